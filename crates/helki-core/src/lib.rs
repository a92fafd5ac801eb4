// helki-core: realtime zone-state synchronization between the Helki cloud
// push channel (helki-api) and consumers.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod router;
pub mod store;
pub mod stream;
pub mod supervisor;

mod fallback;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::SyncConfig;
pub use coordinator::Coordinator;
pub use error::CoreError;
pub use model::{AttrMap, AttrValue, DeviceContext, ZoneMode, ZoneNode, ZoneState, zone_key};
pub use router::EventRouter;
pub use store::{Snapshot, UpdateKind, ZoneStore};
pub use stream::{SnapshotStream, SnapshotWatchStream};
pub use supervisor::ConnectionState;
