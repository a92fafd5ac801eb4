// helki-api: protocol plumbing for the Helki device cloud
// (Engine.IO v3 long-polling push channel + REST endpoints).

pub mod auth;
pub mod error;
pub mod frame;
pub mod rest;
pub mod session;
pub mod transport;

pub use auth::{StaticToken, TokenProvider};
pub use error::Error;
pub use frame::Message;
pub use rest::{DeviceRecord, RestClient, StatusMap};
pub use session::{PollingSession, SessionHandle};
pub use transport::TransportConfig;
