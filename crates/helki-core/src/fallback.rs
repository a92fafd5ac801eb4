// ── REST degraded-mode refresh ──
//
// When the push channel is down (or has never connected), zone status is
// fetched one zone at a time over plain REST. Per-zone failures are
// skipped: partial success still freshens whatever it can.

use std::sync::Arc;

use tracing::{debug, warn};

use helki_api::RestClient;

use crate::model::{DeviceContext, attrs_from_status};
use crate::store::{UpdateKind, ZoneStore};

/// Fetches per-zone status over REST and applies it to the store.
pub(crate) struct FallbackFetcher {
    rest: RestClient,
    store: Arc<ZoneStore>,
    ctx: DeviceContext,
    bootstrap_addrs: Vec<u32>,
}

impl FallbackFetcher {
    pub(crate) fn new(
        rest: RestClient,
        store: Arc<ZoneStore>,
        ctx: DeviceContext,
        bootstrap_addrs: Vec<u32>,
    ) -> Self {
        Self {
            rest,
            store,
            ctx,
            bootstrap_addrs,
        }
    }

    /// Refresh every known zone; with no zones yet, bootstrap from the
    /// configured addresses instead. Returns how many zones were touched.
    pub(crate) async fn refresh(&self) -> usize {
        let snapshot = self.store.snapshot();
        if snapshot.is_empty() {
            return self.bootstrap().await;
        }

        let mut refreshed = 0;
        for (key, zone) in snapshot.iter() {
            match self.rest.zone_status(&self.ctx.dev_id, zone.zone_addr).await {
                Ok(status) => {
                    self.store
                        .apply_partial(key, UpdateKind::Status, attrs_from_status(status));
                    refreshed += 1;
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "zone refresh failed, skipping");
                }
            }
        }
        debug!(refreshed, "REST refresh complete");
        refreshed
    }

    /// Seed the store from scratch when the push channel never connected.
    pub(crate) async fn bootstrap(&self) -> usize {
        let mut created = 0;
        for &addr in &self.bootstrap_addrs {
            match self.rest.zone_status(&self.ctx.dev_id, addr).await {
                Ok(status) => {
                    self.store
                        .apply_rest_status(addr, attrs_from_status(status), &self.ctx);
                    created += 1;
                }
                Err(e) => {
                    debug!(zone = addr, error = %e, "bootstrap status fetch failed, skipping");
                }
            }
        }
        debug!(created, "REST bootstrap complete");
        created
    }
}

// ── Tests ────────────────────────────────────────────────────────────
