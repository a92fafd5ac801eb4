// ── Zone state store ──
//
// Copy-on-write publication: every update builds a fresh top-level map and
// swaps it in whole, so readers never observe a partially-applied update.
// All writes flow through the single supervisor/router pipeline; reads are
// wait-free and unlimited.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::watch;
use tracing::debug;

use crate::model::{AttrMap, DeviceContext, ZoneNode, ZoneState, zone_key};

/// The published view: zone key → immutable zone state.
pub type Snapshot = HashMap<String, Arc<ZoneState>>;

/// Which sub-map a partial update targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Status,
    Setup,
}

impl UpdateKind {
    /// Path segments default to `status` when the kind is missing or
    /// unrecognized.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("setup") => Self::Setup,
            _ => Self::Status,
        }
    }
}

/// Holds and atomically publishes all known zone state.
///
/// Zone keys, once observed, persist for the process lifetime; this store
/// never removes them.
pub struct ZoneStore {
    current: ArcSwap<Snapshot>,
    published: watch::Sender<Arc<Snapshot>>,
}

impl ZoneStore {
    pub fn new() -> Self {
        let empty: Arc<Snapshot> = Arc::new(HashMap::new());
        let (published, _) = watch::channel(Arc::clone(&empty));
        Self {
            current: ArcSwap::new(empty),
            published,
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Current published view. Wait-free; the returned map never changes.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Push-based change notification; the receiver sees every publish.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.published.subscribe()
    }

    pub fn zone_keys(&self) -> Vec<String> {
        self.snapshot().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Replace one zone's status or setup sub-map.
    ///
    /// No-op when the zone has not been learned yet: zones are created by
    /// full snapshots or REST bootstrap only. Returns whether a publish
    /// happened.
    pub fn apply_partial(&self, key: &str, kind: UpdateKind, body: AttrMap) -> bool {
        let old = self.snapshot();
        let Some(zone) = old.get(key) else {
            debug!(key, "partial update for unknown zone ignored");
            return false;
        };

        let mut updated = (**zone).clone();
        match kind {
            UpdateKind::Status => updated.status = body,
            UpdateKind::Setup => updated.setup = body,
        }

        let mut next: Snapshot = (*old).clone();
        next.insert(key.to_owned(), Arc::new(updated));
        self.publish(next);
        true
    }

    /// Create-or-merge every node from a full `dev_data` snapshot,
    /// publishing exactly once.
    ///
    /// Sections absent from a node leave the stored values untouched.
    pub fn apply_full_snapshot(&self, nodes: &[ZoneNode], ctx: &DeviceContext) {
        if nodes.is_empty() {
            return;
        }

        let old = self.snapshot();
        let mut next: Snapshot = (*old).clone();
        for node in nodes {
            let key = zone_key(&ctx.dev_id, node.addr);
            let zone = match next.get(&key) {
                Some(existing) => merged_zone(existing, node),
                None => new_zone(node, ctx),
            };
            next.insert(key, Arc::new(zone));
        }
        self.publish(next);
    }

    /// Create-or-refresh one zone from a REST status fetch.
    pub fn apply_rest_status(&self, zone_addr: u32, status: AttrMap, ctx: &DeviceContext) {
        let key = zone_key(&ctx.dev_id, zone_addr);
        let old = self.snapshot();
        let mut next: Snapshot = (*old).clone();

        let zone = match next.get(&key) {
            Some(existing) => {
                let mut updated = (**existing).clone();
                updated.status = status;
                updated
            }
            None => ZoneState {
                zone_addr,
                name: format!("Zone {zone_addr}"),
                device: ctx.clone(),
                status,
                setup: AttrMap::new(),
                version: AttrMap::new(),
            },
        };
        next.insert(key, Arc::new(zone));
        self.publish(next);
    }

    /// Swap in the new map, then notify subscribers.
    fn publish(&self, next: Snapshot) {
        let next = Arc::new(next);
        self.current.store(Arc::clone(&next));
        // send_modify notifies even with zero receivers.
        self.published.send_modify(|snap| *snap = next);
    }
}

impl Default for ZoneStore {
    fn default() -> Self {
        Self::new()
    }
}

// ── Merge helpers ────────────────────────────────────────────────────

fn merged_zone(existing: &ZoneState, node: &ZoneNode) -> ZoneState {
    let mut zone = existing.clone();
    if let Some(ref name) = node.name {
        zone.name = name.clone();
    }
    if let Some(ref status) = node.status {
        zone.status = status.clone();
    }
    if let Some(ref setup) = node.setup {
        zone.setup = setup.clone();
    }
    if let Some(ref version) = node.version {
        zone.version = version.clone();
    }
    zone
}

fn new_zone(node: &ZoneNode, ctx: &DeviceContext) -> ZoneState {
    ZoneState {
        zone_addr: node.addr,
        name: node
            .name
            .clone()
            .unwrap_or_else(|| format!("Zone {}", node.addr)),
        device: ctx.clone(),
        status: node.status.clone().unwrap_or_default(),
        setup: node.setup.clone().unwrap_or_default(),
        version: node.version.clone().unwrap_or_default(),
    }
}

// ── Tests ────────────────────────────────────────────────────────────
