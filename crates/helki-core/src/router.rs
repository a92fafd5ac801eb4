// ── Socket.IO event routing ──
//
// Decodes one `42`-class envelope at a time and applies it to the store.
// Parsing is best-effort: malformed envelopes and unknown event names are
// logged at debug and dropped, never propagated.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::model::{AttrMap, DeviceContext, ZoneNode, zone_key};
use crate::store::{UpdateKind, ZoneStore};

/// Dispatches decoded event envelopes into the [`ZoneStore`].
pub struct EventRouter {
    store: Arc<ZoneStore>,
    ctx: DeviceContext,
    namespace: String,
}

impl EventRouter {
    pub fn new(store: Arc<ZoneStore>, ctx: DeviceContext, namespace: impl Into<String>) -> Self {
        Self {
            store,
            ctx,
            namespace: namespace.into(),
        }
    }

    /// Route one event envelope (the message body after the `42` token).
    pub fn route(&self, envelope: &str) {
        let body = self.strip_namespace(envelope);
        let parsed: Value = match serde_json::from_str(body) {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "unparseable event envelope");
                return;
            }
        };
        let Some(items) = parsed.as_array() else {
            debug!("event envelope is not an array");
            return;
        };

        let name = items.first().and_then(Value::as_str).unwrap_or("unknown");
        let payload = items.get(1).cloned().unwrap_or(Value::Null);
        debug!(event = name, "routing event");

        match name {
            "update" => self.handle_update(&payload),
            "dev_data" => self.handle_dev_data(&payload),
            other => debug!(event = other, "ignoring unhandled event"),
        }
    }

    /// Drop the namespace prefix and its trailing comma, when present.
    fn strip_namespace<'a>(&self, envelope: &'a str) -> &'a str {
        match envelope.strip_prefix(self.namespace.as_str()) {
            Some(rest) => rest.strip_prefix(',').unwrap_or(rest),
            None => envelope,
        }
    }

    /// `{path, body}`: a targeted replacement of one zone's status or
    /// setup sub-map. Zones not yet learned are ignored.
    fn handle_update(&self, payload: &Value) {
        let path = payload.get("path").and_then(Value::as_str).unwrap_or("");

        // Path shape: /acm/<zoneAddr>/<status|setup>. Anything else
        // (e.g. /connected) carries no zone data.
        let parts: Vec<&str> = path.split('/').collect();
        if parts.len() < 3 || parts[1] != "acm" {
            debug!(path, "update path carries no zone target");
            return;
        }
        let Ok(zone_addr) = parts[2].parse::<u32>() else {
            debug!(path, "update path has a malformed zone address");
            return;
        };
        let kind = UpdateKind::parse(parts.get(3).copied());

        let body: AttrMap = match payload.get("body") {
            Some(body) => match serde_json::from_value(body.clone()) {
                Ok(map) => map,
                Err(e) => {
                    debug!(error = %e, "malformed update body");
                    return;
                }
            },
            None => AttrMap::new(),
        };

        let key = zone_key(&self.ctx.dev_id, zone_addr);
        self.store.apply_partial(&key, kind, body);
    }

    /// `{nodes: [...]}`: a full snapshot. Malformed nodes are skipped
    /// individually so one bad entry cannot drop the rest.
    fn handle_dev_data(&self, payload: &Value) {
        let Some(raw_nodes) = payload.get("nodes").and_then(Value::as_array) else {
            debug!("dev_data payload carries no nodes");
            return;
        };

        let nodes: Vec<ZoneNode> = raw_nodes
            .iter()
            .filter_map(|raw| match serde_json::from_value(raw.clone()) {
                Ok(node) => Some(node),
                Err(e) => {
                    debug!(error = %e, "skipping malformed node");
                    None
                }
            })
            .collect();

        if nodes.is_empty() {
            return;
        }
        self.store.apply_full_snapshot(&nodes, &self.ctx);
        debug!(zones = nodes.len(), "applied full snapshot");
    }
}

// ── Tests ────────────────────────────────────────────────────────────
