// ── Zone domain model ──
//
// The vendor's status/setup dictionaries are duck-typed on the wire. They
// are modeled as maps from string keys to a small closed set of value
// shapes, with anything unrecognized preserved opaquely.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use helki_api::{DeviceRecord, StatusMap};

// ── Attribute values ─────────────────────────────────────────────────

/// A single attribute value as observed on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Any other shape (arrays, nested objects, null), kept verbatim.
    Other(Value),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<Value> for AttrValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or_else(|| Self::Other(Value::Number(n))),
            Value::String(s) => Self::Text(s),
            other => Self::Other(other),
        }
    }
}

/// Status/setup/version sub-map of a zone.
pub type AttrMap = BTreeMap<String, AttrValue>;

/// Convert a raw JSON object (as the REST surface serves it) into an
/// attribute map.
pub fn attrs_from_status(status: StatusMap) -> AttrMap {
    status
        .into_iter()
        .map(|(key, value)| (key, AttrValue::from(value)))
        .collect()
}

// ── Zone mode ────────────────────────────────────────────────────────

/// Operating mode of a zone, as reported in `status.mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneMode {
    Off,
    /// Running the programmed weekly schedule (`"auto"`).
    FollowSchedule,
    /// Manual setpoint override (`"modified_auto"`).
    Manual,
}

impl ZoneMode {
    /// Unrecognized values map to [`FollowSchedule`](Self::FollowSchedule).
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "off" => Self::Off,
            "modified_auto" => Self::Manual,
            _ => Self::FollowSchedule,
        }
    }
}

// ── Device identity ──────────────────────────────────────────────────

/// Identity of the bound device and its group, discovered once at startup
/// and shared read-only across zones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceContext {
    pub dev_id: String,
    pub device_name: String,
    pub group_id: Option<String>,
    pub group_name: Option<String>,
}

impl DeviceContext {
    pub fn from_record(record: &DeviceRecord) -> Self {
        Self {
            dev_id: record.dev_id.clone(),
            device_name: record.name.clone().unwrap_or_else(|| "Device".into()),
            group_id: record.group_id.clone(),
            group_name: record.group_name.clone(),
        }
    }
}

// ── Zone state ───────────────────────────────────────────────────────

/// Store key for a zone: `"{dev_id}_zone{addr}"`.
pub fn zone_key(dev_id: &str, zone_addr: u32) -> String {
    format!("{dev_id}_zone{zone_addr}")
}

/// State of one addressable zone.
///
/// Immutable once published; the store replaces whole values on update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneState {
    pub zone_addr: u32,
    pub name: String,
    pub device: DeviceContext,
    pub status: AttrMap,
    pub setup: AttrMap,
    pub version: AttrMap,
}

impl ZoneState {
    /// Semantic view of `status.mode`; missing or unrecognized values
    /// read as [`ZoneMode::FollowSchedule`].
    pub fn mode(&self) -> ZoneMode {
        self.status
            .get("mode")
            .and_then(AttrValue::as_str)
            .map_or(ZoneMode::FollowSchedule, ZoneMode::parse)
    }
}

// ── Wire-level snapshot node ─────────────────────────────────────────

/// One node entry from a full `dev_data` snapshot.
///
/// Fields the server omits stay `None` and leave the stored value
/// untouched on merge.
#[derive(Debug, Clone, Deserialize)]
pub struct ZoneNode {
    pub addr: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<AttrMap>,
    #[serde(default)]
    pub setup: Option<AttrMap>,
    #[serde(default)]
    pub version: Option<AttrMap>,
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn attr_values_deserialize_by_shape() {
        let map: AttrMap =
            serde_json::from_value(json!({
                "active": true,
                "power": 1200,
                "ratio": 0.5,
                "mtemp": "21.5",
                "prog": [1, 2, 3]
            }))
            .unwrap();

        assert_eq!(map["active"], AttrValue::Bool(true));
        assert_eq!(map["power"], AttrValue::Int(1200));
        assert_eq!(map["ratio"], AttrValue::Float(0.5));
        assert_eq!(map["mtemp"], AttrValue::Text("21.5".into()));
        assert!(matches!(map["prog"], AttrValue::Other(_)));
    }

    #[test]
    fn mode_parsing_is_permissive() {
        assert_eq!(ZoneMode::parse("off"), ZoneMode::Off);
        assert_eq!(ZoneMode::parse("auto"), ZoneMode::FollowSchedule);
        assert_eq!(ZoneMode::parse("modified_auto"), ZoneMode::Manual);
        assert_eq!(ZoneMode::parse("eco_boost"), ZoneMode::FollowSchedule);
        assert_eq!(ZoneMode::parse(""), ZoneMode::FollowSchedule);
    }

    #[test]
    fn zone_mode_reads_from_status() {
        let status = attrs_from_status(
            json!({"mode": "off"}).as_object().cloned().unwrap_or_default(),
        );
        let zone = ZoneState {
            zone_addr: 3,
            name: "Bed".into(),
            device: DeviceContext {
                dev_id: "D1".into(),
                device_name: "Heater".into(),
                group_id: None,
                group_name: None,
            },
            status,
            setup: AttrMap::new(),
            version: AttrMap::new(),
        };
        assert_eq!(zone.mode(), ZoneMode::Off);
    }

    #[test]
    fn zone_keys_compose_device_and_address() {
        assert_eq!(zone_key("D1", 3), "D1_zone3");
    }

    #[test]
    fn node_with_missing_sections_deserializes() {
        let node: ZoneNode =
            serde_json::from_value(json!({"addr": 2, "name": "Bath"})).unwrap();
        assert_eq!(node.addr, 2);
        assert!(node.status.is_none());
        assert!(node.setup.is_none());
    }
}
