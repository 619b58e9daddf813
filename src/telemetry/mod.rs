//! Vehicle telemetry snapshots
//!
//! Documents in the "shipments" collection are owned by the device gateway, so decoding is
//! lenient: numbers may arrive as strings, sensor fields may be missing, and `last_updated`
//! may be absent (treated as never seen).

pub mod firestore;
pub mod source;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Shock readings above this are treated as sensor noise and clamped.
pub const SHOCK_CLAMP_G: f64 = 2.5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

/// One vehicle document from the collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VehicleTelemetry {
    pub doc_id: String,
    pub truck_id: String,
    pub location: Option<Location>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub shock: Option<f64>,
    pub status: Option<String>,
    /// Epoch millis of the device's last report; 0 when never reported.
    pub last_updated_ms: i64,
}

/// Read a number that may be encoded as a JSON number or a numeric string.
fn lenient_number(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    if n.is_finite() {
        Some(n)
    } else {
        None
    }
}

impl VehicleTelemetry {
    /// Decode a document. The truck id falls back to the document id.
    pub fn from_document(doc_id: &str, doc: &Value) -> Self {
        let truck_id = doc
            .get("truck_id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(doc_id)
            .to_string();

        let sensors = doc.get("sensors");
        let temperature = sensors.and_then(|s| {
            lenient_number(s.get("temp")).or_else(|| lenient_number(s.get("temperature")))
        });
        let humidity = sensors.and_then(|s| lenient_number(s.get("humidity")));

        let location = doc.get("location").and_then(|loc| {
            Some(Location {
                lat: lenient_number(loc.get("lat"))?,
                lng: lenient_number(loc.get("lng"))?,
            })
        });

        let last_updated_ms = lenient_number(doc.get("last_updated"))
            .map(|n| n as i64)
            .unwrap_or(0);

        Self {
            doc_id: doc_id.to_string(),
            truck_id,
            location,
            temperature,
            humidity,
            shock: lenient_number(doc.get("shock")),
            status: doc.get("status").and_then(Value::as_str).map(str::to_string),
            last_updated_ms,
        }
    }

    /// Temperature in °C, 0 when missing.
    pub fn temperature_or_default(&self) -> f64 {
        self.temperature.unwrap_or(0.0)
    }

    /// Relative humidity in %. Missing or zero readings count as 100 (no alert).
    pub fn humidity_or_default(&self) -> f64 {
        match self.humidity {
            Some(h) if h != 0.0 => h,
            _ => 100.0,
        }
    }

    /// Shock in G, clamped to [`SHOCK_CLAMP_G`].
    pub fn shock_clamped(&self) -> f64 {
        self.shock.unwrap_or(0.0).min(SHOCK_CLAMP_G)
    }
}

/// A full-collection snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub received_at: DateTime<Utc>,
    pub vehicles: Vec<VehicleTelemetry>,
}

impl Snapshot {
    /// Accepts any of:
    /// - an array of documents (`id` or `truck_id` used as document id),
    /// - `{"documents": [...]}`,
    /// - an object keyed by document id.
    pub fn from_json(value: &Value, received_at: DateTime<Utc>) -> Self {
        let mut vehicles = Vec::new();
        let docs: Vec<(String, &Value)> = match value {
            Value::Array(items) => items.iter().enumerate().map(|(i, d)| (doc_id_of(d, i), d)).collect(),
            Value::Object(map) => match map.get("documents") {
                Some(Value::Array(items)) => {
                    items.iter().enumerate().map(|(i, d)| (doc_id_of(d, i), d)).collect()
                }
                _ => map.iter().map(|(k, d)| (k.clone(), d)).collect(),
            },
            _ => Vec::new(),
        };
        for (id, doc) in docs {
            if !doc.is_object() {
                debug!("Telemetry: skipping non-object document {}", id);
                continue;
            }
            vehicles.push(VehicleTelemetry::from_document(&id, doc));
        }
        Self {
            received_at,
            vehicles,
        }
    }

    pub fn vehicle(&self, truck_id: &str) -> Option<&VehicleTelemetry> {
        self.vehicles.iter().find(|v| v.truck_id == truck_id)
    }
}

fn doc_id_of(doc: &Value, index: usize) -> String {
    doc.get("id")
        .or_else(|| doc.get("truck_id"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("doc-{}", index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decodes_full_document() {
        let doc = json!({
            "truck_id": "GJ-01-LIVE",
            "location": {"lat": 22.9, "lng": 72.6},
            "sensors": {"temp": 31.5, "humidity": "45"},
            "shock": 0.2,
            "status": "Moving",
            "last_updated": 1_700_000_000_000_i64
        });
        let v = VehicleTelemetry::from_document("abc", &doc);
        assert_eq!(v.truck_id, "GJ-01-LIVE");
        assert_eq!(v.temperature, Some(31.5));
        assert_eq!(v.humidity, Some(45.0));
        assert_eq!(v.location, Some(Location { lat: 22.9, lng: 72.6 }));
        assert_eq!(v.last_updated_ms, 1_700_000_000_000);
    }

    #[test]
    fn test_missing_fields_default() {
        let v = VehicleTelemetry::from_document("doc-1", &json!({}));
        assert_eq!(v.truck_id, "doc-1");
        assert_eq!(v.last_updated_ms, 0);
        assert_eq!(v.temperature_or_default(), 0.0);
        assert_eq!(v.humidity_or_default(), 100.0);
        assert_eq!(v.shock_clamped(), 0.0);
    }

    #[test]
    fn test_temperature_alias_and_shock_clamp() {
        let doc = json!({"sensors": {"temperature": "28"}, "shock": 9.0, "humidity": 0});
        let v = VehicleTelemetry::from_document("x", &doc);
        assert_eq!(v.temperature, Some(28.0));
        assert_eq!(v.shock_clamped(), SHOCK_CLAMP_G);
    }

    #[test]
    fn test_zero_humidity_counts_as_missing() {
        let v = VehicleTelemetry::from_document("x", &json!({"sensors": {"humidity": 0}}));
        assert_eq!(v.humidity_or_default(), 100.0);
    }

    #[test]
    fn test_snapshot_shapes() {
        let now = Utc::now();
        let arr = Snapshot::from_json(&json!([{"truck_id": "A"}, {"id": "B"}]), now);
        assert_eq!(arr.vehicles.len(), 2);
        assert!(arr.vehicle("B").is_some());

        let keyed = Snapshot::from_json(&json!({"d1": {"truck_id": "A"}, "d2": 5}), now);
        assert_eq!(keyed.vehicles.len(), 1);

        let wrapped = Snapshot::from_json(&json!({"documents": [{"truck_id": "C"}]}), now);
        assert_eq!(wrapped.vehicles[0].truck_id, "C");
    }
}
