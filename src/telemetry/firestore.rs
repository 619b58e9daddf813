//! Firestore REST decoding
//!
//! The list-documents endpoint returns typed values (`{"stringValue": ".."}`,
//! `{"mapValue": {"fields": {..}}}`, ...). They are flattened into plain JSON so the
//! same document decoder serves both the file source and Firestore.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

const FIRESTORE_BASE: &str = "https://firestore.googleapis.com/v1";
const PAGE_SIZE: u32 = 300;

#[derive(Debug, Deserialize)]
pub struct ListDocumentsResponse {
    #[serde(default)]
    pub documents: Vec<FirestoreDocument>,
    #[serde(default, rename = "nextPageToken")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FirestoreDocument {
    /// Full resource name; the last path segment is the document id.
    pub name: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl FirestoreDocument {
    pub fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Flatten the typed fields into a plain JSON object.
    pub fn to_plain(&self) -> Value {
        decode_fields(&self.fields)
    }
}

/// Build the list-documents URL for one page.
pub fn list_documents_url(
    project: &str,
    collection: &str,
    api_key: Option<&str>,
    page_token: Option<&str>,
) -> Result<Url> {
    let mut url = Url::parse(&format!(
        "{}/projects/{}/databases/(default)/documents/{}",
        FIRESTORE_BASE, project, collection
    ))
    .with_context(|| format!("Invalid Firestore project/collection: {}/{}", project, collection))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("pageSize", &PAGE_SIZE.to_string());
        if let Some(key) = api_key {
            query.append_pair("key", key);
        }
        if let Some(token) = page_token {
            query.append_pair("pageToken", token);
        }
    }
    Ok(url)
}

fn decode_fields(fields: &Map<String, Value>) -> Value {
    let mut out = Map::new();
    for (key, typed) in fields {
        out.insert(key.clone(), decode_value(typed));
    }
    Value::Object(out)
}

/// Decode one typed Firestore value. Timestamps become epoch millis.
pub fn decode_value(typed: &Value) -> Value {
    let Some(obj) = typed.as_object() else {
        return Value::Null;
    };
    let Some((kind, inner)) = obj.iter().next() else {
        return Value::Null;
    };
    match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" => inner.clone(),
        "integerValue" => match inner {
            Value::String(s) => s.parse::<i64>().map(Value::from).unwrap_or(Value::Null),
            other => other.clone(),
        },
        "doubleValue" => inner.clone(),
        "timestampValue" => inner
            .as_str()
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| Value::from(dt.timestamp_millis()))
            .unwrap_or(Value::Null),
        "stringValue" | "referenceValue" | "bytesValue" => inner.clone(),
        "geoPointValue" => {
            let mut point = Map::new();
            point.insert("lat".to_string(), inner.get("latitude").cloned().unwrap_or(Value::Null));
            point.insert("lng".to_string(), inner.get("longitude").cloned().unwrap_or(Value::Null));
            Value::Object(point)
        }
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode_value).collect())
                .unwrap_or_default(),
        ),
        "mapValue" => inner
            .get("fields")
            .and_then(Value::as_object)
            .map(decode_fields)
            .unwrap_or_else(|| Value::Object(Map::new())),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_nested_document() {
        let body = json!({
            "documents": [{
                "name": "projects/p/databases/(default)/documents/shipments/doc42",
                "fields": {
                    "truck_id": {"stringValue": "GJ-01-LIVE"},
                    "last_updated": {"integerValue": "1700000000000"},
                    "shock": {"doubleValue": 0.4},
                    "sensors": {"mapValue": {"fields": {
                        "temp": {"doubleValue": 31.0},
                        "humidity": {"integerValue": "38"}
                    }}},
                    "location": {"geoPointValue": {"latitude": 22.1, "longitude": 72.5}}
                }
            }],
            "nextPageToken": "abc"
        });
        let resp: ListDocumentsResponse = serde_json::from_value(body).unwrap();
        assert_eq!(resp.next_page_token.as_deref(), Some("abc"));
        let doc = &resp.documents[0];
        assert_eq!(doc.id(), "doc42");
        let plain = doc.to_plain();
        assert_eq!(plain["truck_id"], "GJ-01-LIVE");
        assert_eq!(plain["last_updated"], 1_700_000_000_000_i64);
        assert_eq!(plain["sensors"]["humidity"], 38);
        assert_eq!(plain["location"]["lat"], 22.1);
    }

    #[test]
    fn test_timestamp_becomes_millis() {
        let v = decode_value(&json!({"timestampValue": "2024-01-01T00:00:00Z"}));
        assert_eq!(v, json!(1_704_067_200_000_i64));
    }

    #[test]
    fn test_list_url_has_key_and_token() {
        let url = list_documents_url("demo", "shipments", Some("k1"), Some("t2")).unwrap();
        let s = url.as_str();
        assert!(s.contains("/projects/demo/databases/(default)/documents/shipments"));
        assert!(s.contains("key=k1"));
        assert!(s.contains("pageToken=t2"));
    }
}
