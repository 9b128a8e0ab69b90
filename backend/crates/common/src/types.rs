use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub instance_id: Uuid,
}

impl ServiceInfo {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            instance_id: Uuid::new_v4(),
        }
    }
}

/// Field-name to value bag carried by every mirrored record.
pub type Payload = Map<String, Value>;

/// One upstream record, normalized so every entity domain shares the same
/// sync and scheduling code.
///
/// `external_id` is the key upstream uses for the record (a decimal id, or a
/// lower-cased email for identity-keyed domains) and must be stable across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamItem {
    pub external_id: String,
    pub payload: Payload,
    pub updated_at: DateTime<Utc>,
}

impl UpstreamItem {
    pub fn new(external_id: impl Into<String>, updated_at: DateTime<Utc>) -> Self {
        Self {
            external_id: external_id.into(),
            payload: Payload::new(),
            updated_at,
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_owned(), value.into());
        self
    }

    /// Inserts `value` only when it is present and not blank, so consumers can
    /// tell an omitted field apart from an empty one.
    pub fn with_text(mut self, key: &str, value: Option<String>) -> Self {
        if let Some(v) = value {
            let trimmed = v.trim();
            if !trimmed.is_empty() {
                self.payload
                    .insert(key.to_owned(), Value::String(trimmed.to_owned()));
            }
        }
        self
    }

    pub fn with_optional(mut self, key: &str, value: Option<impl Into<Value>>) -> Self {
        if let Some(v) = value {
            self.payload.insert(key.to_owned(), v.into());
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key).filter(|v| !v.is_null())
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }
}
