use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Watermark row for one entity domain; `name` is the scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub name: String,
    pub watermark: DateTime<Utc>,
}
