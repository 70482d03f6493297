use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use crate::criteria::SqlValue;
use crate::repository::{InsertRecord, Record, UpdateRecord};

/// Metrics tracker row, ingested from the external metrics system and
/// upserted on its external id.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct TrackerRecord {
    /// Unique row id.
    pub id: Uuid,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Principal that created the row.
    pub creator_id: Uuid,
    /// Owning tenant.
    pub owner_id: Uuid,
    /// External metrics system id; the upsert conflict key.
    pub metrics_ex_id: String,
    /// Free-form description.
    pub description: Option<String>,
}

impl Record for TrackerRecord {
    type Insert = NewTracker;
    type Update = TrackerChanges;

    fn id(&self) -> Uuid {
        self.id
    }
}

/// Insert shape for `trackers`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTracker {
    /// Principal creating the row.
    pub creator_id: Uuid,
    /// Owning tenant; required when permissions are enforced.
    pub owner_id: Option<Uuid>,
    /// External metrics system id.
    pub metrics_ex_id: String,
    /// Free-form description.
    pub description: Option<String>,
}

impl InsertRecord for NewTracker {
    fn columns() -> &'static [&'static str] {
        &["creator_id", "owner_id", "metrics_ex_id", "description"]
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.creator_id.into(),
            self.owner_id.into(),
            self.metrics_ex_id.as_str().into(),
            self.description.clone().into(),
        ]
    }

    fn owner_id(&self) -> Option<Uuid> {
        self.owner_id
    }
}

/// Update shape for `trackers`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerChanges {
    /// New description.
    pub description: Option<String>,
}

impl UpdateRecord for TrackerChanges {
    fn assignments(&self) -> Vec<(&'static str, SqlValue)> {
        let mut assignments = Vec::new();
        if let Some(description) = &self.description {
            assignments.push(("description", description.as_str().into()));
        }
        assignments
    }
}
