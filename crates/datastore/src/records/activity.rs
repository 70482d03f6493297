use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use crate::activity::ActivityAction;
use crate::criteria::SqlValue;
use crate::repository::{InsertRecord, NoUpdate, Record};

/// Audit trail row; written once, never updated.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ActivityRecord {
    /// Unique row id.
    pub id: Uuid,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Principal that performed the action.
    pub generator_id: Uuid,
    /// Table of the mutated resource.
    pub resource_type: String,
    /// Id of the mutated resource.
    pub resource_id: Uuid,
    /// Action label, one of [`ActivityAction`].
    pub action: String,
    /// Principal that created the entry.
    pub creator_id: Uuid,
    /// Tenant of the acting principal, not of the target row.
    pub owner_id: Uuid,
    /// Human-readable summary.
    pub description: String,
}

impl Record for ActivityRecord {
    type Insert = NewActivity;
    type Update = NoUpdate;

    fn id(&self) -> Uuid {
        self.id
    }
}

/// Insert shape for `activities`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewActivity {
    /// Principal that performed the action.
    pub generator_id: Uuid,
    /// Table of the mutated resource.
    pub resource_type: String,
    /// Id of the mutated resource.
    pub resource_id: Uuid,
    /// Action label.
    pub action: ActivityAction,
    /// Principal that created the entry.
    pub creator_id: Uuid,
    /// Tenant of the acting principal.
    pub owner_id: Uuid,
    /// Human-readable summary.
    pub description: String,
}

impl InsertRecord for NewActivity {
    fn columns() -> &'static [&'static str] {
        &[
            "generator_id",
            "resource_type",
            "resource_id",
            "action",
            "creator_id",
            "owner_id",
            "description",
        ]
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.generator_id.into(),
            self.resource_type.as_str().into(),
            self.resource_id.into(),
            self.action.as_str().into(),
            self.creator_id.into(),
            self.owner_id.into(),
            self.description.as_str().into(),
        ]
    }

    fn owner_id(&self) -> Option<Uuid> {
        Some(self.owner_id)
    }
}
