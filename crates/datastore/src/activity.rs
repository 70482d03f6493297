//! Append-only audit trail written after successful mutations.

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use freightdeck_core::{AppResult, Principal};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use crate::context::current_principal;
use crate::records::{ActivityRecord, NewActivity};
use crate::repository::{Repository, RepositoryConfig};

/// Stable action labels recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityAction {
    /// A row was inserted.
    Create,
    /// A row was modified.
    Update,
    /// A row was removed or soft-deleted.
    Delete,
    /// A row was inserted or merged through the conflict path.
    Upsert,
}

impl ActivityAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Upsert => "upsert",
        }
    }
}

impl Display for ActivityAction {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Writes one immutable audit row per mutation, best-effort.
///
/// The entry goes through the ambient transaction of the triggering
/// mutation, so it commits or rolls back together with the data change.
#[derive(Clone)]
pub struct ActivityRecorder {
    repository: Box<Repository<ActivityRecord>>,
    system_principal: Arc<Principal>,
}

impl ActivityRecorder {
    /// Creates a recorder writing to the `activities` table, attributing
    /// unattended mutations to `system_principal`.
    #[must_use]
    pub fn new(pool: PgPool, system_principal: Arc<Principal>) -> Self {
        let repository = Box::new(Repository::new(pool, RepositoryConfig::new("activities"), None));
        Self {
            repository,
            system_principal,
        }
    }

    /// Records one activity for a successful mutation.
    ///
    /// Failures are logged and swallowed; an audit write must never fail
    /// the business operation it describes.
    pub async fn record(&self, action: ActivityAction, resource_type: &str, resource_id: Uuid) {
        if let Err(record_error) = self.insert(action, resource_type, resource_id).await {
            error!(
                %action,
                resource_type,
                %resource_id,
                %record_error,
                "failed to record activity"
            );
        }
    }

    async fn insert(
        &self,
        action: ActivityAction,
        resource_type: &str,
        resource_id: Uuid,
    ) -> AppResult<()> {
        let principal = current_principal().unwrap_or_else(|| Arc::clone(&self.system_principal));
        let entry = NewActivity {
            generator_id: principal.id(),
            resource_type: resource_type.to_owned(),
            resource_id,
            action,
            creator_id: principal.id(),
            owner_id: principal.owner_id(),
            description: activity_description(&principal, action, resource_type, resource_id),
        };
        self.repository.create(&entry).await.map(drop)
    }
}

/// Builds the human-readable audit summary for one mutation.
fn activity_description(
    principal: &Principal,
    action: ActivityAction,
    resource_type: &str,
    resource_id: Uuid,
) -> String {
    let principal_id = principal.id().to_string();
    let short_id = principal_id.get(..8).unwrap_or(principal_id.as_str());
    format!(
        "{} {} {}: {} '{}' with id={}",
        principal.role(),
        short_id,
        principal.name(),
        action,
        resource_type,
        resource_id
    )
}
