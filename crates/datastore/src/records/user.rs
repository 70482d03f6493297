use chrono::{DateTime, Utc};
use freightdeck_core::Role;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use crate::criteria::SqlValue;
use crate::repository::{InsertRecord, Record, UpdateRecord};

/// Administered user account row.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct UserRecord {
    /// Unique row id.
    pub id: Uuid,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker; `None` means active.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Principal that created the row.
    pub creator_id: Uuid,
    /// Owning tenant.
    pub owner_id: Uuid,
    /// Login email, unique across all tenants.
    pub email: String,
    /// Authorization role, one of [`Role`].
    pub role: String,
    /// Display name.
    pub name: String,
    /// Company label shown in the admin panel.
    pub company_name: String,
    /// Contact phone number.
    pub phone: Option<String>,
    /// External logistics system id, when synced.
    pub logistics_ex_id: Option<String>,
}

impl Record for UserRecord {
    type Insert = NewUser;
    type Update = UserChanges;

    fn id(&self) -> Uuid {
        self.id
    }
}

/// Insert shape for `users`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    /// Principal creating the row.
    pub creator_id: Uuid,
    /// Owning tenant; required when permissions are enforced.
    pub owner_id: Option<Uuid>,
    /// Login email.
    pub email: String,
    /// Authorization role.
    pub role: Role,
    /// Display name.
    pub name: String,
    /// Company label.
    pub company_name: String,
    /// Contact phone number.
    pub phone: Option<String>,
}

impl InsertRecord for NewUser {
    fn columns() -> &'static [&'static str] {
        &[
            "creator_id",
            "owner_id",
            "email",
            "role",
            "name",
            "company_name",
            "phone",
        ]
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.creator_id.into(),
            self.owner_id.into(),
            self.email.as_str().into(),
            self.role.as_str().into(),
            self.name.as_str().into(),
            self.company_name.as_str().into(),
            self.phone.clone().into(),
        ]
    }

    fn owner_id(&self) -> Option<Uuid> {
        self.owner_id
    }
}

/// Update shape for `users`; unset fields stay unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserChanges {
    /// New login email.
    pub email: Option<String>,
    /// New authorization role.
    pub role: Option<Role>,
    /// New display name.
    pub name: Option<String>,
    /// New company label.
    pub company_name: Option<String>,
    /// New contact phone number.
    pub phone: Option<String>,
    /// New external logistics system id.
    pub logistics_ex_id: Option<String>,
}

impl UpdateRecord for UserChanges {
    fn assignments(&self) -> Vec<(&'static str, SqlValue)> {
        let mut assignments = Vec::new();
        if let Some(email) = &self.email {
            assignments.push(("email", email.as_str().into()));
        }
        if let Some(role) = self.role {
            assignments.push(("role", role.as_str().into()));
        }
        if let Some(name) = &self.name {
            assignments.push(("name", name.as_str().into()));
        }
        if let Some(company_name) = &self.company_name {
            assignments.push(("company_name", company_name.as_str().into()));
        }
        if let Some(phone) = &self.phone {
            assignments.push(("phone", phone.as_str().into()));
        }
        if let Some(logistics_ex_id) = &self.logistics_ex_id {
            assignments.push(("logistics_ex_id", logistics_ex_id.as_str().into()));
        }
        assignments
    }
}
