use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppError;
use crate::permission::PermissionGrant;

/// Authorization role attached to a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full administrative access.
    Admin,
    /// Internal operations staff.
    Operator,
    /// External customer account.
    Customer,
}

impl Role {
    /// Returns a stable storage value for this role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Operator => "operator",
            Self::Customer => "customer",
        }
    }
}

impl Display for Role {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "admin" => Ok(Self::Admin),
            "operator" => Ok(Self::Operator),
            "customer" => Ok(Self::Customer),
            _ => Err(AppError::Validation(format!("unknown role value '{value}'"))),
        }
    }
}

/// The authenticated actor behind the current call chain, resolved by the
/// request layer before any repository call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    role: Role,
    permissions: Vec<PermissionGrant>,
}

impl Principal {
    /// Creates a principal from authentication and tenancy data.
    #[must_use]
    pub fn new(
        id: Uuid,
        owner_id: Uuid,
        name: impl Into<String>,
        role: Role,
        permissions: Vec<PermissionGrant>,
    ) -> Self {
        Self {
            id,
            owner_id,
            name: name.into(),
            role,
            permissions,
        }
    }

    /// Creates the well-known system identity used by unattended jobs.
    ///
    /// The system principal owns itself and carries no explicit grants;
    /// components treat its absence of ambient context as trusted.
    #[must_use]
    pub fn system(id: Uuid) -> Self {
        Self {
            id,
            owner_id: id,
            name: "System".to_owned(),
            role: Role::Admin,
            permissions: Vec::new(),
        }
    }

    /// Returns the stable principal id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the tenant the principal belongs to.
    #[must_use]
    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the authorization role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the permission grants loaded with the principal.
    #[must_use]
    pub fn permissions(&self) -> &[PermissionGrant] {
        self.permissions.as_slice()
    }
}
