use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::AppError;

/// Action named by a permission grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrantAction {
    /// Insert a new resource row.
    Create,
    /// Fetch resource rows.
    Read,
    /// Modify an existing resource row.
    Update,
    /// Remove (or soft-delete) a resource row.
    Delete,
}

impl GrantAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl Display for GrantAction {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for GrantAction {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "create" => Ok(Self::Create),
            "read" => Ok(Self::Read),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            _ => Err(AppError::Validation(format!(
                "unknown grant action '{value}'"
            ))),
        }
    }
}

/// One position of a permission grant: the wildcard or an exact value.
///
/// Serialized as `"*"` for the wildcard and the value's string form
/// otherwise, matching the persisted grant shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pattern<T> {
    /// Matches any value in this position.
    Any,
    /// Matches exactly one value.
    Exact(T),
}

impl<T: PartialEq> Pattern<T> {
    /// Returns whether the pattern matches `target`.
    #[must_use]
    pub fn matches(&self, target: &T) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(value) => value == target,
        }
    }

    /// Returns whether the pattern matches an optional target; an absent
    /// target is matched only by the wildcard.
    #[must_use]
    pub fn matches_opt(&self, target: Option<&T>) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(value) => target == Some(value),
        }
    }
}

impl Pattern<String> {
    /// Returns whether the pattern matches a string target without copying.
    #[must_use]
    pub fn matches_str(&self, target: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(value) => value == target,
        }
    }
}

impl<T: Display> Display for Pattern<T> {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => formatter.write_str("*"),
            Self::Exact(value) => write!(formatter, "{value}"),
        }
    }
}

impl<T: FromStr> FromStr for Pattern<T> {
    type Err = T::Err;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value == "*" {
            return Ok(Self::Any);
        }

        value.parse().map(Self::Exact)
    }
}

impl<T: Display> Serialize for Pattern<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de, T> Deserialize<'de> for Pattern<T>
where
    T: FromStr,
    T::Err: Display,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(D::Error::custom)
    }
}

/// One permission rule held by a principal, scoped by action, resource
/// type, resource id, and owning tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionGrant {
    /// Action the grant allows.
    pub action: Pattern<GrantAction>,
    /// Resource type (table name) the grant covers.
    pub resource_type: Pattern<String>,
    /// Specific resource id the grant covers.
    pub resource_id: Pattern<Uuid>,
    /// Owning tenant the grant covers.
    pub owner_id: Pattern<Uuid>,
}

/// Filters `grants` down to those applying to `resource_type` and
/// `action`, exactly or through the wildcard.
#[must_use]
pub fn grants_for<'a>(
    grants: &'a [PermissionGrant],
    action: GrantAction,
    resource_type: &str,
) -> Vec<&'a PermissionGrant> {
    grants
        .iter()
        .filter(|grant| {
            grant.resource_type.matches_str(resource_type) && grant.action.matches(&action)
        })
        .collect()
}

/// Pure allow/deny decision for one target, deny by default.
///
/// A matching grant must cover the resource type and action, its owner
/// must be the wildcard or equal the target owner, and its resource id
/// must be the wildcard or equal the target id. A target without an id
/// (an insert that lets the database assign one) is matched only by
/// wildcard resource-id grants.
#[must_use]
pub fn has_permission(
    grants: &[PermissionGrant],
    action: GrantAction,
    resource_type: &str,
    resource_id: Option<Uuid>,
    owner_id: Uuid,
) -> bool {
    grants_for(grants, action, resource_type)
        .into_iter()
        .any(|grant| {
            grant.owner_id.matches(&owner_id) && grant.resource_id.matches_opt(resource_id.as_ref())
        })
}
