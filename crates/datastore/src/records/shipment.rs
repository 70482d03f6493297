use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use freightdeck_core::AppError;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::criteria::SqlValue;
use crate::repository::{InsertRecord, Record, UpdateRecord};

/// Lifecycle state of a shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    /// Created but not yet picked up.
    Pending,
    /// On its way to the destination.
    InTransit,
    /// Arrived at the destination.
    Delivered,
    /// Cancelled before delivery.
    Cancelled,
}

impl ShipmentStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InTransit => "in_transit",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Display for ShipmentStatus {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for ShipmentStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "in_transit" => Ok(Self::InTransit),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(AppError::Validation(format!(
                "unknown shipment status '{value}'"
            ))),
        }
    }
}

/// Shipment row managed through the admin panel.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ShipmentRecord {
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
    /// Customer-facing reference code.
    pub reference: String,
    /// Lifecycle state, one of [`ShipmentStatus`].
    pub status: String,
    /// Pickup location.
    pub origin: Option<String>,
    /// Delivery location.
    pub destination: Option<String>,
}

impl Record for ShipmentRecord {
    type Insert = NewShipment;
    type Update = ShipmentChanges;

    fn id(&self) -> Uuid {
        self.id
    }
}

/// Insert shape for `shipments`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewShipment {
    /// Principal creating the row.
    pub creator_id: Uuid,
    /// Owning tenant; required when permissions are enforced.
    pub owner_id: Option<Uuid>,
    /// Customer-facing reference code.
    pub reference: String,
    /// Initial lifecycle state.
    pub status: ShipmentStatus,
    /// Pickup location.
    pub origin: Option<String>,
    /// Delivery location.
    pub destination: Option<String>,
}

impl InsertRecord for NewShipment {
    fn columns() -> &'static [&'static str] {
        &[
            "creator_id",
            "owner_id",
            "reference",
            "status",
            "origin",
            "destination",
        ]
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.creator_id.into(),
            self.owner_id.into(),
            self.reference.as_str().into(),
            self.status.as_str().into(),
            self.origin.clone().into(),
            self.destination.clone().into(),
        ]
    }

    fn owner_id(&self) -> Option<Uuid> {
        self.owner_id
    }
}

/// Update shape for `shipments`; unset fields stay unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShipmentChanges {
    /// New lifecycle state.
    pub status: Option<ShipmentStatus>,
    /// New pickup location.
    pub origin: Option<String>,
    /// New delivery location.
    pub destination: Option<String>,
}

impl UpdateRecord for ShipmentChanges {
    fn assignments(&self) -> Vec<(&'static str, SqlValue)> {
        let mut assignments = Vec::new();
        if let Some(status) = self.status {
            assignments.push(("status", status.as_str().into()));
        }
        if let Some(origin) = &self.origin {
            assignments.push(("origin", origin.as_str().into()));
        }
        if let Some(destination) = &self.destination {
            assignments.push(("destination", destination.as_str().into()));
        }
        assignments
    }
}
