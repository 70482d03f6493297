//! Concrete resource shapes for the administered logistics domain.

mod activity;
mod shipment;
mod tracker;
mod user;

pub use activity::{ActivityRecord, NewActivity};
pub use shipment::{NewShipment, ShipmentChanges, ShipmentRecord, ShipmentStatus};
pub use tracker::{NewTracker, TrackerChanges, TrackerRecord};
pub use user::{NewUser, UserChanges, UserRecord};
