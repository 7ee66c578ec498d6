//! Stored records and the parameters used to create or change them.
//!
//! Ownership fields (`Device::user_id`, `Sensor::device_id`,
//! `SensorReading::sensor_id`) are set at creation and never appear in an
//! update type.

use chrono::{DateTime, Utc};
use homeman_core::{ResourceKind, ResourceRef};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered user. Root of every ownership chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Primary key.
    pub id: Uuid,
    /// Unique login email.
    pub email: String,
    /// Display name.
    pub full_name: Option<String>,
    /// Privileged capability flag.
    pub is_superuser: bool,
    /// Argon2 PHC string; never serialized.
    #[serde(skip_serializing, default)]
    pub hashed_password: String,
}

/// Taxonomy entry for devices (e.g. "Light", "Thermostat").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeviceType {
    /// Primary key.
    pub id: i32,
    /// Unique name.
    pub name: String,
}

/// A device owned by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Device {
    /// Primary key.
    pub id: Uuid,
    /// User-chosen name (e.g. "Living room light").
    pub name: String,
    /// Current state of activity.
    pub is_active: bool,
    /// Optional device type.
    pub type_id: Option<i32>,
    /// Owning user.
    pub user_id: Uuid,
}

/// Taxonomy entry for sensors (e.g. "Temperature" in "°C").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SensorType {
    /// Primary key.
    pub id: i32,
    /// Unique name.
    pub name: String,
    /// Unit of measurement.
    pub unit: String,
}

/// A sensor attached to a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Sensor {
    /// Primary key.
    pub id: Uuid,
    /// User-chosen name.
    pub name: String,
    /// Current state of activity.
    pub is_active: bool,
    /// Sensor type.
    pub type_id: i32,
    /// Owning device.
    pub device_id: Uuid,
}

/// One time-stamped measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SensorReading {
    /// Primary key.
    pub id: i64,
    /// Owning sensor.
    pub sensor_id: Uuid,
    /// Measured value.
    pub data: f64,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
}

/// Any record that can be the target of an ownership check.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// A user.
    User(User),
    /// A device.
    Device(Device),
    /// A sensor.
    Sensor(Sensor),
    /// A reading.
    Reading(SensorReading),
}

impl Record {
    /// Kind of this record.
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::User(_) => ResourceKind::User,
            Self::Device(_) => ResourceKind::Device,
            Self::Sensor(_) => ResourceKind::Sensor,
            Self::Reading(_) => ResourceKind::Reading,
        }
    }

    /// The direct owner edge, or `None` for a user.
    pub fn owner(&self) -> Option<ResourceRef> {
        match self {
            Self::User(_) => None,
            Self::Device(d) => Some(ResourceRef::new(ResourceKind::User, d.user_id.to_string())),
            Self::Sensor(s) => Some(ResourceRef::device(s.device_id)),
            Self::Reading(r) => Some(ResourceRef::sensor(r.sensor_id)),
        }
    }

    /// The user id, when this record is a user.
    pub fn as_user_id(&self) -> Option<Uuid> {
        match self {
            Self::User(u) => Some(u.id),
            _ => None,
        }
    }
}

/// A page of results plus the total number of matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items in this page.
    pub data: Vec<T>,
    /// Total number of matching items.
    pub count: u64,
}

impl<T> Page<T> {
    /// An empty page.
    pub fn empty() -> Self {
        Self {
            data: Vec::new(),
            count: 0,
        }
    }
}

/// Offset pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pagination {
    /// Items to skip.
    pub skip: u32,
    /// Maximum items to return.
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { skip: 0, limit: 100 }
    }
}

/// Fields for a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Unique login email.
    pub email: String,
    /// Display name.
    pub full_name: Option<String>,
    /// Privileged capability flag.
    pub is_superuser: bool,
    /// Already-hashed password.
    pub hashed_password: String,
}

/// Partial update of a user. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    /// New email.
    pub email: Option<String>,
    /// New display name.
    pub full_name: Option<String>,
    /// New privilege flag.
    pub is_superuser: Option<bool>,
    /// New password hash.
    pub hashed_password: Option<String>,
}

/// Fields for a new device; the owner is passed separately.
#[derive(Debug, Clone, Deserialize)]
pub struct NewDevice {
    /// User-chosen name.
    pub name: String,
    /// Initial activity state.
    #[serde(default)]
    pub is_active: bool,
    /// Optional device type.
    #[serde(default)]
    pub type_id: Option<i32>,
}

/// Partial update of a device.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeviceUpdate {
    /// New name.
    pub name: Option<String>,
    /// New activity state.
    pub is_active: Option<bool>,
    /// New device type.
    pub type_id: Option<i32>,
}

/// Fields for a new sensor.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSensor {
    /// User-chosen name.
    pub name: String,
    /// Initial activity state.
    #[serde(default)]
    pub is_active: bool,
    /// Sensor type.
    pub type_id: i32,
    /// Owning device.
    pub device_id: Uuid,
}

/// Partial update of a sensor. The owning device cannot change.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SensorUpdate {
    /// New name.
    pub name: Option<String>,
    /// New activity state.
    pub is_active: Option<bool>,
    /// New sensor type.
    pub type_id: Option<i32>,
}

/// Filter for listing readings.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReadingQuery {
    /// Inclusive lower bound on `created_at`.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    pub end: Option<DateTime<Utc>>,
    /// Newest first when true.
    pub reverse: bool,
    /// Items to skip.
    pub skip: u32,
    /// Maximum items to return.
    pub limit: u32,
}

impl Default for ReadingQuery {
    fn default() -> Self {
        Self {
            start: None,
            end: None,
            reverse: true,
            skip: 0,
            limit: 100,
        }
    }
}

impl ReadingQuery {
    /// True when `at` falls inside the time bounds.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.is_none_or(|s| at >= s) && self.end.is_none_or(|e| at <= e)
    }
}
