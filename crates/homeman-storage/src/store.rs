//! The Store trait that backends implement.

use async_trait::async_trait;
use homeman_core::{ResourceKind, Result};
use uuid::Uuid;

use crate::types::*;

/// The storage trait the access-control and HTTP layers depend on.
///
/// `get` is the only method the ownership resolver calls; it must be a
/// primary-key lookup, never a scan. Everything else is plain CRUD used by
/// request handlers after authorization has succeeded.
#[async_trait]
pub trait Store: Send + Sync {
    // ───────────────────────────── Point lookups ─────────────────────────────

    /// Fetch a record by kind and id. An id that cannot name a record of
    /// that kind is simply absent.
    async fn get(&self, kind: ResourceKind, id: &str) -> Result<Option<Record>>;

    // ───────────────────────────────── Users ─────────────────────────────────

    /// Get a user by id.
    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;

    /// Get a user by email.
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// List users.
    async fn list_users(&self, page: Pagination) -> Result<Page<User>>;

    /// Create a user; `Conflict` when the email is taken.
    async fn create_user(&self, new: NewUser) -> Result<User>;

    /// Apply a partial update to a user.
    async fn update_user(&self, id: Uuid, update: UserUpdate) -> Result<User>;

    // ────────────────────────────── Device types ─────────────────────────────

    /// List device types.
    async fn list_device_types(&self, page: Pagination) -> Result<Page<DeviceType>>;

    /// Create a device type; `Conflict` when the name is taken.
    async fn create_device_type(&self, name: &str) -> Result<DeviceType>;

    // ──────────────────────────────── Devices ────────────────────────────────

    /// Devices owned by a user.
    async fn list_user_devices(&self, user_id: Uuid) -> Result<Page<Device>>;

    /// Create a device owned by `owner`.
    async fn create_device(&self, owner: Uuid, new: NewDevice) -> Result<Device>;

    /// Apply a partial update to a device.
    async fn update_device(&self, id: Uuid, update: DeviceUpdate) -> Result<Device>;

    /// Delete a device together with its sensors and readings.
    async fn delete_device(&self, id: Uuid) -> Result<()>;

    // ────────────────────────────── Sensor types ─────────────────────────────

    /// List sensor types.
    async fn list_sensor_types(&self, page: Pagination) -> Result<Page<SensorType>>;

    /// Create a sensor type; `Conflict` when the name is taken.
    async fn create_sensor_type(&self, name: &str, unit: &str) -> Result<SensorType>;

    // ──────────────────────────────── Sensors ────────────────────────────────

    /// Sensors on devices owned by a user.
    async fn list_user_sensors(&self, user_id: Uuid) -> Result<Page<Sensor>>;

    /// Create a sensor on `new.device_id`.
    async fn create_sensor(&self, new: NewSensor) -> Result<Sensor>;

    /// Apply a partial update to a sensor.
    async fn update_sensor(&self, id: Uuid, update: SensorUpdate) -> Result<Sensor>;

    /// Delete a sensor together with its readings.
    async fn delete_sensor(&self, id: Uuid) -> Result<()>;

    // ──────────────────────────────── Readings ───────────────────────────────

    /// Append a reading to a sensor.
    async fn create_reading(&self, sensor_id: Uuid, data: f64) -> Result<SensorReading>;

    /// Readings of a sensor, filtered and ordered by `query`.
    async fn list_readings(
        &self,
        sensor_id: Uuid,
        query: ReadingQuery,
    ) -> Result<Page<SensorReading>>;
}

/// Parses a UUID-keyed id, treating garbage as "no such record".
pub(crate) fn parse_uuid(id: &str) -> Option<Uuid> {
    Uuid::parse_str(id).ok()
}

/// Parses an integer-keyed id, treating garbage as "no such record".
pub(crate) fn parse_int(id: &str) -> Option<i64> {
    id.parse().ok()
}
