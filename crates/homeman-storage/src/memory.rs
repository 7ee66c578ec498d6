//! In-memory storage backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use homeman_core::{Clock, Error, ResourceKind, Result, SystemClock};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::{Store, parse_int, parse_uuid};
use crate::types::*;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    device_types: BTreeMap<i32, DeviceType>,
    devices: HashMap<Uuid, Device>,
    sensor_types: BTreeMap<i32, SensorType>,
    sensors: HashMap<Uuid, Sensor>,
    readings: BTreeMap<i64, SensorReading>,
    last_device_type: i32,
    last_sensor_type: i32,
    last_reading: i64,
}

fn paginate<T>(items: Vec<T>, page: Pagination) -> Page<T> {
    let count = items.len() as u64;
    let data = items
        .into_iter()
        .skip(page.skip as usize)
        .take(page.limit as usize)
        .collect();
    Page { data, count }
}

/// Storage backend that keeps everything in process memory.
///
/// Counts point lookups made through [`Store::get`] so tests can assert how
/// many hops an ownership check took.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    lookups: AtomicUsize,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Creates an empty store stamped by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store that stamps readings with `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            lookups: AtomicUsize::new(0),
            clock,
        }
    }

    /// Number of [`Store::get`] calls so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, kind: ResourceKind, id: &str) -> Result<Option<Record>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let t = self.tables.read().await;
        let record = match kind {
            ResourceKind::User => parse_uuid(id)
                .and_then(|id| t.users.get(&id).cloned())
                .map(Record::User),
            ResourceKind::Device => parse_uuid(id)
                .and_then(|id| t.devices.get(&id).cloned())
                .map(Record::Device),
            ResourceKind::Sensor => parse_uuid(id)
                .and_then(|id| t.sensors.get(&id).cloned())
                .map(Record::Sensor),
            ResourceKind::Reading => parse_int(id)
                .and_then(|id| t.readings.get(&id).cloned())
                .map(Record::Reading),
        };
        Ok(record)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users.values().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self, page: Pagination) -> Result<Page<User>> {
        let t = self.tables.read().await;
        let mut users: Vec<User> = t.users.values().cloned().collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(paginate(users, page))
    }

    async fn create_user(&self, new: NewUser) -> Result<User> {
        let mut t = self.tables.write().await;
        if t.users.values().any(|u| u.email == new.email) {
            return Err(Error::conflict(
                "The user with this email already exists in the system",
            ));
        }
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            full_name: new.full_name,
            is_superuser: new.is_superuser,
            hashed_password: new.hashed_password,
        };
        t.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_user(&self, id: Uuid, update: UserUpdate) -> Result<User> {
        let mut t = self.tables.write().await;
        if let Some(email) = &update.email {
            if t.users.values().any(|u| &u.email == email && u.id != id) {
                return Err(Error::conflict("User with this email already exists"));
            }
        }
        let user = t
            .users
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("User not found"))?;
        if let Some(email) = update.email {
            user.email = email;
        }
        if let Some(full_name) = update.full_name {
            user.full_name = Some(full_name);
        }
        if let Some(flag) = update.is_superuser {
            user.is_superuser = flag;
        }
        if let Some(hash) = update.hashed_password {
            user.hashed_password = hash;
        }
        Ok(user.clone())
    }

    async fn list_device_types(&self, page: Pagination) -> Result<Page<DeviceType>> {
        let t = self.tables.read().await;
        Ok(paginate(t.device_types.values().cloned().collect(), page))
    }

    async fn create_device_type(&self, name: &str) -> Result<DeviceType> {
        let mut t = self.tables.write().await;
        if t.device_types.values().any(|dt| dt.name == name) {
            return Err(Error::conflict(format!(
                "Device type with name '{name}' already exists"
            )));
        }
        t.last_device_type += 1;
        let device_type = DeviceType {
            id: t.last_device_type,
            name: name.to_string(),
        };
        t.device_types.insert(device_type.id, device_type.clone());
        Ok(device_type)
    }

    async fn list_user_devices(&self, user_id: Uuid) -> Result<Page<Device>> {
        let t = self.tables.read().await;
        let mut devices: Vec<Device> = t
            .devices
            .values()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect();
        devices.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        let count = devices.len() as u64;
        Ok(Page {
            data: devices,
            count,
        })
    }

    async fn create_device(&self, owner: Uuid, new: NewDevice) -> Result<Device> {
        let mut t = self.tables.write().await;
        if !t.users.contains_key(&owner) {
            return Err(Error::invalid_data("Owner does not exist"));
        }
        if let Some(type_id) = new.type_id {
            if !t.device_types.contains_key(&type_id) {
                return Err(Error::invalid_data("Device type not found"));
            }
        }
        let device = Device {
            id: Uuid::new_v4(),
            name: new.name,
            is_active: new.is_active,
            type_id: new.type_id,
            user_id: owner,
        };
        t.devices.insert(device.id, device.clone());
        Ok(device)
    }

    async fn update_device(&self, id: Uuid, update: DeviceUpdate) -> Result<Device> {
        let mut t = self.tables.write().await;
        if let Some(type_id) = update.type_id {
            if !t.device_types.contains_key(&type_id) {
                return Err(Error::invalid_data("Device type not found"));
            }
        }
        let device = t
            .devices
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("Device not found"))?;
        if let Some(name) = update.name {
            device.name = name;
        }
        if let Some(active) = update.is_active {
            device.is_active = active;
        }
        if update.type_id.is_some() {
            device.type_id = update.type_id;
        }
        Ok(device.clone())
    }

    async fn delete_device(&self, id: Uuid) -> Result<()> {
        let mut t = self.tables.write().await;
        if t.devices.remove(&id).is_none() {
            return Err(Error::not_found("Device not found"));
        }
        let sensors: Vec<Uuid> = t
            .sensors
            .values()
            .filter(|s| s.device_id == id)
            .map(|s| s.id)
            .collect();
        for sensor_id in &sensors {
            t.sensors.remove(sensor_id);
        }
        t.readings.retain(|_, r| !sensors.contains(&r.sensor_id));
        Ok(())
    }

    async fn list_sensor_types(&self, page: Pagination) -> Result<Page<SensorType>> {
        let t = self.tables.read().await;
        Ok(paginate(t.sensor_types.values().cloned().collect(), page))
    }

    async fn create_sensor_type(&self, name: &str, unit: &str) -> Result<SensorType> {
        let mut t = self.tables.write().await;
        if t.sensor_types.values().any(|st| st.name == name) {
            return Err(Error::conflict(format!(
                "Sensor type with name '{name}' already exists"
            )));
        }
        t.last_sensor_type += 1;
        let sensor_type = SensorType {
            id: t.last_sensor_type,
            name: name.to_string(),
            unit: unit.to_string(),
        };
        t.sensor_types.insert(sensor_type.id, sensor_type.clone());
        Ok(sensor_type)
    }

    async fn list_user_sensors(&self, user_id: Uuid) -> Result<Page<Sensor>> {
        let t = self.tables.read().await;
        let mut sensors: Vec<Sensor> = t
            .sensors
            .values()
            .filter(|s| {
                t.devices
                    .get(&s.device_id)
                    .is_some_and(|d| d.user_id == user_id)
            })
            .cloned()
            .collect();
        sensors.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        let count = sensors.len() as u64;
        Ok(Page {
            data: sensors,
            count,
        })
    }

    async fn create_sensor(&self, new: NewSensor) -> Result<Sensor> {
        let mut t = self.tables.write().await;
        if !t.devices.contains_key(&new.device_id) {
            return Err(Error::not_found("Device not found"));
        }
        if !t.sensor_types.contains_key(&new.type_id) {
            return Err(Error::invalid_data("Sensor type not found"));
        }
        let sensor = Sensor {
            id: Uuid::new_v4(),
            name: new.name,
            is_active: new.is_active,
            type_id: new.type_id,
            device_id: new.device_id,
        };
        t.sensors.insert(sensor.id, sensor.clone());
        Ok(sensor)
    }

    async fn update_sensor(&self, id: Uuid, update: SensorUpdate) -> Result<Sensor> {
        let mut t = self.tables.write().await;
        if let Some(type_id) = update.type_id {
            if !t.sensor_types.contains_key(&type_id) {
                return Err(Error::invalid_data("Sensor type not found"));
            }
        }
        let sensor = t
            .sensors
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("Sensor not found"))?;
        if let Some(name) = update.name {
            sensor.name = name;
        }
        if let Some(active) = update.is_active {
            sensor.is_active = active;
        }
        if let Some(type_id) = update.type_id {
            sensor.type_id = type_id;
        }
        Ok(sensor.clone())
    }

    async fn delete_sensor(&self, id: Uuid) -> Result<()> {
        let mut t = self.tables.write().await;
        if t.sensors.remove(&id).is_none() {
            return Err(Error::not_found("Sensor not found"));
        }
        t.readings.retain(|_, r| r.sensor_id != id);
        Ok(())
    }

    async fn create_reading(&self, sensor_id: Uuid, data: f64) -> Result<SensorReading> {
        let mut t = self.tables.write().await;
        if !t.sensors.contains_key(&sensor_id) {
            return Err(Error::not_found("Sensor not found"));
        }
        t.last_reading += 1;
        let reading = SensorReading {
            id: t.last_reading,
            sensor_id,
            data,
            created_at: self.clock.now(),
        };
        t.readings.insert(reading.id, reading.clone());
        Ok(reading)
    }

    async fn list_readings(
        &self,
        sensor_id: Uuid,
        query: ReadingQuery,
    ) -> Result<Page<SensorReading>> {
        let t = self.tables.read().await;
        let mut readings: Vec<SensorReading> = t
            .readings
            .values()
            .filter(|r| r.sensor_id == sensor_id && query.contains(r.created_at))
            .cloned()
            .collect();
        readings.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        if query.reverse {
            readings.reverse();
        }
        Ok(paginate(
            readings,
            Pagination {
                skip: query.skip,
                limit: query.limit,
            },
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;
    use homeman_core::ManualClock;
    use proptest::prelude::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.into(),
            full_name: None,
            is_superuser: false,
            hashed_password: "hash".into(),
        }
    }

    fn new_device(name: &str) -> NewDevice {
        NewDevice {
            name: name.into(),
            is_active: false,
            type_id: None,
        }
    }

    async fn seeded() -> (MemoryStore, User, Device, Sensor) {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("a@example.com")).await.unwrap();
        let device = store
            .create_device(user.id, new_device("Hall"))
            .await
            .unwrap();
        let st = store.create_sensor_type("Temperature", "°C").await.unwrap();
        let sensor = store
            .create_sensor(NewSensor {
                name: "Hall temp".into(),
                is_active: true,
                type_id: st.id,
                device_id: device.id,
            })
            .await
            .unwrap();
        (store, user, device, sensor)
    }

    // ------------------------------------------------------------------------
    // Point lookups
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_get_each_kind() {
        let (store, user, device, sensor) = seeded().await;
        let reading = store.create_reading(sensor.id, 1.0).await.unwrap();

        let got = store
            .get(ResourceKind::User, &user.id.to_string())
            .await
            .unwrap();
        assert_eq!(got, Some(Record::User(user)));
        let got = store
            .get(ResourceKind::Device, &device.id.to_string())
            .await
            .unwrap();
        assert_eq!(got, Some(Record::Device(device)));
        let got = store
            .get(ResourceKind::Sensor, &sensor.id.to_string())
            .await
            .unwrap();
        assert_eq!(got, Some(Record::Sensor(sensor)));
        let got = store
            .get(ResourceKind::Reading, &reading.id.to_string())
            .await
            .unwrap();
        assert_eq!(got, Some(Record::Reading(reading)));
        assert_eq!(store.lookups(), 4);
    }

    #[tokio::test]
    async fn test_get_malformed_id_is_absent() {
        let store = MemoryStore::new();
        assert!(store.get(ResourceKind::Device, "not-a-uuid").await.unwrap().is_none());
        assert!(store.get(ResourceKind::Reading, "abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_wrong_kind_is_absent() {
        let (store, _, device, _) = seeded().await;
        let got = store
            .get(ResourceKind::Sensor, &device.id.to_string())
            .await
            .unwrap();
        assert!(got.is_none());
    }

    // ------------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = MemoryStore::new();
        store.create_user(new_user("a@example.com")).await.unwrap();
        let err = store
            .create_user(new_user("a@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_user_partial() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("a@example.com")).await.unwrap();
        let updated = store
            .update_user(
                user.id,
                UserUpdate {
                    full_name: Some("Ada".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.full_name.as_deref(), Some("Ada"));
        assert_eq!(updated.email, "a@example.com");
    }

    #[tokio::test]
    async fn test_list_users_paginates() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .create_user(new_user(&format!("u{i}@example.com")))
                .await
                .unwrap();
        }
        let page = store
            .list_users(Pagination { skip: 1, limit: 2 })
            .await
            .unwrap();
        assert_eq!(page.count, 5);
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.data[0].email, "u1@example.com");
    }

    // ------------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_type_names_unique() {
        let store = MemoryStore::new();
        store.create_device_type("Light").await.unwrap();
        let err = store.create_device_type("Light").await.unwrap_err();
        assert_eq!(err.to_string(), "Device type with name 'Light' already exists");

        store.create_sensor_type("Humidity", "%").await.unwrap();
        assert!(store.create_sensor_type("Humidity", "%").await.is_err());
    }

    // ------------------------------------------------------------------------
    // Devices and sensors
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_device_with_unknown_type_rejected() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("a@example.com")).await.unwrap();
        let err = store
            .create_device(
                user.id,
                NewDevice {
                    type_id: Some(99),
                    ..new_device("x")
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[tokio::test]
    async fn test_list_user_devices_only_own() {
        let (store, user, _, _) = seeded().await;
        let other = store.create_user(new_user("b@example.com")).await.unwrap();
        store.create_device(other.id, new_device("Theirs")).await.unwrap();

        let page = store.list_user_devices(user.id).await.unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.data[0].name, "Hall");
    }

    #[tokio::test]
    async fn test_list_user_sensors_follows_devices() {
        let (store, user, _, sensor) = seeded().await;
        let other = store.create_user(new_user("b@example.com")).await.unwrap();

        assert_eq!(store.list_user_sensors(user.id).await.unwrap().data, vec![sensor]);
        assert_eq!(store.list_user_sensors(other.id).await.unwrap().count, 0);
    }

    #[tokio::test]
    async fn test_update_sensor_keeps_device() {
        let (store, _, device, sensor) = seeded().await;
        let updated = store
            .update_sensor(
                sensor.id,
                SensorUpdate {
                    name: Some("Renamed".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.device_id, device.id);
    }

    #[tokio::test]
    async fn test_delete_device_cascades() {
        let (store, _, device, sensor) = seeded().await;
        let reading = store.create_reading(sensor.id, 3.5).await.unwrap();

        store.delete_device(device.id).await.unwrap();

        let sid = sensor.id.to_string();
        assert!(store.get(ResourceKind::Sensor, &sid).await.unwrap().is_none());
        let rid = reading.id.to_string();
        assert!(store.get(ResourceKind::Reading, &rid).await.unwrap().is_none());
        assert!(matches!(
            store.delete_device(device.id).await.unwrap_err(),
            Error::NotFound(_)
        ));
    }

    // ------------------------------------------------------------------------
    // Readings
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_readings_order_and_bounds() {
        let clock = Arc::new(ManualClock::default());
        let store = MemoryStore::with_clock(clock.clone());
        let user = store.create_user(new_user("a@example.com")).await.unwrap();
        let device = store.create_device(user.id, new_device("d")).await.unwrap();
        let st = store.create_sensor_type("T", "°C").await.unwrap();
        let sensor = store
            .create_sensor(NewSensor {
                name: "s".into(),
                is_active: true,
                type_id: st.id,
                device_id: device.id,
            })
            .await
            .unwrap();

        let t0 = clock.now();
        for v in [1.0, 2.0, 3.0] {
            store.create_reading(sensor.id, v).await.unwrap();
            clock.advance(Duration::minutes(1));
        }

        let newest_first = store
            .list_readings(sensor.id, ReadingQuery::default())
            .await
            .unwrap();
        let values: Vec<f64> = newest_first.data.iter().map(|r| r.data).collect();
        assert_eq!(values, vec![3.0, 2.0, 1.0]);

        let bounded = store
            .list_readings(
                sensor.id,
                ReadingQuery {
                    start: Some(t0 + Duration::minutes(1)),
                    reverse: false,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let values: Vec<f64> = bounded.data.iter().map(|r| r.data).collect();
        assert_eq!(values, vec![2.0, 3.0]);
        assert_eq!(bounded.count, 2);
    }

    #[tokio::test]
    async fn test_reading_for_missing_sensor() {
        let store = MemoryStore::new();
        let err = store.create_reading(Uuid::new_v4(), 1.0).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    proptest! {
        #[test]
        fn test_paginate_window(n in 0usize..50, skip in 0u32..60, limit in 0u32..60) {
            let page = paginate((0..n).collect::<Vec<_>>(), Pagination { skip, limit });
            prop_assert_eq!(page.count, n as u64);
            let expected = n.saturating_sub(skip as usize).min(limit as usize);
            prop_assert_eq!(page.data.len(), expected);
            if let Some(first) = page.data.first() {
                prop_assert_eq!(*first, skip as usize);
            }
        }
    }
}
