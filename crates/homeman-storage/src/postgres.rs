//! PostgreSQL storage backend.
//!
//! The pool is owned by a bootstrapped [`Dependency`]; every call fetches it
//! through [`Dependency::handle`], so a degraded database surfaces as
//! `ServiceUnavailable` before any query is attempted.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use homeman_bootstrap::{Connector, Dependency};
use homeman_core::{Error, ResourceKind, Result};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPoolOptions};
use sqlx::{Connection, PgPool};
use tracing::debug;
use uuid::Uuid;

use crate::store::{Store, parse_int, parse_uuid};
use crate::types::*;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const USER_COLUMNS: &str = "id, email, full_name, is_superuser, hashed_password";
const DEVICE_COLUMNS: &str = "id, name, is_active, type_id, user_id";
const SENSOR_COLUMNS: &str = "id, name, is_active, type_id, device_id";
const READING_COLUMNS: &str = "id, sensor_id, data, created_at";

/// Maps a driver error, turning constraint violations into domain errors.
fn map_sqlx(err: sqlx::Error, conflict: &str) -> Error {
    if let sqlx::Error::Database(db) = &err {
        match db.code().as_deref() {
            Some("23505") => return Error::conflict(conflict),
            Some("23503") => return Error::invalid_data(db.message().to_string()),
            _ => {}
        }
    }
    Error::backend(err.to_string())
}

fn backend(err: sqlx::Error) -> Error {
    Error::backend(err.to_string())
}

// ============================================================================
// Connector
// ============================================================================

/// Opens and validates a Postgres pool.
#[derive(Debug, Clone)]
pub struct PostgresConnector {
    url: String,
    max_connections: u32,
    acquire_timeout: Duration,
    migrate: bool,
}

impl PostgresConnector {
    /// Creates a connector for `url`.
    pub fn new(url: impl Into<String>, max_connections: u32) -> Self {
        Self {
            url: url.into(),
            max_connections,
            acquire_timeout: Duration::from_secs(5),
            migrate: true,
        }
    }

    /// Skips schema migrations after connecting.
    pub fn without_migrations(mut self) -> Self {
        self.migrate = false;
        self
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    type Handle = PgPool;

    fn name(&self) -> &str {
        "postgres"
    }

    async fn connect(&self) -> Result<PgPool> {
        let options = PgConnectOptions::from_str(&self.url).map_err(backend)?;

        // A single direct connection validates the server; the pool itself
        // would retry until its acquire timeout and hide the cause.
        let mut conn = PgConnection::connect_with(&options)
            .await
            .map_err(backend)?;
        let (version,): (String,) = sqlx::query_as("SELECT version()")
            .fetch_one(&mut conn)
            .await
            .map_err(backend)?;
        debug!(%version, "postgres handshake");

        if self.migrate {
            MIGRATOR
                .run_direct(&mut conn)
                .await
                .map_err(|e| Error::backend(e.to_string()))?;
        }
        conn.close().await.map_err(backend)?;

        Ok(PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect_lazy_with(options))
    }

    async fn ping(&self, pool: &PgPool) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn close(&self, pool: &PgPool) {
        pool.close().await;
    }
}

// ============================================================================
// Store
// ============================================================================

/// [`Store`] over the bootstrapped Postgres dependency.
pub struct PostgresStore {
    db: Arc<Dependency<PostgresConnector>>,
}

impl PostgresStore {
    /// Wraps a (possibly not yet connected) Postgres dependency.
    pub fn new(db: Arc<Dependency<PostgresConnector>>) -> Self {
        Self { db }
    }

    async fn pool(&self) -> Result<Arc<PgPool>> {
        self.db.handle().await
    }

    async fn count(&self, sql: &str) -> Result<u64> {
        let pool = self.pool().await?;
        let (n,): (i64,) = sqlx::query_as(sql)
            .fetch_one(&*pool)
            .await
            .map_err(backend)?;
        Ok(n.max(0) as u64)
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn get(&self, kind: ResourceKind, id: &str) -> Result<Option<Record>> {
        let pool = self.pool().await?;
        let record = match kind {
            ResourceKind::User => {
                let Some(id) = parse_uuid(id) else {
                    return Ok(None);
                };
                sqlx::query_as::<_, User>(&format!(
                    "SELECT {USER_COLUMNS} FROM \"user\" WHERE id = $1"
                ))
                .bind(id)
                .fetch_optional(&*pool)
                .await
                .map_err(backend)?
                .map(Record::User)
            }
            ResourceKind::Device => {
                let Some(id) = parse_uuid(id) else {
                    return Ok(None);
                };
                sqlx::query_as::<_, Device>(&format!(
                    "SELECT {DEVICE_COLUMNS} FROM device WHERE id = $1"
                ))
                .bind(id)
                .fetch_optional(&*pool)
                .await
                .map_err(backend)?
                .map(Record::Device)
            }
            ResourceKind::Sensor => {
                let Some(id) = parse_uuid(id) else {
                    return Ok(None);
                };
                sqlx::query_as::<_, Sensor>(&format!(
                    "SELECT {SENSOR_COLUMNS} FROM sensor WHERE id = $1"
                ))
                .bind(id)
                .fetch_optional(&*pool)
                .await
                .map_err(backend)?
                .map(Record::Sensor)
            }
            ResourceKind::Reading => {
                let Some(id) = parse_int(id) else {
                    return Ok(None);
                };
                sqlx::query_as::<_, SensorReading>(&format!(
                    "SELECT {READING_COLUMNS} FROM sensordata WHERE id = $1"
                ))
                .bind(id)
                .fetch_optional(&*pool)
                .await
                .map_err(backend)?
                .map(Record::Reading)
            }
        };
        Ok(record)
    }

    // ───────────────────────────── Users ─────────────────────────────

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let pool = self.pool().await?;
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM \"user\" WHERE id = $1"))
            .bind(id)
            .fetch_optional(&*pool)
            .await
            .map_err(backend)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let pool = self.pool().await?;
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM \"user\" WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&*pool)
        .await
        .map_err(backend)
    }

    async fn list_users(&self, page: Pagination) -> Result<Page<User>> {
        let pool = self.pool().await?;
        let data = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM \"user\" ORDER BY email OFFSET $1 LIMIT $2"
        ))
        .bind(i64::from(page.skip))
        .bind(i64::from(page.limit))
        .fetch_all(&*pool)
        .await
        .map_err(backend)?;
        let count = self.count("SELECT COUNT(*) FROM \"user\"").await?;
        Ok(Page { data, count })
    }

    async fn create_user(&self, new: NewUser) -> Result<User> {
        let pool = self.pool().await?;
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO \"user\" (id, email, full_name, is_superuser, hashed_password) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new.email)
        .bind(&new.full_name)
        .bind(new.is_superuser)
        .bind(&new.hashed_password)
        .fetch_one(&*pool)
        .await
        .map_err(|e| map_sqlx(e, "The user with this email already exists in the system"))
    }

    async fn update_user(&self, id: Uuid, update: UserUpdate) -> Result<User> {
        let pool = self.pool().await?;
        sqlx::query_as::<_, User>(&format!(
            "UPDATE \"user\" SET email = COALESCE($2, email), \
             full_name = COALESCE($3, full_name), \
             is_superuser = COALESCE($4, is_superuser), \
             hashed_password = COALESCE($5, hashed_password) \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(&update.email)
        .bind(&update.full_name)
        .bind(update.is_superuser)
        .bind(&update.hashed_password)
        .fetch_optional(&*pool)
        .await
        .map_err(|e| map_sqlx(e, "User with this email already exists"))?
        .ok_or_else(|| Error::not_found("User not found"))
    }

    // ───────────────────────────── Device types ─────────────────────────────

    async fn list_device_types(&self, page: Pagination) -> Result<Page<DeviceType>> {
        let pool = self.pool().await?;
        let data = sqlx::query_as::<_, DeviceType>(
            "SELECT id, name FROM devicetype ORDER BY id OFFSET $1 LIMIT $2",
        )
        .bind(i64::from(page.skip))
        .bind(i64::from(page.limit))
        .fetch_all(&*pool)
        .await
        .map_err(backend)?;
        let count = self.count("SELECT COUNT(*) FROM devicetype").await?;
        Ok(Page { data, count })
    }

    async fn create_device_type(&self, name: &str) -> Result<DeviceType> {
        let pool = self.pool().await?;
        sqlx::query_as::<_, DeviceType>(
            "INSERT INTO devicetype (name) VALUES ($1) RETURNING id, name",
        )
        .bind(name)
        .fetch_one(&*pool)
        .await
        .map_err(|e| map_sqlx(e, &format!("Device type with name '{name}' already exists")))
    }

    // ───────────────────────────── Devices ─────────────────────────────

    async fn list_user_devices(&self, user_id: Uuid) -> Result<Page<Device>> {
        let pool = self.pool().await?;
        let data = sqlx::query_as::<_, Device>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM device WHERE user_id = $1 ORDER BY name, id"
        ))
        .bind(user_id)
        .fetch_all(&*pool)
        .await
        .map_err(backend)?;
        let count = data.len() as u64;
        Ok(Page { data, count })
    }

    async fn create_device(&self, owner: Uuid, new: NewDevice) -> Result<Device> {
        let pool = self.pool().await?;
        sqlx::query_as::<_, Device>(&format!(
            "INSERT INTO device (id, name, is_active, type_id, user_id) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {DEVICE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(new.is_active)
        .bind(new.type_id)
        .bind(owner)
        .fetch_one(&*pool)
        .await
        .map_err(|e| map_sqlx(e, "Device already exists"))
    }

    async fn update_device(&self, id: Uuid, update: DeviceUpdate) -> Result<Device> {
        let pool = self.pool().await?;
        sqlx::query_as::<_, Device>(&format!(
            "UPDATE device SET name = COALESCE($2, name), \
             is_active = COALESCE($3, is_active), \
             type_id = COALESCE($4, type_id) \
             WHERE id = $1 RETURNING {DEVICE_COLUMNS}"
        ))
        .bind(id)
        .bind(&update.name)
        .bind(update.is_active)
        .bind(update.type_id)
        .fetch_optional(&*pool)
        .await
        .map_err(|e| map_sqlx(e, "Device already exists"))?
        .ok_or_else(|| Error::not_found("Device not found"))
    }

    async fn delete_device(&self, id: Uuid) -> Result<()> {
        let pool = self.pool().await?;
        // Sensors and readings go with it through ON DELETE CASCADE.
        let done = sqlx::query("DELETE FROM device WHERE id = $1")
            .bind(id)
            .execute(&*pool)
            .await
            .map_err(backend)?;
        if done.rows_affected() == 0 {
            return Err(Error::not_found("Device not found"));
        }
        Ok(())
    }

    // ───────────────────────────── Sensor types ─────────────────────────────

    async fn list_sensor_types(&self, page: Pagination) -> Result<Page<SensorType>> {
        let pool = self.pool().await?;
        let data = sqlx::query_as::<_, SensorType>(
            "SELECT id, name, unit FROM sensortype ORDER BY id OFFSET $1 LIMIT $2",
        )
        .bind(i64::from(page.skip))
        .bind(i64::from(page.limit))
        .fetch_all(&*pool)
        .await
        .map_err(backend)?;
        let count = self.count("SELECT COUNT(*) FROM sensortype").await?;
        Ok(Page { data, count })
    }

    async fn create_sensor_type(&self, name: &str, unit: &str) -> Result<SensorType> {
        let pool = self.pool().await?;
        sqlx::query_as::<_, SensorType>(
            "INSERT INTO sensortype (name, unit) VALUES ($1, $2) RETURNING id, name, unit",
        )
        .bind(name)
        .bind(unit)
        .fetch_one(&*pool)
        .await
        .map_err(|e| map_sqlx(e, &format!("Sensor type with name '{name}' already exists")))
    }

    // ───────────────────────────── Sensors ─────────────────────────────

    async fn list_user_sensors(&self, user_id: Uuid) -> Result<Page<Sensor>> {
        let pool = self.pool().await?;
        let data = sqlx::query_as::<_, Sensor>(
            "SELECT s.id, s.name, s.is_active, s.type_id, s.device_id \
             FROM sensor s JOIN device d ON d.id = s.device_id \
             WHERE d.user_id = $1 ORDER BY s.name, s.id",
        )
        .bind(user_id)
        .fetch_all(&*pool)
        .await
        .map_err(backend)?;
        let count = data.len() as u64;
        Ok(Page { data, count })
    }

    async fn create_sensor(&self, new: NewSensor) -> Result<Sensor> {
        let pool = self.pool().await?;
        sqlx::query_as::<_, Sensor>(&format!(
            "INSERT INTO sensor (id, name, is_active, type_id, device_id) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {SENSOR_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(new.is_active)
        .bind(new.type_id)
        .bind(new.device_id)
        .fetch_one(&*pool)
        .await
        .map_err(|e| map_sqlx(e, "Sensor already exists"))
    }

    async fn update_sensor(&self, id: Uuid, update: SensorUpdate) -> Result<Sensor> {
        let pool = self.pool().await?;
        sqlx::query_as::<_, Sensor>(&format!(
            "UPDATE sensor SET name = COALESCE($2, name), \
             is_active = COALESCE($3, is_active), \
             type_id = COALESCE($4, type_id) \
             WHERE id = $1 RETURNING {SENSOR_COLUMNS}"
        ))
        .bind(id)
        .bind(&update.name)
        .bind(update.is_active)
        .bind(update.type_id)
        .fetch_optional(&*pool)
        .await
        .map_err(|e| map_sqlx(e, "Sensor already exists"))?
        .ok_or_else(|| Error::not_found("Sensor not found"))
    }

    async fn delete_sensor(&self, id: Uuid) -> Result<()> {
        let pool = self.pool().await?;
        let done = sqlx::query("DELETE FROM sensor WHERE id = $1")
            .bind(id)
            .execute(&*pool)
            .await
            .map_err(backend)?;
        if done.rows_affected() == 0 {
            return Err(Error::not_found("Sensor not found"));
        }
        Ok(())
    }

    // ───────────────────────────── Readings ─────────────────────────────

    async fn create_reading(&self, sensor_id: Uuid, data: f64) -> Result<SensorReading> {
        let pool = self.pool().await?;
        sqlx::query_as::<_, SensorReading>(&format!(
            "INSERT INTO sensordata (sensor_id, data) VALUES ($1, $2) RETURNING {READING_COLUMNS}"
        ))
        .bind(sensor_id)
        .bind(data)
        .fetch_one(&*pool)
        .await
        .map_err(|e| match map_sqlx(e, "Reading already exists") {
            Error::InvalidData(_) => Error::not_found("Sensor not found"),
            other => other,
        })
    }

    async fn list_readings(
        &self,
        sensor_id: Uuid,
        query: ReadingQuery,
    ) -> Result<Page<SensorReading>> {
        let pool = self.pool().await?;
        let filter = "sensor_id = $1 \
                      AND ($2::timestamptz IS NULL OR created_at >= $2) \
                      AND ($3::timestamptz IS NULL OR created_at <= $3)";
        let order = if query.reverse { "DESC" } else { "ASC" };

        let data = sqlx::query_as::<_, SensorReading>(&format!(
            "SELECT {READING_COLUMNS} FROM sensordata WHERE {filter} \
             ORDER BY created_at {order}, id {order} OFFSET $4 LIMIT $5"
        ))
        .bind(sensor_id)
        .bind(query.start)
        .bind(query.end)
        .bind(i64::from(query.skip))
        .bind(i64::from(query.limit))
        .fetch_all(&*pool)
        .await
        .map_err(backend)?;

        let (count,): (i64,) =
            sqlx::query_as(&format!("SELECT COUNT(*) FROM sensordata WHERE {filter}"))
                .bind(sensor_id)
                .bind(query.start)
                .bind(query.end)
                .fetch_one(&*pool)
                .await
                .map_err(backend)?;

        Ok(Page {
            data,
            count: count.max(0) as u64,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use homeman_bootstrap::{DependencyState, ManagedDependency};

    #[test]
    fn test_connector_name() {
        let connector = PostgresConnector::new("postgres://localhost/homeman", 10);
        assert_eq!(connector.name(), "postgres");
        assert!(connector.migrate);
        assert!(!connector.without_migrations().migrate);
    }

    #[tokio::test]
    async fn test_store_fails_fast_when_not_connected() {
        let db = Arc::new(Dependency::new(PostgresConnector::new(
            "postgres://localhost/homeman",
            1,
        )));
        let store = PostgresStore::new(Arc::clone(&db));

        let err = store
            .get(ResourceKind::Device, &Uuid::new_v4().to_string())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Service unavailable: postgres is disconnected");

        let err = store.list_users(Pagination::default()).await.unwrap_err();
        assert!(matches!(err, Error::ServiceUnavailable(_)));
        assert_eq!(db.state().await, DependencyState::Disconnected);
    }

    #[tokio::test]
    async fn test_failed_connect_reports_the_cause_at_once() {
        // Nothing listens on port 1.
        let connector = PostgresConnector::new("postgres://homeman@127.0.0.1:1/homeman", 1);
        let started = std::time::Instant::now();

        let outcome = tokio::time::timeout(Duration::from_secs(3), connector.connect()).await;

        let err = outcome.unwrap().unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
        assert!(!err.to_string().contains("pool timed out"), "{err}");
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_url() {
        let connector = PostgresConnector::new("not a url", 1);
        let err = connector.connect().await.unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
    }

    #[test]
    fn test_map_sqlx_non_database_error_is_backend() {
        let err = map_sqlx(sqlx::Error::RowNotFound, "dup");
        assert!(matches!(err, Error::Backend(_)));
    }
}
