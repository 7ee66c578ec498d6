//! Redis connector for the dependency bootstrap.

use async_trait::async_trait;
use homeman_bootstrap::Connector;
use homeman_core::{Error, Result};
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use tracing::debug;

fn backend(err: redis::RedisError) -> Error {
    Error::backend(err.to_string())
}

/// Opens a multiplexed, auto-reconnecting Redis connection.
#[derive(Debug, Clone)]
pub struct RedisConnector {
    url: String,
}

impl RedisConnector {
    /// Creates a connector for `url` (e.g. `redis://localhost:6379/0`).
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// The configured URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Host and port of a Redis URL, without credentials or database.
fn redis_host(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let rest = rest.rsplit_once('@').map_or(rest, |(_, host)| host);
    rest.split('/').next().unwrap_or(rest)
}

/// Sends `PING` and checks the reply.
pub(crate) async fn ping(conn: &ConnectionManager) -> Result<()> {
    let mut conn = conn.clone();
    let reply: String = redis::cmd("PING")
        .query_async(&mut conn)
        .await
        .map_err(backend)?;
    if reply != "PONG" {
        return Err(Error::backend(format!("unexpected PING reply: {reply}")));
    }
    Ok(())
}

#[async_trait]
impl Connector for RedisConnector {
    type Handle = ConnectionManager;

    fn name(&self) -> &str {
        "redis"
    }

    async fn connect(&self) -> Result<ConnectionManager> {
        let client = redis::Client::open(self.url.as_str()).map_err(backend)?;
        // One socket attempt per call; the bootstrap owns the retry schedule.
        let config = ConnectionManagerConfig::new().set_number_of_retries(0);
        let conn = ConnectionManager::new_with_config(client, config)
            .await
            .map_err(backend)?;
        ping(&conn).await?;
        debug!(host = %redis_host(&self.url), "redis handshake");
        Ok(conn)
    }

    async fn ping(&self, conn: &ConnectionManager) -> Result<()> {
        ping(conn).await
    }

    async fn close(&self, _conn: &ConnectionManager) {
        // The manager closes its socket once the last clone is dropped.
        debug!("releasing redis connection manager");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_name_and_url() {
        let connector = RedisConnector::new("redis://localhost:6379/0");
        assert_eq!(connector.name(), "redis");
        assert_eq!(connector.url(), "redis://localhost:6379/0");
    }

    #[test]
    fn test_redis_host_strips_credentials() {
        assert_eq!(
            redis_host("redis://:hunter2@cache.internal:6380/2"),
            "cache.internal:6380"
        );
        assert_eq!(redis_host("redis://user:pw@localhost/0"), "localhost");
        assert_eq!(redis_host("redis://localhost:6379"), "localhost:6379");
    }

    #[tokio::test]
    async fn test_failed_connect_is_a_single_attempt() {
        // Nothing listens on port 1.
        let connector = RedisConnector::new("redis://127.0.0.1:1/0");
        let started = std::time::Instant::now();

        let outcome = tokio::time::timeout(Duration::from_secs(3), connector.connect()).await;

        assert!(matches!(outcome, Ok(Err(Error::Backend(_)))));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_url() {
        let connector = RedisConnector::new("not a url");
        let err = connector.connect().await.unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
    }
}
