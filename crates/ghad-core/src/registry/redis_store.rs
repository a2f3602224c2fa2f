//! Redis-backed registry store.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;

use super::{ReconcilePlan, RegistryError, RegistryStore};

/// [`RegistryStore`] over a Redis connection.
///
/// Plans execute as a `MULTI`/`EXEC` pipeline, so deletions and writes of a
/// cycle commit atomically. The multiplexed connection is safe to share
/// across tasks.
pub struct RedisRegistry {
    conn: MultiplexedConnection,
}

impl RedisRegistry {
    /// Connects to `host:port` and verifies the connection with a `PING`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Connection`] when the server is
    /// unreachable.
    pub async fn connect(host: &str, port: u16) -> Result<Self, RegistryError> {
        let client = redis::Client::open(format!("redis://{host}:{port}"))
            .map_err(|err| RegistryError::Connection(err.to_string()))?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|err| RegistryError::Connection(err.to_string()))?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|err| RegistryError::Connection(err.to_string()))?;
        if pong != "PONG" {
            return Err(RegistryError::Connection(format!(
                "unexpected ping reply: {pong}"
            )));
        }

        Ok(Self { conn })
    }
}

#[async_trait]
impl RegistryStore for RedisRegistry {
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, RegistryError> {
        let mut conn = self.conn.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|err| RegistryError::Command(err.to_string()))?;

            keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(keys)
    }

    async fn execute(&self, plan: &ReconcilePlan) -> Result<(), RegistryError> {
        if plan.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        if !plan.dels.is_empty() {
            pipe.del(&plan.dels);
        }
        for (key, value) in &plan.sets {
            pipe.set(key, value);
        }

        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|err| RegistryError::Command(err.to_string()))?;

        Ok(())
    }
}
