use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::cache::TtlCache;
use crate::error::Result;

const KEY_PREFIX: &str = "gapscan:";

/// Optional durable tier behind the in-memory caches, shared across
/// processes through SQLite. When no store is configured every lookup is
/// memory-only; that is a supported mode, not an error. Durable failures
/// of any kind are swallowed and behave as a miss for that call only.
#[derive(Clone)]
pub struct CacheContext {
    pool: Option<SqlitePool>,
}

impl CacheContext {
    pub fn memory_only() -> Self {
        Self { pool: None }
    }

    pub async fn with_sqlite(path: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&format!("sqlite:{path}?mode=rwc"))
            .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at_ms INTEGER NOT NULL
            )",
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool: Some(pool) })
    }

    pub fn is_durable(&self) -> bool {
        self.pool.is_some()
    }

    /// Memory first, then the durable store. A durable hit re-populates the
    /// memory tier with the same TTL a fresh write would have received.
    pub async fn get_through<V>(&self, cache: &TtlCache<V>, key: &str, ttl: Duration) -> Option<V>
    where
        V: Clone + Serialize + DeserializeOwned,
    {
        if let Some(value) = cache.get(key) {
            return Some(value);
        }

        let pool = self.pool.as_ref()?;
        match self.durable_get::<V>(pool, key).await {
            Ok(Some(value)) => {
                cache.set(key, value.clone(), Some(ttl));
                Some(value)
            }
            Ok(None) => None,
            Err(e) => {
                debug!("durable cache read failed for {key}: {e}");
                None
            }
        }
    }

    /// Writes memory, then the durable store when configured.
    pub async fn put_through<V>(&self, cache: &TtlCache<V>, key: &str, value: &V, ttl: Duration)
    where
        V: Clone + Serialize + DeserializeOwned,
    {
        cache.set(key, value.clone(), Some(ttl));

        let Some(pool) = self.pool.as_ref() else {
            return;
        };
        if let Err(e) = self.durable_put(pool, key, value, ttl).await {
            debug!("durable cache write failed for {key}: {e}");
        }
    }

    async fn durable_get<V: DeserializeOwned>(
        &self,
        pool: &SqlitePool,
        key: &str,
    ) -> Result<Option<V>> {
        let row = sqlx::query("SELECT value, expires_at_ms FROM cache_entries WHERE key = ?")
            .bind(format!("{KEY_PREFIX}{key}"))
            .fetch_optional(pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let expires_at_ms: i64 = row.try_get("expires_at_ms")?;
        if expires_at_ms <= chrono::Utc::now().timestamp_millis() {
            // Expired rows are reaped opportunistically on read.
            let _ = sqlx::query("DELETE FROM cache_entries WHERE key = ?")
                .bind(format!("{KEY_PREFIX}{key}"))
                .execute(pool)
                .await;
            return Ok(None);
        }

        let raw: String = row.try_get("value")?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    async fn durable_put<V: Serialize>(
        &self,
        pool: &SqlitePool,
        key: &str,
        value: &V,
        ttl: Duration,
    ) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        let expires_at_ms = chrono::Utc::now().timestamp_millis() + ttl.as_millis() as i64;
        sqlx::query(
            "INSERT OR REPLACE INTO cache_entries (key, value, expires_at_ms) VALUES (?, ?, ?)",
        )
        .bind(format!("{KEY_PREFIX}{key}"))
        .bind(raw)
        .bind(expires_at_ms)
        .execute(pool)
        .await?;
        Ok(())
    }
}
