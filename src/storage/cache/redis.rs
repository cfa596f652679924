//! Redis cache backend
//!
//! Counters use `HINCRBY` + `EXPIRE` in a MULTI/EXEC pipeline; compare-and-swap
//! and once-per-marker counting run server-side as Lua scripts.

use super::{SharedCache, ttl_secs};
use crate::config::RedisConfig;
use crate::utils::error::{ImportError, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, Script};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

// ARGV: [has_expected, expected, new, ttl_secs]
static CAS_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
local current = redis.call('GET', KEYS[1])
if ARGV[1] == '0' then
  if current then return 0 end
elseif current ~= ARGV[2] then
  return 0
end
redis.call('SET', KEYS[1], ARGV[3], 'EX', ARGV[4])
return 1
",
    )
});

// ARGV: [marker, ttl_secs, increment_count, (field, delta)..., (field, value)...]
static INCREMENT_ONCE_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
if redis.call('HSETNX', KEYS[1], ARGV[1], '1') == 0 then
  return false
end
local values = {}
local i = 4
for _ = 1, tonumber(ARGV[3]) do
  values[#values + 1] = redis.call('HINCRBY', KEYS[1], ARGV[i], ARGV[i + 1])
  i = i + 2
end
while i < #ARGV do
  redis.call('HSET', KEYS[1], ARGV[i], ARGV[i + 1])
  i = i + 2
end
redis.call('EXPIRE', KEYS[1], ARGV[2])
return values
",
    )
});

/// Cache backed by a Redis multiplexed connection
#[derive(Clone)]
pub struct RedisCache {
    connection: MultiplexedConnection,
    url: String,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("url", &self.url)
            .finish()
    }
}

impl RedisCache {
    /// Connect to Redis
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        let url = Self::sanitize_url(&config.url);
        info!("Connecting to Redis cache");
        debug!("Redis URL: {}", url);

        let client = Client::open(config.url.as_str())?;
        let connection = tokio::time::timeout(
            Duration::from_secs(config.connection_timeout),
            client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| ImportError::timeout("Timed out connecting to Redis"))??;

        info!("Redis cache connected");
        Ok(Self { connection, url })
    }

    /// Sanitize Redis URL for logging (hide password)
    pub(crate) fn sanitize_url(url: &str) -> String {
        match url::Url::parse(url) {
            Ok(mut parsed) => {
                if parsed.password().is_some() {
                    let _ = parsed.set_password(Some("***"));
                }
                parsed.to_string()
            }
            Err(_) => "invalid_url".to_string(),
        }
    }
}

#[async_trait]
impl SharedCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: () = conn.set_ex(key, value, ttl_secs(ttl)).await?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection.clone();
        let removed: u64 = conn.del(keys).await?;
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn hash_increment(
        &self,
        key: &str,
        field: &str,
        delta: i64,
        ttl: Duration,
    ) -> Result<i64> {
        let mut conn = self.connection.clone();
        let (value,): (i64,) = redis::pipe()
            .atomic()
            .hincr(key, field, delta)
            .expire(key, ttl_secs(ttl) as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: () = redis::pipe()
            .atomic()
            .hset(key, field, value)
            .ignore()
            .expire(key, ttl_secs(ttl) as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn hash_increment_once(
        &self,
        key: &str,
        marker: &str,
        increments: &[(&str, i64)],
        fields: &[(&str, &str)],
        ttl: Duration,
    ) -> Result<Option<Vec<i64>>> {
        let mut conn = self.connection.clone();
        let mut invocation = INCREMENT_ONCE_SCRIPT.prepare_invoke();
        invocation
            .key(key)
            .arg(marker)
            .arg(ttl_secs(ttl))
            .arg(increments.len());
        for (field, delta) in increments {
            invocation.arg(*field).arg(*delta);
        }
        for (field, value) in fields {
            invocation.arg(*field).arg(*value);
        }
        let values: Option<Vec<i64>> = invocation.invoke_async(&mut conn).await?;
        Ok(values)
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.connection.clone();
        let fields: HashMap<String, String> = conn.hgetall(key).await?;
        Ok(fields)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Duration,
    ) -> Result<bool> {
        let mut conn = self.connection.clone();
        let swapped: i64 = CAS_SCRIPT
            .key(key)
            .arg(if expected.is_some() { "1" } else { "0" })
            .arg(expected.unwrap_or_default())
            .arg(new)
            .arg(ttl_secs(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(swapped == 1)
    }

    async fn health_check(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
