use std::collections::HashMap;
use std::sync::Arc;

use redis::aio::ConnectionManager;
use redis::{cmd, Client, ErrorKind, RedisError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;

/// Handle to the distributed cache. During the live exam window this is
/// the authoritative store; Postgres only catches up via the synchronizer.
#[derive(Clone)]
pub(crate) struct RedisHandle {
    url: String,
    manager: Arc<RwLock<Option<ConnectionManager>>>,
}

#[derive(Debug, Clone)]
pub(crate) enum RedisHealth {
    Healthy,
    Disconnected,
    Unhealthy(String),
}

impl RedisHandle {
    pub(crate) fn new(url: String) -> Self {
        Self { url, manager: Arc::new(RwLock::new(None)) }
    }

    pub(crate) async fn connect(&self) -> Result<(), RedisError> {
        let client = Client::open(self.url.clone())?;
        let manager = ConnectionManager::new(client).await?;
        let mut guard = self.manager.write().await;
        *guard = Some(manager);
        Ok(())
    }

    pub(crate) async fn disconnect(&self) {
        let mut guard = self.manager.write().await;
        *guard = None;
    }

    async fn connection(&self) -> Result<ConnectionManager, RedisError> {
        let manager = { self.manager.read().await.clone() };
        manager.ok_or_else(|| RedisError::from((ErrorKind::IoError, "redis not connected")))
    }

    pub(crate) async fn health(&self) -> RedisHealth {
        let manager = { self.manager.read().await.clone() };
        let Some(mut manager) = manager else {
            return RedisHealth::Disconnected;
        };

        match cmd("PING").query_async::<_, String>(&mut manager).await {
            Ok(_) => RedisHealth::Healthy,
            Err(err) => RedisHealth::Unhealthy(err.to_string()),
        }
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, RedisError> {
        let mut manager = self.connection().await?;
        let raw: Option<String> = cmd("GET").arg(key).query_async(&mut manager).await?;

        match raw {
            Some(raw) => serde_json::from_str(&raw).map(Some).map_err(|err| {
                RedisError::from((ErrorKind::TypeError, "corrupt cache entry", err.to_string()))
            }),
            None => Ok(None),
        }
    }

    pub(crate) async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), RedisError> {
        let raw = encode(value)?;
        let mut manager = self.connection().await?;
        cmd("SET").arg(key).arg(raw).query_async(&mut manager).await
    }

    pub(crate) async fn set_json_ex<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl_seconds: u64,
    ) -> Result<(), RedisError> {
        let raw = encode(value)?;
        let mut manager = self.connection().await?;
        cmd("SET").arg(key).arg(raw).arg("EX").arg(ttl_seconds).query_async(&mut manager).await
    }

    pub(crate) async fn delete(&self, key: &str) -> Result<(), RedisError> {
        let mut manager = self.connection().await?;
        cmd("DEL").arg(key).query_async(&mut manager).await
    }

    /// Atomic set-if-absent with expiry. Returns false when the key is
    /// already held. This is the sole acquisition primitive for the
    /// per-student submission lock; the TTL bounds how long a crashed
    /// scoring attempt can keep a student locked out.
    pub(crate) async fn set_nx_ex(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> Result<bool, RedisError> {
        let mut manager = self.connection().await?;
        let reply: Option<String> = cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut manager)
            .await?;

        Ok(reply.is_some())
    }

    pub(crate) async fn push_back(&self, queue: &str, value: &str) -> Result<(), RedisError> {
        let mut manager = self.connection().await?;
        cmd("RPUSH").arg(queue).arg(value).query_async(&mut manager).await
    }

    /// Atomically moves the head of `src` to the tail of `dst`. The entry
    /// is never outside a list, so a crash between the move and the final
    /// delete leaves it recoverable.
    pub(crate) async fn move_first(
        &self,
        src: &str,
        dst: &str,
    ) -> Result<Option<String>, RedisError> {
        let mut manager = self.connection().await?;
        cmd("LMOVE").arg(src).arg(dst).arg("LEFT").arg("RIGHT").query_async(&mut manager).await
    }

    pub(crate) async fn list_remove(&self, key: &str, value: &str) -> Result<(), RedisError> {
        let mut manager = self.connection().await?;
        cmd("LREM").arg(key).arg(1).arg(value).query_async(&mut manager).await
    }

    pub(crate) async fn queue_len(&self, queue: &str) -> Result<u64, RedisError> {
        let mut manager = self.connection().await?;
        cmd("LLEN").arg(queue).query_async(&mut manager).await
    }

    /// Applies a batch of integer increments to a hash in one atomic
    /// pipeline. Increments commute, so concurrent writers from different
    /// students merge without a read-modify-write cycle.
    pub(crate) async fn hash_increment(
        &self,
        key: &str,
        fields: &[(&str, i64)],
    ) -> Result<(), RedisError> {
        let mut manager = self.connection().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (field, delta) in fields {
            pipe.cmd("HINCRBY").arg(key).arg(*field).arg(*delta).ignore();
        }
        pipe.query_async(&mut manager).await
    }

    pub(crate) async fn hash_get_all(
        &self,
        key: &str,
    ) -> Result<HashMap<String, i64>, RedisError> {
        let mut manager = self.connection().await?;
        cmd("HGETALL").arg(key).query_async(&mut manager).await
    }

    pub(crate) async fn rate_limit(
        &self,
        key: &str,
        limit: u64,
        window_seconds: u64,
    ) -> Result<bool, RedisError> {
        let manager = { self.manager.read().await.clone() };
        let Some(mut manager) = manager else {
            return Ok(true);
        };

        let script = redis::Script::new(
            r#"
            local current = redis.call("INCR", KEYS[1])
            if current == 1 then
                redis.call("EXPIRE", KEYS[1], ARGV[1])
            end
            return current
        "#,
        );

        let current: i64 =
            script.key(key).arg(window_seconds as i64).invoke_async(&mut manager).await?;

        Ok(current <= limit as i64)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<String, RedisError> {
    serde_json::to_string(value).map_err(|err| {
        RedisError::from((ErrorKind::TypeError, "cache encode failed", err.to_string()))
    })
}

#[cfg(test)]
mod tests {
    use super::RedisHandle;
    use crate::core::config::Settings;
    use crate::test_support;
    use uuid::Uuid;

    async fn connected_handle() -> RedisHandle {
        let settings = Settings::load().expect("settings");
        test_support::reset_redis(settings.redis().redis_url()).await.expect("redis reset");

        let redis = RedisHandle::new(settings.redis().redis_url());
        redis.connect().await.expect("redis connect");
        redis
    }

    #[tokio::test]
    async fn set_nx_ex_grants_only_one_holder() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        let redis = connected_handle().await;

        let key = format!("lock:{}", Uuid::new_v4());
        let first = redis.set_nx_ex(&key, "1", 60).await.expect("set nx");
        let second = redis.set_nx_ex(&key, "1", 60).await.expect("set nx");

        assert!(first);
        assert!(!second);

        redis.delete(&key).await.expect("delete");
        let third = redis.set_nx_ex(&key, "1", 60).await.expect("set nx");
        assert!(third);
    }

    #[tokio::test]
    async fn move_first_claims_in_fifo_order() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        let redis = connected_handle().await;

        let queue = format!("queue:{}", Uuid::new_v4());
        let claimed = format!("{queue}:claimed");
        redis.push_back(&queue, "a").await.expect("push");
        redis.push_back(&queue, "b").await.expect("push");

        assert_eq!(redis.queue_len(&queue).await.expect("len"), 2);
        assert_eq!(redis.move_first(&queue, &claimed).await.expect("move"), Some("a".to_string()));
        assert_eq!(redis.move_first(&queue, &claimed).await.expect("move"), Some("b".to_string()));
        assert_eq!(redis.move_first(&queue, &claimed).await.expect("move"), None);

        assert_eq!(redis.queue_len(&claimed).await.expect("len"), 2);
        redis.list_remove(&claimed, "a").await.expect("remove");
        assert_eq!(redis.queue_len(&claimed).await.expect("len"), 1);
        assert_eq!(redis.move_first(&claimed, &queue).await.expect("move"), Some("b".to_string()));
    }

    #[tokio::test]
    async fn hash_increment_accumulates() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        let redis = connected_handle().await;

        let key = format!("summary:{}", Uuid::new_v4());
        redis.hash_increment(&key, &[("count", 1), ("total", 87)]).await.expect("incr");
        redis.hash_increment(&key, &[("count", 1), ("total", 90)]).await.expect("incr");

        let fields = redis.hash_get_all(&key).await.expect("get all");
        assert_eq!(fields.get("count"), Some(&2));
        assert_eq!(fields.get("total"), Some(&177));
    }

    #[tokio::test]
    async fn rate_limit_enforces_limit() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        let redis = connected_handle().await;

        let key = format!("rate-limit:{}", Uuid::new_v4());
        let first = redis.rate_limit(&key, 1, 5).await.expect("rate limit");
        let second = redis.rate_limit(&key, 1, 5).await.expect("rate limit");

        assert!(first);
        assert!(!second);
    }
}
