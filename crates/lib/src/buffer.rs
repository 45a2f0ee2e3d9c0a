//! Per-sender message buffer.
//!
//! Inbound texts are appended to a short-lived list keyed by sender number so bursts of messages
//! can later be read back and combined into one prompt. Redis is the only real backend (cargo
//! feature `redis`); without it a no-op buffer keeps the receiver path unchanged.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

const KEY_PREFIX: &str = "NUMBER_buffer_helsenia:";

#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("buffer backend: {0}")]
    Backend(String),
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for BufferError {
    fn from(e: redis::RedisError) -> Self {
        Self::Backend(format!("redis: {}", e))
    }
}

/// Storage for buffered messages of one sender.
#[async_trait]
pub trait MessageBuffer: Send + Sync {
    /// Backend name for logs and the health endpoint.
    fn backend(&self) -> &'static str;

    /// Append `message` to the sender's list and refresh its expiry. Blank inputs are ignored.
    async fn push(&self, number: &str, message: &str, ttl: Duration) -> Result<(), BufferError>;

    /// All buffered messages, oldest first. The list is left in place.
    async fn get_all(&self, number: &str) -> Result<Vec<String>, BufferError>;

    /// All buffered messages, oldest first; the list is removed in the same transaction.
    async fn pop_all(&self, number: &str) -> Result<Vec<String>, BufferError>;

    async fn clear(&self, number: &str) -> Result<(), BufferError>;
}

/// Storage key of a sender's list.
pub fn buffer_key(number: &str) -> String {
    format!("{}{}", KEY_PREFIX, number)
}

/// Join buffered messages with `sep` (newline when empty) and clamp the result to `max_chars`
/// characters (0 means no limit). None when there is nothing to combine.
pub fn combine_messages(messages: &[String], sep: &str, max_chars: usize) -> Option<String> {
    if messages.is_empty() {
        return None;
    }
    let sep = if sep.is_empty() { "\n" } else { sep };
    let joined = messages.join(sep);
    if max_chars > 0 && joined.chars().count() > max_chars {
        return Some(joined.chars().take(max_chars).collect());
    }
    Some(joined)
}

/// Buffer that stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBuffer;

#[async_trait]
impl MessageBuffer for NoopBuffer {
    fn backend(&self) -> &'static str {
        "none"
    }

    async fn push(&self, _number: &str, _message: &str, _ttl: Duration) -> Result<(), BufferError> {
        Ok(())
    }

    async fn get_all(&self, _number: &str) -> Result<Vec<String>, BufferError> {
        Ok(Vec::new())
    }

    async fn pop_all(&self, _number: &str) -> Result<Vec<String>, BufferError> {
        Ok(Vec::new())
    }

    async fn clear(&self, _number: &str) -> Result<(), BufferError> {
        Ok(())
    }
}

#[cfg(feature = "redis")]
pub use self::redis_backend::RedisBuffer;

#[cfg(feature = "redis")]
mod redis_backend {
    use super::{buffer_key, BufferError, MessageBuffer};
    use async_trait::async_trait;
    use redis::aio::ConnectionManager;
    use redis::AsyncCommands;
    use std::time::Duration;

    /// Redis list per sender; writes and drains run in MULTI/EXEC pipelines.
    #[derive(Clone)]
    pub struct RedisBuffer {
        manager: ConnectionManager,
    }

    impl RedisBuffer {
        pub async fn connect(redis_url: &str) -> Result<Self, BufferError> {
            let client = redis::Client::open(redis_url)?;
            let manager = client.get_connection_manager().await?;
            Ok(Self { manager })
        }
    }

    #[async_trait]
    impl MessageBuffer for RedisBuffer {
        fn backend(&self) -> &'static str {
            "redis"
        }

        async fn push(&self, number: &str, message: &str, ttl: Duration) -> Result<(), BufferError> {
            if number.is_empty() || message.is_empty() {
                return Ok(());
            }
            let key = buffer_key(number);
            let mut conn = self.manager.clone();
            let mut pipe = redis::pipe();
            pipe.atomic().rpush(&key, message).ignore();
            if !ttl.is_zero() {
                pipe.expire(&key, ttl.as_secs().max(1) as i64).ignore();
            }
            let _: () = pipe.query_async(&mut conn).await?;
            Ok(())
        }

        async fn get_all(&self, number: &str) -> Result<Vec<String>, BufferError> {
            if number.is_empty() {
                return Ok(Vec::new());
            }
            let mut conn = self.manager.clone();
            let items: Vec<String> = conn.lrange(buffer_key(number), 0, -1).await?;
            Ok(items)
        }

        async fn pop_all(&self, number: &str) -> Result<Vec<String>, BufferError> {
            if number.is_empty() {
                return Ok(Vec::new());
            }
            let key = buffer_key(number);
            let mut conn = self.manager.clone();
            let (items,): (Vec<String>,) = redis::pipe()
                .atomic()
                .lrange(&key, 0, -1)
                .del(&key)
                .ignore()
                .query_async(&mut conn)
                .await?;
            Ok(items)
        }

        async fn clear(&self, number: &str) -> Result<(), BufferError> {
            if number.is_empty() {
                return Ok(());
            }
            let mut conn = self.manager.clone();
            conn.del::<_, ()>(buffer_key(number)).await?;
            Ok(())
        }
    }

}

/// Buffer for the configured URL. Falls back to [`NoopBuffer`] (with a warning) when no URL is
/// set, the `redis` feature is off, or the server cannot be reached.
pub async fn connect(redis_url: Option<&str>) -> Arc<dyn MessageBuffer> {
    let Some(url) = redis_url.map(str::trim).filter(|u| !u.is_empty()) else {
        return Arc::new(NoopBuffer);
    };
    connect_url(url).await
}

#[cfg(feature = "redis")]
async fn connect_url(url: &str) -> Arc<dyn MessageBuffer> {
    match RedisBuffer::connect(url).await {
        Ok(buffer) => {
            log::info!("buffer: redis connected");
            Arc::new(buffer)
        }
        Err(e) => {
            log::warn!("buffer: redis unavailable ({}), buffering disabled", e);
            Arc::new(NoopBuffer)
        }
    }
}

#[cfg(not(feature = "redis"))]
async fn connect_url(_url: &str) -> Arc<dyn MessageBuffer> {
    log::warn!("buffer: redis url configured but built without the `redis` feature, buffering disabled");
    Arc::new(NoopBuffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn key_uses_sender_number() {
        assert_eq!(buffer_key("5531999990000"), "NUMBER_buffer_helsenia:5531999990000");
    }

    #[test]
    fn combine_joins_with_default_separator() {
        let msgs = strings(&["oi", "tudo bem?", "quero um anel"]);
        assert_eq!(
            combine_messages(&msgs, "", 0).as_deref(),
            Some("oi\ntudo bem?\nquero um anel")
        );
        assert_eq!(combine_messages(&msgs, " | ", 0).as_deref(), Some("oi | tudo bem? | quero um anel"));
    }

    #[test]
    fn combine_clamps_by_characters_not_bytes() {
        let msgs = strings(&["ação", "ótimo"]);
        assert_eq!(combine_messages(&msgs, " ", 6).as_deref(), Some("ação ó"));
    }

    #[test]
    fn combine_empty_is_none() {
        assert_eq!(combine_messages(&[], "\n", 10), None);
    }

    #[tokio::test]
    async fn noop_buffer_stores_nothing() {
        let buffer = NoopBuffer;
        buffer.push("55", "oi", Duration::from_secs(60)).await.unwrap();
        assert!(buffer.get_all("55").await.unwrap().is_empty());
        assert!(buffer.pop_all("55").await.unwrap().is_empty());
        assert_eq!(buffer.backend(), "none");
    }

    #[tokio::test]
    async fn connect_without_url_is_noop() {
        assert_eq!(connect(None).await.backend(), "none");
        assert_eq!(connect(Some("  ")).await.backend(), "none");
    }
}
