pub mod backoff;
pub mod broker;
pub mod envelope;
pub mod memory;
pub mod messages;
pub mod outbox;
pub mod queue;
pub mod redis;

/// adapter failures. transient ones are retried with backoff by the
/// adapter itself; the rest surface to the caller.
#[derive(Debug, Clone)]
pub enum BusError {
    Unavailable(String),
    OutboxFull,
    Codec(String),
}

impl std::fmt::Display for BusError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Unavailable(s) => write!(f, "broker unavailable: {}", s),
            Self::OutboxFull => write!(f, "publish outbox at capacity"),
            Self::Codec(s) => write!(f, "envelope codec failure: {}", s),
        }
    }
}

impl std::error::Error for BusError {}

use std::sync::Arc;

/// choose a broker backend off the connection string. "memory://"
/// keeps everything in-process, which is what the tests and the
/// standalone server use; anything else is handed to redis.
pub async fn connect(url: &str, prefix: &str) -> Result<Arc<dyn broker::Broker>, BusError> {
    if url.starts_with("memory") {
        Ok(Arc::new(memory::MemoryBroker::new()))
    } else {
        Ok(Arc::new(redis::RedisBroker::connect(url, prefix).await?))
    }
}
