use super::BusError;
use super::backoff::Backoff;
use super::broker::Broker;
use super::broker::Delivery;
use super::envelope::Envelope;
use super::outbox::Outbox;
use super::queue::Queue;
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::collections::HashMap;
use std::time::Duration;
use std::time::Instant;

const RECONNECT_ATTEMPTS: u32 = 5;
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// redis-list-backed broker. each queue is a list; consuming moves
/// the message onto a per-consumer pending list where it waits for
/// its ack, and a claims hash records when it was taken so a sweep
/// can re-enqueue anything unacked past the visibility window.
pub struct RedisBroker {
    client: redis::Client,
    conn: tokio::sync::Mutex<Option<MultiplexedConnection>>,
    prefix: String,
    consumer: String,
    outbox: Outbox,
    visibility: Duration,
}

impl RedisBroker {
    pub async fn connect(url: &str, prefix: &str) -> Result<Self, BusError> {
        let client = redis::Client::open(url).map_err(|e| BusError::Unavailable(e.to_string()))?;
        let broker = Self {
            client,
            conn: tokio::sync::Mutex::new(None),
            prefix: String::from(prefix),
            consumer: uuid::Uuid::now_v7().simple().to_string(),
            outbox: Outbox::new(crate::OUTBOX_CAPACITY),
            visibility: Duration::from_secs(crate::VISIBILITY_TIMEOUT_SECS),
        };
        let _ = broker.connection().await?;
        log::info!("connected to broker as consumer {}", broker.consumer);
        Ok(broker)
    }

    fn key(&self, queue: Queue) -> String {
        queue.key(&self.prefix)
    }
    fn pending(&self, queue: Queue) -> String {
        format!("{}:pending:{}", self.key(queue), self.consumer)
    }
    fn claims(&self, queue: Queue) -> String {
        format!("{}:claims:{}", self.key(queue), self.consumer)
    }

    /// cached connection, or a fresh one after capped backoff.
    /// a successful reconnect drains the outbox before anyone else
    /// gets to publish.
    async fn connection(&self) -> Result<MultiplexedConnection, BusError> {
        let mut slot = self.conn.lock().await;
        if let Some(ref conn) = *slot {
            return Ok(conn.clone());
        }
        let mut backoff = Backoff::default();
        loop {
            match self.client.get_multiplexed_async_connection().await {
                Ok(mut conn) => {
                    self.flush(&mut conn).await;
                    *slot = Some(conn.clone());
                    return Ok(conn);
                }
                Err(e) if backoff.attempts() < RECONNECT_ATTEMPTS => {
                    let delay = backoff.next();
                    log::warn!("broker reconnect failed ({}), retrying in {:?}", e, delay);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(BusError::Unavailable(e.to_string())),
            }
        }
    }

    /// drop the cached connection after a command failure
    async fn disconnect(&self) {
        *self.conn.lock().await = None;
    }

    /// retry buffered publishes, preserving order
    async fn flush(&self, conn: &mut MultiplexedConnection) {
        for (key, raw) in self.outbox.drain() {
            let sent: Result<(), _> = conn.lpush(&key, &raw).await;
            if let Err(e) = sent {
                log::warn!("outbox flush interrupted: {}", e);
                self.outbox.requeue(key, raw);
                break;
            }
        }
    }

    /// re-enqueue claims that outlived the visibility window
    async fn recover(&self, conn: &mut MultiplexedConnection, queue: Queue) {
        let claims: Result<HashMap<String, u64>, _> = conn.hgetall(self.claims(queue)).await;
        let now = crate::clock();
        for (raw, taken) in claims.unwrap_or_default() {
            if now.saturating_sub(taken) > self.visibility.as_millis() as u64 {
                let removed: Result<i64, _> = conn.lrem(self.pending(queue), 1, &raw).await;
                if let Ok(n) = removed {
                    if n > 0 {
                        log::debug!("redelivering unacked message on {}", queue);
                        let _: Result<(), _> = conn.lpush(self.key(queue), &raw).await;
                    }
                    let _: Result<(), _> = conn.hdel(self.claims(queue), &raw).await;
                }
            }
        }
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn publish(&self, queue: Queue, envelope: Envelope) -> Result<(), BusError> {
        let key = self.key(queue);
        let raw = envelope.encode()?;
        match self.connection().await {
            Ok(mut conn) => {
                let sent: Result<(), _> = conn.lpush(&key, &raw).await;
                match sent {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        log::warn!("publish failed, buffering: {}", e);
                        self.disconnect().await;
                        self.outbox.push(key, raw)
                    }
                }
            }
            Err(_) => self.outbox.push(key, raw),
        }
    }

    async fn consume(&self, queue: Queue, wait: Duration) -> Result<Option<Delivery>, BusError> {
        let deadline = Instant::now() + wait;
        loop {
            let mut conn = self.connection().await?;
            self.recover(&mut conn, queue).await;
            let popped: Result<Option<String>, _> =
                conn.rpoplpush(self.key(queue), self.pending(queue)).await;
            match popped {
                Ok(Some(raw)) => {
                    let _: Result<(), _> = conn
                        .hset(self.claims(queue), &raw, crate::clock())
                        .await;
                    match Envelope::decode(&raw) {
                        Ok(envelope) => {
                            return Ok(Some(Delivery {
                                queue,
                                envelope,
                                receipt: raw,
                            }));
                        }
                        Err(e) => {
                            // poison message: drop it rather than loop on it
                            log::error!("undecodable message on {}: {}", queue, e);
                            let _: Result<i64, _> =
                                conn.lrem(self.pending(queue), 1, &raw).await;
                            let _: Result<(), _> = conn.hdel(self.claims(queue), &raw).await;
                        }
                    }
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                    tokio::time::sleep(POLL_INTERVAL.min(wait)).await;
                }
                Err(e) => {
                    self.disconnect().await;
                    return Err(BusError::Unavailable(e.to_string()));
                }
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), BusError> {
        let mut conn = self.connection().await?;
        let removed: Result<i64, _> = conn
            .lrem(self.pending(delivery.queue), 1, &delivery.receipt)
            .await;
        removed.map_err(|e| BusError::Unavailable(e.to_string()))?;
        let _: Result<(), _> = conn.hdel(self.claims(delivery.queue), &delivery.receipt).await;
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery) -> Result<(), BusError> {
        let mut conn = self.connection().await?;
        let removed: Result<i64, _> = conn
            .lrem(self.pending(delivery.queue), 1, &delivery.receipt)
            .await;
        let removed = removed.map_err(|e| BusError::Unavailable(e.to_string()))?;
        if removed > 0 {
            let pushed: Result<(), _> = conn.lpush(self.key(delivery.queue), &delivery.receipt).await;
            pushed.map_err(|e| BusError::Unavailable(e.to_string()))?;
        }
        let _: Result<(), _> = conn.hdel(self.claims(delivery.queue), &delivery.receipt).await;
        Ok(())
    }

    async fn depth(&self, queue: Queue) -> Result<usize, BusError> {
        let mut conn = self.connection().await?;
        let depth: Result<usize, _> = conn.llen(self.key(queue)).await;
        depth.map_err(|e| BusError::Unavailable(e.to_string()))
    }

    fn connected(&self) -> bool {
        self.conn
            .try_lock()
            .map(|slot| slot.is_some())
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_keys_nest_under_prefix() {
        // key shaping is pure; exercised without a live broker
        let queue = Queue::TaskResults;
        assert!(queue.key("fleet:") == "fleet:task_results");
    }
}
