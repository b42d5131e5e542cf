use super::BusError;
use super::broker::Broker;
use super::broker::Delivery;
use super::envelope::Envelope;
use super::queue::Queue;
use async_trait::async_trait;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;
use tokio::sync::Notify;

struct Claim {
    queue: Queue,
    envelope: Envelope,
    taken: Instant,
}

#[derive(Default)]
struct State {
    queues: HashMap<Queue, VecDeque<Envelope>>,
    claims: HashMap<String, Claim>,
}

/// in-process broker with the same at-least-once contract as the
/// redis one: manual acks, and unacked deliveries re-enqueued after
/// the visibility window. this is the backend the test suite and the
/// standalone server run on.
pub struct MemoryBroker {
    state: Mutex<State>,
    notify: Notify,
    receipts: AtomicU64,
    visibility: Duration,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::with_visibility(Duration::from_secs(crate::VISIBILITY_TIMEOUT_SECS))
    }
    pub fn with_visibility(visibility: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            receipts: AtomicU64::new(0),
            visibility,
        }
    }

    /// move expired claims back to the head of their queues
    fn redeliver(&self, state: &mut State) {
        let expired = state
            .claims
            .iter()
            .filter(|(_, c)| c.taken.elapsed() > self.visibility)
            .map(|(r, _)| r.clone())
            .collect::<Vec<_>>();
        for receipt in expired {
            if let Some(claim) = state.claims.remove(&receipt) {
                log::debug!("redelivering unacked message on {}", claim.queue);
                state
                    .queues
                    .entry(claim.queue)
                    .or_default()
                    .push_front(claim.envelope);
            }
        }
    }

    fn take(&self, queue: Queue) -> Option<Delivery> {
        let mut state = self.state.lock().expect("broker lock");
        self.redeliver(&mut state);
        let envelope = state.queues.entry(queue).or_default().pop_front()?;
        let receipt = self.receipts.fetch_add(1, Ordering::Relaxed).to_string();
        state.claims.insert(
            receipt.clone(),
            Claim {
                queue,
                envelope: envelope.clone(),
                taken: Instant::now(),
            },
        );
        Some(Delivery {
            queue,
            envelope,
            receipt,
        })
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, queue: Queue, envelope: Envelope) -> Result<(), BusError> {
        self.state
            .lock()
            .expect("broker lock")
            .queues
            .entry(queue)
            .or_default()
            .push_back(envelope);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn consume(&self, queue: Queue, wait: Duration) -> Result<Option<Delivery>, BusError> {
        let deadline = Instant::now() + wait;
        loop {
            let notified = self.notify.notified();
            if let Some(delivery) = self.take(queue) {
                return Ok(Some(delivery));
            }
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) if remaining > Duration::ZERO => remaining,
                _ => return Ok(None),
            };
            let tick = remaining.min(Duration::from_millis(50));
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(tick) => {}
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), BusError> {
        self.state
            .lock()
            .expect("broker lock")
            .claims
            .remove(&delivery.receipt);
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery) -> Result<(), BusError> {
        let mut state = self.state.lock().expect("broker lock");
        if state.claims.remove(&delivery.receipt).is_some() {
            state
                .queues
                .entry(delivery.queue)
                .or_default()
                .push_front(delivery.envelope.clone());
        }
        drop(state);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn depth(&self, queue: Queue) -> Result<usize, BusError> {
        Ok(self
            .state
            .lock()
            .expect("broker lock")
            .queues
            .get(&queue)
            .map(|q| q.len())
            .unwrap_or(0))
    }

    fn connected(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(n: usize) -> Envelope {
        Envelope::pack("probe", &n).unwrap()
    }

    #[tokio::test]
    async fn publish_consume_ack() {
        let broker = MemoryBroker::new();
        broker
            .publish(Queue::Control, probe(1))
            .await
            .unwrap();
        let delivery = broker
            .consume(Queue::Control, Duration::from_millis(100))
            .await
            .unwrap()
            .expect("message available");
        assert!(delivery.envelope.open::<usize>().unwrap() == 1);
        broker.ack(&delivery).await.unwrap();
        assert!(broker.depth(Queue::Control).await.unwrap() == 0);
    }

    #[tokio::test]
    async fn consume_times_out_empty() {
        let broker = MemoryBroker::new();
        let got = broker
            .consume(Queue::Heartbeats, Duration::from_millis(20))
            .await
            .unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn nack_requeues_at_head() {
        let broker = MemoryBroker::new();
        broker.publish(Queue::Control, probe(1)).await.unwrap();
        broker.publish(Queue::Control, probe(2)).await.unwrap();
        let first = broker
            .consume(Queue::Control, Duration::from_millis(100))
            .await
            .unwrap()
            .unwrap();
        broker.nack(&first).await.unwrap();
        let again = broker
            .consume(Queue::Control, Duration::from_millis(100))
            .await
            .unwrap()
            .unwrap();
        assert!(again.envelope.open::<usize>().unwrap() == 1);
    }

    #[tokio::test]
    async fn unacked_messages_come_back() {
        let broker = MemoryBroker::with_visibility(Duration::from_millis(10));
        broker.publish(Queue::TaskResults, probe(9)).await.unwrap();
        let first = broker
            .consume(Queue::TaskResults, Duration::from_millis(100))
            .await
            .unwrap()
            .unwrap();
        // never acked; let the visibility window lapse
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = broker
            .consume(Queue::TaskResults, Duration::from_millis(100))
            .await
            .unwrap()
            .unwrap();
        assert!(second.envelope.open::<usize>().unwrap() == 9);
        assert!(second.receipt != first.receipt);
    }

    #[tokio::test]
    async fn fifo_within_queue() {
        let broker = MemoryBroker::new();
        for n in 0..5usize {
            broker.publish(Queue::PreflopTasks, probe(n)).await.unwrap();
        }
        for n in 0..5usize {
            let delivery = broker
                .consume(Queue::PreflopTasks, Duration::from_millis(100))
                .await
                .unwrap()
                .unwrap();
            assert!(delivery.envelope.open::<usize>().unwrap() == n);
            broker.ack(&delivery).await.unwrap();
        }
    }
}
