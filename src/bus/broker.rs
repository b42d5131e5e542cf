use super::BusError;
use super::envelope::Envelope;
use super::queue::Queue;
use async_trait::async_trait;
use std::time::Duration;

/// an in-flight message. holding one means the broker is waiting on
/// an ack; letting the visibility window lapse re-enqueues it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub queue: Queue,
    pub envelope: Envelope,
    pub receipt: String,
}

/// typed publish/consume over named queues with manual acks.
/// delivery is at-least-once: consumers must tolerate duplicates.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, queue: Queue, envelope: Envelope) -> Result<(), BusError>;
    /// next message on the queue, waiting up to `wait`. None on timeout.
    async fn consume(&self, queue: Queue, wait: Duration) -> Result<Option<Delivery>, BusError>;
    /// the message is durably handled; drop it for good
    async fn ack(&self, delivery: &Delivery) -> Result<(), BusError>;
    /// hand the message back for redelivery
    async fn nack(&self, delivery: &Delivery) -> Result<(), BusError>;
    async fn depth(&self, queue: Queue) -> Result<usize, BusError>;
    fn connected(&self) -> bool;
}
