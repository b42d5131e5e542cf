use super::BusError;
use std::collections::VecDeque;
use std::sync::Mutex;

/// bounded buffer for publishes attempted while the broker is down.
/// drained in order on reconnect; a full outbox fails the publish
/// synchronously rather than growing without bound.
pub struct Outbox {
    items: Mutex<VecDeque<(String, String)>>,
    capacity: usize,
}

impl Outbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            capacity,
        }
    }
    pub fn push(&self, key: String, raw: String) -> Result<(), BusError> {
        let mut items = self.items.lock().expect("outbox lock");
        if items.len() >= self.capacity {
            return Err(BusError::OutboxFull);
        }
        items.push_back((key, raw));
        Ok(())
    }
    pub fn drain(&self) -> Vec<(String, String)> {
        self.items.lock().expect("outbox lock").drain(..).collect()
    }
    pub fn requeue(&self, key: String, raw: String) {
        // head position so drain order stays FIFO after a failed flush
        self.items
            .lock()
            .expect("outbox lock")
            .push_front((key, raw));
    }
    pub fn len(&self) -> usize {
        self.items.lock().expect("outbox lock").len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_and_ordered() {
        let outbox = Outbox::new(2);
        assert!(outbox.push(String::from("q"), String::from("a")).is_ok());
        assert!(outbox.push(String::from("q"), String::from("b")).is_ok());
        assert!(matches!(
            outbox.push(String::from("q"), String::from("c")),
            Err(BusError::OutboxFull)
        ));
        let drained = outbox.drain();
        assert!(drained.len() == 2);
        assert!(drained[0].1 == "a");
        assert!(outbox.is_empty());
    }
}
