use std::time::Duration;

/// capped exponential backoff for reconnect attempts
pub struct Backoff {
    attempt: u32,
    base: Duration,
    cap: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            attempt: 0,
            base: Duration::from_millis(100),
            cap: Duration::from_secs(10),
        }
    }
}

impl Backoff {
    pub fn next(&mut self) -> Duration {
        let delay = self
            .base
            .saturating_mul(1u32 << self.attempt.min(16))
            .min(self.cap);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_cap() {
        let mut backoff = Backoff::default();
        assert!(backoff.next() == Duration::from_millis(100));
        assert!(backoff.next() == Duration::from_millis(200));
        assert!(backoff.next() == Duration::from_millis(400));
        for _ in 0..20 {
            assert!(backoff.next() <= Duration::from_secs(10));
        }
    }

    #[test]
    fn reset_starts_over() {
        let mut backoff = Backoff::default();
        let _ = backoff.next();
        let _ = backoff.next();
        backoff.reset();
        assert!(backoff.next() == Duration::from_millis(100));
    }
}
