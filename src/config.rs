/// Process configuration read once from the environment and passed
/// explicitly to whoever needs it. No hidden globals.
#[derive(Debug, Clone)]
pub struct Config {
    /// broker connection string. "memory://" selects the in-process
    /// broker, anything else is handed to the redis client.
    pub broker_url: String,
    /// HTTP bind address for the orchestrator process.
    pub bind_addr: String,
    /// directory for checkpoint blobs.
    pub artifact_dir: String,
    /// prefix prepended to every queue name, so that multiple
    /// deployments can share one broker.
    pub queue_prefix: String,
    /// how many tasks a worker process runs at once.
    pub concurrency: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            broker_url: Self::var("BROKER_URL", "redis://localhost:6379"),
            bind_addr: Self::var("BIND_ADDR", "127.0.0.1:8888"),
            artifact_dir: Self::var("ARTIFACT_DIR", "artifacts"),
            queue_prefix: Self::var("QUEUE_PREFIX", ""),
            concurrency: Self::var("WORKER_CONCURRENCY", "")
                .parse()
                .unwrap_or_else(|_| num_cpus::get()),
        }
    }
    fn var(name: &str, default: &str) -> String {
        std::env::var(name).unwrap_or_else(|_| String::from(default))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broker_url: String::from("memory://"),
            bind_addr: String::from("127.0.0.1:8888"),
            artifact_dir: String::from("artifacts"),
            queue_prefix: String::new(),
            concurrency: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert!(config.broker_url.starts_with("memory"));
        assert!(config.concurrency > 0);
    }
}
