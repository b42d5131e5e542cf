pub mod bus;
pub mod cards;
pub mod cfr;
pub mod config;
pub mod gameplay;
pub mod orchestrator;
pub mod registry;
pub mod server;
pub mod worker;

/// dimensional analysis types
pub type Chips = f64;
pub type Equity = f64;
pub type Utility = f64;
pub type Probability = f64;
pub type Position = usize;

// table bounds
pub const N_MIN_PLAYERS: usize = 2;
pub const N_MAX_PLAYERS: usize = 9;
pub const MAX_RAISES_PER_STREET: usize = 3;

// abstraction parameters
pub const N_PREFLOP_BUCKETS: u16 = 169;
pub const N_EQUITY_BUCKETS: u16 = 10;
pub const EQUITY_SAMPLES: usize = 200;

// solver parameters
pub const EXPLOITABILITY_SAMPLES: usize = 256;
pub const EXPLOITABILITY_CADENCE: usize = 50;
pub const LOSS_FRACTION: f64 = 0.1;
pub const REGRET_MIN: Utility = -3e5;

// orchestration parameters
pub const MAX_TASK_RETRIES: usize = 3;
pub const NODE_TABLE_SHARDS: usize = 64;
pub const TASK_TIMEOUT_SECS: u64 = 30;
pub const TASK_GRACE_SECS: u64 = 10;
pub const OFFLINE_AFTER_SECS: u64 = 60;
pub const HEARTBEAT_EVERY_SECS: u64 = 10;

// bus parameters
pub const WIRE_SCHEMA_VERSION: u32 = 1;
pub const OUTBOX_CAPACITY: usize = 1024;
pub const VISIBILITY_TIMEOUT_SECS: u64 = 30;

// checkpoint parameters
pub const CHECKPOINT_VERSION: u32 = 1;

/// trait for random generation, mainly (strictly?) for testing
pub trait Arbitrary {
    fn random() -> Self;
}

/// typed wrapper around uuid for compile-time separation of
/// simulation, task, node, and trace identifiers.
pub struct ID<T> {
    inner: uuid::Uuid,
    marker: std::marker::PhantomData<T>,
}

impl<T> ID<T> {
    pub fn new() -> Self {
        Self::from(uuid::Uuid::now_v7())
    }
    pub fn inner(&self) -> uuid::Uuid {
        self.inner
    }
}

impl<T> Default for ID<T> {
    fn default() -> Self {
        Self::new()
    }
}
impl<T> Clone for ID<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for ID<T> {}
impl<T> PartialEq for ID<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}
impl<T> Eq for ID<T> {}
impl<T> PartialOrd for ID<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<T> Ord for ID<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.inner.cmp(&other.inner)
    }
}
impl<T> std::hash::Hash for ID<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.hash(state);
    }
}
impl<T> std::fmt::Debug for ID<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}
impl<T> std::fmt::Display for ID<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}
impl<T> From<uuid::Uuid> for ID<T> {
    fn from(inner: uuid::Uuid) -> Self {
        Self {
            inner,
            marker: std::marker::PhantomData,
        }
    }
}
impl<T> From<ID<T>> for uuid::Uuid {
    fn from(id: ID<T>) -> Self {
        id.inner
    }
}
impl<T> std::str::FromStr for ID<T> {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(uuid::Uuid::parse_str(s)?))
    }
}
impl<T> serde::Serialize for ID<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.inner)
    }
}
impl<'de, T> serde::Deserialize<'de> for ID<T> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        uuid::Uuid::parse_str(&s)
            .map(Self::from)
            .map_err(serde::de::Error::custom)
    }
}
impl<T> crate::Arbitrary for ID<T> {
    fn random() -> Self {
        Self::new()
    }
}

/// initialize logging and exit on ctrl-c
pub fn init() {
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.expect("ctrl-c handler");
        println!();
        log::warn!("forcing exit");
        std::process::exit(0);
    });
    std::fs::create_dir_all("logs").expect("create logs directory");
    let config = simplelog::ConfigBuilder::new()
        .set_location_level(log::LevelFilter::Off)
        .set_target_level(log::LevelFilter::Off)
        .set_thread_level(log::LevelFilter::Off)
        .build();
    let time = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("time moves slow")
        .as_secs();
    let file = simplelog::WriteLogger::new(
        log::LevelFilter::Debug,
        config.clone(),
        std::fs::File::create(format!("logs/{}.log", time)).expect("create log file"),
    );
    let term = simplelog::TermLogger::new(
        log::LevelFilter::Info,
        config.clone(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );
    simplelog::CombinedLogger::init(vec![term, file]).expect("initialize logger");
}

/// current wall clock in milliseconds since the unix epoch
pub fn clock() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("time moves slow")
        .as_millis() as u64
}
