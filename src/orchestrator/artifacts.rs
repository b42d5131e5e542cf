use super::simulation::SimId;
use async_trait::async_trait;
use std::path::PathBuf;

/// checkpoint blob storage. the orchestrator writes on cadence and
/// reads on resume; it never cares what is behind the trait.
#[async_trait]
pub trait Artifacts: Send + Sync {
    async fn save(&self, sim: SimId, iteration: usize, blob: Vec<u8>) -> Result<(), String>;
    /// newest checkpoint for a simulation, if any
    async fn latest(&self, sim: SimId) -> Result<Option<Vec<u8>>, String>;
}

/// filesystem-backed store: one directory per simulation, one
/// zero-padded file per checkpoint iteration.
pub struct DiskArtifacts {
    dir: PathBuf,
}

impl DiskArtifacts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
    fn sim_dir(&self, sim: SimId) -> PathBuf {
        self.dir.join(sim.to_string())
    }
}

#[async_trait]
impl Artifacts for DiskArtifacts {
    async fn save(&self, sim: SimId, iteration: usize, blob: Vec<u8>) -> Result<(), String> {
        let dir = self.sim_dir(sim);
        std::fs::create_dir_all(&dir).map_err(|e| e.to_string())?;
        let path = dir.join(format!("{:08}.ckpt", iteration));
        std::fs::write(&path, blob).map_err(|e| e.to_string())?;
        log::info!("checkpointed simulation {} at iteration {}", sim, iteration);
        Ok(())
    }

    async fn latest(&self, sim: SimId) -> Result<Option<Vec<u8>>, String> {
        let dir = self.sim_dir(sim);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => return Ok(None),
        };
        let newest = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|x| x == "ckpt").unwrap_or(false))
            .max();
        match newest {
            Some(path) => std::fs::read(&path).map(Some).map_err(|e| e.to_string()),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> DiskArtifacts {
        let dir = std::env::temp_dir().join(format!("artifacts-{}", uuid::Uuid::now_v7()));
        DiskArtifacts::new(dir)
    }

    #[tokio::test]
    async fn save_then_latest() {
        let store = scratch();
        let sim = SimId::new();
        store.save(sim, 10, vec![1, 2, 3]).await.unwrap();
        store.save(sim, 20, vec![4, 5, 6]).await.unwrap();
        let blob = store.latest(sim).await.unwrap().unwrap();
        assert!(blob == vec![4, 5, 6]);
    }

    #[tokio::test]
    async fn empty_store_has_nothing() {
        let store = scratch();
        assert!(store.latest(SimId::new()).await.unwrap().is_none());
    }
}
