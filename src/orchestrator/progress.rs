use super::simulation::SimId;
use serde::Serialize;
use tokio::sync::broadcast;

/// realtime fan-out payloads, shaped for the websocket surface:
/// a tagged type, an optional simulation id, and a data body.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    SimulationUpdate {
        simulation_id: SimId,
        data: ProgressBody,
    },
    SystemUpdate {
        data: serde_json::Value,
    },
    ComputeNodeUpdate {
        data: serde_json::Value,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressBody {
    pub status: String,
    pub iterations_completed: usize,
    pub total_iterations: usize,
    pub current_exploitability: Option<f64>,
    pub phase: String,
}

/// broadcast topic for progress events. slow or absent subscribers
/// never block the orchestrator; they just miss frames.
#[derive(Clone)]
pub struct Progress {
    tx: broadcast::Sender<Event>,
}

impl Default for Progress {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Progress {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
    pub fn emit(&self, event: Event) {
        // returns Err when nobody is listening, which is fine
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_subscribers() {
        let progress = Progress::default();
        let mut rx = progress.subscribe();
        progress.emit(Event::SystemUpdate {
            data: serde_json::json!({"connected": true}),
        });
        let event = rx.recv().await.unwrap();
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("system_update"));
    }

    #[test]
    fn emitting_without_subscribers_is_fine() {
        let progress = Progress::default();
        progress.emit(Event::SystemUpdate {
            data: serde_json::json!({}),
        });
    }

    #[test]
    fn simulation_updates_carry_the_id() {
        let id = SimId::new();
        let event = Event::SimulationUpdate {
            simulation_id: id,
            data: ProgressBody {
                status: String::from("RUNNING"),
                iterations_completed: 3,
                total_iterations: 100,
                current_exploitability: Some(1.5),
                phase: String::from("iterating"),
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("simulation_update"));
        assert!(json.contains(&id.to_string()));
    }
}
