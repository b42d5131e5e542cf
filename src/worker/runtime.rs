use crate::bus::broker::Broker;
use crate::bus::broker::Delivery;
use crate::bus::messages::Control;
use crate::bus::messages::Heartbeat;
use crate::bus::messages::ResultStatus;
use crate::bus::messages::TaskEnvelope;
use crate::bus::messages::TaskResultEnvelope;
use crate::bus::queue::Queue;
use crate::cfr::EngineError;
use crate::cfr::engine::Engine;
use crate::orchestrator::simulation::SimId;
use crate::orchestrator::task::TaskId;
use crate::registry::node::NodeId;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

/// one worker process: pulls tasks off the queues, runs the engine on
/// blocking threads, publishes results, and keeps its heartbeat up.
/// acks only land after the result is durably on the results queue,
/// so a crash mid-task just means redelivery.
pub struct Runtime {
    broker: Arc<dyn Broker>,
    node_id: NodeId,
    concurrency: usize,
    active: Mutex<BTreeSet<TaskId>>,
    cancelled: Mutex<BTreeMap<SimId, Arc<AtomicBool>>>,
    completed: AtomicUsize,
    shutdown: AtomicBool,
}

impl Runtime {
    pub fn new(broker: Arc<dyn Broker>, concurrency: usize) -> Self {
        Self {
            broker,
            node_id: NodeId::new(),
            concurrency: concurrency.max(1),
            active: Mutex::new(BTreeSet::new()),
            cancelled: Mutex::new(BTreeMap::new()),
            completed: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// announce, then run task loops sized to the concurrency limit.
    /// prefetch equals concurrency because each loop holds at most
    /// one unacked delivery.
    pub async fn run(self: Arc<Self>) {
        log::info!("worker {} starting", self.node_id);
        self.beat().await;
        let heart = self.clone();
        tokio::spawn(async move { heart.heartbeats().await });
        let control = self.clone();
        tokio::spawn(async move { control.controls().await });
        let loops = (0..self.concurrency)
            .map(|_| {
                let runtime = self.clone();
                tokio::spawn(async move {
                    while !runtime.shutdown.load(Ordering::Relaxed) {
                        runtime.step(Duration::from_millis(100)).await;
                    }
                })
            })
            .collect::<Vec<_>>();
        futures::future::join_all(loops).await;
    }

    /// take and serve at most one task from either queue
    pub async fn step(&self, wait: Duration) -> bool {
        for queue in [Queue::PreflopTasks, Queue::PostflopTasks] {
            match self.broker.consume(queue, wait).await {
                Ok(Some(delivery)) => {
                    self.serve(delivery).await;
                    return true;
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!("task consumption stalled: {}", e);
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    return false;
                }
            }
        }
        false
    }

    async fn serve(&self, delivery: Delivery) {
        let task = match delivery.envelope.open::<TaskEnvelope>() {
            Ok(task) => task,
            Err(e) => {
                log::error!("undecodable task envelope: {}", e);
                let _ = self.broker.ack(&delivery).await;
                return;
            }
        };
        self.active.lock().expect("active lock").insert(task.task_id);
        let cancel = self
            .cancelled
            .lock()
            .expect("cancel lock")
            .entry(task.simulation_id)
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone();
        let started = Instant::now();
        let worked = {
            let task = task.clone();
            tokio::task::spawn_blocking(move || Engine::execute(&task, &cancel)).await
        };
        let elapsed = started.elapsed().as_millis() as u64;
        let result = match worked {
            Ok(Ok(solution)) => TaskResultEnvelope {
                task_id: task.task_id,
                simulation_id: task.simulation_id,
                node_id: self.node_id,
                status: ResultStatus::Completed,
                execution_ms: elapsed,
                memory_mb: 0.0,
                results: Some(solution),
                error: None,
            },
            Ok(Err(e)) => {
                log::warn!("task {} failed: {}", task.task_id, e);
                TaskResultEnvelope {
                    task_id: task.task_id,
                    simulation_id: task.simulation_id,
                    node_id: self.node_id,
                    status: ResultStatus::Failed,
                    execution_ms: elapsed,
                    memory_mb: 0.0,
                    results: None,
                    error: Some(e.to_string()),
                }
            }
            Err(e) => {
                log::error!("engine thread died: {}", e);
                TaskResultEnvelope {
                    task_id: task.task_id,
                    simulation_id: task.simulation_id,
                    node_id: self.node_id,
                    status: ResultStatus::Failed,
                    execution_ms: elapsed,
                    memory_mb: 0.0,
                    results: None,
                    error: Some(EngineError::Evaluator(e.to_string()).to_string()),
                }
            }
        };
        let completed = result.status == ResultStatus::Completed;
        match result.seal() {
            Ok(envelope) => match self.broker.publish(Queue::TaskResults, envelope).await {
                Ok(()) => {
                    // result durably enqueued (or outboxed): safe to ack
                    if let Err(e) = self.broker.ack(&delivery).await {
                        log::warn!("task ack failed: {}", e);
                    }
                    if completed {
                        self.completed.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Err(e) => {
                    log::warn!("result publish failed, redelivering task: {}", e);
                    let _ = self.broker.nack(&delivery).await;
                }
            },
            Err(e) => {
                log::error!("could not seal result: {}", e);
                let _ = self.broker.nack(&delivery).await;
            }
        }
        self.active.lock().expect("active lock").remove(&task.task_id);
    }

    /// periodic telemetry on the heartbeats queue
    async fn heartbeats(self: Arc<Self>) {
        let every = Duration::from_secs(crate::HEARTBEAT_EVERY_SECS);
        while !self.shutdown.load(Ordering::Relaxed) {
            tokio::time::sleep(every).await;
            self.beat().await;
        }
    }

    async fn beat(&self) {
        let heartbeat = Heartbeat {
            node_id: self.node_id,
            platform: String::from(std::env::consts::OS),
            cpu_count: num_cpus::get(),
            memory_total_mb: 0.0,
            max_concurrent: self.concurrency,
            current_tasks: self
                .active
                .lock()
                .expect("active lock")
                .iter()
                .cloned()
                .collect(),
            total_completed: self.completed.load(Ordering::Relaxed),
        };
        match heartbeat.seal() {
            Ok(envelope) => {
                if let Err(e) = self.broker.publish(Queue::Heartbeats, envelope).await {
                    log::warn!("heartbeat publish failed: {}", e);
                }
            }
            Err(e) => log::error!("could not seal heartbeat: {}", e),
        }
    }

    /// cancellation signals flip per-simulation flags that running
    /// traversals poll at state transitions
    async fn controls(self: Arc<Self>) {
        while !self.shutdown.load(Ordering::Relaxed) {
            match self
                .broker
                .consume(Queue::Control, Duration::from_millis(500))
                .await
            {
                Ok(Some(delivery)) => {
                    if let Ok(Control::CancelSimulation { simulation_id }) =
                        delivery.envelope.open::<Control>()
                    {
                        log::info!("cancelling simulation {} locally", simulation_id);
                        self.cancelled
                            .lock()
                            .expect("cancel lock")
                            .entry(simulation_id)
                            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
                            .store(true, Ordering::Relaxed);
                    }
                    let _ = self.broker.ack(&delivery).await;
                }
                Ok(None) => {}
                Err(_) => tokio::time::sleep(Duration::from_millis(500)).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::memory::MemoryBroker;
    use crate::bus::messages::TaskPayload;
    use crate::cfr::Variant;
    use crate::gameplay::bucket::AbstractionParams;
    use crate::gameplay::config::GameConfig;
    use crate::gameplay::game::Game;
    use crate::orchestrator::simulation::SimKind;

    fn task() -> TaskEnvelope {
        TaskEnvelope {
            task_id: TaskId::new(),
            simulation_id: SimId::new(),
            iteration: 1,
            kind: SimKind::Preflop,
            retry_count: 0,
            payload: TaskPayload {
                variant: Variant::Vanilla,
                root_state: Game::root(GameConfig {
                    stack_size: 4.0,
                    allowed_bet_fractions: vec![1.0],
                    ..GameConfig::default()
                }),
                player_to_update: 0,
                sampled_hand: None,
                abstraction_params: AbstractionParams::default(),
                regrets: Default::default(),
                discounting: false,
                alpha: 0.5,
                seed: 1,
                budget_ms: 30_000,
            },
        }
    }

    #[tokio::test]
    async fn serves_a_task_end_to_end() {
        let broker: Arc<dyn Broker> = Arc::new(MemoryBroker::new());
        let runtime = Runtime::new(broker.clone(), 1);
        let task = task();
        broker
            .publish(Queue::PreflopTasks, task.seal().unwrap())
            .await
            .unwrap();
        assert!(runtime.step(Duration::from_millis(100)).await);
        let delivery = broker
            .consume(Queue::TaskResults, Duration::from_millis(100))
            .await
            .unwrap()
            .expect("result published");
        let result: TaskResultEnvelope = delivery.envelope.open().unwrap();
        assert!(result.task_id == task.task_id);
        assert!(result.status == ResultStatus::Completed);
        assert!(result.results.is_some());
        assert!(result.node_id == runtime.node_id());
        // the task delivery was acked, nothing left to redeliver
        assert!(
            broker
                .depth(Queue::PreflopTasks)
                .await
                .unwrap()
                == 0
        );
    }

    #[tokio::test]
    async fn reports_failures_as_results() {
        let broker: Arc<dyn Broker> = Arc::new(MemoryBroker::new());
        let runtime = Runtime::new(broker.clone(), 1);
        let mut bad = task();
        bad.payload.player_to_update = 9;
        broker
            .publish(Queue::PreflopTasks, bad.seal().unwrap())
            .await
            .unwrap();
        assert!(runtime.step(Duration::from_millis(100)).await);
        let delivery = broker
            .consume(Queue::TaskResults, Duration::from_millis(100))
            .await
            .unwrap()
            .expect("failure published");
        let result: TaskResultEnvelope = delivery.envelope.open().unwrap();
        assert!(result.status == ResultStatus::Failed);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn idle_step_returns_false() {
        let broker: Arc<dyn Broker> = Arc::new(MemoryBroker::new());
        let runtime = Runtime::new(broker, 1);
        assert!(!runtime.step(Duration::from_millis(10)).await);
    }
}
