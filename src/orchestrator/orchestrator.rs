use super::OrchestratorError;
use super::artifacts::Artifacts;
use super::checkpoint::Checkpoint;
use super::progress::Event;
use super::progress::Progress;
use super::progress::ProgressBody;
use super::simulation::SimId;
use super::simulation::SimKind;
use super::simulation::SimStatus;
use super::simulation::Simulation;
use super::simulation::SimulationSpec;
use super::table::NodeTable;
use super::task::Task;
use super::task::TaskId;
use super::task::TaskState;
use super::task::Wave;
use crate::bus::BusError;
use crate::bus::broker::Broker;
use crate::bus::messages::Control;
use crate::bus::messages::Heartbeat;
use crate::bus::messages::ResultStatus;
use crate::bus::messages::TaskEnvelope;
use crate::bus::messages::TaskPayload;
use crate::bus::queue::Queue;
use crate::cards::board::Board;
use crate::cfr::Variant;
use crate::cfr::exploitability::exploitability;
use crate::gameplay::game::Game;
use crate::registry::registry::Registry;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::Notify;

/// everything the orchestrator owns about one running solve
pub struct SimHandle {
    pub record: Mutex<Simulation>,
    pub table: NodeTable,
    pub tasks: Mutex<BTreeMap<TaskId, Task>>,
    pub wave: Mutex<Option<Wave>>,
    pub cancel: AtomicBool,
    /// pinged by the aggregator whenever wave state moves
    pub waker: Notify,
}

impl SimHandle {
    fn new(record: Simulation) -> Arc<Self> {
        Arc::new(Self {
            record: Mutex::new(record),
            table: NodeTable::default(),
            tasks: Mutex::new(BTreeMap::new()),
            wave: Mutex::new(None),
            cancel: AtomicBool::new(false),
            waker: Notify::new(),
        })
    }
    fn record(&self) -> Simulation {
        self.record.lock().expect("record lock").clone()
    }
}

/// the read model returned by the results endpoint
#[derive(Debug, Serialize)]
pub struct Results {
    pub simulation_id: SimId,
    pub status: SimStatus,
    pub final_exploitability: Option<f64>,
    pub iterations_completed: usize,
    pub convergence_time_seconds: Option<f64>,
    pub final_strategy: BTreeMap<String, Vec<f64>>,
}

/// what to do about a task that came back bad
enum Failure {
    Retry(TaskEnvelope),
    Tolerated,
    Fatal(String),
    AlreadySettled,
}

/// drives every simulation: decompose into waves, dispatch over the
/// bus, fold results, converge, checkpoint, fan progress out. owns
/// the simulation records and their node tables exclusively.
pub struct Orchestrator {
    broker: Arc<dyn Broker>,
    registry: Arc<Registry>,
    artifacts: Arc<dyn Artifacts>,
    progress: Progress,
    sims: RwLock<BTreeMap<SimId, Arc<SimHandle>>>,
}

impl Orchestrator {
    pub fn new(
        broker: Arc<dyn Broker>,
        registry: Arc<Registry>,
        artifacts: Arc<dyn Artifacts>,
    ) -> Arc<Self> {
        Arc::new(Self {
            broker,
            registry,
            artifacts,
            progress: Progress::default(),
            sims: RwLock::new(BTreeMap::new()),
        })
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
    pub fn progress(&self) -> &Progress {
        &self.progress
    }
    pub fn handle(&self, id: &SimId) -> Option<Arc<SimHandle>> {
        self.sims.read().expect("sims lock").get(id).cloned()
    }
    fn locate(&self, task: &TaskId) -> Option<Arc<SimHandle>> {
        self.sims
            .read()
            .expect("sims lock")
            .values()
            .find(|h| h.tasks.lock().expect("tasks lock").contains_key(task))
            .cloned()
    }

    /// a task left over http: record the node it went to and start
    /// its timeout clock
    pub fn attributed(&self, task_id: &TaskId, node: crate::registry::node::NodeId) {
        if let Some(handle) = self.locate(task_id) {
            let mut tasks = handle.tasks.lock().expect("tasks lock");
            if let Some(task) = tasks.get_mut(task_id) {
                task.node = Some(node);
                task.dispatched();
            }
        }
    }

    // lifecycle operations

    /// validate and persist a new simulation as PENDING. no dispatch
    /// happens until start.
    pub fn create(&self, spec: SimulationSpec) -> Result<SimId, OrchestratorError> {
        spec.validate().map_err(OrchestratorError::SpecInvalid)?;
        let record = Simulation::fresh(spec);
        let id = record.id;
        log::info!("created simulation {}", id);
        self.sims
            .write()
            .expect("sims lock")
            .insert(id, SimHandle::new(record));
        Ok(id)
    }

    /// rebuild a simulation from its newest checkpoint. the node
    /// table swaps in atomically; call start to continue iterating.
    pub async fn restore(
        &self,
        id: SimId,
        spec: SimulationSpec,
    ) -> Result<SimId, OrchestratorError> {
        spec.validate().map_err(OrchestratorError::SpecInvalid)?;
        let blob = self
            .artifacts
            .latest(id)
            .await
            .map_err(OrchestratorError::Integrity)?
            .ok_or(OrchestratorError::NotFound)?;
        let checkpoint = Checkpoint::decode(&blob).map_err(OrchestratorError::Integrity)?;
        let mut record = Simulation::fresh(spec);
        record.id = id;
        record.iterations_completed = checkpoint.iteration as usize;
        let handle = SimHandle::new(record);
        handle.table.restore(checkpoint.nodes);
        log::info!(
            "restored simulation {} at iteration {}",
            id,
            checkpoint.iteration
        );
        self.sims.write().expect("sims lock").insert(id, handle);
        Ok(id)
    }

    /// PENDING -> RUNNING; spawns the iteration driver
    pub fn start(self: &Arc<Self>, id: SimId) -> Result<(), OrchestratorError> {
        let handle = self.handle(&id).ok_or(OrchestratorError::NotFound)?;
        let started = handle
            .record
            .lock()
            .expect("record lock")
            .transition(SimStatus::Running);
        if !started {
            return Err(OrchestratorError::AlreadyStarted);
        }
        let orchestrator = self.clone();
        tokio::spawn(async move { orchestrator.drive(id).await });
        Ok(())
    }

    pub fn status(&self, id: &SimId) -> Result<Simulation, OrchestratorError> {
        self.handle(id)
            .map(|h| h.record())
            .ok_or(OrchestratorError::NotFound)
    }

    pub fn results(&self, id: &SimId) -> Result<Results, OrchestratorError> {
        let handle = self.handle(id).ok_or(OrchestratorError::NotFound)?;
        let record = handle.record();
        let final_strategy = handle
            .table
            .snapshot()
            .iter()
            .map(|(key, node)| (key.to_string(), node.average()))
            .collect();
        let convergence = match (record.started_at, record.finished_at) {
            (Some(start), Some(end)) => Some(end.saturating_sub(start) as f64 / 1000.0),
            _ => None,
        };
        Ok(Results {
            simulation_id: record.id,
            status: record.status,
            final_exploitability: record.current_exploitability,
            iterations_completed: record.iterations_completed,
            convergence_time_seconds: convergence,
            final_strategy,
        })
    }

    pub fn list(
        &self,
        status: Option<SimStatus>,
        limit: usize,
        offset: usize,
    ) -> Vec<Simulation> {
        let mut sims = self
            .sims
            .read()
            .expect("sims lock")
            .values()
            .map(|h| h.record())
            .filter(|s| status.map(|wanted| s.status == wanted).unwrap_or(true))
            .collect::<Vec<Simulation>>();
        sims.sort_by_key(|s| std::cmp::Reverse(s.created_at));
        sims.into_iter().skip(offset).take(limit.max(1)).collect()
    }

    /// flips the cancel flag; the driver winds down before its next
    /// wave and straggler results are dropped at aggregation.
    pub async fn cancel(&self, id: &SimId) -> Result<(), OrchestratorError> {
        let handle = self.handle(id).ok_or(OrchestratorError::NotFound)?;
        handle.cancel.store(true, Ordering::Relaxed);
        let was_pending = {
            let mut record = handle.record.lock().expect("record lock");
            record.status == SimStatus::Pending && record.transition(SimStatus::Cancelled)
        };
        if was_pending {
            self.announce(&handle, "cancelled");
        }
        handle.waker.notify_one();
        let control = Control::CancelSimulation { simulation_id: *id };
        match control.seal() {
            Ok(envelope) => {
                if let Err(e) = self.broker.publish(Queue::Control, envelope).await {
                    log::warn!("could not broadcast cancellation: {}", e);
                }
            }
            Err(e) => log::error!("could not seal cancellation: {}", e),
        }
        Ok(())
    }

    // the per-simulation iteration driver

    async fn drive(self: Arc<Self>, id: SimId) {
        let handle = match self.handle(&id) {
            Some(handle) => handle,
            None => return,
        };
        loop {
            if handle.cancel.load(Ordering::Relaxed) {
                self.finish(&handle, SimStatus::Cancelled, None);
                return;
            }
            let (iteration, converged) = {
                let record = handle.record.lock().expect("record lock");
                if record.status.is_terminal() {
                    return;
                }
                let solver = &record.spec.solver_config;
                let budget_spent = record.iterations_completed >= solver.max_iterations;
                let at_target = record
                    .current_exploitability
                    .map(|x| x <= solver.target_exploitability)
                    .unwrap_or(false);
                (record.iterations_completed + 1, budget_spent || at_target)
            };
            if converged {
                self.finish(&handle, SimStatus::Completed, None);
                return;
            }
            self.emit_wave(&handle, iteration).await;
            self.await_wave(&handle).await;
            if handle.cancel.load(Ordering::Relaxed) {
                self.finish(&handle, SimStatus::Cancelled, None);
                return;
            }
            if handle.record().status.is_terminal() {
                return;
            }
            self.close_wave(&handle).await;
        }
    }

    /// decompose the next iteration into tasks and get them onto the
    /// queue. broker trouble stalls here, visibly, until it clears.
    async fn emit_wave(&self, handle: &Arc<SimHandle>, iteration: usize) {
        let envelopes = self.decompose(handle, iteration);
        {
            let mut tasks = handle.tasks.lock().expect("tasks lock");
            for envelope in envelopes.iter() {
                tasks.insert(envelope.task_id, Task::fresh(envelope.clone()));
            }
            *handle.wave.lock().expect("wave lock") =
                Some(Wave::new(iteration, envelopes.iter().map(|e| e.task_id)));
        }
        log::debug!(
            "wave {} of simulation {}: {} tasks",
            iteration,
            handle.record().id,
            envelopes.len()
        );
        for envelope in envelopes {
            loop {
                if handle.cancel.load(Ordering::Relaxed) {
                    return;
                }
                match self.dispatch(handle, &envelope).await {
                    Ok(()) => break,
                    Err(e) => {
                        log::warn!("dispatch stalled: {}", e);
                        self.stall(handle, true);
                        tokio::time::sleep(Duration::from_millis(500)).await;
                    }
                }
            }
        }
        self.stall(handle, false);
    }

    async fn dispatch(&self, handle: &Arc<SimHandle>, envelope: &TaskEnvelope) -> Result<(), BusError> {
        let sealed = envelope.seal()?;
        self.broker.publish(envelope.queue(), sealed).await?;
        if let Some(task) = handle
            .tasks
            .lock()
            .expect("tasks lock")
            .get_mut(&envelope.task_id)
        {
            task.dispatched();
        }
        Ok(())
    }

    /// block until the wave closes, sweeping lost tasks as we wait
    async fn await_wave(&self, handle: &Arc<SimHandle>) {
        loop {
            if handle.cancel.load(Ordering::Relaxed) {
                return;
            }
            if handle.record().status.is_terminal() {
                return;
            }
            let closed = handle
                .wave
                .lock()
                .expect("wave lock")
                .as_ref()
                .map(|w| w.is_closed())
                .unwrap_or(true);
            if closed {
                return;
            }
            self.sweep_lost(handle).await;
            let notified = handle.waker.notified();
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(Duration::from_millis(100)) => {}
            }
        }
    }

    /// wave closed: advance the counter, then exploitability and
    /// checkpoint on their cadences, then fan progress out
    async fn close_wave(&self, handle: &Arc<SimHandle>) {
        let (id, iterations, solver, kind, game_config) = {
            let mut record = handle.record.lock().expect("record lock");
            record.iterations_completed += 1;
            (
                record.id,
                record.iterations_completed,
                record.spec.solver_config.clone(),
                record.spec.kind,
                record.spec.game_config.clone(),
            )
        };
        let cadence = solver.exploitability_cadence.max(1);
        let due = iterations % cadence == 0 || iterations >= solver.max_iterations;
        if due {
            let nodes = handle.table.snapshot();
            let root = self.base_root(kind, &game_config, solver.seed);
            let x = exploitability(
                &root,
                &nodes,
                solver.exploitability_samples,
                mix(solver.seed, iterations as u64, 0xE),
                solver.abstraction,
            );
            log::info!("simulation {} exploitability {:.4} @ {}", id, x, iterations);
            handle.record.lock().expect("record lock").current_exploitability = Some(x);
        }
        if solver.checkpoint_frequency > 0 && iterations % solver.checkpoint_frequency == 0 {
            let checkpoint = Checkpoint {
                iteration: iterations as u32,
                variant: solver.variant,
                nodes: handle.table.snapshot(),
                seed: match solver.variant.is_sampled() {
                    true => Some(solver.seed),
                    false => None,
                },
            };
            match checkpoint.encode() {
                Ok(blob) => {
                    if let Err(e) = self.artifacts.save(id, iterations, blob).await {
                        log::error!("checkpoint save failed: {}", e);
                    }
                }
                Err(e) => log::error!("checkpoint encode failed: {}", e),
            }
        }
        self.announce(handle, "iterating");
    }

    // wave decomposition

    /// the root shape shared by every wave of a simulation
    fn base_root(&self, kind: SimKind, config: &crate::gameplay::config::GameConfig, seed: u64) -> Game {
        let root = Game::root(config.clone());
        match kind {
            SimKind::Preflop => root,
            SimKind::Postflop => {
                let board = match config.board {
                    Some(ref s) => Board::try_from(s.as_str()).expect("validated at create"),
                    None => {
                        let ref mut rng = SmallRng::seed_from_u64(mix(seed, 0xB0A2D, 0));
                        let flop = root.deck().deal(3, rng);
                        Board::empty().add(flop)
                    }
                };
                root.with_board(board)
            }
        }
    }

    fn decompose(&self, handle: &Arc<SimHandle>, iteration: usize) -> Vec<TaskEnvelope> {
        let record = handle.record();
        let spec = &record.spec;
        let solver = &spec.solver_config;
        let n = spec.game_config.num_players;
        let regrets = handle.table.regrets();
        let root = self.base_root(spec.kind, &spec.game_config, solver.seed);
        let mut envelopes = Vec::new();
        match solver.variant {
            Variant::Vanilla | Variant::Plus => {
                for partition in 0..solver.partitions {
                    let seed = mix(solver.seed, iteration as u64, partition as u64);
                    let ref mut rng = SmallRng::seed_from_u64(seed);
                    let dealt = root.clone().deal_holes(rng);
                    for player in 0..n {
                        envelopes.push(TaskEnvelope {
                            task_id: TaskId::new(),
                            simulation_id: record.id,
                            iteration,
                            kind: spec.kind,
                            retry_count: 0,
                            payload: TaskPayload {
                                variant: solver.variant,
                                root_state: dealt.clone(),
                                player_to_update: player,
                                sampled_hand: None,
                                abstraction_params: solver.abstraction,
                                regrets: regrets.clone(),
                                discounting: solver.discounting,
                                alpha: solver.alpha,
                                seed,
                                budget_ms: solver.task_timeout_ms,
                            },
                        });
                    }
                }
            }
            Variant::ChanceSampling => {
                for b in 0..solver.batch_size {
                    let seed = mix(solver.seed, iteration as u64, b as u64);
                    let ref mut rng = SmallRng::seed_from_u64(seed);
                    let hole = root.deck().hole(rng);
                    envelopes.push(TaskEnvelope {
                        task_id: TaskId::new(),
                        simulation_id: record.id,
                        iteration,
                        kind: spec.kind,
                        retry_count: 0,
                        payload: TaskPayload {
                            variant: solver.variant,
                            root_state: root.clone(),
                            player_to_update: b % n,
                            sampled_hand: Some(hole),
                            abstraction_params: solver.abstraction,
                            regrets: regrets.clone(),
                            discounting: false,
                            alpha: solver.alpha,
                            seed,
                            budget_ms: solver.task_timeout_ms,
                        },
                    });
                }
            }
        }
        envelopes
    }

    // result aggregation

    /// consume the results queue forever. acks only after the fold
    /// (or an intentional drop), so a crash between fold and ack just
    /// causes a redelivery the idempotency guard shrugs off.
    pub async fn run_results(self: Arc<Self>) {
        loop {
            match self
                .broker
                .consume(Queue::TaskResults, Duration::from_millis(500))
                .await
            {
                Ok(Some(delivery)) => {
                    match delivery.envelope.open::<crate::bus::messages::TaskResultEnvelope>() {
                        Ok(result) => self.absorb(result).await,
                        Err(e) => log::error!("undecodable result envelope: {}", e),
                    }
                    if let Err(e) = self.broker.ack(&delivery).await {
                        log::warn!("result ack failed: {}", e);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!("results consumer stalled: {}", e);
                    self.stall_running(true);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn absorb(&self, result: crate::bus::messages::TaskResultEnvelope) {
        let handle = match self.handle(&result.simulation_id) {
            Some(handle) => handle,
            None => {
                log::debug!("dropping result for unknown simulation {}", result.simulation_id);
                return;
            }
        };
        if handle.cancel.load(Ordering::Relaxed) || handle.record().status.is_terminal() {
            log::debug!("dropping result for settled simulation {}", result.simulation_id);
            return;
        }
        {
            // idempotency against redelivery and duplicate attempts
            let mut tasks = handle.tasks.lock().expect("tasks lock");
            let task = match tasks.get_mut(&result.task_id) {
                Some(task) => task,
                None => {
                    log::debug!("dropping result for unknown task {}", result.task_id);
                    return;
                }
            };
            if task.is_terminal() {
                log::debug!("dropping duplicate result for task {}", result.task_id);
                return;
            }
            task.node = Some(result.node_id);
        }
        match result.status {
            ResultStatus::Completed => {
                let plus = handle.record().spec.solver_config.variant == Variant::Plus;
                let solution = match result.results {
                    Some(solution) => solution,
                    None => {
                        log::error!("completed result without a body for {}", result.task_id);
                        self.settle_failure(&handle, result.task_id).await;
                        return;
                    }
                };
                match handle.table.fold(&solution, plus) {
                    Ok(()) => {
                        {
                            let mut tasks = handle.tasks.lock().expect("tasks lock");
                            if let Some(task) = tasks.get_mut(&result.task_id) {
                                task.state = TaskState::Done;
                            }
                        }
                        if let Some(wave) = handle.wave.lock().expect("wave lock").as_mut() {
                            wave.open.remove(&result.task_id);
                        }
                        self.registry.release(&result.node_id, result.task_id, true);
                        handle.waker.notify_one();
                    }
                    Err(e) => {
                        self.registry.release(&result.node_id, result.task_id, true);
                        self.finish(&handle, SimStatus::Failed, Some(e));
                    }
                }
            }
            ResultStatus::Failed => {
                log::warn!(
                    "task {} failed on node {}: {}",
                    result.task_id,
                    result.node_id,
                    result.error.as_deref().unwrap_or("unreported")
                );
                self.registry.release(&result.node_id, result.task_id, false);
                self.settle_failure(&handle, result.task_id).await;
            }
        }
    }

    /// shared failure path for worker-reported failures and lost
    /// tasks: retry below the cap, then tolerate or fail per variant
    async fn settle_failure(&self, handle: &Arc<SimHandle>, task_id: TaskId) {
        let action = {
            let record = handle.record();
            let solver = &record.spec.solver_config;
            let mut tasks = handle.tasks.lock().expect("tasks lock");
            match tasks.get_mut(&task_id) {
                None => Failure::AlreadySettled,
                Some(task) if task.is_terminal() => Failure::AlreadySettled,
                Some(task) if task.retry_count < crate::MAX_TASK_RETRIES => {
                    task.retry_count += 1;
                    task.envelope.retry_count = task.retry_count;
                    task.state = TaskState::Pending;
                    Failure::Retry(task.envelope.clone())
                }
                Some(task) => {
                    task.state = TaskState::Failed;
                    if solver.variant.is_sampled() {
                        let mut wave = handle.wave.lock().expect("wave lock");
                        match wave.as_mut() {
                            Some(wave) => {
                                if wave.open.remove(&task_id) {
                                    wave.lost += 1;
                                    if wave.lost_fraction() <= solver.loss_fraction {
                                        Failure::Tolerated
                                    } else {
                                        Failure::Fatal(format!(
                                            "wave {} lost {:.0}% of its tasks",
                                            wave.iteration,
                                            wave.lost_fraction() * 100.0
                                        ))
                                    }
                                } else {
                                    Failure::AlreadySettled
                                }
                            }
                            None => Failure::AlreadySettled,
                        }
                    } else {
                        Failure::Fatal(format!("task {} exhausted its retries", task_id))
                    }
                }
            }
        };
        match action {
            Failure::AlreadySettled => {}
            Failure::Tolerated => {
                handle.waker.notify_one();
            }
            Failure::Fatal(reason) => {
                self.finish(handle, SimStatus::Failed, Some(reason));
            }
            Failure::Retry(envelope) => {
                log::info!(
                    "reissuing task {} (attempt {})",
                    envelope.task_id,
                    envelope.retry_count
                );
                if let Err(e) = self.dispatch(handle, &envelope).await {
                    log::warn!("retry dispatch stalled: {}", e);
                    self.stall(handle, true);
                }
            }
        }
    }

    /// re-enqueue dispatched tasks whose results never came back
    async fn sweep_lost(&self, handle: &Arc<SimHandle>) {
        let (timeout, grace) = {
            let record = handle.record();
            (
                Duration::from_millis(record.spec.solver_config.task_timeout_ms),
                Duration::from_secs(crate::TASK_GRACE_SECS),
            )
        };
        let mut lost = Vec::new();
        let mut parked = Vec::new();
        {
            let mut tasks = handle.tasks.lock().expect("tasks lock");
            for task in tasks.values_mut() {
                match task.state {
                    TaskState::Dispatched => {
                        if let Some(at) = task.dispatched_at {
                            if at.elapsed() > timeout + grace {
                                log::warn!("task {} timed out", task.id);
                                task.state = TaskState::Timeout;
                                lost.push(task.id);
                            }
                        }
                    }
                    TaskState::Pending => parked.push(task.envelope.clone()),
                    _ => {}
                }
            }
        }
        for task_id in lost {
            self.settle_failure(handle, task_id).await;
        }
        for envelope in parked {
            if let Err(e) = self.dispatch(handle, &envelope).await {
                log::warn!("redispatch stalled: {}", e);
                self.stall(handle, true);
            }
        }
    }

    // background consumers

    /// heartbeat ingest: the registry is the sole liveness authority
    pub async fn run_heartbeats(self: Arc<Self>) {
        loop {
            match self
                .broker
                .consume(Queue::Heartbeats, Duration::from_millis(500))
                .await
            {
                Ok(Some(delivery)) => {
                    match delivery.envelope.open::<Heartbeat>() {
                        Ok(heartbeat) => self.registry.observe(&heartbeat),
                        Err(e) => log::error!("undecodable heartbeat: {}", e),
                    }
                    if let Err(e) = self.broker.ack(&delivery).await {
                        log::warn!("heartbeat ack failed: {}", e);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!("heartbeat consumer stalled: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// periodic liveness sweep: stale nodes go OFFLINE and their
    /// attributed tasks are reissued to whoever is still alive
    pub async fn run_sweeper(self: Arc<Self>) {
        loop {
            tokio::time::sleep(Duration::from_secs(1)).await;
            for (node, orphans) in self.registry.evict_offline() {
                self.progress.emit(Event::ComputeNodeUpdate {
                    data: serde_json::json!({ "node_id": node.to_string(), "status": "OFFLINE" }),
                });
                for task_id in orphans {
                    if let Some(handle) = self.locate(&task_id) {
                        let envelope = {
                            let mut tasks = handle.tasks.lock().expect("tasks lock");
                            match tasks.get_mut(&task_id) {
                                Some(task) if !task.is_terminal() => {
                                    task.state = TaskState::Pending;
                                    Some(task.envelope.clone())
                                }
                                _ => None,
                            }
                        };
                        if let Some(envelope) = envelope {
                            log::info!("reissuing task {} from offline node {}", task_id, node);
                            if let Err(e) = self.dispatch(&handle, &envelope).await {
                                log::warn!("reissue dispatch stalled: {}", e);
                            }
                        }
                    }
                }
            }
        }
    }

    // bookkeeping

    fn finish(&self, handle: &Arc<SimHandle>, status: SimStatus, error: Option<String>) {
        let phase = {
            let mut record = handle.record.lock().expect("record lock");
            if !record.transition(status) {
                return;
            }
            record.error = error;
            match status {
                SimStatus::Completed => "completed",
                SimStatus::Failed => "failed",
                SimStatus::Cancelled => "cancelled",
                _ => "iterating",
            }
        };
        self.announce(handle, phase);
        handle.waker.notify_one();
    }

    fn stall(&self, handle: &Arc<SimHandle>, stalled: bool) {
        let mut record = handle.record.lock().expect("record lock");
        if record.stalled != stalled {
            record.stalled = stalled;
            if stalled {
                log::warn!("simulation {} stalled on broker trouble", record.id);
            }
        }
    }

    fn stall_running(&self, stalled: bool) {
        for handle in self.sims.read().expect("sims lock").values() {
            if handle.record().status == SimStatus::Running {
                self.stall(handle, stalled);
            }
        }
    }

    fn announce(&self, handle: &Arc<SimHandle>, phase: &str) {
        let record = handle.record();
        self.progress.emit(Event::SimulationUpdate {
            simulation_id: record.id,
            data: ProgressBody {
                status: record.status.to_string(),
                iterations_completed: record.iterations_completed,
                total_iterations: record.spec.solver_config.max_iterations,
                current_exploitability: record.current_exploitability,
                phase: String::from(phase),
            },
        });
    }
}

fn mix(seed: u64, a: u64, b: u64) -> u64 {
    let ref mut hasher = std::collections::hash_map::DefaultHasher::new();
    seed.hash(hasher);
    a.hash(hasher);
    b.hash(hasher);
    hasher.finish()
}
