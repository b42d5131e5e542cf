//! end-to-end flows over the in-process broker: a real orchestrator,
//! a real registry, real workers, and the full dispatch -> solve ->
//! aggregate -> converge loop.

use super::artifacts::DiskArtifacts;
use super::orchestrator::Orchestrator;
use super::simulation::SimId;
use super::simulation::SimKind;
use super::simulation::SimStatus;
use super::simulation::Simulation;
use super::simulation::SimulationSpec;
use super::simulation::SolverConfig;
use super::task::TaskState;
use crate::bus::broker::Broker;
use crate::bus::memory::MemoryBroker;
use crate::bus::messages::ResultStatus;
use crate::bus::messages::TaskEnvelope;
use crate::bus::messages::TaskResultEnvelope;
use crate::bus::queue::Queue;
use crate::cfr::Variant;
use crate::cfr::engine::Engine;
use crate::gameplay::bucket::AbstractionParams;
use crate::gameplay::config::GameConfig;
use crate::registry::node::NodeId;
use crate::registry::node::NodeSpec;
use crate::registry::node::NodeStatus;
use crate::registry::registry::Registry;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use std::time::Instant;

struct Rig {
    broker: Arc<dyn Broker>,
    registry: Arc<Registry>,
    orchestrator: Arc<Orchestrator>,
}

fn rig(offline_after: Duration, dir: &PathBuf) -> Rig {
    let broker: Arc<dyn Broker> = Arc::new(MemoryBroker::new());
    let registry = Arc::new(Registry::with_offline_after(offline_after));
    let artifacts = Arc::new(DiskArtifacts::new(dir.clone()));
    let orchestrator = Orchestrator::new(broker.clone(), registry.clone(), artifacts);
    tokio::spawn(orchestrator.clone().run_results());
    tokio::spawn(orchestrator.clone().run_heartbeats());
    tokio::spawn(orchestrator.clone().run_sweeper());
    Rig {
        broker,
        registry,
        orchestrator,
    }
}

fn scratch() -> PathBuf {
    std::env::temp_dir().join(format!("scenario-{}", uuid::Uuid::now_v7()))
}

/// the heads-up 100bb spec the scenarios share
fn heads_up(max_iterations: usize, variant: Variant) -> SimulationSpec {
    SimulationSpec {
        kind: SimKind::Preflop,
        name: Some(String::from("scenario")),
        description: None,
        game_config: GameConfig {
            num_players: 2,
            stack_size: 100.0,
            small_blind: 0.5,
            big_blind: 1.0,
            allowed_bet_fractions: GameConfig::default_fractions(),
            board: None,
        },
        solver_config: SolverConfig {
            max_iterations,
            target_exploitability: 5.0,
            variant,
            batch_size: 64,
            discounting: false,
            alpha: 0.5,
            beta: 0.0,
            checkpoint_frequency: 0,
            exploitability_cadence: 50,
            exploitability_samples: 8,
            abstraction: AbstractionParams::default(),
            loss_fraction: 0.1,
            partitions: 1,
            seed: 7,
            task_timeout_ms: 30_000,
        },
    }
}

/// a deterministic in-test worker. the predicate decides which tasks
/// to fail (consistently, including their retries).
fn toil(
    broker: Arc<dyn Broker>,
    fail: Arc<dyn Fn(&TaskEnvelope) -> bool + Send + Sync>,
) -> NodeId {
    let node = NodeId::new();
    tokio::spawn(async move {
        let cancel = AtomicBool::new(false);
        loop {
            for queue in [Queue::PreflopTasks, Queue::PostflopTasks] {
                while let Ok(Some(delivery)) =
                    broker.consume(queue, Duration::from_millis(5)).await
                {
                    let task: TaskEnvelope =
                        delivery.envelope.open().expect("task decodes");
                    let result = if fail(&task) {
                        TaskResultEnvelope {
                            task_id: task.task_id,
                            simulation_id: task.simulation_id,
                            node_id: node,
                            status: ResultStatus::Failed,
                            execution_ms: 0,
                            memory_mb: 0.0,
                            results: None,
                            error: Some(String::from("injected failure")),
                        }
                    } else {
                        match Engine::execute(&task, &cancel) {
                            Ok(solution) => TaskResultEnvelope {
                                task_id: task.task_id,
                                simulation_id: task.simulation_id,
                                node_id: node,
                                status: ResultStatus::Completed,
                                execution_ms: 1,
                                memory_mb: 0.0,
                                results: Some(solution),
                                error: None,
                            },
                            Err(e) => TaskResultEnvelope {
                                task_id: task.task_id,
                                simulation_id: task.simulation_id,
                                node_id: node,
                                status: ResultStatus::Failed,
                                execution_ms: 1,
                                memory_mb: 0.0,
                                results: None,
                                error: Some(e.to_string()),
                            },
                        }
                    };
                    broker
                        .publish(Queue::TaskResults, result.seal().unwrap())
                        .await
                        .unwrap();
                    broker.ack(&delivery).await.unwrap();
                }
            }
        }
    });
    node
}

fn honest(broker: Arc<dyn Broker>) -> NodeId {
    toil(broker, Arc::new(|_| false))
}

async fn await_terminal(orchestrator: &Arc<Orchestrator>, id: SimId, secs: u64) -> Simulation {
    let deadline = Instant::now() + Duration::from_secs(secs);
    loop {
        let sim = orchestrator.status(&id).expect("simulation exists");
        if sim.status.is_terminal() {
            return sim;
        }
        assert!(Instant::now() < deadline, "simulation did not settle");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn strategies_match(
    a: &std::collections::BTreeMap<String, Vec<f64>>,
    b: &std::collections::BTreeMap<String, Vec<f64>>,
) -> bool {
    a.len() == b.len()
        && a.iter().all(|(key, av)| {
            b.get(key)
                .map(|bv| {
                    av.len() == bv.len()
                        && av.iter().zip(bv).all(|(x, y)| (x - y).abs() < 1e-9)
                })
                .unwrap_or(false)
        })
}

// S1: minimal heads-up preflop solve runs to completion

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn heads_up_preflop_converges() {
    let rig = rig(Duration::from_secs(60), &scratch());
    let worker = Arc::new(crate::worker::runtime::Runtime::new(rig.broker.clone(), 1));
    tokio::spawn(worker.clone().run());
    let id = rig.orchestrator.create(heads_up(100, Variant::Vanilla)).unwrap();
    assert!(rig.orchestrator.status(&id).unwrap().status == SimStatus::Pending);
    rig.orchestrator.start(id).unwrap();
    let sim = await_terminal(&rig.orchestrator, id, 120).await;
    assert!(sim.status == SimStatus::Completed);
    assert!(sim.iterations_completed <= 100);
    let results = rig.orchestrator.results(&id).unwrap();
    let x = results.final_exploitability.expect("exploitability sampled");
    assert!(x.is_finite());
    assert!(x >= 0.0);
    // the dealer's root infosets carry one weight per abstracted
    // action, summing to one
    let root = crate::gameplay::game::Game::root(sim.spec.game_config.clone());
    let arity = crate::cfr::encoder::choices(&root).len();
    let roots = results
        .final_strategy
        .iter()
        .filter(|(key, _)| key.starts_with("p0|s0|b0|h|"))
        .collect::<Vec<_>>();
    assert!(!roots.is_empty());
    for (_, sigma) in roots {
        assert!(sigma.len() == arity);
        assert!((sigma.iter().sum::<f64>() - 1.0).abs() < 1e-6);
    }
    worker.shutdown();
}

// S2: a worker failure is retried and folds exactly once

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn retry_does_not_double_count() {
    let spec = || {
        let mut spec = heads_up(12, Variant::Vanilla);
        spec.solver_config.exploitability_cadence = 1000;
        spec
    };
    // run with a one-shot failure injected into iteration 3
    let faulty = rig(Duration::from_secs(60), &scratch());
    let tripped = Mutex::new(false);
    toil(
        faulty.broker.clone(),
        Arc::new(move |task: &TaskEnvelope| {
            let mut tripped = tripped.lock().unwrap();
            if task.iteration == 3 && task.retry_count == 0 && !*tripped {
                *tripped = true;
                return true;
            }
            false
        }),
    );
    let id = faulty.orchestrator.create(spec()).unwrap();
    faulty.orchestrator.start(id).unwrap();
    let sim = await_terminal(&faulty.orchestrator, id, 60).await;
    assert!(sim.status == SimStatus::Completed);
    assert!(sim.iterations_completed == 12);
    let with_failure = faulty.orchestrator.results(&id).unwrap();
    // clean run with the same seed
    let clean = rig(Duration::from_secs(60), &scratch());
    honest(clean.broker.clone());
    let id = clean.orchestrator.create(spec()).unwrap();
    clean.orchestrator.start(id).unwrap();
    let sim = await_terminal(&clean.orchestrator, id, 60).await;
    assert!(sim.status == SimStatus::Completed);
    let without_failure = clean.orchestrator.results(&id).unwrap();
    assert!(strategies_match(
        &with_failure.final_strategy,
        &without_failure.final_strategy
    ));
}

// S3: a node that stops heartbeating is evicted and its task reissued

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn offline_node_tasks_are_reissued() {
    let rig = rig(Duration::from_millis(200), &scratch());
    let mut spec = heads_up(1, Variant::Vanilla);
    spec.solver_config.exploitability_cadence = 1000;
    let id = rig.orchestrator.create(spec).unwrap();
    rig.orchestrator.start(id).unwrap();
    // n1 claims a task over the pull interface, then goes silent
    let n1 = rig.registry.register(NodeSpec {
        node_id: None,
        platform: String::from("linux"),
        cpu_count: 1,
        memory_total_mb: 1024.0,
        max_concurrent: 1,
    });
    let delivery = rig
        .broker
        .consume(Queue::PreflopTasks, Duration::from_secs(5))
        .await
        .unwrap()
        .expect("task dispatched");
    let stolen: TaskEnvelope = delivery.envelope.open().unwrap();
    rig.registry.attribute(&n1, stolen.task_id).unwrap();
    rig.orchestrator.attributed(&stolen.task_id, n1);
    rig.broker.ack(&delivery).await.unwrap();
    // a healthy worker picks up everything the sweeper reissues
    honest(rig.broker.clone());
    let sim = await_terminal(&rig.orchestrator, id, 60).await;
    assert!(sim.status == SimStatus::Completed);
    let node = rig.registry.get(&n1).unwrap();
    assert!(node.status == NodeStatus::Offline);
    assert!(node.total_completed == 0);
    assert!(node.current_tasks.is_empty());
}

// S4: cancellation lands within a wave and drops stragglers

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellation_is_prompt_and_final() {
    let rig = rig(Duration::from_secs(60), &scratch());
    honest(rig.broker.clone());
    let mut spec = heads_up(10_000, Variant::Vanilla);
    spec.solver_config.exploitability_cadence = 100_000;
    let id = rig.orchestrator.create(spec).unwrap();
    rig.orchestrator.start(id).unwrap();
    let deadline = Instant::now() + Duration::from_secs(60);
    loop {
        if rig.orchestrator.status(&id).unwrap().iterations_completed >= 10 {
            break;
        }
        assert!(Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    rig.orchestrator.cancel(&id).await.unwrap();
    let sim = await_terminal(&rig.orchestrator, id, 30).await;
    assert!(sim.status == SimStatus::Cancelled);
    // once cancelled, the topic goes quiet for this simulation
    let mut events = rig.orchestrator.progress().subscribe();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let mut frames = Vec::new();
    while let Ok(event) = events.try_recv() {
        frames.push(serde_json::to_string(&event).unwrap());
    }
    assert!(frames.iter().all(|f| !f.contains(&id.to_string())));
    // a straggling duplicate of an already-folded task changes nothing
    let handle = rig.orchestrator.handle(&id).unwrap();
    let before = handle.table.snapshot();
    let done = handle
        .tasks
        .lock()
        .unwrap()
        .values()
        .find(|t| t.state == TaskState::Done)
        .map(|t| t.envelope.clone())
        .expect("at least one folded task");
    let straggler = TaskResultEnvelope {
        task_id: done.task_id,
        simulation_id: id,
        node_id: NodeId::new(),
        status: ResultStatus::Completed,
        execution_ms: 1,
        memory_mb: 0.0,
        results: Some(Default::default()),
        error: None,
    };
    rig.broker
        .publish(Queue::TaskResults, straggler.seal().unwrap())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(handle.table.snapshot() == before);
    assert!(rig.orchestrator.status(&id).unwrap().status == SimStatus::Cancelled);
    // and it was acked rather than left pending
    assert!(rig.broker.depth(Queue::TaskResults).await.unwrap() == 0);
}

// S5: checkpoint, restart, resume: same strategy as an unbroken run

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn checkpoint_resume_matches_unbroken_run() {
    let spec = |max: usize| {
        let mut spec = heads_up(max, Variant::Vanilla);
        spec.solver_config.exploitability_cadence = 1000;
        spec.solver_config.checkpoint_frequency = 20;
        spec.solver_config.seed = 42;
        spec
    };
    // unbroken 40-iteration run
    let unbroken = rig(Duration::from_secs(60), &scratch());
    honest(unbroken.broker.clone());
    let id = unbroken.orchestrator.create(spec(40)).unwrap();
    unbroken.orchestrator.start(id).unwrap();
    let sim = await_terminal(&unbroken.orchestrator, id, 60).await;
    assert!(sim.status == SimStatus::Completed);
    let want = unbroken.orchestrator.results(&id).unwrap();
    // first half, checkpointed at 20
    let dir = scratch();
    let first = rig(Duration::from_secs(60), &dir);
    honest(first.broker.clone());
    let id = first.orchestrator.create(spec(20)).unwrap();
    first.orchestrator.start(id).unwrap();
    let sim = await_terminal(&first.orchestrator, id, 60).await;
    assert!(sim.status == SimStatus::Completed);
    assert!(sim.iterations_completed == 20);
    // fresh process resumes from the blob and finishes the budget
    let second = rig(Duration::from_secs(60), &dir);
    honest(second.broker.clone());
    let resumed = second.orchestrator.restore(id, spec(40)).await.unwrap();
    assert!(resumed == id);
    assert!(
        second
            .orchestrator
            .status(&id)
            .unwrap()
            .iterations_completed
            == 20
    );
    second.orchestrator.start(id).unwrap();
    let sim = await_terminal(&second.orchestrator, id, 60).await;
    assert!(sim.status == SimStatus::Completed);
    assert!(sim.iterations_completed == 40);
    let got = second.orchestrator.results(&id).unwrap();
    assert!(strategies_match(&want.final_strategy, &got.final_strategy));
}

// S6: chance-sampling waves tolerate bounded loss and still advance

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sampled_waves_tolerate_bounded_loss() {
    let rig = rig(Duration::from_secs(60), &scratch());
    // the first task seen of every wave fails permanently
    let doomed: Mutex<HashMap<usize, crate::orchestrator::task::TaskId>> =
        Mutex::new(HashMap::new());
    toil(
        rig.broker.clone(),
        Arc::new(move |task: &TaskEnvelope| {
            let mut doomed = doomed.lock().unwrap();
            let first = *doomed.entry(task.iteration).or_insert(task.task_id);
            first == task.task_id
        }),
    );
    let mut spec = heads_up(10, Variant::ChanceSampling);
    spec.solver_config.exploitability_cadence = 1000;
    spec.solver_config.batch_size = 64;
    let id = rig.orchestrator.create(spec).unwrap();
    rig.orchestrator.start(id).unwrap();
    let sim = await_terminal(&rig.orchestrator, id, 120).await;
    assert!(sim.status == SimStatus::Completed);
    assert!(sim.iterations_completed == 10);
    let handle = rig.orchestrator.handle(&id).unwrap();
    let tasks = handle.tasks.lock().unwrap();
    assert!(tasks.len() == 10 * 64);
    for iteration in 1..=10 {
        let wave = tasks
            .values()
            .filter(|t| t.iteration == iteration)
            .collect::<Vec<_>>();
        assert!(wave.len() == 64);
        let failed = wave.iter().filter(|t| t.state == TaskState::Failed).count();
        let done = wave.iter().filter(|t| t.state == TaskState::Done).count();
        assert!(failed == 1);
        assert!(done == 63);
    }
}
