use super::request::CreateSimulation;
use super::request::HeartbeatBody;
use super::response::Created;
use super::response::QueueStatus;
use super::response::SimulationSummary;
use super::response::Status;
use super::socket;
use crate::bus::messages::TaskEnvelope;
use crate::bus::messages::TaskResultEnvelope;
use crate::bus::queue::Queue;
use crate::orchestrator::OrchestratorError;
use crate::orchestrator::orchestrator::Orchestrator;
use crate::orchestrator::simulation::SimId;
use crate::orchestrator::simulation::SimStatus;
use crate::orchestrator::simulation::SimulationSpec;
use crate::registry::RegistryError;
use crate::registry::node::NodeId;
use crate::registry::node::NodeSpec;
use actix_cors::Cors;
use actix_web::App;
use actix_web::HttpResponse;
use actix_web::HttpServer;
use actix_web::Responder;
use actix_web::middleware::Logger;
use actix_web::web;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

pub struct Server;

impl Server {
    pub async fn run(bind: &str, orchestrator: Arc<Orchestrator>) -> Result<(), std::io::Error> {
        let orchestrator = web::Data::new(orchestrator);
        log::info!("starting HTTP server on {}", bind);
        HttpServer::new(move || {
            App::new()
                .wrap(Logger::new("%r %s %Ts"))
                .wrap(
                    Cors::default()
                        .allow_any_origin()
                        .allow_any_method()
                        .allow_any_header(),
                )
                .app_data(orchestrator.clone())
                .route("/simulations", web::post().to(create_simulation))
                .route("/simulations", web::get().to(list_simulations))
                .route("/simulations/{id}/status", web::get().to(simulation_status))
                .route("/simulations/{id}/results", web::get().to(simulation_results))
                .route("/simulations/{id}", web::delete().to(cancel_simulation))
                .route("/queue/status", web::get().to(queue_status))
                .route("/compute-nodes", web::get().to(list_nodes))
                .route("/compute-nodes/register", web::post().to(register_node))
                .route("/compute-nodes/{id}/heartbeat", web::post().to(node_heartbeat))
                .route("/compute-nodes/{id}", web::delete().to(remove_node))
                .route("/tasks/next", web::get().to(next_task))
                .route("/tasks/results", web::post().to(submit_result))
                .route("/ws", web::get().to(socket::connect))
        })
        .workers(4)
        .bind(bind)?
        .run()
        .await
    }
}

fn http_error(e: OrchestratorError) -> HttpResponse {
    match e {
        OrchestratorError::NotFound => HttpResponse::NotFound().body(e.to_string()),
        OrchestratorError::SpecInvalid(_) => HttpResponse::BadRequest().body(e.to_string()),
        OrchestratorError::AlreadyStarted => HttpResponse::Conflict().body(e.to_string()),
        _ => HttpResponse::InternalServerError().body(e.to_string()),
    }
}

// simulation lifecycle

async fn create_simulation(
    orchestrator: web::Data<Arc<Orchestrator>>,
    body: web::Json<CreateSimulation>,
) -> impl Responder {
    let spec = match SimulationSpec::try_from(body.into_inner()) {
        Ok(spec) => spec,
        Err(e) => return HttpResponse::BadRequest().body(e),
    };
    match orchestrator.create(spec) {
        Err(e) => http_error(e),
        Ok(id) => match orchestrator.start(id) {
            Err(e) => http_error(e),
            Ok(()) => HttpResponse::Created().json(Created {
                simulation_id: id,
                status: SimStatus::Running,
            }),
        },
    }
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    offset: Option<usize>,
}

async fn list_simulations(
    orchestrator: web::Data<Arc<Orchestrator>>,
    query: web::Query<ListQuery>,
) -> impl Responder {
    let status = match query.status.as_deref() {
        None => None,
        Some(s) => match serde_json::from_value::<SimStatus>(serde_json::json!(s)) {
            Ok(status) => Some(status),
            Err(_) => return HttpResponse::BadRequest().body("invalid status filter"),
        },
    };
    let sims = orchestrator.list(
        status,
        query.limit.unwrap_or(50),
        query.offset.unwrap_or(0),
    );
    HttpResponse::Ok().json(
        sims.iter()
            .map(SimulationSummary::from)
            .collect::<Vec<_>>(),
    )
}

async fn simulation_status(
    orchestrator: web::Data<Arc<Orchestrator>>,
    path: web::Path<uuid::Uuid>,
) -> impl Responder {
    let id = SimId::from(path.into_inner());
    match orchestrator.status(&id) {
        Err(e) => http_error(e),
        Ok(sim) => HttpResponse::Ok().json(Status::from(&sim)),
    }
}

async fn simulation_results(
    orchestrator: web::Data<Arc<Orchestrator>>,
    path: web::Path<uuid::Uuid>,
) -> impl Responder {
    let id = SimId::from(path.into_inner());
    match orchestrator.results(&id) {
        Err(e) => http_error(e),
        Ok(results) => HttpResponse::Ok().json(results),
    }
}

async fn cancel_simulation(
    orchestrator: web::Data<Arc<Orchestrator>>,
    path: web::Path<uuid::Uuid>,
) -> impl Responder {
    let id = SimId::from(path.into_inner());
    match orchestrator.cancel(&id).await {
        Err(e) => http_error(e),
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "status": "CANCELLED" })),
    }
}

// queue introspection

async fn queue_status(orchestrator: web::Data<Arc<Orchestrator>>) -> impl Responder {
    let broker = orchestrator.broker();
    let preflop = broker.depth(Queue::PreflopTasks).await;
    let postflop = broker.depth(Queue::PostflopTasks).await;
    let results = broker.depth(Queue::TaskResults).await;
    let connected = broker.connected() && preflop.is_ok();
    HttpResponse::Ok().json(QueueStatus {
        preflop_tasks: preflop.unwrap_or(0),
        postflop_tasks: postflop.unwrap_or(0),
        pending_results: results.unwrap_or(0),
        connected,
    })
}

// compute node registry

async fn list_nodes(orchestrator: web::Data<Arc<Orchestrator>>) -> impl Responder {
    HttpResponse::Ok().json(orchestrator.registry().list())
}

async fn register_node(
    orchestrator: web::Data<Arc<Orchestrator>>,
    body: web::Json<NodeSpec>,
) -> impl Responder {
    let id = orchestrator.registry().register(body.into_inner());
    HttpResponse::Ok().json(serde_json::json!({ "node_id": id.to_string() }))
}

async fn node_heartbeat(
    orchestrator: web::Data<Arc<Orchestrator>>,
    path: web::Path<uuid::Uuid>,
    body: web::Json<HeartbeatBody>,
) -> impl Responder {
    let id = NodeId::from(path.into_inner());
    match orchestrator
        .registry()
        .heartbeat(&id, &body.into_inner().telemetry(id))
    {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "status": "ok" })),
        Err(e) => HttpResponse::NotFound().body(e.to_string()),
    }
}

async fn remove_node(
    orchestrator: web::Data<Arc<Orchestrator>>,
    path: web::Path<uuid::Uuid>,
) -> impl Responder {
    let id = NodeId::from(path.into_inner());
    match orchestrator.registry().remove(&id) {
        true => HttpResponse::Ok().json(serde_json::json!({ "status": "removed" })),
        false => HttpResponse::NotFound().body(RegistryError::NotFound.to_string()),
    }
}

// pull-model task exchange for http-only workers

#[derive(Debug, Deserialize)]
struct NextQuery {
    node_id: String,
}

async fn next_task(
    orchestrator: web::Data<Arc<Orchestrator>>,
    query: web::Query<NextQuery>,
) -> impl Responder {
    let node: NodeId = match query.node_id.parse() {
        Ok(node) => node,
        Err(_) => return HttpResponse::BadRequest().body("invalid node id"),
    };
    let broker = orchestrator.broker();
    for queue in [Queue::PreflopTasks, Queue::PostflopTasks] {
        match broker.consume(queue, Duration::from_millis(100)).await {
            Err(e) => return HttpResponse::ServiceUnavailable().body(e.to_string()),
            Ok(None) => continue,
            Ok(Some(delivery)) => {
                let task = match delivery.envelope.open::<TaskEnvelope>() {
                    Ok(task) => task,
                    Err(e) => {
                        log::error!("undecodable task on {}: {}", queue, e);
                        let _ = broker.ack(&delivery).await;
                        continue;
                    }
                };
                match orchestrator.registry().attribute(&node, task.task_id) {
                    Err(RegistryError::NotFound) => {
                        let _ = broker.nack(&delivery).await;
                        return HttpResponse::NotFound().body("unknown compute node");
                    }
                    Err(RegistryError::Saturated) => {
                        let _ = broker.nack(&delivery).await;
                        return HttpResponse::TooManyRequests().body("node at capacity");
                    }
                    Ok(()) => {
                        orchestrator.attributed(&task.task_id, node);
                        // the queue's job is done; from here the lost
                        // task sweep covers this worker dying
                        let _ = broker.ack(&delivery).await;
                        return HttpResponse::Ok().json(task);
                    }
                }
            }
        }
    }
    HttpResponse::NoContent().finish()
}

async fn submit_result(
    orchestrator: web::Data<Arc<Orchestrator>>,
    body: web::Json<TaskResultEnvelope>,
) -> impl Responder {
    let result = body.into_inner();
    match result.seal() {
        Err(e) => HttpResponse::BadRequest().body(e.to_string()),
        Ok(envelope) => match orchestrator
            .broker()
            .publish(Queue::TaskResults, envelope)
            .await
        {
            Ok(()) => HttpResponse::Accepted().json(serde_json::json!({ "status": "accepted" })),
            Err(e) => HttpResponse::ServiceUnavailable().body(e.to_string()),
        },
    }
}
