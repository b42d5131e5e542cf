use super::request::ClientMessage;
use crate::orchestrator::orchestrator::Orchestrator;
use crate::orchestrator::progress::Event;
use crate::orchestrator::simulation::SimId;
use actix_web::HttpRequest;
use actix_web::HttpResponse;
use actix_web::Responder;
use actix_web::web;
use std::collections::BTreeSet;
use std::sync::Arc;

/// GET /ws: upgrades and bridges the progress broadcast to the
/// client. clients subscribe per simulation; system and node updates
/// go to everyone.
pub async fn connect(
    orchestrator: web::Data<Arc<Orchestrator>>,
    req: HttpRequest,
    body: web::Payload,
) -> impl Responder {
    match actix_ws::handle(&req, body) {
        Ok((response, session, stream)) => {
            let events = orchestrator.progress().subscribe();
            actix_web::rt::spawn(bridge(session, stream, events));
            response
        }
        Err(e) => HttpResponse::InternalServerError().body(e.to_string()),
    }
}

async fn bridge(
    mut session: actix_ws::Session,
    mut stream: actix_ws::MessageStream,
    mut events: tokio::sync::broadcast::Receiver<Event>,
) {
    let mut subscriptions: BTreeSet<SimId> = BTreeSet::new();
    loop {
        tokio::select! {
            message = stream.recv() => match message {
                Some(Ok(actix_ws::Message::Text(text))) => {
                    match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::Subscribe { simulation_id }) => {
                            let confirmed = simulation_id
                                .as_deref()
                                .and_then(|s| s.parse::<SimId>().ok())
                                .inspect(|id| { subscriptions.insert(*id); });
                            let frame = serde_json::json!({
                                "type": "subscription_confirmed",
                                "simulation_id": confirmed.map(|id| id.to_string()),
                            });
                            if session.text(frame.to_string()).await.is_err() {
                                break;
                            }
                        }
                        Ok(ClientMessage::Ping) => {
                            let frame = serde_json::json!({ "type": "pong" });
                            if session.text(frame.to_string()).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => log::debug!("ignoring unparseable ws frame: {}", e),
                    }
                }
                Some(Ok(actix_ws::Message::Ping(bytes))) => {
                    if session.pong(&bytes).await.is_err() {
                        break;
                    }
                }
                Some(Ok(actix_ws::Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
            event = events.recv() => match event {
                Ok(event) => {
                    let wanted = match &event {
                        Event::SimulationUpdate { simulation_id, .. } => {
                            subscriptions.is_empty() || subscriptions.contains(simulation_id)
                        }
                        _ => true,
                    };
                    if wanted {
                        match serde_json::to_string(&event) {
                            Ok(frame) => {
                                if session.text(frame).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => log::error!("unserializable event: {}", e),
                        }
                    }
                }
                // lagged subscribers skip frames rather than block anyone
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    let _ = session.close(None).await;
}
