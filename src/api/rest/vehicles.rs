use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};
use uuid::Uuid;

use crate::animation::marker::{MarkerAnimator, MarkerFrame, RenderMode};
use crate::animation::spring::SpringConfig;
use crate::codec;
use crate::engine::dispatch;
use crate::engine::reconciler::Reconciled;
use crate::engine::simulation::SimulationStatus;
use crate::error::AppError;
use crate::models::path::GeoPoint;
use crate::models::vehicle::{Vehicle, VehicleStatus};
use crate::state::AppState;
use crate::store::watch_vehicle;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/vehicles", get(list_vehicles))
        .route("/vehicles/:id", get(get_vehicle))
        .route(
            "/vehicles/:id/simulation",
            post(start_simulation)
                .patch(change_speed)
                .delete(stop_simulation),
        )
        .route("/vehicles/:id/route", post(refresh_route))
        .route("/vehicles/:id/track", get(track))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleView {
    #[serde(flatten)]
    pub vehicle: Vehicle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<GeoPoint>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_error: Option<String>,
    pub simulation: Option<SimulationStatus>,
}

impl VehicleView {
    fn new(vehicle: Vehicle, simulation: Option<SimulationStatus>) -> Self {
        let (path, path_error) = match codec::decode(&vehicle.paths) {
            Ok(path) => (Some(path), None),
            Err(err) => (None, Some(err.to_string())),
        };

        Self {
            vehicle,
            path,
            path_error,
            simulation,
        }
    }
}

#[derive(Deserialize, Default)]
pub struct StartSimulationRequest {
    pub speed: Option<f64>,
}

#[derive(Deserialize)]
pub struct ChangeSpeedRequest {
    pub speed: f64,
}

#[derive(Deserialize)]
pub struct TrackQuery {
    #[serde(default)]
    pub mode: RenderMode,
}

/// Messages pushed to a tracking socket.
#[derive(Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum TrackMessage {
    Path {
        status: VehicleStatus,
        points: Vec<GeoPoint>,
    },
    Frame(MarkerFrame),
    Error {
        message: String,
    },
}

async fn list_vehicles(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<VehicleView>>, AppError> {
    let vehicles = state.repos.vehicles.list_vehicles().await?;
    let views = vehicles
        .into_iter()
        .map(|vehicle| {
            let simulation = state.simulations.status(vehicle.id);
            VehicleView::new(vehicle, simulation)
        })
        .collect();

    Ok(Json(views))
}

async fn get_vehicle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<VehicleView>, AppError> {
    let vehicle = load_vehicle(&state, id).await?;
    Ok(Json(VehicleView::new(vehicle, state.simulations.status(id))))
}

async fn start_simulation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Option<Json<StartSimulationRequest>>,
) -> Result<(StatusCode, Json<SimulationStatus>), AppError> {
    let payload = payload.map(|Json(body)| body).unwrap_or_default();
    let vehicle = load_vehicle(&state, id).await?;
    let speed = payload.speed.unwrap_or(state.settings.default_speed);

    let status = state.simulations.start(&vehicle, speed)?;
    Ok((StatusCode::CREATED, Json(status)))
}

async fn change_speed(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ChangeSpeedRequest>,
) -> Result<Json<SimulationStatus>, AppError> {
    let status = state.simulations.set_speed(id, payload.speed)?;
    Ok(Json(status))
}

async fn stop_simulation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.simulations.stop(id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!(
            "no simulation running for vehicle {id}"
        )))
    }
}

async fn refresh_route(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<VehicleView>, AppError> {
    let vehicle = dispatch::reroute_vehicle(&state.repos, &state.routes, id).await?;
    Ok(Json(VehicleView::new(vehicle, state.simulations.status(id))))
}

async fn track(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<TrackQuery>,
) -> Result<impl IntoResponse, AppError> {
    let vehicle = load_vehicle(&state, id).await?;
    Ok(ws.on_upgrade(move |socket| track_socket(socket, state, vehicle, query.mode)))
}

/// Per-connection view of one vehicle: turns record changes and frame ticks
/// into socket messages.
struct TrackSession {
    vehicle_id: Uuid,
    status: VehicleStatus,
    animator: MarkerAnimator,
}

impl TrackSession {
    /// Returns the session with its opening messages. A path that fails to
    /// decode is reported and rendered as empty.
    fn open(spring: SpringConfig, vehicle: &Vehicle, mode: RenderMode) -> (Self, Vec<TrackMessage>) {
        let mut messages = Vec::new();
        let animator = match MarkerAnimator::for_vehicle(spring, vehicle, mode) {
            Ok(animator) => animator,
            Err(err) => {
                warn!(vehicle_id = %vehicle.id, error = %err, "vehicle path not renderable");
                messages.push(TrackMessage::Error {
                    message: err.to_string(),
                });
                MarkerAnimator::new(spring, Vec::new(), vehicle.delivery_progress, mode)
            }
        };

        let session = Self {
            vehicle_id: vehicle.id,
            status: vehicle.status,
            animator,
        };
        messages.push(session.path_message());
        if mode == RenderMode::Marker {
            messages.push(TrackMessage::Frame(session.animator.frame()));
        }

        (session, messages)
    }

    /// A progress-only change moves the spring target and sends nothing; the
    /// frame ticks carry the motion. A new path is sent with the snapped frame.
    fn on_update(&mut self, vehicle: &Vehicle) -> Vec<TrackMessage> {
        let status_changed = vehicle.status != self.status;
        self.status = vehicle.status;

        match self.animator.sync(vehicle) {
            Ok(changed) => {
                let mut messages = Vec::new();
                if changed || status_changed {
                    messages.push(self.path_message());
                }
                if changed && self.animator.mode() == RenderMode::Marker {
                    messages.push(TrackMessage::Frame(self.animator.frame()));
                }
                messages
            }
            Err(err) => {
                warn!(vehicle_id = %self.vehicle_id, error = %err, "vehicle path not renderable");
                vec![TrackMessage::Error {
                    message: err.to_string(),
                }]
            }
        }
    }

    fn is_animating(&self) -> bool {
        self.animator.mode() == RenderMode::Marker && !self.animator.is_settled()
    }

    fn on_frame(&mut self, dt: Duration) -> TrackMessage {
        TrackMessage::Frame(self.animator.advance(dt))
    }

    fn path_message(&self) -> TrackMessage {
        TrackMessage::Path {
            status: self.status,
            points: self.animator.path().to_vec(),
        }
    }
}

async fn track_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    vehicle: Vehicle,
    mode: RenderMode,
) {
    let (mut sender, mut receiver) = socket.split();
    let updates = watch_vehicle(state.repos.vehicles.subscribe_vehicles(), vehicle.id);
    tokio::pin!(updates);

    let vehicle_id = vehicle.id;
    let (mut session, opening) = TrackSession::open(state.settings.spring, &vehicle, mode);
    info!(vehicle_id = %vehicle_id, mode = ?mode, "tracking client connected");

    let frame_interval = state.settings.marker_frame_interval;
    let mut frames = interval(frame_interval);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut open = send_all(&mut sender, opening).await;
    while open {
        tokio::select! {
            _ = frames.tick(), if session.is_animating() => {
                let frame = session.on_frame(frame_interval);
                open = send_message(&mut sender, &frame).await.is_ok();
            }
            update = updates.next() => {
                let Some(vehicle) = update else { break };
                if vehicle.delivery_progress >= 1.0 {
                    let state = state.clone();
                    let observed = vehicle.clone();
                    tokio::spawn(async move {
                        if let Err(err) = observe_completion(&state, &observed).await {
                            warn!(vehicle_id = %observed.id, error = %err, "observed completion failed");
                        }
                    });
                }
                open = send_all(&mut sender, session.on_update(&vehicle)).await;
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    info!(vehicle_id = %vehicle_id, "tracking client disconnected");
}

/// Completes a delivery whose final progress was written by another writer.
/// A vehicle driven by a local simulation is left to that simulation.
async fn observe_completion(state: &AppState, vehicle: &Vehicle) -> Result<Reconciled, AppError> {
    if vehicle.status != VehicleStatus::Delivery
        || vehicle.delivery_progress < 1.0
        || state.simulations.is_active(vehicle.id)
    {
        return Ok(Reconciled::Unchanged);
    }

    state.reconciler.observe(vehicle).await
}

async fn send_all<S>(sender: &mut S, messages: Vec<TrackMessage>) -> bool
where
    S: futures::Sink<Message> + Unpin,
{
    for message in &messages {
        if send_message(sender, message).await.is_err() {
            return false;
        }
    }
    true
}

async fn send_message<S>(sender: &mut S, message: &TrackMessage) -> Result<(), ()>
where
    S: futures::Sink<Message> + Unpin,
{
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(err) => {
            warn!(error = %err, "failed to serialize track message");
            return Ok(());
        }
    };

    sender.send(Message::Text(json.into())).await.map_err(|_| ())
}

async fn load_vehicle(state: &AppState, id: Uuid) -> Result<Vehicle, AppError> {
    state
        .repos
        .vehicles
        .get_vehicle(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("vehicle {id} not found")))
}
