use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec;
use crate::engine::dispatch;
use crate::error::AppError;
use crate::models::parcel::{NewParcel, Parcel, ParcelStatus};
use crate::models::path::GeoPoint;
use crate::models::vehicle::Vehicle;
use crate::routing::acquisition::RouteTarget;
use crate::routing::stops::RouteStops;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/parcels", post(create_parcel).get(list_parcels))
        .route("/parcels/status", patch(change_status))
        .route("/parcels/:id", get(get_parcel))
        .route("/parcels/:id/route", post(refresh_route))
        .route("/users/:id/parcels", get(list_user_parcels))
        .route("/dispatch", post(send_to_delivery))
}

/// Parcel with its stored route decoded. A malformed route is reported on
/// this record alone.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParcelView {
    #[serde(flatten)]
    pub parcel: Parcel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<GeoPoint>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_error: Option<String>,
}

impl From<Parcel> for ParcelView {
    fn from(parcel: Parcel) -> Self {
        let (path, path_error) = match codec::decode(&parcel.paths) {
            Ok(path) => (Some(path), None),
            Err(err) => (None, Some(err.to_string())),
        };

        Self {
            parcel,
            path,
            path_error,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeStatusRequest {
    pub parcel_ids: Vec<Uuid>,
    pub status: ParcelStatus,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    pub parcel_ids: Vec<Uuid>,
}

async fn create_parcel(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewParcel>,
) -> Result<(StatusCode, Json<Parcel>), AppError> {
    let parcel = dispatch::intake_parcel(&state.repos, payload).await?;

    let background = state.clone();
    let queued = parcel.clone();
    tokio::spawn(async move {
        dispatch::acquire_parcel_route(&background.routes, &background.notifications_tx, &queued)
            .await;
    });

    Ok((StatusCode::CREATED, Json(parcel)))
}

async fn list_parcels(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ParcelView>>, AppError> {
    let parcels = state.repos.parcels.list_parcels().await?;
    Ok(Json(parcels.into_iter().map(ParcelView::from).collect()))
}

async fn get_parcel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ParcelView>, AppError> {
    let parcel = load_parcel(&state, id).await?;
    Ok(Json(parcel.into()))
}

async fn refresh_route(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ParcelView>, AppError> {
    let parcel = load_parcel(&state, id).await?;
    state
        .routes
        .acquire_for(RouteTarget::Parcel(id), &RouteStops::single(&parcel))
        .await?;

    let parcel = load_parcel(&state, id).await?;
    Ok(Json(parcel.into()))
}

async fn change_status(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChangeStatusRequest>,
) -> Result<Json<Vec<Parcel>>, AppError> {
    if payload.parcel_ids.is_empty() {
        return Err(AppError::BadRequest("parcelIds cannot be empty".to_string()));
    }

    for id in &payload.parcel_ids {
        load_parcel(&state, *id).await?;
    }

    let updated =
        dispatch::change_parcels_status(&state.repos, &payload.parcel_ids, payload.status).await?;
    Ok(Json(updated))
}

async fn list_user_parcels(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<ParcelView>>, AppError> {
    let parcels = state.repos.parcels.list_parcels().await?;
    let owned = parcels
        .into_iter()
        .filter(|parcel| parcel.user_id == user_id)
        .map(ParcelView::from)
        .collect();

    Ok(Json(owned))
}

async fn send_to_delivery(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DispatchRequest>,
) -> Result<(StatusCode, Json<Vehicle>), AppError> {
    let vehicle =
        dispatch::send_to_delivery(&state.repos, &state.routes, &payload.parcel_ids).await?;
    Ok((StatusCode::CREATED, Json(vehicle)))
}

async fn load_parcel(state: &AppState, id: Uuid) -> Result<Parcel, AppError> {
    state
        .repos
        .parcels
        .get_parcel(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("parcel {id} not found")))
}
