//! Devices and device types.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use homeman_core::{Error, ResourceKind, ResourceRef, Result};
use homeman_storage::{Device, DeviceType, DeviceUpdate, NewDevice, Page, Pagination, Record};
use serde::Deserialize;

use super::Deleted;
use crate::error::ApiResult;
use crate::extract::{BearerToken, CurrentPrincipal};
use crate::state::AppState;

/// Body for a new device type.
#[derive(Debug, Deserialize)]
pub struct DeviceTypeCreate {
    /// Unique name.
    pub name: String,
}

/// Device routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/devices", get(list_user_devices).post(create_user_device))
        .route("/devices/types", get(list_device_types).post(create_device_type))
        .route(
            "/devices/{device_id}",
            get(get_device_info)
                .patch(update_user_device)
                .delete(delete_user_device),
        )
}

/// Authorizes the caller against the device and loads it.
async fn owned_device(state: &AppState, token: &str, device_id: &str) -> Result<Device> {
    let target = ResourceRef::new(ResourceKind::Device, device_id);
    state.gate.authorize(token, Some(&target)).await?;
    match state.store.get(ResourceKind::Device, device_id).await? {
        Some(Record::Device(device)) => Ok(device),
        _ => Err(Error::not_found("Device not found")),
    }
}

async fn list_device_types(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Page<DeviceType>>> {
    Ok(Json(state.store.list_device_types(page).await?))
}

async fn create_device_type(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Json(body): Json<DeviceTypeCreate>,
) -> ApiResult<(StatusCode, Json<DeviceType>)> {
    principal.require_privileged()?;
    let device_type = state.store.create_device_type(&body.name).await?;
    Ok((StatusCode::CREATED, Json(device_type)))
}

async fn list_user_devices(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> ApiResult<Json<Page<Device>>> {
    Ok(Json(state.store.list_user_devices(principal.subject_id).await?))
}

async fn create_user_device(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Json(body): Json<NewDevice>,
) -> ApiResult<(StatusCode, Json<Device>)> {
    let device = state.store.create_device(principal.subject_id, body).await?;
    Ok((StatusCode::CREATED, Json(device)))
}

async fn get_device_info(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path(device_id): Path<String>,
) -> ApiResult<Json<Device>> {
    Ok(Json(owned_device(&state, &token, &device_id).await?))
}

async fn update_user_device(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path(device_id): Path<String>,
    Json(body): Json<DeviceUpdate>,
) -> ApiResult<Json<Device>> {
    let device = owned_device(&state, &token, &device_id).await?;
    Ok(Json(state.store.update_device(device.id, body).await?))
}

async fn delete_user_device(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path(device_id): Path<String>,
) -> ApiResult<Json<Deleted>> {
    let device = owned_device(&state, &token, &device_id).await?;
    state.store.delete_device(device.id).await?;
    Ok(Json(Deleted::ok()))
}
