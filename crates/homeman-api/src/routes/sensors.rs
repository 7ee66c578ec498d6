//! Sensors, sensor types, and readings.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use homeman_core::{Error, ResourceKind, ResourceRef, Result};
use homeman_storage::{
    NewSensor, Page, Pagination, ReadingQuery, Record, Sensor, SensorReading, SensorType,
    SensorUpdate,
};
use serde::Deserialize;

use super::Deleted;
use crate::error::ApiResult;
use crate::extract::{BearerToken, CurrentPrincipal};
use crate::state::AppState;

/// Body for a new sensor type.
#[derive(Debug, Deserialize)]
pub struct SensorTypeCreate {
    /// Unique name.
    pub name: String,
    /// Unit of measurement.
    #[serde(default)]
    pub unit: String,
}

/// Body for a new reading.
#[derive(Debug, Deserialize)]
pub struct ReadingCreate {
    /// Measured value.
    pub data: f64,
}

/// Sensor routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sensors", get(list_user_sensors).post(create_user_sensor))
        .route("/sensors/types", get(list_sensor_types).post(create_sensor_type))
        .route(
            "/sensors/{sensor_id}",
            get(get_sensor_info)
                .patch(update_user_sensor)
                .delete(delete_user_sensor),
        )
        .route(
            "/sensors/{sensor_id}/data",
            get(list_sensor_data).post(create_sensor_data),
        )
        .route("/sensors/{sensor_id}/data/{reading_id}", get(get_sensor_data))
}

/// Authorizes the caller against the sensor and loads it.
async fn owned_sensor(state: &AppState, token: &str, sensor_id: &str) -> Result<Sensor> {
    let target = ResourceRef::new(ResourceKind::Sensor, sensor_id);
    state.gate.authorize(token, Some(&target)).await?;
    match state.store.get(ResourceKind::Sensor, sensor_id).await? {
        Some(Record::Sensor(sensor)) => Ok(sensor),
        _ => Err(Error::not_found("Sensor not found")),
    }
}

async fn list_sensor_types(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Page<SensorType>>> {
    Ok(Json(state.store.list_sensor_types(page).await?))
}

async fn create_sensor_type(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Json(body): Json<SensorTypeCreate>,
) -> ApiResult<(StatusCode, Json<SensorType>)> {
    principal.require_privileged()?;
    let sensor_type = state.store.create_sensor_type(&body.name, &body.unit).await?;
    Ok((StatusCode::CREATED, Json(sensor_type)))
}

async fn list_user_sensors(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> ApiResult<Json<Page<Sensor>>> {
    Ok(Json(state.store.list_user_sensors(principal.subject_id).await?))
}

async fn create_user_sensor(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Json(body): Json<NewSensor>,
) -> ApiResult<(StatusCode, Json<Sensor>)> {
    // The new edge points at the device, so the caller must own it.
    state
        .gate
        .authorize(&token, Some(&ResourceRef::device(body.device_id)))
        .await?;
    let sensor = state.store.create_sensor(body).await?;
    Ok((StatusCode::CREATED, Json(sensor)))
}

async fn get_sensor_info(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path(sensor_id): Path<String>,
) -> ApiResult<Json<Sensor>> {
    Ok(Json(owned_sensor(&state, &token, &sensor_id).await?))
}

async fn update_user_sensor(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path(sensor_id): Path<String>,
    Json(body): Json<SensorUpdate>,
) -> ApiResult<Json<Sensor>> {
    let sensor = owned_sensor(&state, &token, &sensor_id).await?;
    Ok(Json(state.store.update_sensor(sensor.id, body).await?))
}

async fn delete_user_sensor(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path(sensor_id): Path<String>,
) -> ApiResult<Json<Deleted>> {
    let sensor = owned_sensor(&state, &token, &sensor_id).await?;
    state.store.delete_sensor(sensor.id).await?;
    Ok(Json(Deleted::ok()))
}

async fn create_sensor_data(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path(sensor_id): Path<String>,
    Json(body): Json<ReadingCreate>,
) -> ApiResult<(StatusCode, Json<SensorReading>)> {
    let sensor = owned_sensor(&state, &token, &sensor_id).await?;
    let reading = state.store.create_reading(sensor.id, body.data).await?;
    Ok((StatusCode::CREATED, Json(reading)))
}

async fn list_sensor_data(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path(sensor_id): Path<String>,
    Query(query): Query<ReadingQuery>,
) -> ApiResult<Json<Page<SensorReading>>> {
    let sensor = owned_sensor(&state, &token, &sensor_id).await?;
    Ok(Json(state.store.list_readings(sensor.id, query).await?))
}

async fn get_sensor_data(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path((sensor_id, reading_id)): Path<(String, String)>,
) -> ApiResult<Json<SensorReading>> {
    let target = ResourceRef::new(ResourceKind::Reading, &reading_id);
    state.gate.authorize(&token, Some(&target)).await?;
    match state.store.get(ResourceKind::Reading, &reading_id).await? {
        Some(Record::Reading(reading)) if reading.sensor_id.to_string() == sensor_id => {
            Ok(Json(reading))
        }
        _ => Err(Error::not_found("Sensor data not found").into()),
    }
}
