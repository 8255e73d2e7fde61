/// Telemetry ingestion and query endpoints
use crate::{
    context::AppContext,
    db::models::{DeviceRegistration, TelemetryRecord},
    error::{AppError, AppResult},
    ingest::{InboundMessage, NewTelemetry, Source},
    telemetry::{RegisterDeviceRequest, SearchFilter, UpdateDeviceRequest, DEFAULT_PAGE_SIZE},
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use validator::Validate;

/// Build IoT routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/iot/v1/data/_create", post(create_data))
        .route("/iot/v1/data/_bulkCreate", post(bulk_create_data))
        .route("/iot/v1/data/_webhook", post(webhook_ingest))
        .route("/iot/v1/data/_search", get(search_data))
        .route("/iot/v1/data/:device_id/_latest", get(latest_data))
        .route("/iot/v1/data/:device_id/_count", get(count_data))
        .route("/iot/v1/data/:device_id/_publish", post(publish_to_device))
        .route("/iot/v1/data/:device_id/_command", post(send_command))
        .route("/iot/v1/devices/_search", get(search_devices))
        .route("/iot/v1/devices/_create", post(register_device))
        .route("/iot/v1/devices/:device_id", get(get_device))
        .route("/iot/v1/devices/:device_id/_update", post(update_device))
        .route("/iot/v1/devices/:device_id/_delete", post(delete_device))
}

async fn create_data(
    State(ctx): State<AppContext>,
    Json(mut record): Json<NewTelemetry>,
) -> AppResult<Json<TelemetryRecord>> {
    tracing::info!("Telemetry creation request for device: {}", record.device_id);

    if record.source.is_none() {
        record.source = Some(Source::Rest.as_str().to_string());
    }

    let stored = ctx.ingestor.ingest(&record).await?;
    Ok(Json(stored))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkCreateRequest {
    data_list: Vec<NewTelemetry>,
}

async fn bulk_create_data(
    State(ctx): State<AppContext>,
    Json(req): Json<BulkCreateRequest>,
) -> AppResult<Json<Vec<TelemetryRecord>>> {
    tracing::info!("Bulk telemetry creation request: {} records", req.data_list.len());

    let mut records = req.data_list;
    for record in &mut records {
        if record.source.is_none() {
            record.source = Some(Source::Rest.as_str().to_string());
        }
    }

    let stored = ctx.ingestor.ingest_bulk(&records).await?;
    Ok(Json(stored))
}

#[derive(Debug, Deserialize)]
struct WebhookMessage {
    topic: String,
    payload: String,
}

/// Accept a (topic, payload) pair from an HTTP webhook bridge and hand it
/// to the bus listener. The message is queued, not stored synchronously.
async fn webhook_ingest(
    State(ctx): State<AppContext>,
    Json(msg): Json<WebhookMessage>,
) -> AppResult<Json<serde_json::Value>> {
    ctx.ingest_tx
        .send(InboundMessage {
            topic: msg.topic,
            payload: msg.payload,
            source: Source::Webhook,
        })
        .await
        .map_err(|_| AppError::ServiceUnavailable("message bus closed".to_string()))?;

    Ok(Json(serde_json::json!({ "success": true, "message": "queued" })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchQuery {
    device_id: Option<String>,
    tenant_id: Option<String>,
    data_type: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
    page: Option<i64>,
    size: Option<i64>,
}

fn parse_time(value: &Option<String>, field: &str) -> AppResult<Option<DateTime<Utc>>> {
    value
        .as_ref()
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| AppError::Validation(format!("Invalid {} timestamp: {}", field, s)))
        })
        .transpose()
}

async fn search_data(
    State(ctx): State<AppContext>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Vec<TelemetryRecord>>> {
    let filter = SearchFilter {
        device_id: query.device_id,
        tenant_id: query.tenant_id,
        data_type: query.data_type,
        start: parse_time(&query.start_time, "startTime")?,
        end: parse_time(&query.end_time, "endTime")?,
        page: query.page.unwrap_or(0),
        size: query.size.unwrap_or(DEFAULT_PAGE_SIZE),
    };

    let records = ctx.query.search(&filter).await?;
    Ok(Json(records))
}

#[derive(Debug, Deserialize)]
struct LatestQuery {
    limit: Option<i64>,
}

async fn latest_data(
    State(ctx): State<AppContext>,
    Path(device_id): Path<String>,
    Query(query): Query<LatestQuery>,
) -> AppResult<Json<Vec<TelemetryRecord>>> {
    let records = ctx
        .query
        .latest(&device_id, query.limit.unwrap_or(DEFAULT_PAGE_SIZE))
        .await?;
    Ok(Json(records))
}

#[derive(Debug, Deserialize)]
struct CountQuery {
    since: String,
}

async fn count_data(
    State(ctx): State<AppContext>,
    Path(device_id): Path<String>,
    Query(query): Query<CountQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let since = DateTime::parse_from_rfc3339(&query.since)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| AppError::Validation(format!("Invalid since timestamp: {}", query.since)))?;
    let count = ctx.query.count_since(&device_id, since).await?;
    Ok(Json(serde_json::json!({ "deviceId": device_id, "count": count })))
}

async fn publish_to_device(
    State(ctx): State<AppContext>,
    Path(device_id): Path<String>,
    payload: String,
) -> AppResult<Json<serde_json::Value>> {
    tracing::info!("Publishing data to device: {}", device_id);

    let topic = crate::ingest::MessageBus::data_topic(&device_id);
    ctx.bus.publish(topic, payload).await?;

    Ok(Json(serde_json::json!({ "success": true })))
}

async fn send_command(
    State(ctx): State<AppContext>,
    Path(device_id): Path<String>,
    command: String,
) -> AppResult<Json<serde_json::Value>> {
    tracing::info!("Sending command to device: {}", device_id);

    ctx.bus.publish_command(&device_id, command).await?;

    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceSearchQuery {
    tenant_id: Option<String>,
    device_type: Option<String>,
    status: Option<String>,
}

async fn search_devices(
    State(ctx): State<AppContext>,
    Query(query): Query<DeviceSearchQuery>,
) -> AppResult<Json<Vec<DeviceRegistration>>> {
    let devices = ctx
        .registry
        .list(
            query.tenant_id.as_deref(),
            query.device_type.as_deref(),
            query.status.as_deref(),
        )
        .await?;
    Ok(Json(devices))
}

async fn register_device(
    State(ctx): State<AppContext>,
    Json(req): Json<RegisterDeviceRequest>,
) -> AppResult<Json<DeviceRegistration>> {
    req.validate().map_err(AppError::from_validation)?;

    let device = ctx.registry.register(&req).await?;
    Ok(Json(device))
}

async fn get_device(
    State(ctx): State<AppContext>,
    Path(device_id): Path<String>,
) -> AppResult<Json<DeviceRegistration>> {
    let device = ctx.registry.get(&device_id).await?;
    Ok(Json(device))
}

async fn update_device(
    State(ctx): State<AppContext>,
    Path(device_id): Path<String>,
    Json(req): Json<UpdateDeviceRequest>,
) -> AppResult<Json<DeviceRegistration>> {
    let device = ctx.registry.update(&device_id, &req).await?;
    Ok(Json(device))
}

async fn delete_device(
    State(ctx): State<AppContext>,
    Path(device_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    ctx.registry.delete(&device_id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}
