use crate::metrics::record_ingest;
use crate::AppState;
use airq_broadcast::serve_socket;
use airq_core::geo::{self, BoundingBox};
use airq_core::AirqError;
use airq_types::MeasurementPayload;
use axum::{
    body::Bytes,
    extract::{ws::WebSocketUpgrade, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

type Params = HashMap<String, String>;

fn error_response(status: StatusCode, message: impl ToString) -> Response {
    (status, Json(json!({ "error": message.to_string() }))).into_response()
}

fn store_error(e: AirqError) -> Response {
    tracing::error!(error = %e, "Record store query failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
}

fn required<'a>(params: &'a Params, name: &str) -> Result<&'a str, Response> {
    params
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, format!("Missing query parameter '{}'", name)))
}

fn required_f64(params: &Params, name: &str) -> Result<f64, Response> {
    let raw = required(params, name)?;
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, format!("Query parameter '{}' is not a number: {}", name, raw)))
}

fn required_time(params: &Params, name: &str) -> Result<DateTime<Utc>, Response> {
    let raw = required(params, name)?;
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, format!("Query parameter '{}' is not RFC3339: {}", name, e)))
}

/// 接收一条读数并写入读数队列
async fn ingest(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let payload: MeasurementPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            record_ingest("invalid");
            return error_response(StatusCode::BAD_REQUEST, e);
        }
    };

    let measurement = match payload.into_measurement() {
        Ok(measurement) => measurement,
        Err(e) => {
            record_ingest("invalid");
            return error_response(StatusCode::BAD_REQUEST, e);
        }
    };

    let bytes = match measurement.to_vec() {
        Ok(bytes) => bytes,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    };

    if let Err(e) = state.ingest.publish(&bytes).await {
        record_ingest("failed");
        tracing::error!(parameter = %measurement.parameter, error = %e, "Failed to queue measurement");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, e);
    }

    record_ingest("queued");
    tracing::debug!(parameter = %measurement.parameter, value = measurement.value, "Measurement queued");
    (StatusCode::ACCEPTED, Json(json!({ "status": "queued" }))).into_response()
}

/// 时间范围内的告警，最新的在前
async fn anomalies_by_timerange(State(state): State<Arc<AppState>>, Query(params): Query<Params>) -> Response {
    let (start, end) = match (required_time(&params, "start"), required_time(&params, "end")) {
        (Ok(start), Ok(end)) => (start, end),
        (Err(resp), _) | (_, Err(resp)) => return resp,
    };
    if start > end {
        return error_response(StatusCode::BAD_REQUEST, "start must not be after end");
    }

    match state.records.alerts_between(start, end).await {
        Ok(alerts) => Json(alerts).into_response(),
        Err(e) => store_error(e),
    }
}

/// 以某点为中心、半径 `radius` km 内的告警
async fn anomalies_by_location(State(state): State<Arc<AppState>>, Query(params): Query<Params>) -> Response {
    let parsed = (|| {
        Ok::<_, Response>((
            required_f64(&params, "lat")?,
            required_f64(&params, "lon")?,
            required_f64(&params, "radius")?,
        ))
    })();
    let (lat, lon, radius) = match parsed {
        Ok(values) => values,
        Err(resp) => return resp,
    };
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return error_response(StatusCode::BAD_REQUEST, "lat/lon out of range");
    }
    if radius <= 0.0 {
        return error_response(StatusCode::BAD_REQUEST, "radius must be positive");
    }

    let bbox = BoundingBox::around(lat, lon, radius);
    match state.records.alerts_in_box(&bbox).await {
        Ok(alerts) => {
            let nearby: Vec<_> = alerts
                .into_iter()
                .filter(|a| geo::haversine_km(lat, lon, a.latitude, a.longitude) <= radius)
                .collect();
            Json(nearby).into_response()
        }
        Err(e) => store_error(e),
    }
}

/// 矩形范围内按网格统计告警数量
async fn anomaly_density(State(state): State<Arc<AppState>>, Query(params): Query<Params>) -> Response {
    let parsed = (|| {
        Ok::<_, Response>((
            required_f64(&params, "minLat")?,
            required_f64(&params, "minLon")?,
            required_f64(&params, "maxLat")?,
            required_f64(&params, "maxLon")?,
        ))
    })();
    let (min_lat, min_lon, max_lat, max_lon) = match parsed {
        Ok(values) => values,
        Err(resp) => return resp,
    };

    let bbox = match BoundingBox::new(min_lat, min_lon, max_lat, max_lon) {
        Ok(bbox) => bbox,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    match state.records.alerts_in_box(&bbox).await {
        Ok(alerts) => Json(geo::density(&alerts)).into_response(),
        Err(e) => store_error(e),
    }
}

/// 升级为 WebSocket 并登记为告警订阅者
async fn subscribe(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Params>,
    ws: WebSocketUpgrade,
) -> Response {
    let hub = state.hub.clone();
    let client_id = params.get("client_id").cloned();
    ws.on_upgrade(move |socket| serve_socket(hub, socket, client_id))
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/ingest", post(ingest))
        .route("/api/anomalies/timerange", get(anomalies_by_timerange))
        .route("/api/anomalies/location", get(anomalies_by_location))
        .route("/api/anomalies/density", get(anomaly_density))
        .route("/ws", get(subscribe))
        .with_state(state)
}
