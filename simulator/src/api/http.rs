use axum::{
    body::Bytes,
    extract::State as AxumState,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use floorgate_types::{
    api::{ErrorResponse, GateRequest, StressRequest, TripRequest},
    GateStatus, InterlockState, GATE_NAME,
};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Write;
use std::sync::Arc;
use std::time::Instant;

use crate::metrics::LatencySnapshot;
use crate::{Simulator, SimulatorError};

#[derive(Serialize)]
struct HealthzResponse {
    ok: bool,
}

#[derive(Serialize)]
struct BannerResponse {
    status: &'static str,
    gate: &'static str,
    interlock: InterlockState,
}

pub(super) async fn banner(AxumState(simulator): AxumState<Arc<Simulator>>) -> Response {
    Json(BannerResponse {
        status: "LIVE",
        gate: GATE_NAME,
        interlock: simulator.interlock_snapshot().state,
    })
    .into_response()
}

/// Liveness check; never touches the engines.
pub(super) async fn healthz() -> Response {
    Json(HealthzResponse { ok: true }).into_response()
}

pub(super) async fn trip(AxumState(simulator): AxumState<Arc<Simulator>>, body: Bytes) -> Response {
    let start = Instant::now();
    let request: TripRequest = match parse_optional_body(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let response = simulator.trip(request.fault.as_deref()).await;
    simulator.http_metrics().record_trip(start.elapsed());
    Json(response).into_response()
}

pub(super) async fn status(AxumState(simulator): AxumState<Arc<Simulator>>) -> Response {
    let start = Instant::now();
    let response = simulator.status();
    simulator.http_metrics().record_status(start.elapsed());
    Json(response).into_response()
}

pub(super) async fn stress(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    body: Bytes,
) -> Response {
    let start = Instant::now();
    let request: StressRequest = match parse_optional_body(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let response = match simulator.stress(request.cycles()).await {
        Ok(result) => Json(result).into_response(),
        Err(err @ SimulatorError::StressLimit { .. }) => {
            error_response(StatusCode::BAD_REQUEST, err.to_string())
        }
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    };
    simulator.http_metrics().record_stress(start.elapsed());
    response
}

pub(super) async fn gate(AxumState(simulator): AxumState<Arc<Simulator>>, body: Bytes) -> Response {
    let start = Instant::now();
    let request: GateRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, format!("invalid request: {err}")),
    };
    let response = match simulator.gate(&request.prompt).await {
        Ok(response) => {
            let status = match response.status() {
                GateStatus::ErrorModel => StatusCode::BAD_GATEWAY,
                GateStatus::Approved | GateStatus::Rejected => StatusCode::OK,
            };
            (status, Json(response)).into_response()
        }
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    };
    simulator.http_metrics().record_gate(start.elapsed());
    response
}

pub(super) async fn http_metrics(
    headers: HeaderMap,
    AxumState(simulator): AxumState<Arc<Simulator>>,
) -> Response {
    if let Some(status) = metrics_auth_error(&headers) {
        return status.into_response();
    }
    Json(simulator.http_metrics_snapshot()).into_response()
}

pub(super) async fn gate_metrics(
    headers: HeaderMap,
    AxumState(simulator): AxumState<Arc<Simulator>>,
) -> Response {
    if let Some(status) = metrics_auth_error(&headers) {
        return status.into_response();
    }
    Json(simulator.gate_metrics_snapshot()).into_response()
}

pub(super) async fn system_metrics(
    headers: HeaderMap,
    AxumState(simulator): AxumState<Arc<Simulator>>,
) -> Response {
    if let Some(status) = metrics_auth_error(&headers) {
        return status.into_response();
    }
    Json(simulator.system_metrics_snapshot()).into_response()
}

pub(super) async fn prometheus_metrics(
    headers: HeaderMap,
    AxumState(simulator): AxumState<Arc<Simulator>>,
) -> Response {
    if let Some(status) = metrics_auth_error(&headers) {
        return status.into_response();
    }
    let body = render_prometheus_metrics(&simulator);
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4"),
        )],
        body,
    )
        .into_response()
}

/// Empty bodies decode as the request's defaults.
fn parse_optional_body<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|err| error_response(StatusCode::BAD_REQUEST, format!("invalid request: {err}")))
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

fn metrics_auth_error(headers: &HeaderMap) -> Option<StatusCode> {
    let token = std::env::var("METRICS_AUTH_TOKEN").unwrap_or_default();
    if token.is_empty() {
        return None;
    }
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string);
    let header_token = headers
        .get("x-metrics-token")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    if bearer.as_deref() == Some(token.as_str()) || header_token.as_deref() == Some(token.as_str()) {
        None
    } else {
        Some(StatusCode::UNAUTHORIZED)
    }
}

fn render_prometheus_metrics(simulator: &Simulator) -> String {
    let http = simulator.http_metrics_snapshot();
    let gate = simulator.gate_metrics_snapshot();
    let system = simulator.system_metrics_snapshot();
    let interlock = simulator.interlock_snapshot();

    let mut out = String::new();

    append_histogram(&mut out, "floorgate_http_trip_latency_ms", &http.trip);
    append_histogram(&mut out, "floorgate_http_status_latency_ms", &http.status);
    append_histogram(&mut out, "floorgate_http_stress_latency_ms", &http.stress);
    append_histogram(&mut out, "floorgate_http_gate_latency_ms", &http.gate);
    append_counter(&mut out, "floorgate_http_reject_origin_total", http.reject_origin);
    append_counter(
        &mut out,
        "floorgate_http_reject_rate_limit_total",
        http.reject_rate_limit,
    );
    append_counter(
        &mut out,
        "floorgate_http_reject_body_limit_total",
        http.reject_body_limit,
    );

    append_counter(&mut out, "floorgate_interlock_cycles_total", interlock.cycles);
    append_counter(&mut out, "floorgate_interlock_trips_total", interlock.trip_count);
    append_gauge(
        &mut out,
        "floorgate_interlock_tripped",
        u8::from(interlock.state == InterlockState::Tripped),
    );
    if let Some(last) = &interlock.last_trip {
        append_gauge(
            &mut out,
            "floorgate_interlock_last_trip_duration_ms",
            last.trip_duration_ms,
        );
    }

    append_counter(&mut out, "floorgate_gate_approved_total", gate.approved);
    append_counter(&mut out, "floorgate_gate_rejected_total", gate.rejected);
    append_counter(&mut out, "floorgate_gate_model_errors_total", gate.model_errors);
    append_counter(&mut out, "floorgate_gate_seal_errors_total", gate.seal_errors);
    append_counter(&mut out, "floorgate_gate_cycles_total", gate.cycles);
    append_histogram(&mut out, "floorgate_gate_latency_ms", &gate.latency);

    append_gauge(&mut out, "floorgate_process_rss_bytes", system.rss_bytes);
    append_gauge(&mut out, "floorgate_process_virtual_bytes", system.virtual_bytes);
    append_gauge(
        &mut out,
        "floorgate_process_cpu_usage_percent",
        system.cpu_usage_percent,
    );

    out
}

fn append_counter(out: &mut String, name: &str, value: u64) {
    let _ = writeln!(out, "# TYPE {name} counter");
    let _ = writeln!(out, "{name} {value}");
}

fn append_gauge(out: &mut String, name: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "# TYPE {name} gauge");
    let _ = writeln!(out, "{name} {value}");
}

fn append_histogram(out: &mut String, name: &str, snapshot: &LatencySnapshot) {
    let _ = writeln!(out, "# TYPE {name} histogram");
    let mut cumulative = 0u64;
    for (bucket, count) in snapshot.buckets_ms.iter().zip(snapshot.counts.iter()) {
        cumulative = cumulative.saturating_add(*count);
        let _ = writeln!(out, "{name}_bucket{{le=\"{bucket}\"}} {cumulative}");
    }
    cumulative = cumulative.saturating_add(snapshot.overflow);
    let _ = writeln!(out, "{name}_bucket{{le=\"+Inf\"}} {cumulative}");
    let _ = writeln!(out, "{name}_count {}", snapshot.count);
    let sum = snapshot.avg_ms * snapshot.count as f64;
    let _ = writeln!(out, "{name}_sum {sum}");
}
