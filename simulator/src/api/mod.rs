use axum::{
    extract::{DefaultBodyLimit, Request, State as AxumState},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use governor::middleware::NoOpMiddleware;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::Simulator;

mod http;

pub struct Api {
    simulator: Arc<Simulator>,
}

#[derive(Clone)]
struct OriginConfig {
    allowed_origins: Arc<HashSet<String>>,
    allow_any_origin: bool,
    allow_no_origin: bool,
}

type IpGovernorConfig =
    tower_governor::governor::GovernorConfig<SmartIpKeyExtractor, NoOpMiddleware>;

fn default_governor_config() -> Option<IpGovernorConfig> {
    GovernorConfigBuilder::default()
        .key_extractor(SmartIpKeyExtractor)
        .finish()
}

impl Api {
    pub fn new(simulator: Arc<Simulator>) -> Self {
        Self { simulator }
    }

    pub fn router(&self) -> Router {
        // Unset means any origin.
        let allowed_origins = parse_allowed_origins("ALLOWED_HTTP_ORIGINS", "*");
        let allow_any_origin = allowed_origins.contains("*");
        let allow_no_origin = allow_any_origin || parse_allow_no_origin("ALLOW_HTTP_NO_ORIGIN");
        if allowed_origins.is_empty() {
            tracing::warn!("ALLOWED_HTTP_ORIGINS is empty; all browser origins will be rejected");
        }
        let cors_origins = allowed_origins
            .iter()
            .filter(|origin| *origin != "*")
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("Invalid origin in ALLOWED_HTTP_ORIGINS: {}", origin);
                    None
                }
            })
            .collect::<Vec<_>>();
        let origin_config = OriginConfig {
            allowed_origins: Arc::new(allowed_origins),
            allow_any_origin,
            allow_no_origin,
        };

        let cors = if allow_any_origin {
            CorsLayer::new().allow_origin(AllowOrigin::any())
        } else {
            CorsLayer::new().allow_origin(AllowOrigin::list(cors_origins))
        }
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::HeaderName::from_static("x-request-id"),
            header::HeaderName::from_static("x-metrics-token"),
        ])
        .expose_headers([header::HeaderName::from_static("x-request-id")]);

        // Environment variables override config
        let http_rate_per_sec = parse_env_u64("RATE_LIMIT_HTTP_PER_SEC")
            .or(self.simulator.config().http_rate_limit_per_second);
        let http_rate_burst = parse_env_u32("RATE_LIMIT_HTTP_BURST")
            .or(self.simulator.config().http_rate_limit_burst);

        let governor_conf = match (http_rate_per_sec, http_rate_burst) {
            (Some(rate_per_second), Some(burst_size))
                if rate_per_second > 0 && burst_size > 0 =>
            {
                let nanos_per_request = (1_000_000_000u64 / rate_per_second).max(1);
                let period = Duration::from_nanos(nanos_per_request);
                tracing::info!(
                    rate_per_second,
                    burst_size,
                    "HTTP rate limit configured"
                );
                let config = GovernorConfigBuilder::default()
                    .period(period)
                    .burst_size(burst_size)
                    .key_extractor(SmartIpKeyExtractor)
                    .finish()
                    .or_else(|| {
                        tracing::warn!("invalid rate-limit config; falling back to defaults");
                        default_governor_config()
                    });
                config.map(Arc::new)
            }
            _ => None,
        };

        let router = Router::new()
            .route("/", get(http::banner))
            .route("/healthz", get(http::healthz))
            .route("/interlock/trip", post(http::trip))
            .route("/interlock/status", get(http::status))
            .route("/interlock/stress", post(http::stress))
            .route("/gate", post(http::gate))
            .route("/metrics/http", get(http::http_metrics))
            .route("/metrics/gate", get(http::gate_metrics))
            .route("/metrics/system", get(http::system_metrics))
            .route("/metrics/prometheus", get(http::prometheus_metrics));

        let router = match governor_conf {
            Some(config) => router.layer(GovernorLayer { config }),
            None => router,
        };

        let router = router.layer(cors);
        let router = router.layer(middleware::from_fn(move |req, next| {
            let origin_config = origin_config.clone();
            async move { enforce_origin(origin_config, req, next).await }
        }));
        let router = match self.simulator.config().http_body_limit_bytes {
            Some(limit) if limit > 0 => router.layer(DefaultBodyLimit::max(limit)),
            _ => router,
        };
        let router = router.layer(middleware::from_fn_with_state(
            self.simulator.clone(),
            request_id_middleware,
        ));
        let router = router.layer(TraceLayer::new_for_http());

        router.with_state(self.simulator.clone())
    }
}

fn parse_allowed_origins(var: &str, default: &str) -> HashSet<String> {
    std::env::var(var)
        .unwrap_or_else(|_| default.to_string())
        .split(',')
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

fn parse_allow_no_origin(var: &str) -> bool {
    matches!(
        std::env::var(var).as_deref(),
        Ok("1") | Ok("true") | Ok("TRUE") | Ok("yes") | Ok("YES")
    )
}

fn parse_env_u64(var: &str) -> Option<u64> {
    std::env::var(var).ok().and_then(|v| v.parse().ok())
}

fn parse_env_u32(var: &str) -> Option<u32> {
    std::env::var(var).ok().and_then(|v| v.parse().ok())
}

async fn enforce_origin(config: OriginConfig, req: Request, next: Next) -> Response {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok());
    if let Some(origin) = origin {
        if !config.allow_any_origin && !config.allowed_origins.contains(origin) {
            return (StatusCode::FORBIDDEN, "Origin not allowed").into_response();
        }
    } else if !config.allow_no_origin {
        return (StatusCode::FORBIDDEN, "Origin required").into_response();
    }
    next.run(req).await
}

async fn request_id_middleware(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    req: Request,
    next: Next,
) -> Response {
    let request_id = req
        .headers()
        .get(header::HeaderName::from_static("x-request-id"))
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();
    let mut response = next.run(req).await;
    match response.status() {
        StatusCode::FORBIDDEN => simulator.http_metrics().inc_reject_origin(),
        StatusCode::PAYLOAD_TOO_LARGE => simulator.http_metrics().inc_reject_body_limit(),
        StatusCode::TOO_MANY_REQUESTS => simulator.http_metrics().inc_reject_rate_limit(),
        _ => {}
    }
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(
            header::HeaderName::from_static("x-request-id"),
            header_value,
        );
    }
    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "http.request"
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimulatorConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use floorgate_execution::mocks::{FailingGenerator, FixedGenerator, ManualClock};
    use floorgate_execution::{Generator, STUB_RESPONSES};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn router(generator: impl Generator) -> Router {
        let config = SimulatorConfig {
            fault_seed: Some(3),
            stress_max_cycles: 500,
            http_rate_limit_per_second: None,
            http_rate_limit_burst: None,
            http_body_limit_bytes: Some(1024),
            ..Default::default()
        };
        let simulator =
            Simulator::with_parts(config, Arc::new(ManualClock::new()), Arc::new(generator))
                .unwrap();
        Api::new(Arc::new(simulator)).router()
    }

    fn default_router() -> Router {
        router(FixedGenerator::new(STUB_RESPONSES[0]))
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    fn post(path: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn banner_and_health() {
        let router = default_router();
        let (status, body) = send(&router, get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["gate"], "DOS 2.0");
        assert_eq!(body["interlock"], "ARMED");

        let (status, body) = send(&router, get("/healthz")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));
    }

    #[tokio::test]
    async fn trip_then_status() {
        let router = default_router();
        let (status, body) = send(&router, post("/interlock/trip", json!({ "fault": "logic" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cycle_index"], 1);
        assert_eq!(body["total_cycles"], 1);
        assert_eq!(body["state"], "ARMED");
        assert!(body["config"]["forced_fault_probability"].is_number());
        assert!(body["trip_log"].is_array());
        assert!(body["tripped_rate"].as_str().unwrap().ends_with('%'));

        let (status, body) = send(&router, get("/interlock/status")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "LIVE");
        assert_eq!(body["cycles"], 1);
        assert_eq!(body["state"], "ARMED");
    }

    #[tokio::test]
    async fn trip_accepts_empty_body() {
        let router = default_router();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/interlock/trip")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cycle_index"], 1);
    }

    #[tokio::test]
    async fn stress_defaults_and_limits() {
        let router = default_router();
        let (status, body) = send(&router, post("/interlock/stress", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stress_test"], true);
        assert_eq!(body["cycles"], 100);
        assert_eq!(
            body["passes"].as_u64().unwrap() + body["trips"].as_u64().unwrap(),
            100
        );

        let (status, body) = send(&router, post("/interlock/stress", json!({ "cycles": 0 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["trip_rate"], "0.0%");

        let (status, body) = send(&router, post("/interlock/stress", json!({ "cycles": 501 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("501"));
    }

    #[tokio::test]
    async fn gate_approves_and_reports_model_errors() {
        let approving = default_router();
        let (status, body) = send(&approving, post("/gate", json!({ "prompt": "short safe text." }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "APPROVED");
        assert_eq!(body["envelope"]["validation"]["pass"], true);
        assert_eq!(body["seal"]["version"], "2.0");

        let failing = router(FailingGenerator::new("quota exceeded"));
        let (status, body) = send(&failing, post("/gate", json!({ "prompt": "p" }))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["status"], "ERROR_MODEL");
        assert!(body.get("seal").is_none());
    }

    #[tokio::test]
    async fn gate_rejects_malformed_requests() {
        let router = default_router();
        let (status, _) = send(&router, post("/gate", json!({ "text": "no prompt" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let oversized = json!({ "prompt": "x".repeat(4096) });
        let (status, _) = send(&router, post("/gate", oversized)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn request_id_is_echoed() {
        let router = default_router();
        let request = Request::builder()
            .uri("/healthz")
            .header("x-request-id", "abc-123")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.headers()["x-request-id"], "abc-123");
    }

    #[tokio::test]
    async fn metrics_endpoints_render() {
        let router = default_router();
        send(&router, post("/gate", json!({ "prompt": "p" }))).await;
        send(&router, post("/interlock/trip", json!({}))).await;

        let (status, body) = send(&router, get("/metrics/gate")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["approved"], 1);

        let (status, body) = send(&router, get("/metrics/http")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["trip"]["count"], 1);
        assert_eq!(body["gate"]["count"], 1);

        let response = router.clone().oneshot(get("/metrics/prometheus")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("floorgate_interlock_cycles_total 1"));
        assert!(text.contains("floorgate_gate_approved_total 1"));
        assert!(text.contains("# TYPE floorgate_http_trip_latency_ms histogram"));
    }
}
