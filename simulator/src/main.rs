use anyhow::{Context, Result};
use clap::Parser;
use floorgate_simulator::{Api, GeneratorKind, Simulator, SimulatorConfig};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() -> Result<()> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .ok()
        .and_then(|value| {
            let trimmed = value.trim().to_string();
            (!trimmed.is_empty()).then_some(trimmed)
        });

    if let Some(endpoint) = endpoint {
        let service_name = std::env::var("OTEL_SERVICE_NAME")
            .unwrap_or_else(|_| "floorgate-simulator".to_string());
        let rate = std::env::var("OTEL_SAMPLING_RATE")
            .ok()
            .and_then(|value| value.parse::<f64>().ok())
            .map(|value| value.clamp(0.0, 1.0))
            .unwrap_or(1.0);
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(endpoint)
            .build()
            .context("failed to build OTLP exporter")?;
        let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
            .with_sampler(opentelemetry_sdk::trace::Sampler::TraceIdRatioBased(rate))
            .with_resource(
                opentelemetry_sdk::Resource::builder_empty()
                    .with_attributes([opentelemetry::KeyValue::new("service.name", service_name)])
                    .build(),
            )
            .with_batch_exporter(exporter)
            .build();
        let tracer = tracer_provider.tracer("floorgate-simulator");
        opentelemetry::global::set_tracer_provider(tracer_provider);

        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_filter(LevelFilter::INFO))
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    Ok(())
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host interface to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Post-trip reset latency in milliseconds.
    #[arg(long)]
    reset_delay_ms: Option<u64>,

    /// Duration of a nominal cycle in milliseconds.
    #[arg(long)]
    settle_ms: Option<u64>,

    /// Seed for the fault injector (OS entropy when omitted).
    #[arg(long)]
    fault_seed: Option<u64>,

    /// Largest accepted stress run.
    #[arg(long)]
    stress_max_cycles: Option<u64>,

    #[arg(long, value_enum, default_value_t = GeneratorKind::Stub)]
    generator: GeneratorKind,

    /// Seed for the stub generator (OS entropy when omitted).
    #[arg(long)]
    generator_seed: Option<u64>,

    /// Generator timeout in milliseconds (must be > 0).
    #[arg(long)]
    generator_timeout_ms: Option<u64>,

    #[arg(long)]
    llm_endpoint: Option<String>,

    #[arg(long)]
    llm_model: Option<String>,

    #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
    llm_api_key: Option<String>,

    /// HTTP rate limit per IP in requests per second (0 disables rate limiting).
    #[arg(long)]
    http_rate_limit_per_second: Option<u64>,

    /// HTTP rate limit burst size (0 disables rate limiting).
    #[arg(long)]
    http_rate_limit_burst: Option<u32>,

    /// Max request body size in bytes (0 disables limit).
    #[arg(long)]
    http_body_limit_bytes: Option<usize>,
}

/// Maps an optional arg value to Option: 0 => None, Some(v) => Some(v), None => default
fn map_optional_limit<T: Copy + PartialEq + From<u8>>(
    arg: Option<T>,
    default: Option<T>,
) -> Option<T> {
    match arg {
        Some(v) if v == T::from(0) => None,
        Some(v) => Some(v),
        None => default,
    }
}

fn build_config(args: &Args) -> Result<SimulatorConfig> {
    let defaults = SimulatorConfig::default();

    let mut interlock = defaults.interlock.clone();
    if let Some(reset_delay_ms) = args.reset_delay_ms {
        interlock.reset_delay_ms = reset_delay_ms;
    }
    if let Some(settle_ms) = args.settle_ms {
        interlock.settle_ms = settle_ms;
    }
    interlock.validate().context("invalid interlock config")?;

    let mut gate = defaults.gate.clone();
    if let Some(timeout_ms) = args.generator_timeout_ms {
        gate.generator_timeout_ms = timeout_ms;
    }
    gate.validate().context("invalid gate config")?;

    if args.generator == GeneratorKind::OpenAi && args.llm_api_key.is_none() {
        anyhow::bail!("LLM_API_KEY is required with --generator openai");
    }

    Ok(SimulatorConfig {
        interlock,
        gate,
        fault_seed: args.fault_seed,
        stress_max_cycles: args.stress_max_cycles.unwrap_or(defaults.stress_max_cycles),
        generator: args.generator,
        generator_seed: args.generator_seed,
        llm_endpoint: args.llm_endpoint.clone().unwrap_or(defaults.llm_endpoint),
        llm_model: args.llm_model.clone().unwrap_or(defaults.llm_model),
        http_rate_limit_per_second: map_optional_limit(
            args.http_rate_limit_per_second,
            defaults.http_rate_limit_per_second,
        ),
        http_rate_limit_burst: map_optional_limit(
            args.http_rate_limit_burst,
            defaults.http_rate_limit_burst,
        ),
        http_body_limit_bytes: map_optional_limit(
            args.http_body_limit_bytes,
            defaults.http_body_limit_bytes,
        ),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse args
    let args = Args::parse();

    // Create logger
    init_tracing()?;

    let config = build_config(&args)?;
    info!(
        generator = ?config.generator,
        fault_seed = ?config.fault_seed,
        reset_delay_ms = config.interlock.reset_delay_ms,
        stress_max_cycles = config.stress_max_cycles,
        "simulator config loaded"
    );

    let simulator = Arc::new(
        Simulator::new(config, args.llm_api_key.clone()).context("failed to build simulator")?,
    );
    let api = Api::new(simulator);
    let app = api.router();

    // Start server
    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("axum server error")?;

    Ok(())
}
