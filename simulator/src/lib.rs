use floorgate_execution::{
    Clock, ConfigError, Gate, GateError, Generator, Interlock, InterlockConfig, OpenAiGenerator,
    StubGenerator, SystemClock,
};
use floorgate_types::{
    api::{StatusResponse, StressResponse, TripResponse, TRIP_LOG_TAIL},
    FaultKind, GateResponse, StatusSnapshot,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

mod api;
pub use api::Api;

mod config;
pub use config::{GeneratorKind, SimulatorConfig};

mod metrics;
use metrics::{
    GateMetrics, GateMetricsSnapshot, HttpMetrics, HttpMetricsSnapshot, SystemMetrics,
    SystemMetricsSnapshot,
};

/// Status label reported by the status endpoint while the service is up.
const LIVE: &str = "LIVE";

#[derive(Error, Debug)]
pub enum SimulatorError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("stress run of {requested} cycles exceeds the limit of {max}")]
    StressLimit { requested: u64, max: u64 },
}

/// Shared service state: the interlock, the gate and their metrics.
pub struct Simulator {
    config: SimulatorConfig,
    interlock: Interlock,
    gate: Gate,
    http_metrics: HttpMetrics,
    gate_metrics: GateMetrics,
    system_metrics: SystemMetrics,
}

impl Simulator {
    /// Build from configuration using the system clock and the configured generator.
    pub fn new(config: SimulatorConfig, llm_api_key: Option<String>) -> Result<Self, SimulatorError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let generator: Arc<dyn Generator> = match config.generator {
            GeneratorKind::Stub => Arc::new(StubGenerator::new(clock.clone(), config.generator_seed)),
            GeneratorKind::OpenAi => Arc::new(OpenAiGenerator::new(
                config.llm_endpoint.clone(),
                config.llm_model.clone(),
                llm_api_key,
            )),
        };
        Self::with_parts(config, clock, generator)
    }

    pub fn with_parts(
        config: SimulatorConfig,
        clock: Arc<dyn Clock>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self, SimulatorError> {
        let interlock = Interlock::new(config.interlock.clone(), clock.clone(), config.fault_seed)?;
        let gate = Gate::new(generator, clock, config.gate.clone())?;
        Ok(Self {
            config,
            interlock,
            gate,
            http_metrics: HttpMetrics::default(),
            gate_metrics: GateMetrics::default(),
            system_metrics: SystemMetrics::new(),
        })
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Run one interlock cycle. Unrecognized fault tags fall back to an ambient draw.
    pub async fn trip(&self, fault: Option<&str>) -> TripResponse<InterlockConfig> {
        let requested = fault.and_then(|tag| {
            let kind = FaultKind::from_tag(tag);
            if kind.is_none() {
                tracing::debug!(tag, "unknown fault tag; using ambient draw");
            }
            kind
        });
        let (result, snapshot, trip_log) = self
            .interlock
            .execute_cycle_with_log(requested, TRIP_LOG_TAIL)
            .await;
        TripResponse {
            status: result.status,
            state: snapshot.state,
            cycle_index: result.cycle_index,
            config: self.config.interlock.clone(),
            trip_log,
            total_cycles: snapshot.cycles,
            tripped_rate: snapshot.trip_rate(),
        }
    }

    pub fn status(&self) -> StatusResponse {
        let StatusSnapshot {
            state,
            cycles,
            trip_count,
            last_trip,
        } = self.interlock.status();
        StatusResponse {
            status: LIVE.to_string(),
            state,
            cycles,
            trip_history: trip_count,
            last_trip,
        }
    }

    pub async fn stress(&self, cycles: u64) -> Result<StressResponse, SimulatorError> {
        let max = self.config.stress_max_cycles;
        if cycles > max {
            return Err(SimulatorError::StressLimit {
                requested: cycles,
                max,
            });
        }
        Ok(self.interlock.stress_run(cycles).await.into())
    }

    pub async fn gate(&self, prompt: &str) -> Result<GateResponse, GateError> {
        match self.gate.run(prompt).await {
            Ok(response) => {
                let latency_ms = match &response {
                    GateResponse::ErrorModel { latency_ms, .. } => *latency_ms,
                    GateResponse::Approved { envelope, .. }
                    | GateResponse::Rejected { envelope, .. } => envelope.latency_ms,
                };
                self.gate_metrics
                    .record(response.status(), Duration::from_millis(latency_ms));
                Ok(response)
            }
            Err(err) => {
                self.gate_metrics.inc_seal_error();
                tracing::error!(error = %err, "gate failed to seal response");
                Err(err)
            }
        }
    }

    pub(crate) fn interlock_snapshot(&self) -> StatusSnapshot {
        self.interlock.status()
    }

    pub(crate) fn http_metrics(&self) -> &HttpMetrics {
        &self.http_metrics
    }

    pub(crate) fn http_metrics_snapshot(&self) -> HttpMetricsSnapshot {
        self.http_metrics.snapshot()
    }

    pub(crate) fn gate_metrics_snapshot(&self) -> GateMetricsSnapshot {
        self.gate_metrics.snapshot(self.gate.cycles())
    }

    pub(crate) fn system_metrics_snapshot(&self) -> SystemMetricsSnapshot {
        self.system_metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floorgate_execution::mocks::{FailingGenerator, FixedGenerator, ManualClock};
    use floorgate_execution::STUB_RESPONSES;
    use floorgate_types::{format_rate, CycleStatus, GateStatus, InterlockState};

    fn simulator(generator: impl Generator) -> Simulator {
        let config = SimulatorConfig {
            fault_seed: Some(42),
            stress_max_cycles: 1_000,
            ..Default::default()
        };
        Simulator::with_parts(config, Arc::new(ManualClock::new()), Arc::new(generator)).unwrap()
    }

    #[tokio::test]
    async fn trip_reports_cycle_and_log_tail() {
        let simulator = simulator(FixedGenerator::new(STUB_RESPONSES[0]));
        let mut last = None;
        for expected in 1..=20u64 {
            let response = simulator.trip(Some("thermal")).await;
            assert_eq!(response.cycle_index, expected);
            assert_eq!(response.total_cycles, expected);
            assert_eq!(response.state, InterlockState::Armed);
            assert!(response.trip_log.len() <= TRIP_LOG_TAIL);
            last = Some(response);
        }
        let last = last.unwrap();
        let status = simulator.status();
        assert_eq!(
            last.tripped_rate,
            format_rate(status.trip_history, status.cycles)
        );
        assert_eq!(status.status, "LIVE");
        assert_eq!(status.cycles, 20);
        if last.status == CycleStatus::Interlocked {
            assert_eq!(last.trip_log.last().map(|t| t.cycle_index), Some(20));
        }
    }

    #[tokio::test]
    async fn concurrent_trips_report_their_own_cycle() {
        let simulator = Arc::new(simulator(FixedGenerator::new(STUB_RESPONSES[0])));
        let trips = (0..8).map(|_| {
            let simulator = simulator.clone();
            tokio::spawn(async move { simulator.trip(Some("thermal")).await })
        });
        for response in futures::future::join_all(trips).await {
            let response = response.unwrap();
            assert_eq!(response.total_cycles, response.cycle_index);
            assert_eq!(response.state, InterlockState::Armed);
            let newest = response.trip_log.last().map(|trip| trip.cycle_index);
            assert!(newest.map_or(true, |index| index <= response.cycle_index));
            if response.status == CycleStatus::Interlocked {
                assert_eq!(newest, Some(response.cycle_index));
            }
        }
        assert_eq!(simulator.status().cycles, 8);
    }

    #[tokio::test]
    async fn unknown_fault_tag_is_ambient() {
        let simulator = simulator(FixedGenerator::new(STUB_RESPONSES[0]));
        let mut trips = 0;
        for _ in 0..400 {
            if simulator.trip(Some("meteor")).await.status == CycleStatus::Interlocked {
                trips += 1;
            }
        }
        let rate = trips as f64 / 400.0;
        assert!(rate < 0.45, "rate {rate}");
    }

    #[tokio::test]
    async fn stress_limit_is_enforced() {
        let simulator = simulator(FixedGenerator::new(STUB_RESPONSES[0]));
        assert!(matches!(
            simulator.stress(1_001).await,
            Err(SimulatorError::StressLimit {
                requested: 1_001,
                max: 1_000
            })
        ));
        let response = simulator.stress(50).await.unwrap();
        assert!(response.stress_test);
        assert_eq!(response.passes + response.trips, 50);
        assert_eq!(simulator.status().cycles, 50);
    }

    #[tokio::test]
    async fn gate_outcomes_feed_metrics() {
        let approving = simulator(FixedGenerator::new(STUB_RESPONSES[0]));
        let response = approving.gate("short safe text.").await.unwrap();
        assert_eq!(response.status(), GateStatus::Approved);

        let failing = simulator(FailingGenerator::new("down"));
        let response = failing.gate("p").await.unwrap();
        assert_eq!(response.status(), GateStatus::ErrorModel);

        assert_eq!(approving.gate_metrics_snapshot().approved, 1);
        assert_eq!(approving.gate_metrics_snapshot().cycles, 1);
        assert_eq!(failing.gate_metrics_snapshot().model_errors, 1);
        assert_eq!(failing.gate_metrics_snapshot().cycles, 0);
    }

    #[test]
    fn invalid_interlock_config_is_rejected() {
        let mut config = SimulatorConfig::default();
        config.interlock.ambient_fault_probability = -0.1;
        let result = Simulator::with_parts(
            config,
            Arc::new(ManualClock::new()),
            Arc::new(FixedGenerator::new("x")),
        );
        assert!(matches!(result, Err(SimulatorError::Config(_))));
    }
}
