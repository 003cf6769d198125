//! Deterministic gate around a probabilistic generator.
//!
//! One request runs generate -> validate -> seal. A generator failure or
//! timeout short-circuits to `ERROR_MODEL`: nothing is validated or sealed and
//! the gate cycle counter is left untouched.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use floorgate_types::{Envelope, GateResponse};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::ConfigError;
use crate::generator::{Generator, GeneratorError};
use crate::rules::RuleSet;
use crate::seal::{SealError, Sealer};

const DEFAULT_GENERATOR_TIMEOUT_MS: u64 = 30_000;

#[derive(Error, Debug)]
pub enum GateError {
    #[error(transparent)]
    Seal(#[from] SealError),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateConfig {
    pub generator_timeout_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            generator_timeout_ms: DEFAULT_GENERATOR_TIMEOUT_MS,
        }
    }
}

impl GateConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.generator_timeout_ms == 0 {
            return Err(ConfigError::NotPositive {
                field: "generator_timeout_ms",
                value: 0.0,
            });
        }
        Ok(())
    }

    pub fn generator_timeout(&self) -> Duration {
        Duration::from_millis(self.generator_timeout_ms)
    }
}

pub struct Gate {
    generator: Arc<dyn Generator>,
    clock: Arc<dyn Clock>,
    sealer: Sealer,
    rules: RuleSet,
    config: GateConfig,
    cycles: AtomicU64,
}

impl Gate {
    pub fn new(
        generator: Arc<dyn Generator>,
        clock: Arc<dyn Clock>,
        config: GateConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            generator,
            sealer: Sealer::new(clock.clone()),
            clock,
            rules: RuleSet::new()?,
            config,
            cycles: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Number of generated outputs that reached validation.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub async fn run(&self, prompt: &str) -> Result<GateResponse, GateError> {
        let start = self.clock.instant();
        let generated = tokio::time::timeout(
            self.config.generator_timeout(),
            self.generator.generate(prompt),
        )
        .await
        .unwrap_or(Err(GeneratorError::Timeout {
            timeout_ms: self.config.generator_timeout_ms,
        }));

        let raw_output = match generated {
            Ok(text) => text,
            Err(err) => {
                let latency_ms = self.clock.elapsed_ms(start);
                warn!(latency_ms, error = %err, "generator failed");
                return Ok(GateResponse::model_error(err.to_string(), latency_ms));
            }
        };

        let validation = self.rules.validate(&raw_output);
        self.cycles.fetch_add(1, Ordering::Relaxed);
        let envelope = Envelope {
            prompt: prompt.to_string(),
            raw_output,
            validation,
            latency_ms: self.clock.elapsed_ms(start),
        };
        debug!(
            latency_ms = envelope.latency_ms,
            pass = envelope.validation.pass,
            failed = ?envelope.validation.failed_rules,
            "gate cycle"
        );
        let sealed = self.sealer.seal(envelope)?;
        Ok(GateResponse::from_sealed(sealed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::generator::{StubGenerator, STUB_RESPONSES};
    use crate::mocks::{FailingGenerator, FixedGenerator, ManualClock, StalledGenerator};
    use floorgate_types::{GateStatus, RuleName, GATE_NAME};

    fn gate(generator: impl Generator, clock: Arc<dyn Clock>) -> Gate {
        Gate::new(Arc::new(generator), clock, GateConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn approves_clean_output() {
        let clock = Arc::new(ManualClock::new());
        let generator = Arc::new(
            FixedGenerator::new(STUB_RESPONSES[0]).with_latency(clock.clone(), Duration::from_millis(900)),
        );
        let gate = Gate::new(generator.clone(), clock, GateConfig::default()).unwrap();

        let response = gate.run("short safe text.").await.unwrap();
        assert_eq!(response.status(), GateStatus::Approved);
        let GateResponse::Approved {
            gate: name,
            seal,
            approved_output,
            envelope,
        } = response
        else {
            panic!("expected approval");
        };
        assert_eq!(name, GATE_NAME);
        assert_eq!(approved_output, STUB_RESPONSES[0]);
        assert!(envelope.validation.pass);
        assert_eq!(envelope.prompt, "short safe text.");
        assert_eq!(envelope.latency_ms, 900);
        assert!(seal.sealed);
        assert_eq!(seal.hash.len(), 32);
        assert_eq!(gate.cycles(), 1);
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn rejects_with_every_failed_rule() {
        let clock = Arc::new(ManualClock::new());
        let gate = gate(FixedGenerator::new("kill it"), clock);

        let response = gate.run("p").await.unwrap();
        let GateResponse::Rejected {
            rejected_reason,
            envelope,
            seal,
            ..
        } = response
        else {
            panic!("expected rejection");
        };
        assert_eq!(rejected_reason, vec![RuleName::Safe, RuleName::Structured]);
        assert_eq!(envelope.raw_output, "kill it");
        assert!(!envelope.validation.pass);
        assert!(seal.sealed);
    }

    #[tokio::test]
    async fn generator_failure_yields_model_error() {
        let clock = Arc::new(ManualClock::new());
        let gate = gate(FailingGenerator::new("upstream 503"), clock);

        let response = gate.run("p").await.unwrap();
        assert_eq!(response.status(), GateStatus::ErrorModel);
        assert!(response.seal().is_none());
        let GateResponse::ErrorModel { error, .. } = response else {
            panic!("expected model error");
        };
        assert!(error.contains("upstream 503"));
        assert_eq!(gate.cycles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_generator_times_out() {
        let config = GateConfig {
            generator_timeout_ms: 2_000,
        };
        let gate = Gate::new(Arc::new(StalledGenerator), Arc::new(SystemClock), config).unwrap();

        let response = gate.run("p").await.unwrap();
        let GateResponse::ErrorModel { error, latency_ms, .. } = response else {
            panic!("expected model error");
        };
        assert!(error.contains("timed out after 2000ms"));
        assert!(latency_ms >= 2_000);
        assert_eq!(gate.cycles(), 0);
    }

    #[tokio::test]
    async fn stub_outputs_are_all_sealed() {
        let clock = Arc::new(ManualClock::new());
        let gate = Gate::new(
            Arc::new(StubGenerator::new(clock.clone(), Some(3))),
            clock,
            GateConfig::default(),
        )
        .unwrap();

        for _ in 0..10 {
            let response = gate.run("explain interlocks").await.unwrap();
            assert_ne!(response.status(), GateStatus::ErrorModel);
            let envelope = response.envelope().unwrap();
            assert!((800..1200).contains(&envelope.latency_ms));
            assert!(response.seal().is_some());
        }
        assert_eq!(gate.cycles(), 10);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = GateConfig {
            generator_timeout_ms: 0,
        };
        assert!(config.validate().is_err());
    }
}
