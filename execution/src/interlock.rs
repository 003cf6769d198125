//! Fail-closed interlock state machine.
//!
//! The interlock is ARMED at rest. A cycle draws one fault trial; on a fault
//! the device trips, records the event and holds TRIPPED for the physical
//! reset delay before re-arming.
//!
//! ## Exclusion
//! All cycles (single and stress) run under one async mutex, so at most one
//! cycle/trip sequence is in flight. Status reads never take that lock: the
//! lock holder publishes a snapshot at every transition, which means a reader
//! sees TRIPPED for as long as a reset is pending.
//!
//! ## Cancellation
//! If a cycle is dropped while its reset delay is pending the device stays
//! TRIPPED. The next cycle completes the outstanding reset before drawing.

use std::sync::Arc;
use std::time::Duration;

use floorgate_types::{
    format_rate, CycleResult, CycleStatus, FaultKind, InterlockState, StatusSnapshot,
    StressResult, TripRecord,
};
use rand::RngCore;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::ConfigError;
use crate::fault::FaultInjector;
use crate::trip_log::TripLog;

const DEFAULT_TRIP_FLOOR_MS: f64 = 0.2;
const DEFAULT_TRIP_JITTER_MS: f64 = 0.7;
const DEFAULT_RESET_DELAY_MS: u64 = 50;
const DEFAULT_SETTLE_MS: u64 = 1;
const DEFAULT_FORCED_FAULT_PROBABILITY: f64 = 0.95;
const DEFAULT_AMBIENT_FAULT_PROBABILITY: f64 = 0.30;
const DEFAULT_MAX_POWER_W: f64 = 10e6;
const DEFAULT_AVERAGE_WINDOW: usize = 10;

/// Physics parameters of the simulated interlock.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InterlockConfig {
    /// Mechanical trip floor in milliseconds.
    pub trip_floor_ms: f64,
    /// Upper bound of the uniform jitter added to the floor.
    pub trip_jitter_ms: f64,
    /// Post-trip reset latency.
    pub reset_delay_ms: u64,
    /// Duration of one nominal operating cycle.
    pub settle_ms: u64,
    pub forced_fault_probability: f64,
    pub ambient_fault_probability: f64,
    /// Simulated capacity; reported, never enforced.
    pub max_power_w: f64,
    pub variants: Vec<FaultKind>,
    /// Number of recent trips averaged by a stress run.
    pub average_window: usize,
}

impl Default for InterlockConfig {
    fn default() -> Self {
        Self {
            trip_floor_ms: DEFAULT_TRIP_FLOOR_MS,
            trip_jitter_ms: DEFAULT_TRIP_JITTER_MS,
            reset_delay_ms: DEFAULT_RESET_DELAY_MS,
            settle_ms: DEFAULT_SETTLE_MS,
            forced_fault_probability: DEFAULT_FORCED_FAULT_PROBABILITY,
            ambient_fault_probability: DEFAULT_AMBIENT_FAULT_PROBABILITY,
            max_power_w: DEFAULT_MAX_POWER_W,
            variants: FaultKind::ALL.to_vec(),
            average_window: DEFAULT_AVERAGE_WINDOW,
        }
    }
}

impl InterlockConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("forced_fault_probability", self.forced_fault_probability),
            ("ambient_fault_probability", self.ambient_fault_probability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Probability { field, value });
            }
        }
        if !(self.trip_floor_ms > 0.0) {
            return Err(ConfigError::NotPositive {
                field: "trip_floor_ms",
                value: self.trip_floor_ms,
            });
        }
        if !(self.trip_jitter_ms >= 0.0) {
            return Err(ConfigError::Negative {
                field: "trip_jitter_ms",
                value: self.trip_jitter_ms,
            });
        }
        if self.average_window == 0 {
            return Err(ConfigError::NotPositive {
                field: "average_window",
                value: 0.0,
            });
        }
        if self.variants.is_empty() {
            return Err(ConfigError::EmptyCatalog);
        }
        Ok(())
    }

    pub fn reset_delay(&self) -> Duration {
        Duration::from_millis(self.reset_delay_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

struct Core<R: RngCore> {
    state: InterlockState,
    cycles: u64,
    injector: FaultInjector<R>,
    log: TripLog,
}

impl<R: RngCore> Core<R> {
    fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            state: self.state,
            cycles: self.cycles,
            trip_count: self.log.len() as u64,
            last_trip: self.log.last().cloned(),
        }
    }
}

/// Simulated hardware interlock and its trip log.
pub struct Interlock<R: RngCore + Send = ChaCha20Rng> {
    config: InterlockConfig,
    clock: Arc<dyn Clock>,
    core: Mutex<Core<R>>,
    published: watch::Sender<StatusSnapshot>,
}

impl Interlock<ChaCha20Rng> {
    /// Create an interlock seeded from `seed`, or from OS entropy when absent.
    pub fn new(
        config: InterlockConfig,
        clock: Arc<dyn Clock>,
        seed: Option<u64>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let injector = match seed {
            Some(seed) => FaultInjector::seeded(&config, seed),
            None => FaultInjector::from_entropy(&config),
        };
        Self::with_injector(config, clock, injector)
    }
}

impl<R: RngCore + Send> Interlock<R> {
    pub fn with_injector(
        config: InterlockConfig,
        clock: Arc<dyn Clock>,
        injector: FaultInjector<R>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let core = Core {
            state: InterlockState::Armed,
            cycles: 0,
            injector,
            log: TripLog::new(),
        };
        let (published, _) = watch::channel(core.snapshot());
        Ok(Self {
            config,
            clock,
            core: Mutex::new(core),
            published,
        })
    }

    pub fn config(&self) -> &InterlockConfig {
        &self.config
    }

    /// Run one cycle, optionally requesting a specific fault.
    pub async fn execute_cycle(&self, requested: Option<FaultKind>) -> CycleResult {
        let mut core = self.core.lock().await;
        self.run_cycle(&mut core, requested).await
    }

    /// Run one cycle and capture the resulting snapshot and the last
    /// `tail` trips before another cycle can start.
    pub async fn execute_cycle_with_log(
        &self,
        requested: Option<FaultKind>,
        tail: usize,
    ) -> (CycleResult, StatusSnapshot, Vec<TripRecord>) {
        let mut core = self.core.lock().await;
        let result = self.run_cycle(&mut core, requested).await;
        (result, core.snapshot(), core.log.recent(tail).to_vec())
    }

    /// Latest published snapshot. Never waits on an in-flight cycle.
    pub fn status(&self) -> StatusSnapshot {
        self.published.borrow().clone()
    }

    /// Receive every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.published.subscribe()
    }

    /// The last `count` trips, oldest first.
    pub async fn recent_trips(&self, count: usize) -> Vec<TripRecord> {
        self.core.lock().await.log.recent(count).to_vec()
    }

    /// Run `cycles` unforced cycles back to back without admitting other cycles.
    pub async fn stress_run(&self, cycles: u64) -> StressResult {
        let mut core = self.core.lock().await;
        let mut passes = 0u64;
        let mut trips = 0u64;
        for _ in 0..cycles {
            match self.run_cycle(&mut core, None).await.status {
                CycleStatus::Pass => passes += 1,
                CycleStatus::Interlocked => trips += 1,
            }
        }
        let avg_trip_duration_ms = core
            .log
            .average_duration_ms(self.config.average_window, self.config.trip_floor_ms);
        let result = StressResult {
            cycles,
            passes,
            trips,
            trip_rate: format_rate(trips, cycles),
            avg_trip_duration_ms,
        };
        info!(
            cycles,
            passes,
            trips,
            trip_rate = %result.trip_rate,
            avg_trip_duration_ms,
            "stress run complete"
        );
        result
    }

    async fn run_cycle(&self, core: &mut Core<R>, requested: Option<FaultKind>) -> CycleResult {
        if core.state == InterlockState::Tripped {
            warn!(cycles = core.cycles, "completing interrupted reset");
            self.clock.sleep(self.config.reset_delay()).await;
            core.state = InterlockState::Armed;
            self.publish(core);
        }

        core.cycles += 1;
        let cycle_index = core.cycles;
        self.publish(core);

        match core.injector.draw(requested) {
            Some(fault) => {
                self.trip(core, fault).await;
                CycleResult::interlocked(cycle_index, fault)
            }
            None => {
                self.clock.sleep(self.config.settle()).await;
                debug!(cycle_index, "cycle passed");
                CycleResult::pass(cycle_index)
            }
        }
    }

    async fn trip(&self, core: &mut Core<R>, fault: FaultKind) {
        core.state = InterlockState::Tripped;
        let trip_duration_ms = core.injector.trip_duration_ms();
        core.log.record(TripRecord {
            fault,
            trip_duration_ms,
            timestamp: self.clock.now(),
            cycle_index: core.cycles,
        });
        self.publish(core);
        warn!(
            cycle_index = core.cycles,
            %fault,
            trip_duration_ms,
            "interlock tripped"
        );

        self.clock.sleep(self.config.reset_delay()).await;
        core.state = InterlockState::Armed;
        self.publish(core);
    }

    fn publish(&self, core: &Core<R>) {
        self.published.send_replace(core.snapshot());
    }
}
