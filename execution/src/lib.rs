//! Floorgate execution layer.
//!
//! This crate contains the two engines served by the simulator: the
//! fail-closed [`Interlock`] and the deterministic [`Gate`] that wraps a
//! probabilistic [`Generator`].
//!
//! ## Time and randomness
//! - Every delay and timestamp goes through a [`Clock`]; nothing calls the
//!   system clock directly.
//! - Fault draws come from an injectable RNG. A seeded interlock replays the
//!   same fault sequence.
//!
//! ## Exclusion
//! Interlock cycles are serialized by an async mutex owned by the
//! [`Interlock`]. Status reads are served from a published snapshot and never
//! wait on a running cycle. The gate shares no state with the interlock.
//!
//! ## Minimal gate pipeline (example)
//! ```rust,ignore
//! use std::sync::Arc;
//! use floorgate_execution::{Gate, GateConfig, StubGenerator, SystemClock};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let clock = Arc::new(SystemClock);
//! let generator = Arc::new(StubGenerator::new(clock.clone(), Some(7)));
//! let gate = Gate::new(generator, clock, GateConfig::default())?;
//! let response = gate.run("Describe the interlock.").await?;
//! println!("{}", serde_json::to_string_pretty(&response)?);
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod fault;
pub mod gate;
pub mod generator;
pub mod interlock;
pub mod rules;
pub mod seal;
pub mod trip_log;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

mod error;

pub use clock::{Clock, SystemClock};
pub use error::ConfigError;
pub use fault::FaultInjector;
pub use gate::{Gate, GateConfig, GateError};
pub use generator::{
    Generator, GeneratorError, OpenAiGenerator, StubGenerator, DEFAULT_LLM_ENDPOINT,
    DEFAULT_LLM_MODEL, STUB_RESPONSES,
};
pub use interlock::{Interlock, InterlockConfig};
pub use rules::RuleSet;
pub use seal::{SealError, Sealer};
pub use trip_log::TripLog;
