//! Common types shared by the floorgate engines and the HTTP service.
//!
//! Nothing in this crate performs I/O or holds mutable state: the engines in
//! `floorgate-execution` produce these values and the simulator serializes them.

pub mod api;
pub mod gate;
pub mod interlock;

pub use gate::{
    Envelope, GateResponse, GateStatus, RuleName, RuleResult, Seal, SealedEnvelope,
    ValidationOutcome, GATE_NAME,
};
pub use interlock::{
    format_rate, CycleResult, CycleStatus, FaultKind, InterlockState, StatusSnapshot,
    StressResult, TripRecord,
};
