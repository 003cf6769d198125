//! Request and response bodies exchanged with the HTTP service.

use crate::interlock::{CycleStatus, InterlockState, StressResult, TripRecord};
use serde::{Deserialize, Serialize};

/// Default number of cycles for a stress request without an explicit count.
pub const DEFAULT_STRESS_CYCLES: u64 = 100;

/// Number of trip records echoed by a trip response.
pub const TRIP_LOG_TAIL: usize = 5;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TripRequest {
    /// Requested fault tag. Unknown tags are treated as absent.
    #[serde(default)]
    pub fault: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StressRequest {
    #[serde(default)]
    pub cycles: Option<u64>,
}

impl StressRequest {
    pub fn cycles(&self) -> u64 {
        self.cycles.unwrap_or(DEFAULT_STRESS_CYCLES)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GateRequest {
    pub prompt: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TripResponse<C> {
    pub status: CycleStatus,
    pub state: InterlockState,
    pub cycle_index: u64,
    pub config: C,
    pub trip_log: Vec<TripRecord>,
    pub total_cycles: u64,
    pub tripped_rate: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub state: InterlockState,
    pub cycles: u64,
    pub trip_history: u64,
    pub last_trip: Option<TripRecord>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StressResponse {
    pub stress_test: bool,
    pub cycles: u64,
    pub passes: u64,
    pub trips: u64,
    pub trip_rate: String,
    pub avg_trip_ms: f64,
}

impl From<StressResult> for StressResponse {
    fn from(result: StressResult) -> Self {
        Self {
            stress_test: true,
            cycles: result.cycles,
            passes: result.passes,
            trips: result.trips,
            trip_rate: result.trip_rate,
            avg_trip_ms: result.avg_trip_duration_ms,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bodies_use_defaults() {
        let trip: TripRequest = serde_json::from_str("{}").unwrap();
        assert!(trip.fault.is_none());

        let stress: StressRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(stress.cycles(), DEFAULT_STRESS_CYCLES);

        let stress: StressRequest = serde_json::from_str(r#"{"cycles":0}"#).unwrap();
        assert_eq!(stress.cycles(), 0);
    }

    #[test]
    fn stress_response_marks_stress_test() {
        let response = StressResponse::from(StressResult {
            cycles: 0,
            passes: 0,
            trips: 0,
            trip_rate: "0.0%".to_string(),
            avg_trip_duration_ms: 0.2,
        });
        let json = serde_json::to_value(response).unwrap();
        assert_eq!(json["stress_test"], true);
        assert_eq!(json["trip_rate"], "0.0%");
        assert_eq!(json["avg_trip_ms"], 0.2);
    }
}
