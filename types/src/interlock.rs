use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Observable state of the interlock.
///
/// The device is `Armed` at rest and whenever it accepts a new cycle. It is
/// `Tripped` only while the reset delay of the most recent trip is pending.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterlockState {
    #[default]
    Armed,
    Tripped,
}

impl InterlockState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterlockState::Armed => "ARMED",
            InterlockState::Tripped => "TRIPPED",
        }
    }
}

impl fmt::Display for InterlockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog of simulated fault variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaultKind {
    InjectFail,
    Thermal,
    Logic,
}

impl FaultKind {
    /// Every variant, in catalog order.
    pub const ALL: [FaultKind; 3] = [FaultKind::InjectFail, FaultKind::Thermal, FaultKind::Logic];

    pub fn as_str(&self) -> &'static str {
        match self {
            FaultKind::InjectFail => "inject-fail",
            FaultKind::Thermal => "thermal",
            FaultKind::Logic => "logic",
        }
    }

    /// Parse a requested fault tag.
    ///
    /// Unknown tags resolve to `None`: callers treat them as "no fault
    /// requested" rather than rejecting the request.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "inject-fail" => Some(FaultKind::InjectFail),
            "thermal" => Some(FaultKind::Thermal),
            "logic" => Some(FaultKind::Logic),
            _ => None,
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single recorded trip. Immutable once appended to the trip log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    pub fault: FaultKind,
    /// Mechanical trip time in milliseconds, always in `[0.2, 0.9)`.
    pub trip_duration_ms: f64,
    pub timestamp: DateTime<Utc>,
    pub cycle_index: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleStatus {
    Pass,
    Interlocked,
}

/// Outcome of one interlock cycle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CycleResult {
    pub status: CycleStatus,
    pub tripped: bool,
    pub cycle_index: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<FaultKind>,
}

impl CycleResult {
    pub fn pass(cycle_index: u64) -> Self {
        Self {
            status: CycleStatus::Pass,
            tripped: false,
            cycle_index,
            fault: None,
        }
    }

    pub fn interlocked(cycle_index: u64, fault: FaultKind) -> Self {
        Self {
            status: CycleStatus::Interlocked,
            tripped: true,
            cycle_index,
            fault: Some(fault),
        }
    }
}

/// Read-only view of the interlock.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub state: InterlockState,
    pub cycles: u64,
    pub trip_count: u64,
    pub last_trip: Option<TripRecord>,
}

impl StatusSnapshot {
    /// Lifetime trip rate, `"0.0%"` before the first cycle.
    pub fn trip_rate(&self) -> String {
        format_rate(self.trip_count, self.cycles)
    }
}

/// Tally of a stress run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StressResult {
    pub cycles: u64,
    pub passes: u64,
    pub trips: u64,
    pub trip_rate: String,
    pub avg_trip_duration_ms: f64,
}

/// Format `part / whole` as a percentage with one decimal place.
///
/// A zero denominator yields `"0.0%"`.
pub fn format_rate(part: u64, whole: u64) -> String {
    if whole == 0 {
        return "0.0%".to_string();
    }
    format!("{:.1}%", part as f64 / whole as f64 * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_tags_round_trip() {
        for kind in FaultKind::ALL {
            assert_eq!(FaultKind::from_tag(kind.as_str()), Some(kind));
        }
        assert_eq!(FaultKind::from_tag(" Thermal "), Some(FaultKind::Thermal));
    }

    #[test]
    fn unknown_fault_tag_is_not_requested() {
        assert_eq!(FaultKind::from_tag("meteor"), None);
        assert_eq!(FaultKind::from_tag(""), None);
    }

    #[test]
    fn rate_formatting() {
        assert_eq!(format_rate(0, 0), "0.0%");
        assert_eq!(format_rate(3, 10), "30.0%");
        assert_eq!(format_rate(1, 3), "33.3%");
        assert_eq!(format_rate(10, 10), "100.0%");
    }

    #[test]
    fn cycle_result_serialization() {
        let pass = serde_json::to_value(CycleResult::pass(4)).unwrap();
        assert_eq!(pass["status"], "PASS");
        assert_eq!(pass["tripped"], false);
        assert_eq!(pass["cycle_index"], 4);
        assert!(pass.get("fault").is_none());

        let tripped = serde_json::to_value(CycleResult::interlocked(5, FaultKind::InjectFail)).unwrap();
        assert_eq!(tripped["status"], "INTERLOCKED");
        assert_eq!(tripped["fault"], "inject-fail");
    }

    #[test]
    fn state_serializes_upper_case() {
        assert_eq!(serde_json::to_value(InterlockState::Tripped).unwrap(), "TRIPPED");
        assert_eq!(InterlockState::default(), InterlockState::Armed);
    }
}
