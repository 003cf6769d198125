use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name reported in every gate response.
pub const GATE_NAME: &str = "DOS 2.0";

/// Rules evaluated by the deterministic gate, in evaluation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleName {
    Length,
    Safe,
    Structured,
    Domain,
}

impl RuleName {
    pub const ALL: [RuleName; 4] = [
        RuleName::Length,
        RuleName::Safe,
        RuleName::Structured,
        RuleName::Domain,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleName::Length => "length",
            RuleName::Safe => "safe",
            RuleName::Structured => "structured",
            RuleName::Domain => "domain",
        }
    }
}

impl fmt::Display for RuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleResult {
    pub name: RuleName,
    pub passed: bool,
}

/// Result of running every rule against a candidate text.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub pass: bool,
    pub failed_rules: Vec<RuleName>,
    pub passed_count: usize,
    pub rules: Vec<RuleResult>,
}

impl ValidationOutcome {
    /// Fold per-rule results into an outcome. Order of `results` is preserved.
    pub fn from_results(results: Vec<RuleResult>) -> Self {
        let failed_rules: Vec<RuleName> = results
            .iter()
            .filter(|result| !result.passed)
            .map(|result| result.name)
            .collect();
        Self {
            pass: failed_rules.is_empty(),
            passed_count: results.len() - failed_rules.len(),
            failed_rules,
            rules: results,
        }
    }
}

/// Presentation-only fingerprint attached to a gate envelope.
///
/// The hash is salted with the sealing timestamp and the salt is not kept, so
/// a seal cannot be re-derived or verified later.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seal {
    pub sealed: bool,
    pub timestamp: DateTime<Utc>,
    pub hash: String,
    pub version: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SealedEnvelope<T> {
    pub payload: T,
    pub seal: Seal,
}

/// Request, raw generated output and validation outcome of one gate cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub prompt: String,
    pub raw_output: String,
    pub validation: ValidationOutcome,
    pub latency_ms: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateStatus {
    Approved,
    Rejected,
    ErrorModel,
}

/// Response of one gate request.
///
/// Approvals and rejections are both sealed; a generator failure never
/// reaches validation and carries no seal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateResponse {
    Approved {
        gate: String,
        seal: Seal,
        approved_output: String,
        envelope: Envelope,
    },
    Rejected {
        gate: String,
        seal: Seal,
        rejected_reason: Vec<RuleName>,
        envelope: Envelope,
    },
    ErrorModel {
        gate: String,
        error: String,
        latency_ms: u64,
    },
}

impl GateResponse {
    /// Build an approval or rejection from a sealed envelope.
    pub fn from_sealed(sealed: SealedEnvelope<Envelope>) -> Self {
        let SealedEnvelope { payload, seal } = sealed;
        if payload.validation.pass {
            GateResponse::Approved {
                gate: GATE_NAME.to_string(),
                seal,
                approved_output: payload.raw_output.clone(),
                envelope: payload,
            }
        } else {
            GateResponse::Rejected {
                gate: GATE_NAME.to_string(),
                seal,
                rejected_reason: payload.validation.failed_rules.clone(),
                envelope: payload,
            }
        }
    }

    pub fn model_error(error: impl Into<String>, latency_ms: u64) -> Self {
        GateResponse::ErrorModel {
            gate: GATE_NAME.to_string(),
            error: error.into(),
            latency_ms,
        }
    }

    pub fn status(&self) -> GateStatus {
        match self {
            GateResponse::Approved { .. } => GateStatus::Approved,
            GateResponse::Rejected { .. } => GateStatus::Rejected,
            GateResponse::ErrorModel { .. } => GateStatus::ErrorModel,
        }
    }

    pub fn seal(&self) -> Option<&Seal> {
        match self {
            GateResponse::Approved { seal, .. } | GateResponse::Rejected { seal, .. } => Some(seal),
            GateResponse::ErrorModel { .. } => None,
        }
    }

    pub fn envelope(&self) -> Option<&Envelope> {
        match self {
            GateResponse::Approved { envelope, .. } | GateResponse::Rejected { envelope, .. } => {
                Some(envelope)
            }
            GateResponse::ErrorModel { .. } => None,
        }
    }
}
