//! Deterministic validation rules applied to generated text.

use floorgate_types::{RuleName, RuleResult, ValidationOutcome};
use regex::Regex;

use crate::error::ConfigError;

/// Maximum accepted length, in characters.
pub const MAX_CHARS: usize = 1200;

/// Terms rejected by the `safe` rule, matched case-insensitively as substrings.
pub const BANNED_TERMS: [&str; 4] = ["suicide", "kill", "bomb", "explosive"];

/// Phrase rejected by the `domain` rule.
pub const DOMAIN_PATTERN: &str = r"(?i)quantum\s+decoherence";

/// Compiled rule set. Validation is pure: the same text always yields the
/// same outcome.
#[derive(Clone, Debug)]
pub struct RuleSet {
    domain: Regex,
}

impl RuleSet {
    pub fn new() -> Result<Self, ConfigError> {
        Ok(Self {
            domain: Regex::new(DOMAIN_PATTERN)?,
        })
    }

    /// Evaluate every rule against `text`; failures are listed in rule order.
    pub fn validate(&self, text: &str) -> ValidationOutcome {
        let results = RuleName::ALL
            .iter()
            .map(|&name| RuleResult {
                name,
                passed: self.check(name, text),
            })
            .collect();
        ValidationOutcome::from_results(results)
    }

    fn check(&self, rule: RuleName, text: &str) -> bool {
        match rule {
            RuleName::Length => text.chars().count() <= MAX_CHARS,
            RuleName::Safe => {
                let lowered = text.to_lowercase();
                !BANNED_TERMS.iter().any(|term| lowered.contains(term))
            }
            RuleName::Structured => {
                text.trim().ends_with('.') && text.chars().any(char::is_whitespace)
            }
            RuleName::Domain => !self.domain.is_match(text),
        }
    }
}
