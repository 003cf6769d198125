use clap::ValueEnum;
use floorgate_execution::{GateConfig, InterlockConfig, DEFAULT_LLM_ENDPOINT, DEFAULT_LLM_MODEL};
use serde::Serialize;

const DEFAULT_STRESS_MAX_CYCLES: u64 = 10_000;
const DEFAULT_HTTP_RATE_LIMIT_PER_SECOND: u64 = 100;
const DEFAULT_HTTP_RATE_LIMIT_BURST: u32 = 200;
const DEFAULT_HTTP_BODY_LIMIT_BYTES: usize = 64 * 1024;

/// Source of generated text for the gate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorKind {
    /// Offline canned responses.
    #[default]
    Stub,
    /// OpenAI-compatible chat-completions endpoint.
    #[value(name = "openai")]
    OpenAi,
}

#[derive(Clone, Debug, Serialize)]
pub struct SimulatorConfig {
    pub interlock: InterlockConfig,
    pub gate: GateConfig,
    /// Seed for the fault injector; OS entropy when absent.
    pub fault_seed: Option<u64>,
    /// Largest accepted stress run.
    pub stress_max_cycles: u64,
    pub generator: GeneratorKind,
    pub generator_seed: Option<u64>,
    pub llm_endpoint: String,
    pub llm_model: String,
    pub http_rate_limit_per_second: Option<u64>,
    pub http_rate_limit_burst: Option<u32>,
    pub http_body_limit_bytes: Option<usize>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            interlock: InterlockConfig::default(),
            gate: GateConfig::default(),
            fault_seed: None,
            stress_max_cycles: DEFAULT_STRESS_MAX_CYCLES,
            generator: GeneratorKind::Stub,
            generator_seed: None,
            llm_endpoint: DEFAULT_LLM_ENDPOINT.to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            http_rate_limit_per_second: Some(DEFAULT_HTTP_RATE_LIMIT_PER_SECOND),
            http_rate_limit_burst: Some(DEFAULT_HTTP_RATE_LIMIT_BURST),
            http_body_limit_bytes: Some(DEFAULT_HTTP_BODY_LIMIT_BYTES),
        }
    }
}
