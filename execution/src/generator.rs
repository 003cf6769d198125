//! Text generators consumed by the gate.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::Clock;

pub const DEFAULT_LLM_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Canned answers served by [`StubGenerator`].
pub const STUB_RESPONSES: [&str; 3] = [
    "Quantum interlocks use physical trip mechanisms at 0.2ms to isolate faulty AI execution paths.",
    "Quantum computing will revolutionize AI but requires deterministic validation layers.",
    "Error: This response contains invalid physics claims and fails DOS gate.",
];

const STUB_LATENCY_FLOOR_MS: u64 = 800;
const STUB_LATENCY_JITTER_MS: u64 = 400;

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("generator unavailable: {0}")]
    Unavailable(String),
    #[error("generator timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("generator request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed generator response: {0}")]
    MalformedResponse(String),
}

/// Probabilistic text source. May be slow and may fail.
#[async_trait]
pub trait Generator: Send + Sync + 'static {
    async fn generate(&self, prompt: &str) -> Result<String, GeneratorError>;
}

/// Offline generator returning one of [`STUB_RESPONSES`] after `[800, 1200)` ms.
pub struct StubGenerator {
    clock: Arc<dyn Clock>,
    rng: Mutex<ChaCha20Rng>,
}

impl StubGenerator {
    pub fn new(clock: Arc<dyn Clock>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha20Rng::seed_from_u64(seed),
            None => ChaCha20Rng::from_entropy(),
        };
        Self {
            clock,
            rng: Mutex::new(rng),
        }
    }
}

#[async_trait]
impl Generator for StubGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, GeneratorError> {
        let (latency_ms, index) = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            (
                STUB_LATENCY_FLOOR_MS + rng.gen_range(0..STUB_LATENCY_JITTER_MS),
                rng.gen_range(0..STUB_RESPONSES.len()),
            )
        };
        self.clock.sleep(Duration::from_millis(latency_ms)).await;
        Ok(STUB_RESPONSES[index].to_string())
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// OpenAI-compatible chat-completions client.
#[derive(Clone)]
pub struct OpenAiGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiGenerator {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
        }
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GeneratorError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| GeneratorError::Unavailable("LLM_API_KEY is not set".to_string()))?;

        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: DEFAULT_TEMPERATURE,
        };
        let response: ChatResponse = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GeneratorError::MalformedResponse("no choices[0].message.content".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::ManualClock;

    #[tokio::test]
    async fn stub_sleeps_within_latency_band() {
        let clock = Arc::new(ManualClock::new());
        let generator = StubGenerator::new(clock.clone(), Some(4));

        for _ in 0..20 {
            let before = clock.elapsed();
            let text = generator.generate("anything").await.unwrap();
            let waited = clock.elapsed() - before;
            assert!(STUB_RESPONSES.contains(&text.as_str()));
            assert!(waited >= Duration::from_millis(800) && waited < Duration::from_millis(1200));
        }
    }

    #[tokio::test]
    async fn stub_is_reproducible_and_varied() {
        let a = StubGenerator::new(Arc::new(ManualClock::new()), Some(9));
        let b = StubGenerator::new(Arc::new(ManualClock::new()), Some(9));
        let mut seen = std::collections::HashSet::new();
        for _ in 0..30 {
            let text = a.generate("p").await.unwrap();
            assert_eq!(text, b.generate("p").await.unwrap());
            seen.insert(text);
        }
        assert_eq!(seen.len(), STUB_RESPONSES.len());
    }

    #[tokio::test]
    async fn openai_without_key_is_unavailable() {
        let generator = OpenAiGenerator::new(DEFAULT_LLM_ENDPOINT, DEFAULT_LLM_MODEL, None);
        assert!(matches!(
            generator.generate("hello").await,
            Err(GeneratorError::Unavailable(_))
        ));
    }

    #[test]
    fn chat_request_wire_format() {
        let request = ChatRequest {
            model: "m",
            messages: [ChatMessage {
                role: "user",
                content: "hi",
            }],
            temperature: DEFAULT_TEMPERATURE,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "m");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hi");
        assert!((json["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);

        let reply: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant","content":"ok."}}]}"#)
                .unwrap();
        assert_eq!(reply.choices[0].message.content.as_deref(), Some("ok."));
    }
}
