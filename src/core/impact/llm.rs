use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{EventImpactResult, ImpactExtractor, extract_json_block};
use crate::config::ExtractorConfig;
use crate::core::state::UserState;
use crate::error::ExtractorError;

const SYSTEM_PROMPT: &str = "You estimate how an event described by a user affects six personal \
resources: money, time, energy, asset, reliability, identity. Return strict JSON only, no markdown, \
with keys: schema_version (\"event_impact_v2.1\"), event_summary, event_class, impact_vector \
{delta_money, delta_time, delta_energy, delta_asset, delta_reliability, delta_identity} (signed, \
typically in [-1, 1]), axis_confidence {money, time, energy, asset, reliability, identity} in [0, 1], \
missing_axes (array of axis names), irreversible (bool), system_caused (bool, true when the assistant \
or a tool caused the event), analysis_confidence in [0, 1].";

/// Impact extractor backed by an OpenAI-compatible chat-completions endpoint.
pub struct LlmImpactExtractor {
    /// Pre-computed `"Bearer <key>"` header value.
    cached_auth_header: Option<String>,
    endpoint: String,
    model: String,
    max_tokens: u32,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f64,
    max_tokens: u32,
    response_format: serde_json::Value,
    messages: [Message<'a>; 2],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl LlmImpactExtractor {
    pub fn new(config: &ExtractorConfig) -> Self {
        Self {
            cached_auth_header: config
                .api_key
                .as_deref()
                .filter(|k| !k.trim().is_empty())
                .map(|k| format!("Bearer {k}")),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            client: Client::builder()
                .connect_timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn user_prompt(message: &str, state: &UserState) -> String {
        let baseline = serde_json::to_string(&state.axes).unwrap_or_else(|_| "{}".into());
        format!(
            "Extract EventImpact v2.1 JSON for this message. Do not add markdown.\n\n\
             message: {message}\nuser_state_baseline: {baseline}"
        )
    }

    async fn complete(&self, user_prompt: &str) -> Result<String, ExtractorError> {
        let auth_header = self
            .cached_auth_header
            .as_ref()
            .ok_or_else(|| ExtractorError::Unavailable("no_provider_or_key".into()))?;

        let request = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            max_tokens: self.max_tokens,
            response_format: json!({"type": "json_object"}),
            messages: [
                Message {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Message {
                    role: "user",
                    content: user_prompt,
                },
            ],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", auth_header)
            .json(&request)
            .send()
            .await
            .map_err(|e| ExtractorError::Unavailable(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractorError::Unavailable(format!("http_{}", status.as_u16())));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ExtractorError::NoJson(e.without_url().to_string()))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| ExtractorError::NoJson("empty_completion".into()))
    }
}

#[async_trait]
impl ImpactExtractor for LlmImpactExtractor {
    fn name(&self) -> &str {
        "openai"
    }

    async fn extract(
        &self,
        message: &str,
        state: &UserState,
    ) -> Result<EventImpactResult, ExtractorError> {
        let text = self.complete(&Self::user_prompt(message, state)).await?;
        let value = extract_json_block(&text).ok_or_else(|| ExtractorError::NoJson("openai".into()))?;
        serde_json::from_value(value).map_err(|e| ExtractorError::Parse(e.to_string()))
    }
}
