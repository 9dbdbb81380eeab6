//! Gemini API provider.
//!
//! Calls `POST {endpoint}/v1beta/models/{model}:generateContent` and
//! translates the shared turn/declaration types into Gemini's wire format.
//!
//! Wire notes:
//! - The API key travels in the `x-goog-api-key` header, never in the URL.
//! - `tools` is omitted entirely when there is nothing to declare.
//! - Function results are sent as `functionResponse` parts on a `user` turn.
//! - Only the first part of the first candidate is inspected.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::client::ModelClient;
use super::{FunctionCall, ModelError, ModelReply, Part, Role, Turn};
use crate::abilities::FunctionDeclaration;
use crate::config::ModelConfig;

/// Upstream bodies quoted in error messages are cut to this many chars.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Finish reasons meaning the provider withheld the content.
const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
    "RECITATION",
];

// ── Gemini API request types ─────────────────────────────

/// `generateContent` request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTool<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct GeminiTool<'a> {
    function_declarations: Vec<GeminiFunctionDeclaration<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiFunctionDeclaration<'a> {
    name: &'a str,
    description: &'a str,
    /// Gemini rejects OBJECT schemas with no properties, so argument-less
    /// functions are declared without `parameters`.
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<&'a Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

/// A conversation entry, shared by requests and responses.
#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<GeminiFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<GeminiFunctionResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionResponse {
    name: String,
    response: Value,
}

// ── Gemini API response types ────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Option<Vec<GeminiCandidate>>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

/// Error body returned with non-2xx statuses.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

// ── GeminiClient ─────────────────────────────────────────

pub struct GeminiClient {
    client: Client,
    config: ModelConfig,
    endpoint: String,
    timeout: Duration,
}

impl GeminiClient {
    /// Creates a client whose requests are bounded by
    /// `config.request_timeout_secs`.
    pub fn new(config: ModelConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let client = Client::builder().timeout(timeout).build()?;
        let endpoint = config.endpoint();
        Ok(Self {
            client,
            config,
            endpoint,
            timeout,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, self.config.model
        )
    }

    /// Scrubs the API key from text that may reach logs or users.
    fn redact(&self, text: &str) -> String {
        if self.config.api_key.is_empty() {
            text.to_string()
        } else {
            text.replace(&self.config.api_key, "<redacted>")
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> ModelError {
        if e.is_timeout() {
            ModelError::Timeout(self.timeout)
        } else {
            ModelError::Transport(self.redact(&format!("{:#}", anyhow::Error::new(e.without_url()))))
        }
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn send(
        &self,
        turns: &[Turn],
        tools: &[FunctionDeclaration],
    ) -> Result<ModelReply, ModelError> {
        let request = build_request(turns, tools, self.config.max_output_tokens);

        debug!(
            "Calling Gemini API ({}) with {} turns{}",
            self.config.model,
            turns.len(),
            if tools.is_empty() {
                String::new()
            } else {
                format!(" + {} tools", tools.len())
            }
        );

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            return Err(ModelError::UpstreamStatus {
                status: status.as_u16(),
                message: self.redact(&upstream_message(&body)),
            });
        }

        parse_response(&body)
    }

    fn description(&self) -> String {
        format!("{} ({})", self.config.provider, self.config.model)
    }
}

// ── Request translation ──────────────────────────────────

fn build_request<'a>(
    turns: &[Turn],
    tools: &'a [FunctionDeclaration],
    max_output_tokens: Option<u32>,
) -> GenerateContentRequest<'a> {
    let tools = if tools.is_empty() {
        None
    } else {
        Some(vec![GeminiTool {
            function_declarations: tools.iter().map(translate_declaration).collect(),
        }])
    };

    GenerateContentRequest {
        contents: turns.iter().map(translate_turn).collect(),
        tools,
        generation_config: max_output_tokens.map(|max_output_tokens| GenerationConfig {
            max_output_tokens,
        }),
    }
}

fn translate_declaration(decl: &FunctionDeclaration) -> GeminiFunctionDeclaration<'_> {
    let has_properties = decl.parameters["properties"]
        .as_object()
        .is_some_and(|props| !props.is_empty());

    GeminiFunctionDeclaration {
        name: &decl.name,
        description: &decl.description,
        parameters: has_properties.then_some(&decl.parameters),
    }
}

fn translate_turn(turn: &Turn) -> GeminiContent {
    let role = match turn.role {
        Role::User | Role::FunctionResult => "user",
        Role::Model => "model",
    };

    let part = match &turn.part {
        Part::Text(text) => GeminiPart {
            text: Some(text.clone()),
            ..Default::default()
        },
        Part::FunctionCall(call) => GeminiPart {
            function_call: Some(GeminiFunctionCall {
                name: call.name.clone(),
                args: Value::Object(call.args.clone()),
            }),
            ..Default::default()
        },
        Part::FunctionResponse(resp) => GeminiPart {
            function_response: Some(GeminiFunctionResponse {
                name: resp.name.clone(),
                response: json!({
                    "name": resp.name,
                    "result": resp.result,
                }),
            }),
            ..Default::default()
        },
    };

    GeminiContent {
        role: role.to_string(),
        parts: vec![part],
    }
}

// ── Response parsing ─────────────────────────────────────

fn parse_response(body: &str) -> Result<ModelReply, ModelError> {
    let resp: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| ModelError::Malformed(format!("{e}; body: {}", truncate(body))))?;

    if let Some(ref usage) = resp.usage_metadata {
        info!(
            "LLM response: {} in / {} out tokens",
            usage.prompt_token_count, usage.candidates_token_count
        );
    }

    let block_reason = resp.prompt_feedback.and_then(|f| f.block_reason);
    let candidates = match resp.candidates {
        Some(candidates) if !candidates.is_empty() => candidates,
        other => {
            if let Some(reason) = block_reason {
                warn!("Prompt blocked by Gemini: {reason}");
                return Err(ModelError::Blocked(reason));
            }
            return Err(match other {
                None => ModelError::MissingCandidates,
                Some(_) => ModelError::EmptyCandidates,
            });
        }
    };

    let Some(candidate) = candidates.into_iter().next() else {
        return Err(ModelError::EmptyCandidates);
    };
    let finish_reason = candidate.finish_reason;
    let first_part = candidate
        .content
        .and_then(|content| content.parts.into_iter().next());

    let Some(part) = first_part else {
        return Err(match finish_reason {
            Some(reason) if BLOCKING_FINISH_REASONS.contains(&reason.as_str()) => {
                warn!("Response blocked by Gemini: {reason}");
                ModelError::Blocked(reason)
            }
            _ => ModelError::Unparseable,
        });
    };

    if let Some(call) = part.function_call {
        let args = match call.args {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(ModelError::Malformed(format!(
                    "functionCall.args is not an object: {other}"
                )))
            }
        };
        return Ok(ModelReply::FunctionCall(FunctionCall {
            name: call.name,
            args,
        }));
    }

    if let Some(text) = part.text {
        return Ok(ModelReply::Text(text));
    }

    Err(ModelError::Unparseable)
}

/// Extracts the provider's error message from a non-2xx body.
fn upstream_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => match parsed.error.status {
            Some(status) => format!("{status}: {}", parsed.error.message),
            None => parsed.error.message,
        },
        Err(_) if body.trim().is_empty() => "empty response body".to_string(),
        Err(_) => truncate(body),
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_ERROR_BODY_CHARS {
        text.to_string()
    } else {
        let cut: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{cut}...")
    }
}
