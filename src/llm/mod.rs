//! Conversation types shared by the orchestrator and model providers.
//!
//! Providers translate these into their own wire format and normalize
//! responses back into [`ModelReply`] / [`ModelError`].

pub mod client;
pub mod gemini;

use std::time::Duration;

use serde_json::{Map, Value};

pub use client::ModelClient;
pub use gemini::GeminiClient;

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
    FunctionResult,
}

/// A function invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    /// Declared (sanitized) function name, as reported by the model.
    pub name: String,
    /// Arguments object. Not validated against the ability's schema here.
    pub args: Map<String, Value>,
}

/// Result of a dispatched function call, sent back to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionResponse {
    pub name: String,
    pub result: String,
}

/// Content of a single turn. Each turn carries exactly one part.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    FunctionCall(FunctionCall),
    FunctionResponse(FunctionResponse),
}

/// One entry of the conversation sent to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub part: Part,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            part: Part::Text(text.into()),
        }
    }

    pub fn model_call(call: FunctionCall) -> Self {
        Self {
            role: Role::Model,
            part: Part::FunctionCall(call),
        }
    }

    pub fn function_result(name: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            role: Role::FunctionResult,
            part: Part::FunctionResponse(FunctionResponse {
                name: name.into(),
                result: result.into(),
            }),
        }
    }
}

/// A successfully parsed model reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    Text(String),
    FunctionCall(FunctionCall),
}

/// Coarse classification of [`ModelError`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network, DNS or timeout: the model could not be reached.
    Transport,
    /// The provider answered with a non-2xx status.
    UpstreamStatus,
    /// The provider answered, but not with something we can use.
    MalformedResponse,
}

/// Failure of a single model round-trip. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("upstream returned {status}: {message}")]
    UpstreamStatus { status: u16, message: String },
    #[error("response has no candidates")]
    MissingCandidates,
    #[error("response candidates list is empty")]
    EmptyCandidates,
    #[error("response blocked by the provider: {0}")]
    Blocked(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("unparseable response: first part has neither text nor functionCall")]
    Unparseable,
}

impl ModelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModelError::Transport(_) | ModelError::Timeout(_) => ErrorKind::Transport,
            ModelError::UpstreamStatus { .. } => ErrorKind::UpstreamStatus,
            ModelError::MissingCandidates
            | ModelError::EmptyCandidates
            | ModelError::Blocked(_)
            | ModelError::Malformed(_)
            | ModelError::Unparseable => ErrorKind::MalformedResponse,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_constructors() {
        let user = Turn::user("hi");
        assert_eq!(user.role, Role::User);
        assert_eq!(user.part, Part::Text("hi".to_string()));

        let result = Turn::function_result("site_get-info", "{}");
        assert_eq!(result.role, Role::FunctionResult);
        match result.part {
            Part::FunctionResponse(resp) => {
                assert_eq!(resp.name, "site_get-info");
                assert_eq!(resp.result, "{}");
            }
            other => panic!("unexpected part: {other:?}"),
        }
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ModelError::Transport("dns".into()).kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            ModelError::Timeout(Duration::from_secs(3)).kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            ModelError::UpstreamStatus {
                status: 500,
                message: "boom".into()
            }
            .kind(),
            ErrorKind::UpstreamStatus
        );
        assert_eq!(ModelError::MissingCandidates.kind(), ErrorKind::MalformedResponse);
        assert_eq!(ModelError::EmptyCandidates.kind(), ErrorKind::MalformedResponse);
        assert_eq!(
            ModelError::Blocked("SAFETY".into()).kind(),
            ErrorKind::MalformedResponse
        );
        assert_eq!(ModelError::Unparseable.kind(), ErrorKind::MalformedResponse);
    }

    #[test]
    fn test_timeout_display() {
        let err = ModelError::Timeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "request timed out after 30s");
    }
}
