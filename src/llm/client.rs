//! `ModelClient` trait: abstraction over function-calling model backends.
//!
//! The orchestrator only depends on this trait; each provider maps the
//! shared turn types onto its own wire format.

use async_trait::async_trait;

use super::{ModelError, ModelReply, Turn};
use crate::abilities::FunctionDeclaration;

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Sends a conversation to the model and returns its parsed reply.
    ///
    /// When `tools` is empty the provider request must omit the tools
    /// field entirely. A single attempt is made; failures are returned,
    /// never retried.
    async fn send(
        &self,
        turns: &[Turn],
        tools: &[FunctionDeclaration],
    ) -> Result<ModelReply, ModelError>;

    /// Human-readable description of the provider and model.
    ///
    /// Used in startup logs, e.g. `"gemini (gemini-2.0-flash)"`.
    fn description(&self) -> String;
}
