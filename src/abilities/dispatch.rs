//! Tool-call dispatcher.
//!
//! Resolves a function call requested by the model to a registered
//! ability, checks permission, executes it and turns the outcome into
//! a bounded string. Failures are reported as text so the model can
//! explain them to the user; nothing here returns an error to the caller.

use serde_json::Value;
use tracing::{debug, info, warn};

use super::{AbilityContext, AbilityRegistry};
use crate::llm::FunctionCall;

/// Upper bound on the text sent back to the model for one call.
pub const MAX_RESULT_CHARS: usize = 8000;

const TRUNCATION_MARKER: &str = "\n[... result truncated]";

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Error: ability '{0}' not found.")]
    NotFound(String),
    #[error("Error: you do not have permission to use ability '{0}'.")]
    PermissionDenied(String),
    #[error("Error executing ability '{name}': {message}")]
    Execution { name: String, message: String },
}

pub struct Dispatcher<'a> {
    registry: &'a AbilityRegistry,
}

impl<'a> Dispatcher<'a> {
    pub fn new(registry: &'a AbilityRegistry) -> Self {
        Self { registry }
    }

    /// Runs `call` and returns the text to send back to the model.
    pub async fn dispatch(&self, call: &FunctionCall, context: &AbilityContext) -> String {
        match self.try_dispatch(call, context).await {
            Ok(result) => truncate_result(result),
            Err(e) => {
                warn!("Function call '{}' failed: {e}", call.name);
                truncate_result(e.to_string())
            }
        }
    }

    async fn try_dispatch(
        &self,
        call: &FunctionCall,
        context: &AbilityContext,
    ) -> Result<String, DispatchError> {
        let name = self
            .registry
            .resolve_declared(&call.name)
            .ok_or_else(|| DispatchError::NotFound(call.name.clone()))?;
        let ability = self
            .registry
            .get(name)
            .ok_or_else(|| DispatchError::NotFound(name.to_string()))?;

        if !ability.permitted(context) {
            return Err(DispatchError::PermissionDenied(name.to_string()));
        }

        info!("Executing ability '{name}' for {}", context.caller);
        let args = Value::Object(call.args.clone());
        debug!("Arguments for '{name}': {args}");

        let value = ability
            .execute(args, context)
            .await
            .map_err(|e| DispatchError::Execution {
                name: name.to_string(),
                message: format!("{e:#}"),
            })?;

        Ok(stringify(value))
    }
}

/// Strings pass through untouched, anything else is serialized as JSON.
pub fn stringify(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

fn truncate_result(text: String) -> String {
    if text.chars().count() <= MAX_RESULT_CHARS {
        return text;
    }
    let mut truncated: String = text.chars().take(MAX_RESULT_CHARS).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}
