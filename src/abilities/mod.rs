pub mod builtin;
pub mod dispatch;
pub mod registry;
pub mod schema;

use async_trait::async_trait;
use serde_json::{json, Value};

/// Ambient caller information passed to permission checks and execution.
#[derive(Debug, Clone)]
pub struct AbilityContext {
    /// Identifier of whoever sent the prompt (user login, "cli", ...).
    pub caller: String,
    /// Whether the host authenticated the caller.
    pub authenticated: bool,
}

impl AbilityContext {
    pub fn anonymous(caller: impl Into<String>) -> Self {
        Self {
            caller: caller.into(),
            authenticated: false,
        }
    }

    pub fn authenticated(caller: impl Into<String>) -> Self {
        Self {
            caller: caller.into(),
            authenticated: true,
        }
    }
}

/// Permission predicate for abilities restricted to logged-in callers.
pub fn require_authenticated(context: &AbilityContext) -> bool {
    context.authenticated
}

/// A host capability the model can invoke via function calling.
///
/// Abilities are registered once at startup in the [`AbilityRegistry`]
/// and exposed to the model as function declarations. The dispatcher
/// calls `permitted()` and then `execute()` when the model requests one.
#[async_trait]
pub trait Ability: Send + Sync {
    /// Unique namespaced identifier, e.g. `"site/search-content"`.
    /// Allowed characters: ASCII alphanumerics, `_`, `.`, `-` and `/`.
    fn name(&self) -> &str;

    /// Natural-language description the model uses to decide when
    /// to invoke this ability.
    fn description(&self) -> &str;

    /// JSON Schema describing the arguments object.
    fn input_schema(&self) -> Value;

    /// Documents the shape of the return value. Informational only.
    fn output_schema(&self) -> Value {
        json!({})
    }

    /// Evaluated before every execution. Defaults to allowing everyone.
    fn permitted(&self, _context: &AbilityContext) -> bool {
        true
    }

    /// Executes the ability. Arguments are passed as received from the
    /// model; validating them against `input_schema()` is up to the ability.
    /// Non-string values are serialized before being sent back to the model.
    async fn execute(&self, args: Value, context: &AbilityContext) -> anyhow::Result<Value>;
}

pub use dispatch::Dispatcher;
pub use registry::{AbilityRegistry, DuplicatePolicy};
pub use schema::FunctionDeclaration;

#[cfg(test)]
mod tests {
    use super::*;

    struct Minimal;

    #[async_trait]
    impl Ability for Minimal {
        fn name(&self) -> &str {
            "test/minimal"
        }

        fn description(&self) -> &str {
            "Does nothing"
        }

        fn input_schema(&self) -> Value {
            json!({})
        }

        async fn execute(&self, _args: Value, _context: &AbilityContext) -> anyhow::Result<Value> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn test_defaults() {
        let ability = Minimal;
        assert_eq!(ability.output_schema(), json!({}));
        assert!(ability.permitted(&AbilityContext::anonymous("guest")));
    }

    #[test]
    fn test_require_authenticated() {
        assert!(require_authenticated(&AbilityContext::authenticated("admin")));
        assert!(!require_authenticated(&AbilityContext::anonymous("guest")));
    }

    #[test]
    fn test_ability_is_object_safe() {
        fn _assert_object_safe(_: &dyn Ability) {}
    }
}
