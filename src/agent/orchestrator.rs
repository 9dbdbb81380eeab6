use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::abilities::schema::declarations;
use crate::abilities::{AbilityContext, AbilityRegistry, Dispatcher, FunctionDeclaration};
use crate::llm::{ErrorKind, ModelClient, ModelError, ModelReply, Turn};

/// Returned when the second round-trip does not produce a usable answer.
pub const FINAL_RESPONSE_UNAVAILABLE: &str =
    "Sorry, the final response is unavailable right now. Please try again.";

/// Returned for an empty prompt; the model is never called.
pub const EMPTY_PROMPT: &str = "Please enter a message.";

/// What the caller gets back for one prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatOutcome {
    pub success: bool,
    pub message: String,
}

impl ChatOutcome {
    fn answered(message: String) -> Self {
        Self {
            success: true,
            message,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Where a request currently is in the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingFirstReply,
    AwaitingSecondReply,
    Answered,
    Failed,
}

/// Drives one prompt through at most two model round-trips.
///
/// Holds no per-request state, so a single instance can serve concurrent
/// requests. The registry must be fully built before it is shared here.
pub struct Orchestrator {
    registry: Arc<AbilityRegistry>,
    client: Arc<dyn ModelClient>,
}

impl Orchestrator {
    pub fn new(registry: Arc<AbilityRegistry>, client: Arc<dyn ModelClient>) -> Self {
        Self { registry, client }
    }

    /// Function declarations for every registered ability.
    pub fn declarations(&self) -> Vec<FunctionDeclaration> {
        declarations(&self.registry)
    }

    /// Answers `prompt`, letting the model call at most one ability.
    ///
    /// Dropping the returned future abandons any in-flight model request.
    pub async fn handle(&self, prompt: &str, context: &AbilityContext) -> ChatOutcome {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return ChatOutcome::failed(EMPTY_PROMPT);
        }

        let tools = self.declarations();
        let user_turn = Turn::user(prompt);

        transition(Phase::AwaitingFirstReply);
        debug!("Sending prompt with {} function declarations", tools.len());

        let call = match self.client.send(std::slice::from_ref(&user_turn), &tools).await {
            Ok(ModelReply::Text(text)) => {
                transition(Phase::Answered);
                return ChatOutcome::answered(text);
            }
            Ok(ModelReply::FunctionCall(call)) => call,
            Err(e) => {
                transition(Phase::Failed);
                error!("First model call failed: {e}");
                return ChatOutcome::failed(failure_message(&e));
            }
        };

        info!("Model requested function '{}'", call.name);
        let result = Dispatcher::new(&self.registry).dispatch(&call, context).await;

        let transcript = [
            user_turn,
            Turn::model_call(call.clone()),
            Turn::function_result(call.name, result),
        ];

        // Single hop: the follow-up request carries no declarations.
        transition(Phase::AwaitingSecondReply);
        match self.client.send(&transcript, &[]).await {
            Ok(ModelReply::Text(text)) => {
                transition(Phase::Answered);
                ChatOutcome::answered(text)
            }
            Ok(ModelReply::FunctionCall(nested)) => {
                transition(Phase::Failed);
                warn!(
                    "Model requested a second function call ('{}'), which is not executed",
                    nested.name
                );
                ChatOutcome::failed(FINAL_RESPONSE_UNAVAILABLE)
            }
            Err(e) => {
                transition(Phase::Failed);
                error!("Second model call failed: {e}");
                ChatOutcome::failed(format!(
                    "{FINAL_RESPONSE_UNAVAILABLE} ({})",
                    failure_message(&e)
                ))
            }
        }
    }
}

fn transition(phase: Phase) {
    debug!("Orchestrator phase: {phase:?}");
}

/// User-facing message for a failed model round-trip.
fn failure_message(e: &ModelError) -> String {
    match e.kind() {
        ErrorKind::Transport | ErrorKind::UpstreamStatus => {
            format!("API Error: could not reach the model ({e})")
        }
        ErrorKind::MalformedResponse => {
            format!("API Error: could not parse the model's answer ({e})")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abilities::Ability;
    use crate::llm::{FunctionCall, Part, Role};
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    // ── Test doubles ─────────────────────────────────────

    /// Model client replaying scripted replies and recording every request.
    struct ScriptedClient {
        replies: Mutex<VecDeque<Result<ModelReply, ModelError>>>,
        requests: Mutex<Vec<(Vec<Turn>, Vec<FunctionDeclaration>)>>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<Result<ModelReply, ModelError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<(Vec<Turn>, Vec<FunctionDeclaration>)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedClient {
        async fn send(
            &self,
            turns: &[Turn],
            tools: &[FunctionDeclaration],
        ) -> Result<ModelReply, ModelError> {
            self.requests
                .lock()
                .unwrap()
                .push((turns.to_vec(), tools.to_vec()));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected extra model call")
        }

        fn description(&self) -> String {
            "scripted (test)".to_string()
        }
    }

    /// Search ability counting its executions.
    struct CountingSearch {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Ability for CountingSearch {
        fn name(&self) -> &str {
            "search/content"
        }

        fn description(&self) -> &str {
            "Search content"
        }

        fn input_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"]
            })
        }

        async fn execute(&self, args: Value, _context: &AbilityContext) -> anyhow::Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!(format!("1 match for {}", args["query"].as_str().unwrap_or(""))))
        }
    }

    fn registry_with_search() -> (Arc<AbilityRegistry>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = AbilityRegistry::default();
        registry
            .register(Box::new(CountingSearch {
                calls: calls.clone(),
            }))
            .unwrap();
        (Arc::new(registry), calls)
    }

    fn function_call(name: &str, args: Value) -> FunctionCall {
        let args = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        FunctionCall {
            name: name.to_string(),
            args,
        }
    }

    fn ctx() -> AbilityContext {
        AbilityContext::anonymous("guest")
    }

    // ── Single round-trip ────────────────────────────────

    #[tokio::test]
    async fn test_text_reply_needs_one_call() {
        let (registry, calls) = registry_with_search();
        let client = ScriptedClient::new(vec![Ok(ModelReply::Text("hello".to_string()))]);
        let orchestrator = Orchestrator::new(registry, client.clone());

        let outcome = orchestrator.handle("hi", &ctx()).await;
        assert_eq!(
            outcome,
            ChatOutcome {
                success: true,
                message: "hello".to_string()
            }
        );

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, vec![Turn::user("hi")]);
        assert_eq!(requests[0].1.len(), 1);
        assert_eq!(requests[0].1[0].name, "search_content");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_registry_sends_no_declarations() {
        let client = ScriptedClient::new(vec![Ok(ModelReply::Text("ok".to_string()))]);
        let orchestrator = Orchestrator::new(Arc::new(AbilityRegistry::default()), client.clone());

        orchestrator.handle("hi", &ctx()).await;
        assert!(client.requests()[0].1.is_empty());
    }

    #[tokio::test]
    async fn test_empty_prompt_skips_model() {
        let client = ScriptedClient::new(vec![]);
        let orchestrator = Orchestrator::new(Arc::new(AbilityRegistry::default()), client.clone());

        let outcome = orchestrator.handle("   \n", &ctx()).await;
        assert!(!outcome.success);
        assert_eq!(outcome.message, EMPTY_PROMPT);
        assert!(client.requests().is_empty());
    }

    // ── Function-call round-trip ─────────────────────────

    #[tokio::test]
    async fn test_function_call_then_text() {
        let (registry, calls) = registry_with_search();
        let client = ScriptedClient::new(vec![
            Ok(ModelReply::FunctionCall(function_call(
                "search_content",
                json!({"query": "foo"}),
            ))),
            Ok(ModelReply::Text("answer using foo".to_string())),
        ]);
        let orchestrator = Orchestrator::new(registry, client.clone());

        let outcome = orchestrator.handle("what is foo?", &ctx()).await;
        assert_eq!(
            outcome,
            ChatOutcome {
                success: true,
                message: "answer using foo".to_string()
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let requests = client.requests();
        assert_eq!(requests.len(), 2);

        let (transcript, tools) = &requests[1];
        assert!(tools.is_empty());
        assert_eq!(transcript.len(), 3);

        assert_eq!(transcript[0], Turn::user("what is foo?"));

        assert_eq!(transcript[1].role, Role::Model);
        match &transcript[1].part {
            Part::FunctionCall(call) => {
                assert_eq!(call.name, "search_content");
                assert_eq!(call.args["query"], "foo");
            }
            other => panic!("unexpected part: {other:?}"),
        }

        assert_eq!(transcript[2].role, Role::FunctionResult);
        match &transcript[2].part {
            Part::FunctionResponse(resp) => {
                assert_eq!(resp.name, "search_content");
                assert_eq!(resp.result, "1 match for foo");
            }
            other => panic!("unexpected part: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_function_is_reported_to_model() {
        let (registry, calls) = registry_with_search();
        let client = ScriptedClient::new(vec![
            Ok(ModelReply::FunctionCall(function_call("delete_everything", json!({})))),
            Ok(ModelReply::Text("I could not do that.".to_string())),
        ]);
        let orchestrator = Orchestrator::new(registry, client.clone());

        let outcome = orchestrator.handle("wipe it", &ctx()).await;
        assert!(outcome.success);
        assert_eq!(outcome.message, "I could not do that.");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let requests = client.requests();
        match &requests[1].0[2].part {
            Part::FunctionResponse(resp) => {
                assert_eq!(resp.result, "Error: ability 'delete_everything' not found.")
            }
            other => panic!("unexpected part: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_nested_function_call_not_executed() {
        let (registry, calls) = registry_with_search();
        let client = ScriptedClient::new(vec![
            Ok(ModelReply::FunctionCall(function_call(
                "search_content",
                json!({"query": "a"}),
            ))),
            Ok(ModelReply::FunctionCall(function_call(
                "search_content",
                json!({"query": "b"}),
            ))),
        ]);
        let orchestrator = Orchestrator::new(registry, client.clone());

        let outcome = orchestrator.handle("chain", &ctx()).await;
        assert!(!outcome.success);
        assert_eq!(outcome.message, FINAL_RESPONSE_UNAVAILABLE);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_second_call_error_returns_fallback() {
        let cases = [
            (
                ModelError::Transport("connection reset".to_string()),
                "could not reach the model",
            ),
            (ModelError::EmptyCandidates, "could not parse the model's answer"),
        ];

        for (error, expected) in cases {
            let (registry, calls) = registry_with_search();
            let client = ScriptedClient::new(vec![
                Ok(ModelReply::FunctionCall(function_call(
                    "search_content",
                    json!({"query": "a"}),
                ))),
                Err(error),
            ]);
            let orchestrator = Orchestrator::new(registry, client);

            let outcome = orchestrator.handle("q", &ctx()).await;
            assert!(!outcome.success);
            assert!(outcome.message.starts_with(FINAL_RESPONSE_UNAVAILABLE));
            assert!(outcome.message.contains("API Error"));
            assert!(outcome.message.contains(expected), "{}", outcome.message);
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    // ── First-call failures ──────────────────────────────

    #[tokio::test]
    async fn test_transport_error_on_first_call() {
        let (registry, calls) = registry_with_search();
        let client = ScriptedClient::new(vec![Err(ModelError::Transport(
            "connection refused".to_string(),
        ))]);
        let orchestrator = Orchestrator::new(registry, client.clone());

        let outcome = orchestrator.handle("hi", &ctx()).await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("API Error"));
        assert!(outcome.message.contains("could not reach the model"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(client.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_and_status_count_as_unreachable() {
        for err in [
            ModelError::Timeout(Duration::from_secs(30)),
            ModelError::UpstreamStatus {
                status: 503,
                message: "UNAVAILABLE".to_string(),
            },
        ] {
            let client = ScriptedClient::new(vec![Err(err)]);
            let orchestrator =
                Orchestrator::new(Arc::new(AbilityRegistry::default()), client);
            let outcome = orchestrator.handle("hi", &ctx()).await;
            assert!(outcome.message.starts_with("API Error: could not reach the model"));
        }
    }

    #[tokio::test]
    async fn test_malformed_reply_reported_as_parse_failure() {
        let client = ScriptedClient::new(vec![Err(ModelError::Unparseable)]);
        let orchestrator = Orchestrator::new(Arc::new(AbilityRegistry::default()), client);

        let outcome = orchestrator.handle("hi", &ctx()).await;
        assert!(!outcome.success);
        assert!(outcome
            .message
            .starts_with("API Error: could not parse the model's answer"));
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(ChatOutcome::answered("done".to_string())).unwrap();
        assert_eq!(json, json!({"success": true, "message": "done"}));
    }

    #[test]
    fn test_orchestrator_is_shareable() {
        fn _assert_send_sync<T: Send + Sync>() {}
        _assert_send_sync::<Orchestrator>();
    }
}
