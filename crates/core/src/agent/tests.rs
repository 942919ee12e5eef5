use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use relay_agent_test_model::{PresetEvent, PresetResponse, TestModelProvider};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::hook::{
    Hook, HookOutcome, HookPoint, JumpTo, ModelCallRequest, ModelCallResponse,
    ModelNext, WrapModelCall, node_hook,
};
use crate::tool::{FunctionTool, Tool};

#[derive(Deserialize, JsonSchema)]
struct ReadEmail {
    email_id: String,
}

fn read_email_tool() -> impl Tool<Input = ReadEmail> {
    FunctionTool::new("read_email", "Reads an email", |input: ReadEmail| async move {
        Ok(format!("Contents of email {}: Hello, this is a test email.", input.email_id))
    })
}

#[derive(Deserialize, JsonSchema)]
struct Wait {}

fn slow_tool() -> impl Tool<Input = Wait> {
    FunctionTool::new("wait", "Waits for a minute", |_: Wait| async {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok("done waiting".to_owned())
    })
}

fn call(id: &str, name: &str, arguments: serde_json::Value) -> PresetResponse {
    PresetResponse::with_events([PresetEvent::tool_call(id, name, arguments)])
}

fn roles(messages: &[Message]) -> Vec<Role> {
    messages.iter().map(Message::role).collect()
}

#[tokio::test]
async fn test_tool_loop() {
    let provider = TestModelProvider::with_responses([
        call("call:1", "read_email", json!({ "email_id": "123" })),
        PresetResponse::text("The email says hello."),
    ]);
    let agent = AgentBuilder::with_model_provider(provider.clone())
        .with_system_prompt("You are an email assistant.")
        .with_tool(read_email_tool())
        .build()
        .unwrap();

    let outcome = agent
        .run("1", vec![Message::user("Read email 123")], RunContext::new())
        .await
        .unwrap();
    assert_eq!(
        roles(&outcome.messages),
        [Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
    assert_eq!(
        outcome.messages[2].content(),
        "Contents of email 123: Hello, this is a test email."
    );
    assert_eq!(outcome.messages[2].tool_call_id(), Some("call:1"));
    assert_eq!(
        outcome.final_message().unwrap().content(),
        "The email says hello."
    );
    assert_eq!(outcome.structured, None);

    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[0].system_prompt.as_deref(),
        Some("You are an email assistant.")
    );
    assert_eq!(requests[0].tools.len(), 1);
    assert_eq!(requests[1].messages.len(), 3);

    // The store has the same history.
    assert_eq!(agent.history("1").await, outcome.messages);
}

#[tokio::test]
async fn test_history_carries_over() {
    let provider = TestModelProvider::with_responses([
        PresetResponse::text("Hi John."),
        PresetResponse::text("Your name is John."),
    ]);
    let agent = AgentBuilder::with_model_provider(provider.clone())
        .build()
        .unwrap();

    agent
        .run(1u64, vec![Message::user("I'm John.")], RunContext::new())
        .await
        .unwrap();
    let outcome = agent
        .run(1u64, vec![Message::user("What's my name?")], RunContext::new())
        .await
        .unwrap();
    assert_eq!(outcome.messages.len(), 4);
    assert_eq!(provider.requests()[1].messages.len(), 3);
    assert!(agent.history("2").await.is_empty());
}

#[tokio::test]
async fn test_before_agent_jump_to_end() {
    let provider = TestModelProvider::with_responses([call(
        "call:1",
        "read_email",
        json!({ "email_id": "123" }),
    )]);
    let agent = AgentBuilder::with_model_provider(provider.clone())
        .with_tool(read_email_tool())
        .before_agent(node_hook("refuse", |_, _| {
            Ok(HookOutcome::proceed()
                .with_message(Message::assistant("I cannot respond to that request."))
                .jump_to_end())
        }))
        .build()
        .unwrap();

    let outcome = agent
        .run("1", vec![Message::user("Read email 123")], RunContext::new())
        .await
        .unwrap();
    assert_eq!(provider.call_count(), 0);
    assert!(outcome.messages.iter().all(|msg| msg.role() != Role::Tool));
    assert_eq!(roles(&outcome.messages), [Role::User, Role::Assistant]);
}

struct Cached;

#[async_trait]
impl WrapModelCall for Cached {
    async fn wrap_model_call(
        &self,
        _request: ModelCallRequest,
        _next: ModelNext<'_>,
    ) -> Result<ModelCallResponse, Error> {
        Ok(ModelCallResponse::text("cached answer"))
    }
}

#[tokio::test]
async fn test_short_circuit_model_call() {
    let provider = TestModelProvider::with_responses([PresetResponse::text("live answer")]);
    let agent = AgentBuilder::with_model_provider(provider.clone())
        .wrap_model_call(Cached)
        .build()
        .unwrap();

    let outcome = agent
        .run("1", vec![Message::user("Hi")], RunContext::new())
        .await
        .unwrap();
    assert_eq!(provider.call_count(), 0);
    let last = outcome.final_message().unwrap();
    assert_eq!(last.role(), Role::Assistant);
    assert_eq!(last.content(), "cached answer");
    assert!(last.tool_calls().is_empty());
}

struct Trace {
    label: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl WrapModelCall for Trace {
    async fn wrap_model_call(
        &self,
        request: ModelCallRequest,
        next: ModelNext<'_>,
    ) -> Result<ModelCallResponse, Error> {
        self.log.lock().unwrap().push(format!("{}:in", self.label));
        let resp = next.run(request).await;
        self.log.lock().unwrap().push(format!("{}:out", self.label));
        resp
    }
}

#[tokio::test]
async fn test_hook_order() {
    let log = Arc::new(Mutex::new(vec![]));
    let node = |label: &'static str| {
        let log = Arc::clone(&log);
        node_hook(label, move |_, _| {
            log.lock().unwrap().push(label.to_owned());
            Ok(HookOutcome::proceed())
        })
    };

    let provider = TestModelProvider::with_responses([PresetResponse::text("Hello!")]);
    let agent = AgentBuilder::with_model_provider(provider)
        .before_agent(node("before_agent"))
        .before_model(node("before_model:1"))
        .before_model(node("before_model:2"))
        .after_model(node("after_model"))
        .after_agent(node("after_agent"))
        .wrap_model_call(Trace {
            label: "outer",
            log: Arc::clone(&log),
        })
        .wrap_model_call(Trace {
            label: "inner",
            log: Arc::clone(&log),
        })
        .build()
        .unwrap();

    agent
        .run("1", vec![Message::user("Hi")], RunContext::new())
        .await
        .unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        [
            "before_agent",
            "before_model:1",
            "before_model:2",
            "outer:in",
            "inner:in",
            "inner:out",
            "outer:out",
            "after_model",
            "after_agent",
        ]
    );
}

#[tokio::test]
async fn test_after_model_jump_skips_tools() {
    let provider = TestModelProvider::with_responses([call(
        "call:1",
        "read_email",
        json!({ "email_id": "123" }),
    )]);
    let agent = AgentBuilder::with_model_provider(provider.clone())
        .with_tool(read_email_tool())
        .after_model(node_hook("stop", |state, _| {
            let outcome = HookOutcome::proceed();
            if state.model_calls() >= 1 {
                return Ok(outcome.jump_to(JumpTo::End));
            }
            Ok(outcome)
        }))
        .after_agent(node_hook("cleanup", |_, _| {
            // Jumps from here are ignored.
            Ok(HookOutcome::proceed().jump_to(JumpTo::Model))
        }))
        .build()
        .unwrap();

    let outcome = agent
        .run("1", vec![Message::user("Read email 123")], RunContext::new())
        .await
        .unwrap();
    assert_eq!(provider.call_count(), 1);
    assert_eq!(roles(&outcome.messages), [Role::User, Role::Assistant]);
}

#[tokio::test]
async fn test_after_model_note_keeps_tool_calls() {
    let provider = TestModelProvider::with_responses([
        call("call:1", "read_email", json!({ "email_id": "123" })),
        PresetResponse::text("The email says hello."),
    ]);
    let agent = AgentBuilder::with_model_provider(provider.clone())
        .with_tool(read_email_tool())
        .after_model(node_hook("note", |state, _| {
            let outcome = HookOutcome::proceed();
            if state.model_calls() == 1 {
                return Ok(outcome.with_message(Message::assistant("(checked)")));
            }
            Ok(outcome)
        }))
        .build()
        .unwrap();

    let outcome = agent
        .run("1", vec![Message::user("Read email 123")], RunContext::new())
        .await
        .unwrap();
    assert_eq!(provider.call_count(), 2);
    assert_eq!(
        roles(&outcome.messages),
        [
            Role::User,
            Role::Assistant,
            Role::Assistant,
            Role::Tool,
            Role::Assistant
        ]
    );
    assert_eq!(outcome.messages[3].tool_call_id(), Some("call:1"));
    assert!(!outcome.messages[3].is_error());
}

#[test]
fn test_build_errors() {
    let err = AgentBuilder::with_model_provider(TestModelProvider::default())
        .with_tool(read_email_tool())
        .with_tool(read_email_tool())
        .build()
        .err()
        .unwrap();
    assert_eq!(err, Error::DuplicateName("read_email".to_owned()));

    let err = AgentBuilder::with_model_provider(TestModelProvider::default())
        .with_hook(HookPoint::WrapModelCall, Hook::node(node_hook("noop", |_, _| {
            Ok(HookOutcome::proceed())
        })))
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, Error::Configuration(_)));

    let err = AgentBuilder::with_model_provider(TestModelProvider::default())
        .with_hook(HookPoint::BeforeModel, Hook::wrap_model(Cached))
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, Error::Configuration(_)));
}

struct WrongRole;

#[async_trait]
impl WrapModelCall for WrongRole {
    async fn wrap_model_call(
        &self,
        _request: ModelCallRequest,
        _next: ModelNext<'_>,
    ) -> Result<ModelCallResponse, Error> {
        Ok(ModelCallResponse::new(Message::user("not a model answer")))
    }
}

#[tokio::test]
async fn test_non_assistant_response() {
    let agent = AgentBuilder::with_model_provider(TestModelProvider::default())
        .wrap_model_call(WrongRole)
        .build()
        .unwrap();
    let err = agent
        .run("1", vec![Message::user("Hi")], RunContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert_eq!(agent.history("1").await, [Message::user("Hi")]);
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
struct ContactInfo {
    name: String,
    email: String,
    phone: String,
}

#[tokio::test]
async fn test_structured_output() {
    let provider = TestModelProvider::with_responses([PresetResponse::text(
        "```json\n{\"name\": \"John Doe\", \"email\": \"john@example.com\", \"phone\": \"(555) 123-4567\"}\n```",
    )]);
    let agent = AgentBuilder::with_model_provider(provider.clone())
        .with_system_prompt("Extract the contact info.")
        .with_response_format(ResponseFormat::of::<ContactInfo>())
        .build()
        .unwrap();

    let outcome = agent
        .run(
            "1",
            vec![Message::user("John Doe, john@example.com, (555) 123-4567")],
            RunContext::new(),
        )
        .await
        .unwrap();
    assert_eq!(
        outcome.structured::<ContactInfo>().unwrap(),
        ContactInfo {
            name: "John Doe".to_owned(),
            email: "john@example.com".to_owned(),
            phone: "(555) 123-4567".to_owned(),
        }
    );
    let system_prompt = provider.requests()[0].system_prompt.clone().unwrap();
    assert!(system_prompt.starts_with("Extract the contact info."));
    assert!(system_prompt.contains("JSON schema"));
}

#[tokio::test]
async fn test_structured_output_mismatch() {
    let provider =
        TestModelProvider::with_responses([PresetResponse::text(r#"{"name": "John Doe"}"#)]);
    let agent = AgentBuilder::with_model_provider(provider)
        .with_response_format(ResponseFormat::of::<ContactInfo>())
        .build()
        .unwrap();

    let err = agent
        .run("1", vec![Message::user("John Doe")], RunContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SchemaValidation(_)));
    // The malformed answer is not in the thread.
    assert_eq!(agent.history("1").await, [Message::user("John Doe")]);
}

#[tokio::test]
async fn test_recursion_limit() {
    let provider = TestModelProvider::with_responses(
        (0..5).map(|i| call(&format!("call:{i}"), "read_email", json!({ "email_id": "1" }))),
    );
    let agent = AgentBuilder::with_model_provider(provider.clone())
        .with_tool(read_email_tool())
        .with_config(AgentConfig::default().with_recursion_limit(2))
        .build()
        .unwrap();

    let err = agent
        .run("1", vec![Message::user("Loop forever")], RunContext::new())
        .await
        .unwrap_err();
    assert_eq!(err, Error::RecursionLimit(2));
    assert_eq!(provider.call_count(), 2);
    // Every call got its result before the run stopped.
    let history = agent.history("1").await;
    assert_eq!(history.iter().filter(|msg| msg.role() == Role::Tool).count(), 2);
}

#[tokio::test]
async fn test_tool_failures_are_reported_to_model() {
    let provider = TestModelProvider::with_responses([
        call("call:1", "delete_email", json!({ "email_id": "123" })),
        call("call:2", "read_email", json!({ "id": 123 })),
        PresetResponse::text("Sorry, I couldn't do that."),
    ]);
    let agent = AgentBuilder::with_model_provider(provider)
        .with_tool(read_email_tool())
        .build()
        .unwrap();

    let outcome = agent
        .run("1", vec![Message::user("Delete email 123")], RunContext::new())
        .await
        .unwrap();
    let results: Vec<_> = outcome
        .messages
        .iter()
        .filter(|msg| msg.role() == Role::Tool)
        .collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_error());
    assert!(results[0].content().starts_with("Unknown tool"));
    assert!(results[1].is_error());
    assert!(results[1].content().starts_with("Invalid arguments"));
}

#[tokio::test(start_paused = true)]
async fn test_tool_timeout() {
    let provider = TestModelProvider::with_responses([
        call("call:1", "wait", json!({})),
        PresetResponse::text("It took too long."),
    ]);
    let agent = AgentBuilder::with_model_provider(provider)
        .with_tool(slow_tool())
        .with_config(AgentConfig::default().with_tool_timeout(Duration::from_secs(1)))
        .build()
        .unwrap();

    let outcome = agent
        .run("1", vec![Message::user("Wait")], RunContext::new())
        .await
        .unwrap();
    assert!(outcome.messages[2].is_error());
    assert!(outcome.messages[2].content().contains("timed out"));
    assert_eq!(outcome.final_message().unwrap().content(), "It took too long.");
}

#[tokio::test(start_paused = true)]
async fn test_cancellation() {
    let provider = TestModelProvider::with_responses([
        PresetResponse::with_events([
            PresetEvent::tool_call("call:1", "wait", json!({})),
            PresetEvent::tool_call("call:2", "read_email", json!({ "email_id": "1" })),
        ]),
        PresetResponse::text("unreachable"),
    ]);
    let cleaned_up = Arc::new(AtomicBool::new(false));
    let cleaned_up_clone = Arc::clone(&cleaned_up);
    let agent = AgentBuilder::with_model_provider(provider.clone())
        .with_tool(slow_tool())
        .with_tool(read_email_tool())
        .after_agent(node_hook("cleanup", move |state, _| {
            cleaned_up_clone.store(state.is_cancelled(), Ordering::SeqCst);
            Ok(HookOutcome::proceed())
        }))
        .build()
        .unwrap();

    let token = CancellationToken::new();
    let ctx = RunContext::new().with_cancellation(token.clone());
    let task = tokio::spawn({
        let agent = agent.clone();
        async move { agent.run("1", vec![Message::user("Wait")], ctx).await }
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    token.cancel();

    let err = task.await.unwrap().unwrap_err();
    assert_eq!(err, Error::Cancelled);
    assert!(cleaned_up.load(Ordering::SeqCst));
    assert_eq!(provider.call_count(), 1);

    // Both calls are answered, as whole messages.
    let history = agent.history("1").await;
    assert_eq!(
        roles(&history),
        [Role::User, Role::Assistant, Role::Tool, Role::Tool]
    );
    assert!(history[2..].iter().all(Message::is_error));
    assert_eq!(history[3].tool_call_id(), Some("call:2"));
}

#[tokio::test(start_paused = true)]
async fn test_run_timeout() {
    let provider = TestModelProvider::with_responses([call("call:1", "wait", json!({}))]);
    let agent = AgentBuilder::with_model_provider(provider)
        .with_tool(slow_tool())
        .with_config(AgentConfig::default().with_run_timeout(Duration::from_secs(5)))
        .build()
        .unwrap();

    let err = agent
        .run("1", vec![Message::user("Wait")], RunContext::new())
        .await
        .unwrap_err();
    assert_eq!(err, Error::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_runs_on_distinct_threads() {
    let provider = TestModelProvider::with_responses(
        (0..8).map(|i| PresetResponse::text(format!("answer {i}"))),
    );
    let agent = AgentBuilder::with_model_provider(provider)
        .build()
        .unwrap();

    let tasks: Vec<_> = (0..8u64)
        .map(|thread| {
            let agent = agent.clone();
            tokio::spawn(async move {
                agent
                    .run(thread, vec![Message::user("Hi")], RunContext::new())
                    .await
            })
        })
        .collect();
    for task in tasks {
        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome.messages.len(), 2);
    }
}
