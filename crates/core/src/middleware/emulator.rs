use std::collections::HashSet;

use async_trait::async_trait;
use relay_agent_model::{ModelMessage, ModelRequest};

use crate::hook::{ToolInvocation, ToolNext, WrapToolCall};
use crate::model_client::ModelClient;
use crate::tool::{Error as ToolError, ToolResult};

/// Answers tool calls with a model instead of running the tools.
///
/// Useful to develop and test an agent before its tools exist or when they
/// are expensive to run.
#[derive(Clone, Debug)]
pub struct ToolEmulator {
    model: ModelClient,
    tools: Option<HashSet<String>>,
}

impl ToolEmulator {
    /// Emulates every tool with the given model.
    #[inline]
    pub fn new(model: ModelClient) -> Self {
        Self { model, tools: None }
    }

    /// Only emulates the given tools, the others run for real.
    pub fn only<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    fn emulates(&self, tool: &str) -> bool {
        self.tools.as_ref().is_none_or(|tools| tools.contains(tool))
    }
}

#[async_trait]
impl WrapToolCall for ToolEmulator {
    fn name(&self) -> &str {
        "tool_emulator"
    }

    async fn wrap_tool_call(
        &self,
        invocation: ToolInvocation,
        next: ToolNext<'_>,
    ) -> ToolResult {
        if !self.emulates(invocation.tool_name()) {
            return next.run(invocation).await;
        }

        let description = invocation
            .definition
            .as_ref()
            .map(|def| def.description.as_str())
            .unwrap_or("(no description)");
        let request = ModelRequest {
            system_prompt: Some(format!(
                "You are emulating the tool `{}`: {description}\n\
                 Reply with a realistic output of the tool for the given \
                 arguments, and nothing else.",
                invocation.tool_name()
            )),
            messages: vec![ModelMessage::User(
                invocation.call.arguments.to_string(),
            )],
            tools: vec![],
        };
        debug!(
            "emulating {} with {}",
            invocation.tool_name(),
            self.model.name()
        );
        match self.model.send_request(request).await {
            Ok(resp) => Ok(resp.transcript),
            Err(err) => {
                Err(ToolError::execution_error().with_reason(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use relay_agent_test_model::{PresetEvent, PresetResponse, TestModelProvider};
    use schemars::JsonSchema;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::agent::AgentBuilder;
    use crate::context::RunContext;
    use crate::message::Message;
    use crate::tool::FunctionTool;

    #[allow(dead_code)]
    #[derive(Deserialize, JsonSchema)]
    struct ReadEmail {
        email_id: String,
    }

    #[tokio::test]
    async fn test_emulated_tool_is_not_run() {
        let emulator_model = TestModelProvider::named("emulator");
        emulator_model.add_response(PresetResponse::text(
            "Hello, this is a test email.",
        ));
        let provider = TestModelProvider::with_responses([
            PresetResponse::with_events([PresetEvent::tool_call(
                "call:1",
                "read_email",
                json!({ "email_id": "123" }),
            )]),
            PresetResponse::text("The email says hello."),
        ]);

        let runs = Arc::new(AtomicUsize::new(0));
        let runs_clone = Arc::clone(&runs);
        let agent = AgentBuilder::with_model_provider(provider)
            .with_tool(FunctionTool::new(
                "read_email",
                "Reads an email",
                move |_: ReadEmail| {
                    runs_clone.fetch_add(1, Ordering::SeqCst);
                    async { Ok("real contents".to_owned()) }
                },
            ))
            .wrap_tool_call(
                ToolEmulator::new(ModelClient::new(emulator_model.clone()))
                    .only(["read_email"]),
            )
            .build()
            .unwrap();

        let outcome = agent
            .run("1", vec![Message::user("Read email 123")], RunContext::new())
            .await
            .unwrap();
        let result = outcome
            .messages
            .iter()
            .find(|msg| msg.tool_call_id().is_some())
            .unwrap();
        assert_eq!(result.content(), "Hello, this is a test email.");
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        let request = &emulator_model.requests()[0];
        assert!(
            request
                .system_prompt
                .as_deref()
                .unwrap()
                .contains("`read_email`: Reads an email")
        );
    }
}
