use async_trait::async_trait;

use crate::agent::AgentState;
use crate::context::RunContext;
use crate::error::Error;
use crate::hook::{HookOutcome, NodeHook, ToolInvocation, ToolNext, WrapToolCall};
use crate::message::Message;
use crate::tool::{Error as ToolError, ToolResult};

/// Ends a run once it has made a number of model calls.
///
/// Unlike the recursion limit of the agent, hitting this limit is not an
/// error: a notice is appended and the run ends normally.
#[derive(Clone, Copy, Debug)]
pub struct ModelCallLimit {
    limit: usize,
}

impl ModelCallLimit {
    /// Allows `limit` model calls per run.
    #[inline]
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }
}

#[async_trait]
impl NodeHook for ModelCallLimit {
    fn name(&self) -> &str {
        "model_call_limit"
    }

    async fn run(
        &self,
        state: &AgentState,
        _ctx: &RunContext,
    ) -> Result<HookOutcome, Error> {
        if state.model_calls() < self.limit {
            return Ok(HookOutcome::proceed());
        }
        info!("model call limit of {} reached", self.limit);
        let notice = format!(
            "Model call limit reached ({} calls). Stopping here.",
            self.limit
        );
        Ok(HookOutcome::proceed()
            .with_message(Message::assistant(notice))
            .jump_to_end())
    }
}

/// Refuses tool calls beyond a per-run limit.
///
/// Refused calls get an error result, so the model learns about the limit
/// and can answer without the tool.
#[derive(Clone, Debug)]
pub struct ToolCallLimit {
    limit: usize,
    tool: Option<String>,
}

impl ToolCallLimit {
    /// Allows `limit` tool calls per run, for all tools together.
    #[inline]
    pub fn new(limit: usize) -> Self {
        Self { limit, tool: None }
    }

    /// Allows `limit` calls per run of one tool.
    #[inline]
    pub fn for_tool<S: Into<String>>(tool: S, limit: usize) -> Self {
        Self {
            limit,
            tool: Some(tool.into()),
        }
    }
}

#[async_trait]
impl WrapToolCall for ToolCallLimit {
    fn name(&self) -> &str {
        "tool_call_limit"
    }

    async fn wrap_tool_call(
        &self,
        invocation: ToolInvocation,
        next: ToolNext<'_>,
    ) -> ToolResult {
        let prior = match &self.tool {
            Some(tool) if tool != invocation.tool_name() => {
                return next.run(invocation).await;
            }
            Some(_) => invocation.prior_calls,
            None => invocation.prior_total_calls,
        };
        if prior >= self.limit {
            debug!("refusing call to {}, limit reached", invocation.tool_name());
            return Err(ToolError::permission_denied().with_reason(format!(
                "tool call limit of {} reached, answer without calling `{}`",
                self.limit,
                invocation.tool_name()
            )));
        }
        next.run(invocation).await
    }
}
