use std::sync::Arc;

use async_trait::async_trait;
use relay_agent_model::{ModelTool, ToolCallRequest};
use serde_json::Value;

use crate::context::RunContext;
use crate::tool::{ToolRegistry, ToolResult};

/// A tool call as seen by wrap-tool hooks.
#[derive(Clone, Debug)]
pub struct ToolInvocation {
    /// The call requested by the model.
    pub call: ToolCallRequest,
    /// The definition of the called tool, if it's registered.
    pub definition: Option<ModelTool>,
    /// How many times this tool has been called earlier in the run.
    pub prior_calls: usize,
    /// How many tool calls have been made earlier in the run.
    pub prior_total_calls: usize,
    /// The context of the current run.
    pub context: RunContext,
}

impl ToolInvocation {
    /// Returns the name of the called tool.
    #[inline]
    pub fn tool_name(&self) -> &str {
        &self.call.name
    }

    /// Replaces the arguments of the call.
    #[inline]
    pub fn with_arguments(mut self, arguments: Value) -> Self {
        self.call.arguments = arguments;
        self
    }
}

/// A wrap-style hook around tool calls.
#[async_trait]
pub trait WrapToolCall: Send + Sync {
    /// Name of the hook, for logging.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Handles a tool call.
    ///
    /// Errors returned here end up in the tool result message, they don't
    /// fail the run.
    async fn wrap_tool_call(
        &self,
        invocation: ToolInvocation,
        next: ToolNext<'_>,
    ) -> ToolResult;
}

/// The rest of the tool call chain.
///
/// The innermost continuation dispatches the call through the registry.
#[derive(Clone, Copy)]
pub struct ToolNext<'a> {
    chain: &'a [Arc<dyn WrapToolCall>],
    registry: &'a ToolRegistry,
}

impl<'a> ToolNext<'a> {
    #[inline]
    pub(crate) fn new(
        chain: &'a [Arc<dyn WrapToolCall>],
        registry: &'a ToolRegistry,
    ) -> Self {
        Self { chain, registry }
    }

    /// Runs the rest of the chain with the given invocation.
    pub async fn run(&self, invocation: ToolInvocation) -> ToolResult {
        match self.chain.split_first() {
            Some((hook, rest)) => {
                trace!("entering tool call hook {}", hook.name());
                let next = ToolNext {
                    chain: rest,
                    registry: self.registry,
                };
                hook.wrap_tool_call(invocation, next).await
            }
            None => self.registry.invoke(&invocation.call).await,
        }
    }
}
