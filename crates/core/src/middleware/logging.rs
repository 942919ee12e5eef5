use async_trait::async_trait;

use crate::agent::AgentState;
use crate::context::RunContext;
use crate::error::Error;
use crate::hook::{HookOutcome, NodeHook};

/// Logs the state of the run with `tracing`.
///
/// Register it at `BeforeModel` and/or `AfterModel` to trace every step.
#[derive(Clone, Debug)]
pub struct StepLogger {
    label: String,
}

impl StepLogger {
    /// Creates a logger that tags its records with `label`.
    #[inline]
    pub fn new<S: Into<String>>(label: S) -> Self {
        Self {
            label: label.into(),
        }
    }
}

#[async_trait]
impl NodeHook for StepLogger {
    fn name(&self) -> &str {
        &self.label
    }

    async fn run(
        &self,
        state: &AgentState,
        ctx: &RunContext,
    ) -> Result<HookOutcome, Error> {
        info!(
            label = %self.label,
            thread = %state.thread_id(),
            model_calls = state.model_calls(),
            tool_calls = state.total_tool_calls(),
            messages = state.messages().len(),
            last_role = ?state.last_message().map(|msg| msg.role()),
            "agent step"
        );
        trace!("context: {ctx:?}");
        Ok(HookOutcome::proceed())
    }
}
