use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoff;
use backoff::ExponentialBackoffBuilder;
use backoff::backoff::Backoff;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::context::RunContext;
use crate::error::Error;
use crate::hook::{
    ModelCallRequest, ModelCallResponse, ModelNext, ToolInvocation, ToolNext,
    WrapModelCall, WrapToolCall,
};
use crate::tool::{Error as ToolError, ErrorKind as ToolErrorKind, ToolResult};

/// How often and how fast to retry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: usize,
    /// Delay before the first retry, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound of the delay between two attempts, in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the given number of attempts and the default
    /// delays.
    #[inline]
    pub fn with_max_attempts(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Sets the delay before the first retry.
    #[inline]
    pub fn with_initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff_ms = delay.as_millis() as u64;
        self
    }

    /// Sets the upper bound of the delay.
    #[inline]
    pub fn with_max_backoff(mut self, delay: Duration) -> Self {
        self.max_backoff_ms = delay.as_millis() as u64;
        self
    }

    fn schedule(&self) -> ExponentialBackoff {
        let initial = Duration::from_millis(self.initial_backoff_ms);
        let max = Duration::from_millis(self.max_backoff_ms).max(initial);
        ExponentialBackoffBuilder::new()
            .with_initial_interval(initial)
            .with_max_interval(max)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Waits for the next delay of the schedule. Returns `false` if the run
    /// was cancelled in the meantime.
    async fn wait(&self, schedule: &mut ExponentialBackoff, ctx: &RunContext) -> bool {
        let delay = schedule
            .next_backoff()
            .unwrap_or(Duration::from_millis(self.max_backoff_ms));
        trace!("retrying in {delay:?}");
        tokio::select! {
            _ = ctx.cancellation().cancelled() => false,
            _ = sleep(delay) => true,
        }
    }
}

/// Retries tool calls that fail with an execution error.
///
/// Other failures (unknown tool, invalid arguments, rejections) are
/// returned right away, since running the same call again won't help.
#[derive(Clone, Debug, Default)]
pub struct ToolRetry {
    policy: RetryPolicy,
    tools: Option<Vec<String>>,
}

impl ToolRetry {
    /// Retries every tool with the given policy.
    #[inline]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            tools: None,
        }
    }

    /// Only retries the given tools.
    pub fn only<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    fn applies_to(&self, tool: &str) -> bool {
        self.tools
            .as_ref()
            .is_none_or(|tools| tools.iter().any(|t| t == tool))
    }
}

#[async_trait]
impl WrapToolCall for ToolRetry {
    fn name(&self) -> &str {
        "tool_retry"
    }

    async fn wrap_tool_call(
        &self,
        invocation: ToolInvocation,
        next: ToolNext<'_>,
    ) -> ToolResult {
        if !self.applies_to(invocation.tool_name()) {
            return next.run(invocation).await;
        }

        let mut schedule = self.policy.schedule();
        let mut attempt = 1;
        loop {
            let result = next.run(invocation.clone()).await;
            let err = match result {
                Err(err) if err.kind() == ToolErrorKind::ExecutionError => err,
                result => return result,
            };
            if attempt >= self.policy.max_attempts {
                warn!(
                    "tool {} failed after {attempt} attempt(s): {err}",
                    invocation.tool_name()
                );
                return Err(err);
            }
            debug!(
                "tool {} failed (attempt {attempt}): {err}",
                invocation.tool_name()
            );
            if !self.policy.wait(&mut schedule, &invocation.context).await {
                return Err(ToolError::cancelled());
            }
            attempt += 1;
        }
    }
}

/// Retries model calls that fail with a transient backend error, like a
/// rate limit.
#[derive(Clone, Debug, Default)]
pub struct ModelRetry {
    policy: RetryPolicy,
}

impl ModelRetry {
    /// Creates a retry hook with the given policy.
    #[inline]
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl WrapModelCall for ModelRetry {
    fn name(&self) -> &str {
        "model_retry"
    }

    async fn wrap_model_call(
        &self,
        request: ModelCallRequest,
        next: ModelNext<'_>,
    ) -> Result<ModelCallResponse, Error> {
        let mut schedule = self.policy.schedule();
        let mut attempt = 1;
        loop {
            let err = match next.run(request.clone()).await {
                Err(err) if err.is_retryable() => err,
                result => return result,
            };
            if attempt >= self.policy.max_attempts {
                warn!("model call failed after {attempt} attempt(s): {err}");
                return Err(err);
            }
            debug!("model call failed (attempt {attempt}): {err}");
            if !self.policy.wait(&mut schedule, &request.context).await {
                return Err(Error::Cancelled);
            }
            attempt += 1;
        }
    }
}
