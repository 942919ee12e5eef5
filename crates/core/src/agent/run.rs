use std::collections::VecDeque;
use std::future::pending;

use relay_agent_model::ToolCallRequest;

use tokio::time::{Instant, sleep_until, timeout};

use super::stage::{Stage, Transition};
use super::state::AgentState;
use super::{AgentInner, RunOutcome};
use crate::context::RunContext;
use crate::conversation::ThreadId;
use crate::error::Error;
use crate::hook::{
    HookPoint, JumpTo, ModelCallRequest, ModelCallResponse, ToolInvocation,
};
use crate::message::{Message, Role};
use crate::tool::{Error as ToolError, ToolResult};

/// Drives one run of an agent through its stages.
pub(crate) struct Runner<'a> {
    agent: &'a AgentInner,
    state: AgentState,
    ctx: RunContext,
    deadline: Option<Instant>,
    steps: usize,
    structured: Option<serde_json::Value>,
    /// Calls of the latest model response that have no result yet.
    pending: VecDeque<ToolCallRequest>,
}

impl<'a> Runner<'a> {
    pub(crate) async fn new(
        agent: &'a AgentInner,
        thread_id: ThreadId,
        ctx: RunContext,
    ) -> Self {
        let history = agent.store.read(&thread_id).await;
        trace!("loaded {} message(s) from history", history.len());
        Self {
            agent,
            state: AgentState::new(thread_id, history),
            ctx,
            deadline: agent.config.run_timeout().map(|t| Instant::now() + t),
            steps: 0,
            structured: None,
            pending: VecDeque::new(),
        }
    }

    pub(crate) async fn run(
        mut self,
        new_messages: Vec<Message>,
    ) -> Result<RunOutcome, Error> {
        self.commit(new_messages).await;

        let mut stage = Stage::Start;
        let mut failure = None;
        while stage != Stage::End {
            let result = match stage {
                Stage::Start => Ok(Transition::Proceed),
                Stage::BeforeAgent => self.before_agent().await,
                Stage::ModelCall => self.model_call().await,
                Stage::ToolCall => self.tool_calls().await,
                Stage::AfterAgent => {
                    if let Err(err) = self.run_nodes(HookPoint::AfterAgent).await {
                        return Err(failure.unwrap_or(err));
                    }
                    Ok(Transition::Proceed)
                }
                Stage::End => unreachable!(),
            };

            let transition = match result {
                Ok(transition) => transition,
                Err(Error::Cancelled) => {
                    self.cancel().await;
                    failure = Some(Error::Cancelled);
                    Transition::Cancelled
                }
                Err(err) => {
                    warn!("run failed at stage {stage:?}: {err}");
                    return Err(err);
                }
            };

            let Some(next) = stage.next(transition) else {
                return Err(Error::Configuration(format!(
                    "no transition from {stage:?} on {transition:?}"
                )));
            };
            debug!("{stage:?} -> {next:?} ({transition:?})");
            stage = next;
        }

        if let Some(err) = failure {
            return Err(err);
        }
        let thread_id = self.state.thread_id().clone();
        Ok(RunOutcome {
            thread_id,
            messages: self.state.into_messages(),
            structured: self.structured,
        })
    }

    async fn before_agent(&mut self) -> Result<Transition, Error> {
        self.check_cancelled()?;
        let jump = self.run_nodes(HookPoint::BeforeAgent).await?;
        Ok(jump.map_or(Transition::Proceed, Transition::Jump))
    }

    async fn model_call(&mut self) -> Result<Transition, Error> {
        let agent = self.agent;
        self.check_cancelled()?;

        self.steps += 1;
        if self.steps > agent.config.recursion_limit {
            return Err(Error::RecursionLimit(agent.config.recursion_limit));
        }

        if let Some(jump) = self.run_nodes(HookPoint::BeforeModel).await? {
            return Ok(Transition::Jump(jump));
        }

        let request = self.model_request();
        let chain = agent.hooks.model_chain();
        let ModelCallResponse {
            message,
            finish_reason,
            model,
        } = self.guard(chain.run(request)).await??;
        if message.role() != Role::Assistant {
            return Err(Error::Configuration(format!(
                "model call produced a message from {}",
                message.role()
            )));
        }
        self.state.record_model_call();
        debug!(
            "model {} answered ({finish_reason:?}, {} tool call(s))",
            model.as_deref().unwrap_or("<none>"),
            message.tool_calls().len()
        );

        let wants_tools = !message.tool_calls().is_empty();
        if !wants_tools {
            if let Some(format) = &agent.response_format {
                self.structured = Some(format.coerce(message.content())?);
            }
        }
        self.pending = message.tool_calls().iter().cloned().collect();
        self.commit(vec![message]).await;

        if let Some(jump) = self.run_nodes(HookPoint::AfterModel).await? {
            return Ok(Transition::Jump(jump));
        }
        Ok(if wants_tools {
            Transition::ToolsRequested
        } else {
            Transition::Finished
        })
    }

    async fn tool_calls(&mut self) -> Result<Transition, Error> {
        let agent = self.agent;
        let chain = agent.hooks.tool_chain(&agent.tools);

        while let Some(call) = self.pending.front().cloned() {
            self.check_cancelled()?;

            let invocation = ToolInvocation {
                definition: agent
                    .tools
                    .resolve(&call.name)
                    .ok()
                    .map(|tool| tool.definition()),
                prior_calls: self.state.tool_calls(&call.name),
                prior_total_calls: self.state.total_tool_calls(),
                context: self.ctx.clone(),
                call: call.clone(),
            };
            self.state.record_tool_call(&call.name);

            let fut = chain.run(invocation);
            let result: ToolResult = match agent.config.tool_timeout() {
                Some(limit) => {
                    self.guard(timeout(limit, fut)).await?.unwrap_or_else(|_| {
                        Err(ToolError::execution_error()
                            .with_reason(format!("timed out after {limit:?}")))
                    })
                }
                None => self.guard(fut).await?,
            };

            let message = match result {
                Ok(content) => Message::tool_result(&call, content),
                Err(err) => {
                    warn!("tool {} ({}) failed: {err}", call.name, call.id);
                    Message::tool_error(&call, err.to_string())
                }
            };
            self.commit(vec![message]).await;
            self.pending.pop_front();
        }
        Ok(Transition::Proceed)
    }

    /// Runs the node-style hooks of a point, and returns the jump requested
    /// by one of them, if any.
    async fn run_nodes(
        &mut self,
        point: HookPoint,
    ) -> Result<Option<JumpTo>, Error> {
        let agent = self.agent;
        for hook in agent.hooks.nodes(point) {
            trace!("running {point} hook {}", hook.name());
            let outcome = if point == HookPoint::AfterAgent {
                // Cleanup must run even when the run is cancelled.
                hook.run(&self.state, &self.ctx).await?
            } else {
                self.guard(hook.run(&self.state, &self.ctx)).await??
            };

            let (messages, jump) = outcome.into_parts();
            self.commit(messages).await;
            match jump {
                Some(_) if point == HookPoint::AfterAgent => {
                    warn!("ignoring jump from {point} hook {}", hook.name());
                }
                Some(jump) => {
                    debug!("{point} hook {} jumps to {jump:?}", hook.name());
                    return Ok(Some(jump));
                }
                None => {}
            }
        }
        Ok(None)
    }

    fn model_request(&self) -> ModelCallRequest {
        let agent = self.agent;
        let mut system_prompt = agent.system_prompt.clone();
        if let Some(format) = &agent.response_format {
            let instructions = format.instructions();
            system_prompt = Some(match system_prompt {
                Some(prompt) => format!("{prompt}\n\n{instructions}"),
                None => instructions,
            });
        }
        ModelCallRequest {
            messages: self.state.messages().to_vec(),
            system_prompt,
            tools: agent.tools.definitions(),
            model: agent.model.clone(),
            context: self.ctx.clone(),
        }
    }

    async fn commit(&mut self, messages: Vec<Message>) {
        if messages.is_empty() {
            return;
        }
        self.agent
            .store
            .append_all(self.state.thread_id(), messages.clone())
            .await;
        self.state.extend(messages);
    }

    async fn cancel(&mut self) {
        info!("run on thread {} was cancelled", self.state.thread_id());
        self.state.set_cancelled();
        let answers = std::mem::take(&mut self.pending)
            .iter()
            .map(|call| {
                let reason = ToolError::cancelled()
                    .with_reason("the run was cancelled before this call finished");
                Message::tool_error(call, reason.to_string())
            })
            .collect();
        self.commit(answers).await;
    }

    fn check_cancelled(&self) -> Result<(), Error> {
        let expired = self.deadline.is_some_and(|d| Instant::now() >= d);
        if expired || self.ctx.cancellation().is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Races a suspension point against cancellation and the run deadline.
    async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, Error> {
        let deadline = async {
            match self.deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => pending().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.ctx.cancellation().cancelled() => Err(Error::Cancelled),
            _ = deadline => {
                debug!("run deadline reached");
                Err(Error::Cancelled)
            }
            output = fut => Ok(output),
        }
    }
}
