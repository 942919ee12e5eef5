//! The hook pipeline.
//!
//! Hooks are registered per [`HookPoint`] and run in registration order.
//! There are two styles of hooks:
//!
//! - Node-style hooks ([`NodeHook`]) run at `BeforeAgent`, `BeforeModel`,
//!   `AfterModel` and `AfterAgent`. They see the current state and may
//!   append messages or jump elsewhere in the loop.
//! - Wrap-style hooks ([`WrapModelCall`], [`WrapToolCall`]) sit around
//!   every model call and every tool call. Each one receives the request
//!   and a continuation, and decides how many times to call it.

mod model_call;
mod tool_call;

use std::collections::HashMap;
use std::fmt::{self, Debug, Display};
use std::sync::Arc;

use async_trait::async_trait;

pub use model_call::{
    ModelCallRequest, ModelCallResponse, ModelNext, WrapModelCall,
};
pub use tool_call::{ToolInvocation, ToolNext, WrapToolCall};

use crate::agent::AgentState;
use crate::context::RunContext;
use crate::error::Error;
use crate::message::Message;

/// A fixed point in the agent loop where hooks can be attached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookPoint {
    /// Once per run, before anything else.
    BeforeAgent,
    /// Before every model call.
    BeforeModel,
    /// After every model call.
    AfterModel,
    /// Once per run, after everything else.
    AfterAgent,
    /// Around every model call.
    WrapModelCall,
    /// Around every tool call.
    WrapToolCall,
}

impl HookPoint {
    /// Returns `true` for the points that take node-style hooks.
    #[inline]
    pub fn is_node(self) -> bool {
        !matches!(self, HookPoint::WrapModelCall | HookPoint::WrapToolCall)
    }
}

impl Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPoint::BeforeAgent => write!(f, "before_agent"),
            HookPoint::BeforeModel => write!(f, "before_model"),
            HookPoint::AfterModel => write!(f, "after_model"),
            HookPoint::AfterAgent => write!(f, "after_agent"),
            HookPoint::WrapModelCall => write!(f, "wrap_model_call"),
            HookPoint::WrapToolCall => write!(f, "wrap_tool_call"),
        }
    }
}

/// Where a node-style hook sends the loop next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JumpTo {
    /// Skip all remaining model and tool calls and finish the run.
    End,
    /// Go (back) to the model call, skipping pending tool calls.
    Model,
}

/// What a node-style hook wants to happen.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HookOutcome {
    messages: Vec<Message>,
    jump_to: Option<JumpTo>,
}

impl HookOutcome {
    /// Continues with no change.
    #[inline]
    pub fn proceed() -> Self {
        Self::default()
    }

    /// Appends a message to the thread.
    #[inline]
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Jumps to another stage of the loop.
    #[inline]
    pub fn jump_to(mut self, target: JumpTo) -> Self {
        self.jump_to = Some(target);
        self
    }

    /// Finishes the run right after this hook.
    #[inline]
    pub fn jump_to_end(self) -> Self {
        self.jump_to(JumpTo::End)
    }

    /// Returns the messages to append.
    #[inline]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the jump target, if any.
    #[inline]
    pub fn jump(&self) -> Option<JumpTo> {
        self.jump_to
    }

    #[inline]
    pub(crate) fn into_parts(self) -> (Vec<Message>, Option<JumpTo>) {
        (self.messages, self.jump_to)
    }
}

/// A node-style hook.
#[async_trait]
pub trait NodeHook: Send + Sync {
    /// Name of the hook, for logging.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Runs the hook against the current state.
    async fn run(
        &self,
        state: &AgentState,
        ctx: &RunContext,
    ) -> Result<HookOutcome, Error>;
}

/// A node-style hook backed by a closure. See [`node_hook`].
pub struct FnNodeHook<F> {
    name: String,
    f: F,
}

/// Creates a node-style hook from a closure.
#[inline]
pub fn node_hook<S, F>(name: S, f: F) -> FnNodeHook<F>
where
    S: Into<String>,
    F: Fn(&AgentState, &RunContext) -> Result<HookOutcome, Error>
        + Send
        + Sync
        + 'static,
{
    FnNodeHook {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<F> NodeHook for FnNodeHook<F>
where
    F: Fn(&AgentState, &RunContext) -> Result<HookOutcome, Error>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        state: &AgentState,
        ctx: &RunContext,
    ) -> Result<HookOutcome, Error> {
        (self.f)(state, ctx)
    }
}

/// A hook of any style, ready to be registered.
#[derive(Clone)]
pub enum Hook {
    /// A node-style hook.
    Node(Arc<dyn NodeHook>),
    /// A wrap-style hook around model calls.
    WrapModel(Arc<dyn WrapModelCall>),
    /// A wrap-style hook around tool calls.
    WrapTool(Arc<dyn WrapToolCall>),
}

impl Hook {
    /// Wraps a node-style hook.
    #[inline]
    pub fn node<H: NodeHook + 'static>(hook: H) -> Self {
        Self::Node(Arc::new(hook))
    }

    /// Wraps a model call hook.
    #[inline]
    pub fn wrap_model<H: WrapModelCall + 'static>(hook: H) -> Self {
        Self::WrapModel(Arc::new(hook))
    }

    /// Wraps a tool call hook.
    #[inline]
    pub fn wrap_tool<H: WrapToolCall + 'static>(hook: H) -> Self {
        Self::WrapTool(Arc::new(hook))
    }

    /// Returns the name of the wrapped hook.
    pub fn name(&self) -> &str {
        match self {
            Hook::Node(hook) => hook.name(),
            Hook::WrapModel(hook) => hook.name(),
            Hook::WrapTool(hook) => hook.name(),
        }
    }
}

impl Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let style = match self {
            Hook::Node(_) => "Node",
            Hook::WrapModel(_) => "WrapModel",
            Hook::WrapTool(_) => "WrapTool",
        };
        f.debug_tuple(style).field(&self.name()).finish()
    }
}

/// Registered hooks, keyed by their point.
#[derive(Clone, Default)]
pub struct HookTable {
    nodes: HashMap<HookPoint, Vec<Arc<dyn NodeHook>>>,
    wrap_model: Vec<Arc<dyn WrapModelCall>>,
    wrap_tool: Vec<Arc<dyn WrapToolCall>>,
}

impl HookTable {
    /// Creates an empty table.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a hook at the given point.
    ///
    /// Fails with [`Error::Configuration`] if the hook style doesn't fit
    /// the point, e.g. a node-style hook at `WrapModelCall`.
    pub fn register(
        &mut self,
        point: HookPoint,
        hook: Hook,
    ) -> Result<(), Error> {
        match (point, hook) {
            (point, Hook::Node(hook)) if point.is_node() => {
                self.nodes.entry(point).or_default().push(hook);
            }
            (HookPoint::WrapModelCall, Hook::WrapModel(hook)) => {
                self.wrap_model.push(hook);
            }
            (HookPoint::WrapToolCall, Hook::WrapTool(hook)) => {
                self.wrap_tool.push(hook);
            }
            (point, hook) => {
                return Err(Error::Configuration(format!(
                    "hook `{}` ({hook:?}) cannot be registered at `{point}`",
                    hook.name()
                )));
            }
        }
        Ok(())
    }

    /// Returns the number of hooks at the given point.
    pub fn len(&self, point: HookPoint) -> usize {
        match point {
            HookPoint::WrapModelCall => self.wrap_model.len(),
            HookPoint::WrapToolCall => self.wrap_tool.len(),
            point => self.nodes.get(&point).map_or(0, Vec::len),
        }
    }

    #[inline]
    pub(crate) fn nodes(&self, point: HookPoint) -> &[Arc<dyn NodeHook>] {
        self.nodes.get(&point).map(Vec::as_slice).unwrap_or_default()
    }

    #[inline]
    pub(crate) fn model_chain(&self) -> ModelNext<'_> {
        ModelNext::new(&self.wrap_model)
    }

    #[inline]
    pub(crate) fn tool_chain<'a>(
        &'a self,
        registry: &'a crate::tool::ToolRegistry,
    ) -> ToolNext<'a> {
        ToolNext::new(&self.wrap_tool, registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_checks_style() {
        let mut table = HookTable::new();
        let hook = node_hook("noop", |_, _| Ok(HookOutcome::proceed()));
        let hook = Hook::node(hook);

        table.register(HookPoint::BeforeAgent, hook.clone()).unwrap();
        table.register(HookPoint::BeforeAgent, hook.clone()).unwrap();
        table.register(HookPoint::AfterModel, hook.clone()).unwrap();
        assert_eq!(table.len(HookPoint::BeforeAgent), 2);
        assert_eq!(table.len(HookPoint::AfterModel), 1);
        assert_eq!(table.len(HookPoint::BeforeModel), 0);

        let err = table.register(HookPoint::WrapModelCall, hook).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(table.len(HookPoint::WrapModelCall), 0);
    }

    #[test]
    fn test_outcome_builder() {
        let outcome = HookOutcome::proceed()
            .with_message(Message::assistant("I cannot respond to that."))
            .jump_to_end();
        assert_eq!(outcome.jump(), Some(JumpTo::End));
        assert_eq!(outcome.messages().len(), 1);
        assert_eq!(HookOutcome::proceed().jump(), None);
    }
}
