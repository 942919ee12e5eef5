use std::collections::{HashMap, HashSet};

use relay_agent_model::ToolCallRequest;

use crate::conversation::ThreadId;
use crate::message::{Message, Role};

/// The state of a run, as seen by node-style hooks.
///
/// Hooks can't modify it directly. They return a
/// [`HookOutcome`](crate::hook::HookOutcome) instead.
#[derive(Clone, Debug)]
pub struct AgentState {
    thread_id: ThreadId,
    messages: Vec<Message>,
    model_calls: usize,
    tool_calls: HashMap<String, usize>,
    cancelled: bool,
}

impl AgentState {
    pub(crate) fn new(thread_id: ThreadId, messages: Vec<Message>) -> Self {
        Self {
            thread_id,
            messages,
            model_calls: 0,
            tool_calls: HashMap::new(),
            cancelled: false,
        }
    }

    /// Returns the thread of this run.
    #[inline]
    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    /// Returns the full history of the thread.
    #[inline]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the latest message.
    #[inline]
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Returns the latest user message.
    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|msg| msg.role() == Role::User)
    }

    /// Returns how many model calls completed in this run.
    #[inline]
    pub fn model_calls(&self) -> usize {
        self.model_calls
    }

    /// Returns how many times the tool was called in this run.
    #[inline]
    pub fn tool_calls(&self, name: &str) -> usize {
        self.tool_calls.get(name).copied().unwrap_or_default()
    }

    /// Returns how many tool calls were made in this run.
    #[inline]
    pub fn total_tool_calls(&self) -> usize {
        self.tool_calls.values().sum()
    }

    /// Returns `true` once the run has been cancelled.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Returns the calls of the latest assistant message that have no tool
    /// result yet.
    pub fn pending_tool_calls(&self) -> Vec<ToolCallRequest> {
        let Some(idx) = self
            .messages
            .iter()
            .rposition(|msg| msg.role() == Role::Assistant)
        else {
            return vec![];
        };
        let answered: HashSet<_> = self.messages[idx + 1..]
            .iter()
            .filter_map(Message::tool_call_id)
            .collect();
        self.messages[idx]
            .tool_calls()
            .iter()
            .filter(|call| !answered.contains(call.id.as_str()))
            .cloned()
            .collect()
    }

    #[inline]
    pub(crate) fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    #[inline]
    pub(crate) fn record_model_call(&mut self) {
        self.model_calls += 1;
    }

    #[inline]
    pub(crate) fn record_tool_call(&mut self, name: &str) {
        *self.tool_calls.entry(name.to_owned()).or_default() += 1;
    }

    #[inline]
    pub(crate) fn set_cancelled(&mut self) {
        self.cancelled = true;
    }

    #[inline]
    pub(crate) fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}
