//! Conversation messages.

use std::fmt::{self, Display};

use relay_agent_model::{
    AssistantMessage, ModelMessage, ToolCallRequest, ToolCallResult,
};
use serde::{Deserialize, Serialize};

/// Who authored a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// The human side of the conversation.
    User,
    /// The model.
    Assistant,
    /// A tool call result.
    Tool,
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// Tool call bookkeeping attached to a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallMeta {
    /// Calls requested by an assistant message.
    Requests(Vec<ToolCallRequest>),
    /// The tool message answers this call.
    Result {
        /// Identifier of the answered call.
        id: String,
        /// Name of the called tool.
        name: String,
        /// Whether the content describes a failure.
        is_error: bool,
    },
}

/// A message in a conversation thread.
///
/// Messages are immutable once created, the only way to change a thread is
/// to append new ones.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call: Option<ToolCallMeta>,
}

impl Message {
    #[inline]
    fn new<S: Into<String>>(role: Role, content: S) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call: None,
        }
    }

    /// Creates a system message.
    #[inline]
    pub fn system<S: Into<String>>(content: S) -> Self {
        Self::new(Role::System, content)
    }

    /// Creates a user message.
    #[inline]
    pub fn user<S: Into<String>>(content: S) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates an assistant message without tool calls.
    #[inline]
    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Creates an assistant message that requests tool calls.
    pub fn assistant_with_tool_calls<S: Into<String>>(
        content: S,
        calls: Vec<ToolCallRequest>,
    ) -> Self {
        let mut msg = Self::new(Role::Assistant, content);
        if !calls.is_empty() {
            msg.tool_call = Some(ToolCallMeta::Requests(calls));
        }
        msg
    }

    /// Creates a successful tool result for the given call.
    #[inline]
    pub fn tool_result<S: Into<String>>(
        call: &ToolCallRequest,
        content: S,
    ) -> Self {
        Self::tool(call, content, false)
    }

    /// Creates a failed tool result for the given call.
    #[inline]
    pub fn tool_error<S: Into<String>>(
        call: &ToolCallRequest,
        reason: S,
    ) -> Self {
        Self::tool(call, reason, true)
    }

    fn tool<S: Into<String>>(
        call: &ToolCallRequest,
        content: S,
        is_error: bool,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call: Some(ToolCallMeta::Result {
                id: call.id.clone(),
                name: call.name.clone(),
                is_error,
            }),
        }
    }

    /// Returns the author of this message.
    #[inline]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the text content.
    #[inline]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Returns the tool call metadata, if any.
    #[inline]
    pub fn tool_call(&self) -> Option<&ToolCallMeta> {
        self.tool_call.as_ref()
    }

    /// Returns the tool calls requested by this message.
    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        match &self.tool_call {
            Some(ToolCallMeta::Requests(calls)) => calls,
            _ => &[],
        }
    }

    /// Returns the identifier of the call this tool message answers.
    pub fn tool_call_id(&self) -> Option<&str> {
        match &self.tool_call {
            Some(ToolCallMeta::Result { id, .. }) => Some(id),
            _ => None,
        }
    }

    /// Returns `true` if this is a tool message carrying an error.
    pub fn is_error(&self) -> bool {
        matches!(
            self.tool_call,
            Some(ToolCallMeta::Result { is_error: true, .. })
        )
    }

    /// Returns a copy of this message with different content, keeping the
    /// role and tool call metadata.
    ///
    /// Hooks use this to build a model-facing view of the history without
    /// touching the stored messages.
    pub fn with_content<S: Into<String>>(&self, content: S) -> Self {
        Self {
            role: self.role,
            content: content.into(),
            tool_call: self.tool_call.clone(),
        }
    }

    /// Converts this message for the model protocol.
    pub fn to_model_message(&self) -> ModelMessage {
        match self.role {
            Role::System => ModelMessage::System(self.content.clone()),
            Role::User => ModelMessage::User(self.content.clone()),
            Role::Assistant => ModelMessage::Assistant(AssistantMessage {
                content: self.content.clone(),
                tool_calls: self.tool_calls().to_vec(),
            }),
            Role::Tool => ModelMessage::Tool(ToolCallResult {
                id: self.tool_call_id().unwrap_or_default().to_owned(),
                content: self.content.clone(),
                is_error: self.is_error(),
            }),
        }
    }
}
