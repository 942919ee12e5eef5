use relay_agent_model::ErrorKind as ModelErrorKind;
use thiserror::Error;

use crate::tool::{Error as ToolError, ErrorKind as ToolErrorKind};

/// Errors surfaced by the agent and its components.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// Malformed hook or tool setup, or a hook that broke its contract.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A tool with the same name has already been registered.
    #[error("tool `{0}` is already registered")]
    DuplicateName(String),
    /// No tool is registered under this name.
    #[error("unknown tool `{0}`")]
    UnknownTool(String),
    /// The arguments don't match the tool's parameter schema.
    #[error("invalid arguments for tool `{tool}`: {reason}")]
    InvalidArguments {
        /// Name of the tool.
        tool: String,
        /// What was wrong.
        reason: String,
    },
    /// The tool handler failed.
    #[error("tool `{tool}` failed: {reason}")]
    ToolExecution {
        /// Name of the tool.
        tool: String,
        /// What went wrong.
        reason: String,
    },
    /// The model backend returned an error.
    #[error("model backend error ({kind}): {message}")]
    ModelBackend {
        /// The kind reported by the provider.
        kind: ModelErrorKind,
        /// The provider's error message.
        message: String,
    },
    /// The final answer doesn't match the declared response format.
    #[error("structured output does not match the schema: {0}")]
    SchemaValidation(String),
    /// The run took more model steps than allowed.
    #[error("recursion limit of {0} model steps reached")]
    RecursionLimit(usize),
    /// The run was cancelled or timed out.
    #[error("the run was cancelled")]
    Cancelled,
}

impl Error {
    /// Converts a tool-level error of the named tool.
    pub fn from_tool<S: Into<String>>(tool: S, err: ToolError) -> Self {
        let tool = tool.into();
        let reason = err.reason().into_owned();
        match err.kind() {
            ToolErrorKind::InvalidArguments => {
                Error::InvalidArguments { tool, reason }
            }
            ToolErrorKind::UnknownTool => Error::UnknownTool(tool),
            ToolErrorKind::Cancelled => Error::Cancelled,
            ToolErrorKind::ExecutionError
            | ToolErrorKind::PermissionDenied => {
                Error::ToolExecution { tool, reason }
            }
        }
    }

    /// Returns `true` for model backend errors worth retrying.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ModelBackend { kind, .. } if kind.is_retryable())
    }
}
