//! Core logic including the agent loop, hooks, tool execution,
//! conversation storage, configurations, etc.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod agent;
mod config;
mod context;
pub mod conversation;
mod error;
pub mod hook;
mod message;
pub mod middleware;
mod model_client;
mod output;
pub mod tool;

pub use agent::{
    Agent, AgentBuilder, AgentState, RunOutcome, Stage, Transition,
};
pub use config::AgentConfig;
pub use context::RunContext;
pub use error::Error;
pub use message::{Message, Role, ToolCallMeta};
pub use model_client::{ModelClient, ModelClientResponse};
pub use output::ResponseFormat;
pub use relay_agent_model as model;
pub use tokio_util::sync::CancellationToken;
