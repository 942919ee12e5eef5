mod builder;
mod run;
mod stage;
mod state;
#[cfg(test)]
mod tests;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::Instrument;

use crate::config::AgentConfig;
use crate::context::RunContext;
use crate::conversation::{ConversationStore, ThreadId};
use crate::error::Error;
use crate::hook::HookTable;
use crate::message::{Message, Role};
use crate::model_client::ModelClient;
use crate::output::ResponseFormat;
use crate::tool::ToolRegistry;
pub use builder::AgentBuilder;
use run::Runner;
pub use stage::{Stage, Transition};
pub use state::AgentState;

/// An agent, which owns a model, tools, hooks and a conversation store.
///
/// The agent itself is immutable once built. It can be cloned cheaply and
/// shared between tasks; runs on different threads don't block each other.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

pub(crate) struct AgentInner {
    model: ModelClient,
    system_prompt: Option<String>,
    tools: ToolRegistry,
    hooks: HookTable,
    store: Arc<dyn ConversationStore>,
    response_format: Option<ResponseFormat>,
    config: AgentConfig,
}

impl Agent {
    /// Runs the agent on a thread.
    ///
    /// The new messages are appended to the thread, then the loop runs
    /// until the model gives a final answer or a hook ends the run.
    ///
    /// # Errors
    ///
    /// Fails if the model backend fails, the recursion limit is hit, the
    /// final answer doesn't match the response format, or the run is
    /// cancelled through the context. Tool failures don't fail the run,
    /// they are reported to the model instead.
    pub async fn run(
        &self,
        thread_id: impl Into<ThreadId>,
        new_messages: Vec<Message>,
        ctx: RunContext,
    ) -> Result<RunOutcome, Error> {
        let thread_id = thread_id.into();
        let span = debug_span!("agent run", thread = %thread_id);
        async move {
            let runner = Runner::new(&self.inner, thread_id, ctx).await;
            runner.run(new_messages).await
        }
        .instrument(span)
        .await
    }

    /// Returns the whole history of a thread.
    #[inline]
    pub async fn history(&self, thread_id: impl Into<ThreadId>) -> Vec<Message> {
        self.inner.store.read(&thread_id.into()).await
    }

    /// Returns the registered tools.
    #[inline]
    pub fn tools(&self) -> &ToolRegistry {
        &self.inner.tools
    }

    /// Returns the conversation store.
    #[inline]
    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.inner.store
    }

    /// Returns the configuration.
    #[inline]
    pub fn config(&self) -> &AgentConfig {
        &self.inner.config
    }
}

/// The result of a successful run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunOutcome {
    /// The thread of the run.
    pub thread_id: ThreadId,
    /// The whole history of the thread after the run.
    pub messages: Vec<Message>,
    /// The final answer as JSON, if the agent has a response format.
    pub structured: Option<Value>,
}

impl RunOutcome {
    /// Returns the latest assistant message.
    pub fn final_message(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|msg| msg.role() == Role::Assistant)
    }

    /// Deserializes the structured final answer.
    pub fn structured<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let Some(value) = &self.structured else {
            return Err(Error::Configuration(
                "the agent has no response format".to_owned(),
            ));
        };
        serde_json::from_value(value.clone())
            .map_err(|err| Error::SchemaValidation(err.to_string()))
    }
}
