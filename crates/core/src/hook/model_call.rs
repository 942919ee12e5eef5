use std::sync::Arc;

use async_trait::async_trait;
use relay_agent_model::{ModelFinishReason, ModelRequest, ModelTool};

use crate::context::RunContext;
use crate::error::Error;
use crate::message::Message;
use crate::model_client::{ModelClient, ModelClientResponse};

/// A model call as seen by wrap-model hooks.
///
/// Changing the request only affects this call. In particular, the messages
/// are a model-facing view of the thread and rewriting them doesn't touch
/// the stored history.
#[derive(Clone, Debug)]
pub struct ModelCallRequest {
    /// The messages sent to the model.
    pub messages: Vec<Message>,
    /// The system prompt.
    pub system_prompt: Option<String>,
    /// The tools the model may call.
    pub tools: Vec<ModelTool>,
    /// The model that will receive this request.
    pub model: ModelClient,
    /// The context of the current run.
    pub context: RunContext,
}

impl ModelCallRequest {
    /// Sends this request to another model.
    #[inline]
    pub fn override_model(mut self, model: ModelClient) -> Self {
        self.model = model;
        self
    }

    /// Replaces the system prompt.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Replaces the messages.
    #[inline]
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    pub(crate) fn to_model_request(&self) -> ModelRequest {
        ModelRequest {
            system_prompt: self.system_prompt.clone(),
            messages: self
                .messages
                .iter()
                .map(Message::to_model_message)
                .collect(),
            tools: self.tools.clone(),
        }
    }
}

/// The result of a model call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelCallResponse {
    /// The message produced by the model, or by a hook on its behalf.
    ///
    /// It must be an assistant message.
    pub message: Message,
    /// The reason the model finished, if a model was actually called.
    pub finish_reason: Option<ModelFinishReason>,
    /// Name of the model that answered, if any.
    pub model: Option<String>,
}

impl ModelCallResponse {
    /// Creates a response from a message, without calling any model.
    #[inline]
    pub fn new(message: Message) -> Self {
        Self {
            message,
            finish_reason: None,
            model: None,
        }
    }

    /// Creates a plain-text assistant response.
    #[inline]
    pub fn text<S: Into<String>>(content: S) -> Self {
        Self::new(Message::assistant(content))
    }

    fn from_client(resp: ModelClientResponse, model: &str) -> Self {
        let ModelClientResponse {
            transcript,
            tool_calls,
            finish_reason,
        } = resp;
        Self {
            message: Message::assistant_with_tool_calls(transcript, tool_calls),
            finish_reason,
            model: Some(model.to_owned()),
        }
    }
}

/// A wrap-style hook around model calls.
///
/// The hook decides what to do with the request: pass it on through `next`
/// (possibly transformed, possibly several times), or answer it directly.
#[async_trait]
pub trait WrapModelCall: Send + Sync {
    /// Name of the hook, for logging.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Handles a model call.
    async fn wrap_model_call(
        &self,
        request: ModelCallRequest,
        next: ModelNext<'_>,
    ) -> Result<ModelCallResponse, Error>;
}

/// The rest of the model call chain.
///
/// The innermost continuation sends the request to its model.
#[derive(Clone, Copy)]
pub struct ModelNext<'a> {
    chain: &'a [Arc<dyn WrapModelCall>],
}

impl<'a> ModelNext<'a> {
    #[inline]
    pub(crate) fn new(chain: &'a [Arc<dyn WrapModelCall>]) -> Self {
        Self { chain }
    }

    /// Runs the rest of the chain with the given request.
    pub async fn run(
        &self,
        request: ModelCallRequest,
    ) -> Result<ModelCallResponse, Error> {
        match self.chain.split_first() {
            Some((hook, rest)) => {
                trace!("entering model call hook {}", hook.name());
                hook.wrap_model_call(request, ModelNext { chain: rest })
                    .await
            }
            None => {
                let model = request.model.clone();
                let resp = model.send_request(request.to_model_request()).await?;
                Ok(ModelCallResponse::from_client(resp, model.name()))
            }
        }
    }
}
