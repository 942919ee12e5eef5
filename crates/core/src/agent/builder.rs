use std::sync::Arc;

use relay_agent_model::ModelProvider;

use super::{Agent, AgentInner};
use crate::config::AgentConfig;
use crate::conversation::{ConversationStore, InMemoryStore};
use crate::error::Error;
use crate::hook::{
    Hook, HookPoint, HookTable, NodeHook, WrapModelCall, WrapToolCall,
};
use crate::model_client::ModelClient;
use crate::output::ResponseFormat;
use crate::tool::{AnyTool, Tool, ToolObject, ToolRegistry};

/// [`Agent`] builder.
///
/// Tools and hooks are only checked in [`AgentBuilder::build`], which is
/// where configuration errors are reported.
pub struct AgentBuilder {
    model: ModelClient,
    system_prompt: Option<String>,
    tools: Vec<Arc<dyn ToolObject>>,
    hooks: Vec<(HookPoint, Hook)>,
    store: Option<Arc<dyn ConversationStore>>,
    response_format: Option<ResponseFormat>,
    config: AgentConfig,
}

impl AgentBuilder {
    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self::with_model_client(ModelClient::new(provider))
    }

    /// Creates a new builder with an existing model client.
    pub fn with_model_client(model: ModelClient) -> Self {
        Self {
            model,
            system_prompt: None,
            tools: vec![],
            hooks: vec![],
            store: None,
            response_format: None,
            config: AgentConfig::default(),
        }
    }

    /// Sets the system prompt.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Registers a tool.
    #[inline]
    pub fn with_tool<T: Tool>(self, tool: T) -> Self {
        self.with_tool_object(Arc::new(AnyTool(tool)))
    }

    /// Registers a type-erased tool.
    #[inline]
    pub fn with_tool_object(mut self, tool: Arc<dyn ToolObject>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Registers a hook at the given point.
    #[inline]
    pub fn with_hook(mut self, point: HookPoint, hook: Hook) -> Self {
        self.hooks.push((point, hook));
        self
    }

    /// Registers a hook that runs once before the loop.
    #[inline]
    pub fn before_agent<H: NodeHook + 'static>(self, hook: H) -> Self {
        self.with_hook(HookPoint::BeforeAgent, Hook::node(hook))
    }

    /// Registers a hook that runs before every model call.
    #[inline]
    pub fn before_model<H: NodeHook + 'static>(self, hook: H) -> Self {
        self.with_hook(HookPoint::BeforeModel, Hook::node(hook))
    }

    /// Registers a hook that runs after every model call.
    #[inline]
    pub fn after_model<H: NodeHook + 'static>(self, hook: H) -> Self {
        self.with_hook(HookPoint::AfterModel, Hook::node(hook))
    }

    /// Registers a hook that runs once after the loop.
    #[inline]
    pub fn after_agent<H: NodeHook + 'static>(self, hook: H) -> Self {
        self.with_hook(HookPoint::AfterAgent, Hook::node(hook))
    }

    /// Registers a hook around model calls.
    ///
    /// The first registered hook is the outermost one.
    #[inline]
    pub fn wrap_model_call<H: WrapModelCall + 'static>(self, hook: H) -> Self {
        self.with_hook(HookPoint::WrapModelCall, Hook::wrap_model(hook))
    }

    /// Registers a hook around tool calls.
    ///
    /// The first registered hook is the outermost one.
    #[inline]
    pub fn wrap_tool_call<H: WrapToolCall + 'static>(self, hook: H) -> Self {
        self.with_hook(HookPoint::WrapToolCall, Hook::wrap_tool(hook))
    }

    /// Uses the given conversation store, instead of a fresh in-memory one.
    #[inline]
    pub fn with_store<S: ConversationStore + 'static>(self, store: S) -> Self {
        self.with_shared_store(Arc::new(store))
    }

    /// Uses a conversation store shared with others.
    #[inline]
    pub fn with_shared_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Requires the final answer to match the format.
    #[inline]
    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    /// Sets the limits and timeouts.
    #[inline]
    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the agent.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DuplicateName`] if two tools share a name, and
    /// with [`Error::Configuration`] if a hook is registered at a point
    /// that doesn't accept it.
    pub fn build(self) -> Result<Agent, Error> {
        let Self {
            model,
            system_prompt,
            tools: tool_objects,
            hooks: hook_records,
            store,
            response_format,
            config,
        } = self;

        if config.recursion_limit == 0 {
            return Err(Error::Configuration(
                "recursion limit must be at least 1".to_owned(),
            ));
        }

        let mut tools = ToolRegistry::new();
        for tool in tool_objects {
            tools.register_object(tool)?;
        }
        let mut hooks = HookTable::new();
        for (point, hook) in hook_records {
            hooks.register(point, hook)?;
        }
        debug!(
            "built agent on model {} with {} tool(s)",
            model.name(),
            tools.len()
        );

        let store = store.unwrap_or_else(|| Arc::new(InMemoryStore::new()));
        Ok(Agent {
            inner: Arc::new(AgentInner {
                model,
                system_prompt,
                tools,
                hooks,
                store,
                response_format,
                config,
            }),
        })
    }
}
