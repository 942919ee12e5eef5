use std::collections::HashMap;
use std::future::ready;
use std::sync::Arc;

use relay_agent_model::{ModelTool, ToolCallRequest};
use serde_json::Value;

use crate::error::Error as AgentError;
use crate::tool::{AnyTool, Error, Tool, ToolFuture, ToolObject};

/// A set of tools with unique names.
///
/// Tools keep their registration order, which is also the order they are
/// presented to the model.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn ToolObject>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool.
    ///
    /// Fails with [`AgentError::DuplicateName`] if a tool with the same name
    /// exists, in which case the registry is left unchanged.
    #[inline]
    pub fn register<T: Tool>(&mut self, tool: T) -> Result<(), AgentError> {
        self.register_object(Arc::new(AnyTool(tool)))
    }

    /// Registers a type-erased tool.
    pub fn register_object(
        &mut self,
        tool: Arc<dyn ToolObject>,
    ) -> Result<(), AgentError> {
        let name = tool.name();
        if self.index.contains_key(name) {
            return Err(AgentError::DuplicateName(name.to_owned()));
        }
        self.index.insert(name.to_owned(), self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Looks up a tool by name.
    pub fn resolve(&self, name: &str) -> Result<&Arc<dyn ToolObject>, AgentError> {
        self.index
            .get(name)
            .map(|&idx| &self.tools[idx])
            .ok_or_else(|| AgentError::UnknownTool(name.to_owned()))
    }

    /// Returns the number of registered tools.
    #[inline]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if no tool is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Returns the tool names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|tool| tool.name())
    }

    /// Returns the definitions of all tools, for the model.
    #[inline]
    pub fn definitions(&self) -> Vec<ModelTool> {
        self.tools.iter().map(|tool| tool.definition()).collect()
    }

    /// Dispatches a tool call request from the model.
    ///
    /// Unknown tools and mismatching arguments resolve to an error result
    /// without running anything.
    pub fn invoke(&self, req: &ToolCallRequest) -> ToolFuture {
        let Ok(tool) = self.resolve(&req.name) else {
            warn!("tool not found: {}", req.name);
            return Box::pin(ready(Err(Error::unknown_tool().with_reason(
                format!("there is no tool named `{}`", req.name),
            ))));
        };
        trace!("invoking tool {} ({}) with args: {:?}", req.name, req.id, req.arguments);
        tool.execute(req.arguments.clone())
    }

    /// Calls a tool directly, outside of any agent run.
    pub async fn call(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<String, AgentError> {
        let tool = self.resolve(name)?;
        tool.execute(arguments)
            .await
            .map_err(|err| AgentError::from_tool(name, err))
    }
}
