//! Tool call supports.

mod error;
mod registry;

use std::future::ready;
use std::marker::PhantomData;
use std::pin::Pin;

use relay_agent_model::ModelTool;
use schemars::{JsonSchema, schema_for};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::Instrument;

pub use error::{Error, ErrorKind};
pub use registry::ToolRegistry;

/// The result of a tool call.
pub type ToolResult = Result<String, Error>;

/// A boxed future that resolves to a [`ToolResult`].
pub type ToolFuture = Pin<Box<dyn Future<Output = ToolResult> + Send>>;

/// A tool that can be called by the model.
///
/// Implementations of this trait should be stateless, and may not maintain any
/// internal state.
///
/// The tool can be context-aware, meaning it can access additional information
/// about the current execution context, such as the working directory or the
/// current user. To do this, make the context an immutable state of the tool,
/// which can be set during initialization, and copy it when executing.
pub trait Tool: Send + Sync + 'static {
    /// The type of input that the tool accepts.
    ///
    /// Arguments from the model are deserialized into this type before the
    /// tool runs, so it doubles as the parameter schema validator.
    type Input: DeserializeOwned;

    /// Returns the name of the tool.
    fn name(&self) -> &str;

    /// Returns the description of the tool.
    fn description(&self) -> &str;

    /// Returns the parameter schema of the tool.
    fn parameter_schema(&self) -> &Value;

    /// Executes the tool with the given input.
    ///
    /// This method must return a future that is fully independent of `self`,
    /// and the future should be cancellation safe.
    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static;
}

/// A type-erased [`Tool`], as stored in the registry.
pub trait ToolObject: Send + Sync + 'static {
    /// Returns the name of the tool.
    fn name(&self) -> &str;

    /// Returns the description of the tool.
    fn description(&self) -> &str;

    /// Returns the parameter schema of the tool.
    fn parameter_schema(&self) -> &Value;

    /// Validates the raw arguments and executes the tool.
    ///
    /// Arguments that don't match the schema fail with
    /// [`ErrorKind::InvalidArguments`] and the tool is not executed.
    fn execute(&self, arguments: Value) -> ToolFuture;

    /// Returns the definition exposed to the model.
    fn definition(&self) -> ModelTool {
        ModelTool {
            name: self.name().to_owned(),
            description: self.description().to_owned(),
            parameters: self.parameter_schema().clone(),
        }
    }
}

pub(crate) struct AnyTool<T: Tool>(pub T);

impl<T: Tool> ToolObject for AnyTool<T> {
    #[inline]
    fn name(&self) -> &str {
        self.0.name()
    }

    #[inline]
    fn description(&self) -> &str {
        self.0.description()
    }

    #[inline]
    fn parameter_schema(&self) -> &Value {
        self.0.parameter_schema()
    }

    fn execute(&self, arguments: Value) -> ToolFuture {
        let input: T::Input = match serde_json::from_value(arguments) {
            Ok(input) => input,
            Err(err) => {
                let reason = format!("{err}");
                return Box::pin(ready(ToolResult::Err(
                    Error::invalid_arguments().with_reason(reason),
                )));
            }
        };
        Box::pin(
            self.0
                .execute(input)
                .instrument(debug_span!("tool execute", tool = self.0.name())),
        )
    }
}

/// A tool backed by a closure.
///
/// The parameter schema is generated from the input type, so a plain
/// function can be registered without writing a dedicated type:
///
/// ```ignore
/// #[derive(Deserialize, JsonSchema)]
/// struct ReadEmail {
///     email_id: String,
/// }
///
/// let tool = FunctionTool::new("read_email", "Reads an email", |input: ReadEmail| async move {
///     Ok(format!("Contents of email {}", input.email_id))
/// });
/// ```
pub struct FunctionTool<I, F> {
    name: String,
    description: String,
    parameter_schema: Value,
    handler: F,
    _input: PhantomData<fn(I)>,
}

impl<I, F, Fut> FunctionTool<I, F>
where
    I: JsonSchema + DeserializeOwned + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ToolResult> + Send + 'static,
{
    /// Creates a tool from a name, a description and a handler.
    pub fn new<S1: Into<String>, S2: Into<String>>(
        name: S1,
        description: S2,
        handler: F,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameter_schema: schema_for!(I).to_value(),
            handler,
            _input: PhantomData,
        }
    }
}

impl<I, F, Fut> Tool for FunctionTool<I, F>
where
    I: DeserializeOwned + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ToolResult> + Send + 'static,
{
    type Input = I;

    #[inline]
    fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    fn description(&self) -> &str {
        &self.description
    }

    #[inline]
    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[inline]
    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        (self.handler)(input)
    }
}
