use async_trait::async_trait;

use crate::context::RunContext;
use crate::error::Error;
use crate::hook::{ModelCallRequest, ModelCallResponse, ModelNext, WrapModelCall};
use crate::model_client::ModelClient;

/// Picks the model of every call from the run context.
///
/// The selector returns `None` to keep the agent's model.
///
/// ```ignore
/// struct Profile {
///     is_premium: bool,
/// }
///
/// let selector = ModelSelector::new(move |ctx: &RunContext| {
///     let profile = ctx.data::<Profile>()?;
///     profile.is_premium.then(|| premium_model.clone())
/// });
/// ```
pub struct ModelSelector<F> {
    select: F,
}

impl<F> ModelSelector<F>
where
    F: Fn(&RunContext) -> Option<ModelClient> + Send + Sync,
{
    /// Creates a selector from a closure.
    #[inline]
    pub fn new(select: F) -> Self {
        Self { select }
    }
}

#[async_trait]
impl<F> WrapModelCall for ModelSelector<F>
where
    F: Fn(&RunContext) -> Option<ModelClient> + Send + Sync,
{
    fn name(&self) -> &str {
        "model_selector"
    }

    async fn wrap_model_call(
        &self,
        request: ModelCallRequest,
        next: ModelNext<'_>,
    ) -> Result<ModelCallResponse, Error> {
        let request = match (self.select)(&request.context) {
            Some(model) => {
                debug!("using model {} for this call", model.name());
                request.override_model(model)
            }
            None => request,
        };
        next.run(request).await
    }
}
