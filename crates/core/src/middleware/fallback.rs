use async_trait::async_trait;

use crate::error::Error;
use crate::hook::{ModelCallRequest, ModelCallResponse, ModelNext, WrapModelCall};
use crate::model_client::ModelClient;

/// Sends a failed model call to other models, in order.
///
/// Only backend errors trigger a fallback. If every model fails, the error
/// of the last one is returned.
#[derive(Clone, Debug)]
pub struct ModelFallback {
    models: Vec<ModelClient>,
}

impl ModelFallback {
    /// Creates a fallback hook with the given models.
    pub fn new<I: IntoIterator<Item = ModelClient>>(models: I) -> Self {
        Self {
            models: models.into_iter().collect(),
        }
    }
}

#[async_trait]
impl WrapModelCall for ModelFallback {
    fn name(&self) -> &str {
        "model_fallback"
    }

    async fn wrap_model_call(
        &self,
        request: ModelCallRequest,
        next: ModelNext<'_>,
    ) -> Result<ModelCallResponse, Error> {
        let mut last_err = match next.run(request.clone()).await {
            Err(err @ Error::ModelBackend { .. }) => err,
            result => return result,
        };
        for model in &self.models {
            warn!(
                "model call failed ({last_err}), falling back to {}",
                model.name()
            );
            let request = request.clone().override_model(model.clone());
            last_err = match next.run(request).await {
                Err(err @ Error::ModelBackend { .. }) => err,
                result => return result,
            };
        }
        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use relay_agent_test_model::{PresetResponse, TestModelProvider};

    use super::*;
    use crate::agent::AgentBuilder;
    use crate::context::RunContext;
    use crate::message::Message;

    #[tokio::test]
    async fn test_fallback_in_order() {
        let primary = TestModelProvider::with_responses([
            PresetResponse::text("unreachable").with_failures(0),
        ]);
        let secondary = TestModelProvider::named("secondary");
        let tertiary = TestModelProvider::named("tertiary");
        tertiary.add_response(PresetResponse::text("Hello from tertiary"));

        let agent = AgentBuilder::with_model_provider(primary.clone())
            .wrap_model_call(ModelFallback::new([
                ModelClient::new(secondary.clone()),
                ModelClient::new(tertiary.clone()),
            ]))
            .build()
            .unwrap();

        let outcome = agent
            .run("1", vec![Message::user("Hi")], RunContext::new())
            .await
            .unwrap();
        assert_eq!(
            outcome.final_message().unwrap().content(),
            "Hello from tertiary"
        );
        assert_eq!(primary.call_count(), 1);
        assert_eq!(secondary.call_count(), 1);
        assert_eq!(tertiary.call_count(), 1);
    }
}
