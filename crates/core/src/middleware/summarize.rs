use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Error;
use crate::hook::{ModelCallRequest, ModelCallResponse, ModelNext, WrapModelCall};
use crate::message::{Message, Role};

/// Condenses a part of a conversation.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Returns a summary of the messages.
    async fn summarize(&self, messages: &[Message]) -> Result<String, Error>;
}

/// Keeps the model-facing history short.
///
/// Once the history sent to the model has more than `trigger` messages,
/// everything but the latest `keep` messages is replaced with a summary.
/// The thread itself is not modified.
#[derive(Clone)]
pub struct Summarization {
    summarizer: Arc<dyn Summarizer>,
    trigger: usize,
    keep: usize,
}

impl Summarization {
    /// Creates the hook.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Configuration`] unless `0 < keep < trigger`.
    pub fn new<S: Summarizer + 'static>(
        summarizer: S,
        trigger: usize,
        keep: usize,
    ) -> Result<Self, Error> {
        if keep == 0 {
            return Err(Error::Configuration(
                "summarization must keep at least one message".to_owned(),
            ));
        }
        if keep >= trigger {
            return Err(Error::Configuration(format!(
                "summarization must keep fewer messages ({keep}) than it \
                 triggers at ({trigger})"
            )));
        }
        Ok(Self {
            summarizer: Arc::new(summarizer),
            trigger,
            keep,
        })
    }

    /// Returns where the kept part of the history starts.
    fn split_point(&self, messages: &[Message]) -> usize {
        let mut split = messages.len().saturating_sub(self.keep);
        // Tool results must stay with the call that requested them.
        while split > 0
            && messages.get(split).is_some_and(|msg| msg.role() == Role::Tool)
        {
            split -= 1;
        }
        split
    }
}

#[async_trait]
impl WrapModelCall for Summarization {
    fn name(&self) -> &str {
        "summarization"
    }

    async fn wrap_model_call(
        &self,
        request: ModelCallRequest,
        next: ModelNext<'_>,
    ) -> Result<ModelCallResponse, Error> {
        if request.messages.len() <= self.trigger {
            return next.run(request).await;
        }
        let split = self.split_point(&request.messages);
        if split == 0 {
            return next.run(request).await;
        }

        let (older, recent) = request.messages.split_at(split);
        debug!("summarizing {} message(s)", older.len());
        let summary = self.summarizer.summarize(older).await?;

        let mut messages = Vec::with_capacity(recent.len() + 1);
        messages.push(Message::user(format!(
            "Here is a summary of the conversation so far:\n{summary}"
        )));
        messages.extend_from_slice(recent);
        next.run(request.with_messages(messages)).await
    }
}

#[cfg(test)]
mod tests {
    use relay_agent_model::{AssistantMessage, ModelMessage};
    use relay_agent_test_model::{PresetResponse, TestModelProvider};

    use super::*;
    use crate::agent::AgentBuilder;
    use crate::context::RunContext;

    struct CountingSummarizer;

    #[async_trait]
    impl Summarizer for CountingSummarizer {
        async fn summarize(&self, messages: &[Message]) -> Result<String, Error> {
            Ok(format!("{} earlier messages", messages.len()))
        }
    }

    #[test]
    fn test_thresholds_are_checked() {
        assert!(matches!(
            Summarization::new(CountingSummarizer, 4, 4),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            Summarization::new(CountingSummarizer, 1, 0),
            Err(Error::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_long_history_is_summarized() {
        let provider = TestModelProvider::with_responses([
            PresetResponse::text("First."),
            PresetResponse::text("Second."),
        ]);
        let agent = AgentBuilder::with_model_provider(provider.clone())
            .wrap_model_call(Summarization::new(CountingSummarizer, 4, 2).unwrap())
            .build()
            .unwrap();

        let history = vec![
            Message::user("one"),
            Message::assistant("two"),
            Message::user("three"),
        ];
        agent.run("1", history, RunContext::new()).await.unwrap();
        let outcome = agent
            .run("1", vec![Message::user("five")], RunContext::new())
            .await
            .unwrap();
        assert_eq!(outcome.messages.len(), 6);

        // 3 messages: under the trigger.
        assert_eq!(provider.requests()[0].messages.len(), 3);
        // 5 messages: the first 3 are folded into a summary.
        assert_eq!(
            provider.requests()[1].messages,
            [
                ModelMessage::User(
                    "Here is a summary of the conversation so far:\n\
                     3 earlier messages"
                        .to_owned()
                ),
                ModelMessage::Assistant(AssistantMessage {
                    content: "First.".to_owned(),
                    tool_calls: vec![],
                }),
                ModelMessage::User("five".to_owned()),
            ]
        );
    }
}
