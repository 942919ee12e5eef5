//! A local fake model for testing and demo purpose.

mod preset;

use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use relay_agent_model::{
    ErrorKind, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct TestModelResponse {
    events: Vec<PresetEvent>,
    finish_reason: ModelFinishReason,
    event_idx: usize,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();

        let Some(sleep) = &mut this.sleep else {
            this.sleep = Some(Box::pin(sleep(this.delay)));
            return Pin::new(this).poll_next_event(cx);
        };
        ready!(sleep.as_mut().poll(cx));
        this.sleep = None;

        let event = match this.events.get(this.event_idx) {
            Some(PresetEvent::MessageDelta(msg)) => {
                ModelResponseEvent::MessageDelta(msg.clone())
            }
            Some(PresetEvent::ToolCall(req)) => {
                ModelResponseEvent::ToolCall(req.clone())
            }
            None if this.event_idx == this.events.len() => {
                ModelResponseEvent::Completed(this.finish_reason)
            }
            // In case this method is called after completion.
            None => return Poll::Ready(Ok(None)),
        };
        this.event_idx += 1;
        Poll::Ready(Ok(Some(event)))
    }
}

struct Step {
    preset: PresetResponse,
    attempts: u64,
}

#[derive(Default)]
struct Script {
    steps: Vec<Step>,
    cursor: usize,
    requests: Vec<ModelRequest>,
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to setup the script, which is how the
/// model should respond to each request. Every successful request consumes
/// the next step; a step with injected failures fails that many times
/// before it is consumed. If there are no enough steps in the script, an
/// error will be returned.
///
/// Clones share the same script, so a test can keep a clone around to
/// inspect the requests after the provider has been handed to an agent.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved.
#[derive(Clone)]
pub struct TestModelProvider {
    name: Arc<str>,
    script: Arc<Mutex<Script>>,
    delay: Duration,
}

impl Default for TestModelProvider {
    #[inline]
    fn default() -> Self {
        Self::named("test-model")
    }
}

impl TestModelProvider {
    /// Creates an empty provider with the given model name.
    #[inline]
    pub fn named<S: Into<String>>(name: S) -> Self {
        let name: String = name.into();
        Self {
            name: name.into(),
            script: Default::default(),
            delay: Duration::from_millis(1),
        }
    }

    /// Creates a provider that plays the given responses in order.
    pub fn with_responses(
        responses: impl IntoIterator<Item = PresetResponse>,
    ) -> Self {
        let provider = Self::default();
        for response in responses {
            provider.add_response(response);
        }
        provider
    }

    /// Appends a response to the script.
    #[inline]
    pub fn add_response(&self, preset: PresetResponse) {
        self.lock().steps.push(Step {
            preset,
            attempts: 0,
        });
    }

    /// Sets the delay between two streamed events.
    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = duration;
    }

    /// Returns how many requests have been sent, including failed ones.
    #[inline]
    pub fn call_count(&self) -> usize {
        self.lock().requests.len()
    }

    /// Returns all the requests received so far.
    #[inline]
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.lock().requests.clone()
    }

    /// Returns how many script steps have not been consumed yet.
    #[inline]
    pub fn remaining(&self) -> usize {
        let script = self.lock();
        script.steps.len() - script.cursor
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_response(
        &self,
        req: &ModelRequest,
    ) -> Result<TestModelResponse, Error> {
        let mut script = self.lock();
        script.requests.push(req.clone());

        let cursor = script.cursor;
        let Some(step) = script.steps.get_mut(cursor) else {
            return Err(Error {
                message: "no enough steps",
                kind: ErrorKind::Other,
            });
        };

        step.attempts += 1;
        let should_fail = match step.preset.failures {
            Some(0) => true,
            Some(failures) => step.attempts <= failures,
            None => false,
        };
        if should_fail {
            return Err(Error {
                message: "injected failure",
                kind: ErrorKind::RateLimitExceeded,
            });
        }

        let finish_reason = if step.preset.has_tool_call() {
            ModelFinishReason::ToolCalls
        } else {
            ModelFinishReason::Stop
        };
        let events = step.preset.events.clone();
        script.cursor += 1;

        Ok(TestModelResponse {
            events,
            finish_reason,
            event_idx: 0,
            delay: self.delay,
            sleep: None,
        })
    }
}

impl Debug for TestModelProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestModelProvider")
            .field("name", &self.name)
            .field("remaining", &self.remaining())
            .finish_non_exhaustive()
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn name(&self) -> &str {
        &self.name
    }

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        ready(self.next_response(req))
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use relay_agent_model::{ModelMessage, ModelTool, ToolCallRequest};
    use serde_json::json;

    use super::*;

    async fn collect_response(
        resp: TestModelResponse,
    ) -> (String, Option<ToolCallRequest>, ModelFinishReason) {
        let mut resp = pin!(resp);
        let mut msg = String::new();
        let mut tool_call = None;
        loop {
            let event = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
                .await
                .unwrap()
                .unwrap();
            match event {
                ModelResponseEvent::Completed(reason) => {
                    return (msg, tool_call, reason);
                }
                ModelResponseEvent::MessageDelta(delta) => {
                    msg.push_str(&delta);
                }
                ModelResponseEvent::ToolCall(req) => tool_call = Some(req),
            }
        }
    }

    #[tokio::test]
    async fn test_send_request() {
        let provider = TestModelProvider::default();
        provider.add_response(PresetResponse::with_events([
            PresetEvent::MessageDelta("Hello, ".to_owned()),
            PresetEvent::MessageDelta("world!".to_owned()),
        ]));
        provider.add_response(PresetResponse::with_events([
            PresetEvent::MessageDelta("Sure, let me take a look.".to_owned()),
            PresetEvent::tool_call(
                "tool:1",
                "read_email",
                json!({ "email_id": "123" }),
            ),
        ]));

        let mut req = ModelRequest {
            system_prompt: None,
            messages: vec![ModelMessage::User("Hi".to_owned())],
            tools: vec![ModelTool {
                name: "read_email".to_owned(),
                description: "Reads an email".to_owned(),
                parameters: json!({ "type": "object" }),
            }],
        };
        let resp = provider.send_request(&req).await.unwrap();
        let (msg, _, reason) = collect_response(resp).await;
        assert_eq!(msg, "Hello, world!");
        assert_eq!(reason, ModelFinishReason::Stop);

        req.messages
            .push(ModelMessage::User("Read email 123".to_owned()));
        let resp = provider.send_request(&req).await.unwrap();
        let (msg, tool_call, reason) = collect_response(resp).await;
        assert_eq!(msg, "Sure, let me take a look.");
        assert_eq!(reason, ModelFinishReason::ToolCalls);
        let tool_call = tool_call.unwrap();
        assert_eq!(tool_call.name, "read_email");
        assert_eq!(tool_call.arguments, json!({ "email_id": "123" }));

        assert_eq!(provider.call_count(), 2);
        assert_eq!(provider.remaining(), 0);
        assert!(provider.send_request(&req).await.is_err());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let provider = TestModelProvider::with_responses([
            PresetResponse::text("finally").with_failures(2),
        ]);
        let clone = provider.clone();
        let req = ModelRequest::default();

        for _ in 0..2 {
            let err = provider.send_request(&req).await.err().unwrap();
            assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
        }
        let resp = provider.send_request(&req).await.unwrap();
        let (msg, _, _) = collect_response(resp).await;
        assert_eq!(msg, "finally");

        // Clones observe the same script.
        assert_eq!(clone.call_count(), 3);
        assert_eq!(clone.remaining(), 0);
    }
}
