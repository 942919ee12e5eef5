use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Error;
use crate::hook::{ModelCallRequest, ModelCallResponse, ModelNext, WrapModelCall};
use crate::message::{Message, Role};

/// A span of personal information found in a text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PiiMatch {
    /// What kind of information it is, e.g. `email`.
    pub kind: String,
    /// The byte range of the span.
    pub range: Range<usize>,
}

/// Finds personal information in texts.
///
/// Detection itself is out of the scope of this crate, hosts plug in their
/// own detector.
pub trait PiiDetector: Send + Sync {
    /// Returns the spans found in the text.
    fn detect(&self, text: &str) -> Vec<PiiMatch>;
}

/// What to do with detected spans.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PiiStrategy {
    /// Replace the span with a `[REDACTED_<KIND>]` marker.
    Redact,
    /// Replace all but the last 4 characters with `*`.
    Mask,
    /// Don't call the model at all, answer with a refusal.
    Block,
}

/// Hides personal information from the model.
///
/// Only the model-facing view is rewritten, the thread keeps the original
/// messages.
#[derive(Clone)]
pub struct PiiRedaction {
    detector: Arc<dyn PiiDetector>,
    strategy: PiiStrategy,
    include_tool_results: bool,
}

impl PiiRedaction {
    /// Applies the strategy to user messages.
    pub fn new<D: PiiDetector + 'static>(detector: D, strategy: PiiStrategy) -> Self {
        Self {
            detector: Arc::new(detector),
            strategy,
            include_tool_results: false,
        }
    }

    /// Also applies the strategy to tool results.
    #[inline]
    pub fn include_tool_results(mut self, include: bool) -> Self {
        self.include_tool_results = include;
        self
    }

    fn applies_to(&self, msg: &Message) -> bool {
        match msg.role() {
            Role::User => true,
            Role::Tool => self.include_tool_results,
            Role::System | Role::Assistant => false,
        }
    }
}

fn rewrite(text: &str, mut matches: Vec<PiiMatch>, strategy: PiiStrategy) -> String {
    matches.sort_by_key(|m| m.range.start);

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for m in matches {
        let Range { start, end } = m.range;
        // Overlapping or out of bounds spans are skipped.
        let Some(span) = text.get(start..end).filter(|_| start >= cursor) else {
            continue;
        };
        out.push_str(&text[cursor..start]);
        match strategy {
            PiiStrategy::Mask => {
                let count = span.chars().count();
                for (idx, ch) in span.chars().enumerate() {
                    out.push(if idx + 4 < count { '*' } else { ch });
                }
            }
            PiiStrategy::Redact | PiiStrategy::Block => {
                out.push_str(&format!("[REDACTED_{}]", m.kind.to_uppercase()));
            }
        }
        cursor = end;
    }
    out.push_str(&text[cursor..]);
    out
}

#[async_trait]
impl WrapModelCall for PiiRedaction {
    fn name(&self) -> &str {
        "pii_redaction"
    }

    async fn wrap_model_call(
        &self,
        request: ModelCallRequest,
        next: ModelNext<'_>,
    ) -> Result<ModelCallResponse, Error> {
        let mut messages = Vec::with_capacity(request.messages.len());
        for msg in &request.messages {
            let matches = if self.applies_to(msg) {
                self.detector.detect(msg.content())
            } else {
                vec![]
            };
            if matches.is_empty() {
                messages.push(msg.clone());
                continue;
            }
            if self.strategy == PiiStrategy::Block {
                info!("blocking model call, found {} in input", matches[0].kind);
                return Ok(ModelCallResponse::text(format!(
                    "I can't process messages containing personal information ({}).",
                    matches[0].kind
                )));
            }
            debug!("rewriting {} span(s) of personal information", matches.len());
            messages.push(msg.with_content(rewrite(msg.content(), matches, self.strategy)));
        }
        next.run(request.with_messages(messages)).await
    }
}
