use async_trait::async_trait;

use crate::agent::AgentState;
use crate::context::RunContext;
use crate::error::Error;
use crate::hook::{HookOutcome, NodeHook};
use crate::message::Message;

const DEFAULT_REFUSAL: &str = "I cannot respond to that request.";

/// Refuses a run if the latest user message contains a blocked keyword.
///
/// Register it at `BeforeAgent`: a refused run appends the refusal and ends
/// without calling the model.
#[derive(Clone, Debug)]
pub struct KeywordGuard {
    keywords: Vec<String>,
    refusal: String,
}

impl KeywordGuard {
    /// Creates a guard for the given keywords. Matching is case-sensitive.
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
            refusal: DEFAULT_REFUSAL.to_owned(),
        }
    }

    /// Sets the message appended when a run is refused.
    #[inline]
    pub fn with_refusal<S: Into<String>>(mut self, refusal: S) -> Self {
        self.refusal = refusal.into();
        self
    }

    fn blocked_keyword(&self, text: &str) -> Option<&str> {
        self.keywords
            .iter()
            .find(|keyword| text.contains(keyword.as_str()))
            .map(String::as_str)
    }
}

#[async_trait]
impl NodeHook for KeywordGuard {
    fn name(&self) -> &str {
        "keyword_guard"
    }

    async fn run(
        &self,
        state: &AgentState,
        _ctx: &RunContext,
    ) -> Result<HookOutcome, Error> {
        let Some(input) = state.last_user_message() else {
            return Ok(HookOutcome::proceed());
        };
        match self.blocked_keyword(input.content()) {
            Some(keyword) => {
                info!("refusing input with blocked keyword {keyword:?}");
                Ok(HookOutcome::proceed()
                    .with_message(Message::assistant(self.refusal.as_str()))
                    .jump_to_end())
            }
            None => Ok(HookOutcome::proceed()),
        }
    }
}
