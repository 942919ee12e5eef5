use std::sync::Arc;

use relay_agent_core::conversation::ThreadId;
use relay_agent_core::middleware::{
    Approval, Decision, HumanInTheLoop, KeywordGuard,
};
use relay_agent_core::{
    Agent, AgentBuilder, AgentConfig, Error, Message, RunContext, RunOutcome,
};
use relay_agent_model::ModelProvider;

use crate::tools::*;

type ApprovalHandler = Arc<dyn Fn(Approval) + Send + Sync>;

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    agent_builder: AgentBuilder,
    blocked_keywords: Vec<String>,
    on_tool_call_request: Option<ApprovalHandler>,
    thread_id: ThreadId,
    outbox: Outbox,
}

impl SessionBuilder {
    /// Creates a session builder with a specified model provider.
    pub fn with_model_provider<M: ModelProvider + 'static>(
        provider: M,
    ) -> Self {
        let agent_builder = AgentBuilder::with_model_provider(provider);
        Self {
            agent_builder,
            blocked_keywords: vec![],
            on_tool_call_request: None,
            thread_id: ThreadId::from(1u64),
            outbox: Outbox::new(),
        }
    }

    /// Sets the system prompt for the agent.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.agent_builder = self.agent_builder.with_system_prompt(prompt);
        self
    }

    /// Sets the limits and timeouts of the agent.
    #[inline]
    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.agent_builder = self.agent_builder.with_config(config);
        self
    }

    /// Refuses messages containing any of the keywords.
    pub fn with_blocked_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blocked_keywords
            .extend(keywords.into_iter().map(Into::into));
        self
    }

    /// Sets the conversation thread of the session.
    #[inline]
    pub fn with_thread_id<T: Into<ThreadId>>(mut self, thread_id: T) -> Self {
        self.thread_id = thread_id.into();
        self
    }

    /// Delivers sent emails to the given outbox.
    #[inline]
    pub fn with_outbox(mut self, outbox: Outbox) -> Self {
        self.outbox = outbox;
        self
    }

    /// Attaches a callback to be invoked when the agent wants to send an
    /// email.
    ///
    /// Without it, emails are sent without asking.
    #[inline]
    pub fn on_tool_call_request(
        mut self,
        on_tool_call_request: impl Fn(Approval) + Send + Sync + 'static,
    ) -> Self {
        self.on_tool_call_request = Some(Arc::new(on_tool_call_request));
        self
    }

    /// Builds a new session.
    ///
    /// # Errors
    ///
    /// Fails if the agent configuration is invalid.
    pub fn build(self) -> Result<Session, Error> {
        let Self {
            mut agent_builder,
            blocked_keywords,
            on_tool_call_request,
            thread_id,
            outbox,
        } = self;

        if !blocked_keywords.is_empty() {
            agent_builder =
                agent_builder.before_agent(KeywordGuard::new(blocked_keywords));
        }
        if let Some(handler) = on_tool_call_request {
            let hitl = HumanInTheLoop::new(move |approval| handler(approval))
                .interrupt_on(
                    "send_email",
                    [Decision::Approve, Decision::Reject, Decision::Edit],
                );
            agent_builder = agent_builder.wrap_tool_call(hitl);
        }

        let agent = agent_builder
            .with_tool(ReadEmailTool::new())
            .with_tool(SendEmailTool::with_outbox(outbox.clone()))
            .build()?;
        debug!("session on thread {thread_id} is ready");

        Ok(Session {
            agent,
            thread_id,
            outbox,
        })
    }
}

/// A chat session, like a window that displays messages and has a input box.
///
/// The session holds a fully configured agent bound to one conversation
/// thread, and it is basically a wrapper around [`Agent`].
#[derive(Clone)]
pub struct Session {
    agent: Agent,
    thread_id: ThreadId,
    outbox: Outbox,
}

impl Session {
    /// Sends a message to the session and waits for the agent to answer.
    pub async fn send_message(&self, message: &str) -> Result<RunOutcome, Error> {
        self.agent
            .run(
                self.thread_id.clone(),
                vec![Message::user(message)],
                RunContext::new(),
            )
            .await
    }

    /// Returns the underlying agent.
    #[inline]
    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Returns the conversation thread of this session.
    #[inline]
    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    /// Returns the emails sent in this session.
    #[inline]
    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Returns the whole conversation so far.
    #[inline]
    pub async fn history(&self) -> Vec<Message> {
        self.agent.history(self.thread_id.clone()).await
    }
}
