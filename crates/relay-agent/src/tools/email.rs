use std::sync::{Arc, Mutex, PoisonError};

use relay_agent_core::tool::{Error as ToolError, Tool, ToolResult};
use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Deserialize, JsonSchema)]
pub struct SendEmailParameters {
    #[schemars(description = "Email address of the recipient.")]
    recipient: String,
    #[schemars(description = "Subject line of the email.")]
    subject: String,
    #[schemars(description = "Plain text body of the email.")]
    body: String,
}

/// An email delivered by [`SendEmailTool`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentEmail {
    /// Email address of the recipient.
    pub recipient: String,
    /// Subject line.
    pub subject: String,
    /// Plain text body.
    pub body: String,
}

/// Emails sent so far. Clones share the same storage.
#[derive(Clone, Debug, Default)]
pub struct Outbox(Arc<Mutex<Vec<SentEmail>>>);

impl Outbox {
    /// Creates an empty outbox.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all sent emails, oldest first.
    pub fn sent(&self) -> Vec<SentEmail> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, email: SentEmail) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(email);
    }
}

/// A tool for sending emails.
///
/// Nothing leaves the process, emails end up in an [`Outbox`].
pub struct SendEmailTool {
    parameter_schema: Value,
    outbox: Outbox,
}

impl SendEmailTool {
    /// Creates a new send email tool with its own outbox.
    #[inline]
    pub fn new() -> Self {
        Self::with_outbox(Outbox::new())
    }

    /// Creates a new send email tool delivering to the given outbox.
    #[inline]
    pub fn with_outbox(outbox: Outbox) -> Self {
        Self {
            parameter_schema: schema_for!(SendEmailParameters).to_value(),
            outbox,
        }
    }
}

impl Default for SendEmailTool {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for SendEmailTool {
    type Input = SendEmailParameters;

    fn name(&self) -> &str {
        "send_email"
    }

    fn description(&self) -> &str {
        "Sends an email to a single recipient."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: SendEmailParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let outbox = self.outbox.clone();
        async move {
            if !input.recipient.contains('@') {
                return Err(ToolError::execution_error().with_reason(format!(
                    "`{}` is not an email address",
                    input.recipient
                )));
            }
            let reply = format!(
                "Email sent to {}. Subject: {}",
                input.recipient, input.subject
            );
            outbox.push(SentEmail {
                recipient: input.recipient,
                subject: input.subject,
                body: input.body,
            });
            Ok(reply)
        }
    }
}

#[derive(Deserialize, JsonSchema)]
pub struct ReadEmailParameters {
    #[schemars(description = "Identifier of the email to read.")]
    email_id: String,
}

/// A tool for reading emails by identifier.
pub struct ReadEmailTool {
    parameter_schema: Value,
}

impl ReadEmailTool {
    /// Creates a new read email tool.
    #[inline]
    pub fn new() -> Self {
        Self {
            parameter_schema: schema_for!(ReadEmailParameters).to_value(),
        }
    }
}

impl Default for ReadEmailTool {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for ReadEmailTool {
    type Input = ReadEmailParameters;

    fn name(&self) -> &str {
        "read_email"
    }

    fn description(&self) -> &str {
        "Reads the contents of an email."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: ReadEmailParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        async move {
            Ok(format!(
                "Contents of email {}: Hello, this is a test email.",
                input.email_id
            ))
        }
    }
}
