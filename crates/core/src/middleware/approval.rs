use std::collections::HashMap;
use std::fmt::{self, Debug, Display};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::hook::{ToolInvocation, ToolNext, WrapToolCall};
use crate::tool::{Error as ToolError, ToolResult};

/// A decision a human can make about a tool call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Run the call as requested.
    Approve,
    /// Don't run the call.
    Reject,
    /// Run the call with different arguments.
    Edit,
}

impl Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Approve => write!(f, "approve"),
            Decision::Reject => write!(f, "reject"),
            Decision::Edit => write!(f, "edit"),
        }
    }
}

#[derive(Debug)]
enum Verdict {
    Approved,
    Rejected(Option<String>),
    Edited(Value),
}

impl Verdict {
    fn decision(&self) -> Decision {
        match self {
            Verdict::Approved => Decision::Approve,
            Verdict::Rejected(_) => Decision::Reject,
            Verdict::Edited(_) => Decision::Edit,
        }
    }
}

/// Approval for a tool call request.
///
/// Dropping it without a decision rejects the call.
pub struct Approval {
    tool: String,
    arguments: Value,
    justification: String,
    allowed: Vec<Decision>,
    reply_tx: oneshot::Sender<Verdict>,
}

impl Approval {
    /// Returns the name of the tool to call.
    #[inline]
    pub fn what(&self) -> &str {
        &self.tool
    }

    /// Returns the arguments requested by the model.
    #[inline]
    pub fn arguments(&self) -> &Value {
        &self.arguments
    }

    /// Returns what the tool does, from its definition.
    #[inline]
    pub fn justification(&self) -> &str {
        &self.justification
    }

    /// Returns the decisions allowed for this call.
    #[inline]
    pub fn allowed_decisions(&self) -> &[Decision] {
        &self.allowed
    }

    /// Returns `true` if the decision is allowed for this call.
    #[inline]
    pub fn allows(&self, decision: Decision) -> bool {
        self.allowed.contains(&decision)
    }

    /// Approves the request.
    #[inline]
    pub fn approve(self) {
        self.reply(Verdict::Approved);
    }

    /// Rejects the request with an optional reason.
    #[inline]
    pub fn reject(self, reason: Option<String>) {
        self.reply(Verdict::Rejected(reason));
    }

    /// Approves the request with edited arguments.
    #[inline]
    pub fn edit(self, arguments: Value) {
        self.reply(Verdict::Edited(arguments));
    }

    fn reply(self, verdict: Verdict) {
        // The run may be gone already, nobody is waiting then.
        _ = self.reply_tx.send(verdict);
    }
}

impl Debug for Approval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Approval")
            .field("what", &self.tool)
            .field("arguments", &self.arguments)
            .field("justification", &self.justification)
            .field("allowed", &self.allowed)
            .finish_non_exhaustive()
    }
}

impl Display for Approval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.tool, self.arguments, self.justification)
    }
}

type ApprovalHandler = Arc<dyn Fn(Approval) + Send + Sync>;

/// Pauses selected tool calls until a human decides about them.
///
/// Every guarded call is handed to the callback as an [`Approval`]. The
/// callback should return quickly; the decision can be made later, from
/// anywhere, by consuming the approval.
#[derive(Clone)]
pub struct HumanInTheLoop {
    interrupt_on: HashMap<String, Vec<Decision>>,
    on_request: ApprovalHandler,
}

impl HumanInTheLoop {
    /// Creates the hook with a callback receiving approvals.
    pub fn new(on_request: impl Fn(Approval) + Send + Sync + 'static) -> Self {
        Self {
            interrupt_on: HashMap::new(),
            on_request: Arc::new(on_request),
        }
    }

    /// Guards a tool, allowing the given decisions.
    pub fn interrupt_on<S, I>(mut self, tool: S, allowed: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = Decision>,
    {
        self.interrupt_on
            .insert(tool.into(), allowed.into_iter().collect());
        self
    }
}

impl Debug for HumanInTheLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HumanInTheLoop")
            .field("interrupt_on", &self.interrupt_on)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl WrapToolCall for HumanInTheLoop {
    fn name(&self) -> &str {
        "human_in_the_loop"
    }

    async fn wrap_tool_call(
        &self,
        invocation: ToolInvocation,
        next: ToolNext<'_>,
    ) -> ToolResult {
        let Some(allowed) = self.interrupt_on.get(invocation.tool_name()) else {
            return next.run(invocation).await;
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let approval = Approval {
            tool: invocation.tool_name().to_owned(),
            arguments: invocation.call.arguments.clone(),
            justification: invocation
                .definition
                .as_ref()
                .map(|def| def.description.clone())
                .unwrap_or_default(),
            allowed: allowed.clone(),
            reply_tx,
        };
        debug!("waiting for approval: {approval}");
        (self.on_request)(approval);

        let verdict = reply_rx.await.unwrap_or(Verdict::Rejected(None));
        if !allowed.contains(&verdict.decision()) {
            return Err(ToolError::permission_denied().with_reason(format!(
                "decision `{}` is not allowed for `{}`",
                verdict.decision(),
                invocation.tool_name()
            )));
        }
        match verdict {
            Verdict::Approved => next.run(invocation).await,
            Verdict::Edited(arguments) => {
                next.run(invocation.with_arguments(arguments)).await
            }
            Verdict::Rejected(reason) => {
                info!("call to {} rejected", invocation.tool_name());
                Err(ToolError::permission_denied().with_reason(
                    reason.unwrap_or_else(|| "the user rejected this call".to_owned()),
                ))
            }
        }
    }
}
