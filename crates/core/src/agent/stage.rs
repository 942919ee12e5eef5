use crate::hook::JumpTo;

/// A stage of the agent loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Before anything happened.
    Start,
    /// Running before-agent hooks.
    BeforeAgent,
    /// Running before-model hooks, the model call and after-model hooks.
    ModelCall,
    /// Running the tool calls requested by the last model call.
    ToolCall,
    /// Running after-agent hooks.
    AfterAgent,
    /// The run is over.
    End,
}

/// What happened in a stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transition {
    /// The stage completed normally.
    Proceed,
    /// A hook asked to jump.
    Jump(JumpTo),
    /// The model asked for tool calls.
    ToolsRequested,
    /// The model gave its final answer.
    Finished,
    /// The run was cancelled.
    Cancelled,
}

impl Stage {
    /// Returns the stage following this one, or `None` if the transition
    /// is not allowed here.
    pub fn next(self, transition: Transition) -> Option<Stage> {
        use Transition::*;

        let next = match (self, transition) {
            (Stage::End, _) => return None,
            (Stage::AfterAgent, _) => Stage::End,
            (_, Cancelled) => Stage::AfterAgent,

            (Stage::Start, Proceed) => Stage::BeforeAgent,

            (Stage::BeforeAgent, Proceed) => Stage::ModelCall,
            (Stage::BeforeAgent, Jump(JumpTo::Model)) => Stage::ModelCall,
            (Stage::BeforeAgent, Jump(JumpTo::End)) => Stage::AfterAgent,

            (Stage::ModelCall, ToolsRequested) => Stage::ToolCall,
            (Stage::ModelCall, Finished) => Stage::AfterAgent,
            (Stage::ModelCall, Jump(JumpTo::Model)) => Stage::ModelCall,
            (Stage::ModelCall, Jump(JumpTo::End)) => Stage::AfterAgent,

            (Stage::ToolCall, Proceed) => Stage::ModelCall,
            (Stage::ToolCall, Jump(JumpTo::Model)) => Stage::ModelCall,
            (Stage::ToolCall, Jump(JumpTo::End)) => Stage::AfterAgent,

            _ => return None,
        };
        Some(next)
    }
}
