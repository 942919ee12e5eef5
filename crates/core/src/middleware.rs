//! Built-in hooks.
//!
//! | hook | point |
//! |---|---|
//! | [`KeywordGuard`] | before agent |
//! | [`ModelCallLimit`] | before model |
//! | [`StepLogger`] | before / after model |
//! | [`ModelRetry`], [`ModelFallback`], [`ModelSelector`] | around model calls |
//! | [`PiiRedaction`], [`Summarization`] | around model calls |
//! | [`ToolCallLimit`], [`ToolRetry`], [`HumanInTheLoop`], [`ToolEmulator`] | around tool calls |

mod approval;
mod emulator;
mod fallback;
mod guard;
mod limit;
mod logging;
mod pii;
mod retry;
mod select;
mod summarize;

pub use approval::{Approval, Decision, HumanInTheLoop};
pub use emulator::ToolEmulator;
pub use fallback::ModelFallback;
pub use guard::KeywordGuard;
pub use limit::{ModelCallLimit, ToolCallLimit};
pub use logging::StepLogger;
pub use pii::{PiiDetector, PiiMatch, PiiRedaction, PiiStrategy};
pub use retry::{ModelRetry, RetryPolicy, ToolRetry};
pub use select::ModelSelector;
pub use summarize::{Summarization, Summarizer};
