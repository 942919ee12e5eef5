//! A set of built-in tools that models can use.

mod email;

pub use email::{Outbox, ReadEmailTool, SendEmailTool, SentEmail};
