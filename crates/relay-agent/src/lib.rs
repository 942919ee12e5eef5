//! An out-of-the-box email assistant built on the relay agent loop.
//!
//! The crate includes a CLI tool that replays a scripted conversation in
//! the terminal. And you can also use it as a library to bring the agent
//! into your own host apps.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod session;
pub mod tools;

pub use session::{Session, SessionBuilder};

/// Re-exports of [`relay_agent_core`] crate.
pub mod core {
    pub use relay_agent_core::*;
}
