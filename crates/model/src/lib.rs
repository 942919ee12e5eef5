//! An abstraction layer for different LLMs.
//!
//! This crate establishes an unified protocol for the agent loop to talk
//! to any model backend, so that hooks and tools never depend on a
//! concrete provider. A backend only has to turn a [`ModelRequest`] into a
//! stream of [`ModelResponseEvent`]s.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
