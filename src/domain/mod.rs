//! Domain layer containing conversation state and its invariants.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (ids, timestamps, errors, state machines)
//! - `conversation` - Threads, interactions, checkpoints, session metrics and
//!   prompt enhancement
//!
//! Nothing in this layer performs I/O.

pub mod conversation;
pub mod foundation;
