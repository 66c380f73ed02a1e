//! Shared test utilities for dedupmail integration tests.
//!
//! This module provides:
//! - `ScriptedMailbox`, an in-memory `MailboxTransport` with failure injection
//! - `TestHarness` for runs against a file-backed index in a temp directory
//! - Builders for messages and pipeline configurations

pub mod builders;
pub mod harness;
pub mod mailbox;

pub use builders::*;
pub use harness::{CancelAfterBatches, RecordingProgress, TestHarness};
pub use mailbox::{Fault, Op, ScriptedMailbox};
