//! # Sidekick Core
//!
//! The thin service layer between the IDE messenger and the two engines:
//! inbound messages are decoded and dispatched to the indexer orchestrator
//! or the completion provider, and progress flows back out through the
//! [`Messenger`] trait. Transport (IPC, sockets, subprocess supervision)
//! belongs to the host; this crate only speaks [`sidekick_protocol`]
//! shapes.

mod service;

pub use service::{CoreError, CoreService, Messenger};
