//! # Client Runtime (Internal)
//!
//! The async shell around the sans-I/O [`client`](crate::client) core. It is
//! `pub(crate)`, internal to the library.
//!
//! ## Module Structure
//!
//! - [`command`]: Command enum for handle→task communication
//! - [`event_loop`]: The client task: commands, binding I/O and timers

pub(crate) mod command;
pub(crate) mod event_loop;

pub(crate) use command::Command;
