// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`spawner`] defines the `ProcessSpawner` / `ChildProcess` seam that the
//!   supervisor and test runner are written against.
//! - [`process`] is the production implementation using
//!   `tokio::process::Command`; child output is forwarded chunk by chunk over
//!   mpsc channels.

pub mod process;
pub mod spawner;

pub use process::TokioSpawner;
pub use spawner::{
    BoxFuture, ChildIo, ChildProcess, CommandOutput, CommandSpec, ProcessSpawner,
};
