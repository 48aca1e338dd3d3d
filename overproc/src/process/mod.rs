//! Composable process nodes.
//!
//! Every node implements [`Process`]: a leaf [`Command`], a [`Redirect`]
//! that attaches stream endpoints, a [`Pipe`] that connects two nodes
//! directly, and a [`ProcessContext`] that guards a node with cancellation.
//! Composites own their children and aggregate their failures.

mod command;
mod context;
mod descriptor;
mod dump;
mod pipe;
mod redirect;

use std::fmt;

use async_trait::async_trait;

use crate::error::Result;

pub use command::Command;
pub use context::{EscalationPolicy, GuardState, ProcessContext};
pub use descriptor::{exit_code_of, Descriptor, Signaller, EXIT_CODE_UNKNOWN};
pub use dump::{dump_tree, DumpNode};
pub use pipe::Pipe;
pub use redirect::Redirect;

/// One of a process's standard streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Stdin,
    Stdout,
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stdin => "stdin",
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        })
    }
}

/// The uniform capability of every composable unit.
///
/// `wait` must only follow a successful `start`. It reports a failure only
/// for abnormal invocation; a nonzero exit is observed through
/// [`exit_code`](Process::exit_code), which stays at
/// [`EXIT_CODE_UNKNOWN`] until `wait` completes.
#[async_trait]
pub trait Process: Send {
    /// Launch the node. Never suspends beyond the underlying spawn calls.
    fn start(&mut self) -> Result<()>;

    /// Block until the node has terminated.
    async fn wait(&mut self) -> Result<()>;

    /// Exit code of the node, or [`EXIT_CODE_UNKNOWN`] before `wait` completes.
    fn exit_code(&self) -> i32;

    /// Spawn descriptor whose output streams this node exposes.
    ///
    /// Available before `start` so composites can wire streams ahead of spawn.
    fn descriptor(&mut self) -> &mut Descriptor;

    /// Spawn descriptor that receives this node's standard input.
    fn input_descriptor(&mut self) -> &mut Descriptor {
        self.descriptor()
    }

    /// Describe this node and its children for [`dump_tree`].
    fn dump_node(&self) -> DumpNode;
}
