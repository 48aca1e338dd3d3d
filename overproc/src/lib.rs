//! overproc - composable external process orchestration.
//!
//! Build a tree of process nodes, start it, wait on it:
//!
//! - [`Command`] runs one external program.
//! - [`Redirect`] attaches stream endpoints (files, the parent's own streams,
//!   in-memory buffers, line scanners) to a node.
//! - [`Pipe`] connects one node's output directly to another's input.
//! - [`ProcessContext`] stops a node by signal when cancelled.
//!
//! Composite nodes wait for every child and close every endpoint before
//! reporting, and fold all failures into one [`ErrorSet`].
//!
//! ```rust,no_run
//! use overproc::stream::MemoryBuffer;
//! use overproc::{Command, Pipe, Process, Redirect, Stream};
//!
//! #[tokio::main]
//! async fn main() -> overproc::Result<()> {
//!     let out = MemoryBuffer::new();
//!     let mut tree = Redirect::new(Pipe::new(
//!         Command::new("printf").arg("123\\n456\\n"),
//!         Stream::Stdout,
//!         Command::new("grep").arg("2"),
//!     ))
//!     .stdout(out.clone());
//!
//!     tree.start()?;
//!     tree.wait().await?;
//!     assert_eq!(out.read_string(), "123\n");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod process;
pub mod stream;

pub use error::{merge, merge_with, ErrorSet, ProcessError, Result};
pub use process::{
    dump_tree, exit_code_of, Command, Descriptor, DumpNode, EscalationPolicy, GuardState, Pipe,
    Process, ProcessContext, Redirect, Signaller, Stream, EXIT_CODE_UNKNOWN,
};
