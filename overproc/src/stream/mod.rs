//! Stream endpoints for [`Redirect`](crate::Redirect).
//!
//! A [`Source`] feeds a child's standard input; a [`Destination`] receives a
//! child's standard output or standard error. Endpoints are lazy: nothing is
//! opened until the owning redirect wires them, right before spawn.

mod file;
mod memory;
mod parent;
mod scan;

use async_trait::async_trait;

use crate::error::Result;
use crate::process::{Descriptor, DumpNode};
use crate::Stream;

pub use file::{FileDestination, FileSource};
pub use memory::MemoryBuffer;
pub use parent::{ParentDestination, ParentSource, ParentStreams};
pub use scan::{LineScanner, ScannerDestination};

/// Produces a readable endpoint for a child's standard input.
#[async_trait]
pub trait Source: Send {
    /// Wire this source into `descriptor` as its standard input.
    fn attach(&mut self, descriptor: &mut Descriptor) -> Result<()>;

    /// Release whatever `attach` opened. Called once the child has exited.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// One-line description for tree dumps.
    fn dump_node(&self) -> DumpNode;
}

/// Produces a writable endpoint for a child's standard output or error.
#[async_trait]
pub trait Destination: Send {
    /// Wire this destination into `descriptor` as `stream`.
    ///
    /// Fails with [`ProcessError::Io`](crate::ProcessError::Io) when `stream`
    /// is [`Stream::Stdin`].
    fn attach(&mut self, descriptor: &mut Descriptor, stream: Stream) -> Result<()>;

    /// Release whatever `attach` opened. Called once the child has exited.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// One-line description for tree dumps.
    fn dump_node(&self) -> DumpNode;
}
