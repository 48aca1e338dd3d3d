//! Passthrough to the parent's standard streams.
//!
//! The parent streams are an injected handle set rather than implicit
//! globals, so trees can be exercised against substitute files.

use std::io;
use std::os::fd::{AsFd, OwnedFd};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;

use super::{Destination, Source};
use crate::error::{ProcessError, Result};
use crate::process::{Descriptor, DumpNode};
use crate::Stream;

/// The parent's standard input, output and error.
#[derive(Debug, Clone)]
pub struct ParentStreams {
    stdin: Arc<OwnedFd>,
    stdout: Arc<OwnedFd>,
    stderr: Arc<OwnedFd>,
}

impl ParentStreams {
    /// Use the handles of the current process.
    pub fn ambient() -> Result<Self> {
        let dup = |fd: std::os::fd::BorrowedFd<'_>, stream: Stream| {
            fd.try_clone_to_owned()
                .map(Arc::new)
                .map_err(|e| ProcessError::io(format!("duplicating parent {stream}"), e))
        };
        Ok(Self {
            stdin: dup(io::stdin().as_fd(), Stream::Stdin)?,
            stdout: dup(io::stdout().as_fd(), Stream::Stdout)?,
            stderr: dup(io::stderr().as_fd(), Stream::Stderr)?,
        })
    }

    /// Use substitute handles, e.g. files in tests.
    pub fn new(
        stdin: impl Into<OwnedFd>,
        stdout: impl Into<OwnedFd>,
        stderr: impl Into<OwnedFd>,
    ) -> Self {
        Self {
            stdin: Arc::new(stdin.into()),
            stdout: Arc::new(stdout.into()),
            stderr: Arc::new(stderr.into()),
        }
    }

    /// A fresh child-side handle for one parent stream.
    pub fn stdio(&self, stream: Stream) -> Result<Stdio> {
        let fd = match stream {
            Stream::Stdin => &self.stdin,
            Stream::Stdout => &self.stdout,
            Stream::Stderr => &self.stderr,
        };
        fd.try_clone()
            .map(Stdio::from)
            .map_err(|e| ProcessError::io(format!("duplicating parent {stream}"), e))
    }
}

fn resolve(streams: &mut Option<ParentStreams>) -> Result<&ParentStreams> {
    let resolved = match streams.take() {
        Some(resolved) => resolved,
        None => ParentStreams::ambient()?,
    };
    Ok(streams.insert(resolved))
}

/// Feeds a child's standard input from the parent's standard input.
#[derive(Debug, Clone, Default)]
pub struct ParentSource {
    streams: Option<ParentStreams>,
}

impl ParentSource {
    /// Use the ambient standard input, resolved when wired.
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn with_streams(streams: ParentStreams) -> Self {
        Self {
            streams: Some(streams),
        }
    }
}

#[async_trait]
impl Source for ParentSource {
    fn attach(&mut self, descriptor: &mut Descriptor) -> Result<()> {
        let stdio = resolve(&mut self.streams)?.stdio(Stream::Stdin)?;
        descriptor.set_stdin(stdio)
    }

    fn dump_node(&self) -> DumpNode {
        DumpNode::label("[Parent stdin]")
    }
}

/// Sends a child's output stream to one of the parent's output streams.
///
/// Either child stream may target either parent stream, so a child's stderr
/// can be folded into the parent's stdout.
#[derive(Debug, Clone)]
pub struct ParentDestination {
    target: Stream,
    streams: Option<ParentStreams>,
}

impl ParentDestination {
    /// Target the parent's standard output.
    pub const fn stdout() -> Self {
        Self {
            target: Stream::Stdout,
            streams: None,
        }
    }

    /// Target the parent's standard error.
    pub const fn stderr() -> Self {
        Self {
            target: Stream::Stderr,
            streams: None,
        }
    }

    /// Target `target` within a substitute handle set.
    pub fn with_streams(streams: ParentStreams, target: Stream) -> Self {
        Self {
            target,
            streams: Some(streams),
        }
    }
}

#[async_trait]
impl Destination for ParentDestination {
    fn attach(&mut self, descriptor: &mut Descriptor, stream: Stream) -> Result<()> {
        if stream == Stream::Stdin {
            return Err(ProcessError::invalid_stream("ParentDestination", stream));
        }
        if self.target == Stream::Stdin {
            return Err(ProcessError::invalid_stream("parent input", stream));
        }
        let stdio = resolve(&mut self.streams)?.stdio(self.target)?;
        descriptor.set_output(stream, stdio)
    }

    fn dump_node(&self) -> DumpNode {
        DumpNode::label(format!("[Parent {}]", self.target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambient_streams() {
        let streams = ParentStreams::ambient().unwrap();
        assert!(streams.stdio(Stream::Stdout).is_ok());
    }

    #[test]
    fn test_destination_rejects_stdin() {
        let mut dest = ParentDestination::stdout();
        let mut desc = Descriptor::new("true");
        assert!(dest.attach(&mut desc, Stream::Stdin).is_err());
    }

    #[test]
    fn test_destination_rejects_parent_input_target() {
        let null = || std::fs::File::open("/dev/null").unwrap();
        let streams = ParentStreams::new(null(), null(), null());
        let mut dest = ParentDestination::with_streams(streams, Stream::Stdin);
        let mut desc = Descriptor::new("true");
        assert!(dest.attach(&mut desc, Stream::Stdout).is_err());
    }

    #[test]
    fn test_labels() {
        assert_eq!(
            ParentDestination::stderr().dump_node(),
            DumpNode::label("[Parent stderr]")
        );
        assert_eq!(ParentSource::new().dump_node(), DumpNode::label("[Parent stdin]"));
    }
}
