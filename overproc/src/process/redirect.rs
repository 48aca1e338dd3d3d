//! Stream redirection around a wrapped node.

use async_trait::async_trait;
use tracing::warn;

use super::{Descriptor, DumpNode, Process, Stream};
use crate::error::{merge, Result};
use crate::stream::{Destination, Source};

/// Attaches stream endpoints to a wrapped node.
///
/// Endpoints are wired into the node's descriptor before it starts and
/// closed after it has been waited on, whatever the outcome of the wait.
/// If `start` fails, everything already wired is detached again so a
/// following `wait` still returns and closes every endpoint.
///
/// # Example
///
/// ```rust,no_run
/// use overproc::stream::{FileDestination, MemoryBuffer};
/// use overproc::{Command, Process, Redirect};
///
/// #[tokio::main]
/// async fn main() -> overproc::Result<()> {
///     let errors = MemoryBuffer::new();
///     let mut echo = Redirect::new(Command::new("echo").arg("123"))
///         .stdout(FileDestination::new("/tmp/output.txt"))
///         .stderr(errors.clone());
///
///     echo.start()?;
///     echo.wait().await?;
///     println!("stderr: {}", errors.read_string());
///     Ok(())
/// }
/// ```
pub struct Redirect {
    from: Box<dyn Process>,
    stdin: Option<Box<dyn Source>>,
    stdout: Option<Box<dyn Destination>>,
    stderr: Option<Box<dyn Destination>>,
}

impl Redirect {
    pub fn new(from: impl Process + 'static) -> Self {
        Self {
            from: Box::new(from),
            stdin: None,
            stdout: None,
            stderr: None,
        }
    }

    /// Feed standard input from `source`.
    pub fn stdin(mut self, source: impl Source + 'static) -> Self {
        self.stdin = Some(Box::new(source));
        self
    }

    /// Send standard output to `destination`.
    pub fn stdout(mut self, destination: impl Destination + 'static) -> Self {
        self.stdout = Some(Box::new(destination));
        self
    }

    /// Send standard error to `destination`.
    pub fn stderr(mut self, destination: impl Destination + 'static) -> Self {
        self.stderr = Some(Box::new(destination));
        self
    }

    fn wire(&mut self) -> Result<()> {
        if let Some(source) = self.stdin.as_mut() {
            source.attach(self.from.input_descriptor())?;
        }
        if let Some(destination) = self.stdout.as_mut() {
            destination.attach(self.from.descriptor(), Stream::Stdout)?;
        }
        if let Some(destination) = self.stderr.as_mut() {
            destination.attach(self.from.descriptor(), Stream::Stderr)?;
        }
        Ok(())
    }

    /// Drop whatever `wire` handed to the descriptor that was never spawned.
    fn unwire(&mut self) {
        if self.stdin.is_some() {
            self.from.input_descriptor().clear(Stream::Stdin);
        }
        if self.stdout.is_some() {
            self.from.descriptor().clear(Stream::Stdout);
        }
        if self.stderr.is_some() {
            self.from.descriptor().clear(Stream::Stderr);
        }
    }
}

#[async_trait]
impl Process for Redirect {
    fn start(&mut self) -> Result<()> {
        let started = self.wire().and_then(|()| self.from.start());
        if let Err(ref e) = started {
            warn!(error = %e, "Redirect failed to start, detaching endpoints");
            self.unwire();
        }
        started
    }

    async fn wait(&mut self) -> Result<()> {
        let mut results = vec![self.from.wait().await];

        if let Some(source) = self.stdin.as_mut() {
            results.push(source.close().await);
        }
        if let Some(destination) = self.stdout.as_mut() {
            results.push(destination.close().await);
        }
        if let Some(destination) = self.stderr.as_mut() {
            results.push(destination.close().await);
        }

        let merged = merge(results);
        if let Err(ref e) = merged {
            warn!(error = %e, "Redirect finished with errors");
        }
        merged
    }

    fn exit_code(&self) -> i32 {
        self.from.exit_code()
    }

    fn descriptor(&mut self) -> &mut Descriptor {
        self.from.descriptor()
    }

    fn input_descriptor(&mut self) -> &mut Descriptor {
        self.from.input_descriptor()
    }

    fn dump_node(&self) -> DumpNode {
        let mut node = DumpNode::new("Redirect").child("proc", self.from.dump_node());
        if let Some(source) = self.stdin.as_ref() {
            node = node.child("stdin", source.dump_node());
        }
        if let Some(destination) = self.stdout.as_ref() {
            node = node.child("stdout", destination.dump_node());
        }
        if let Some(destination) = self.stderr.as_ref() {
            node = node.child("stderr", destination.dump_node());
        }
        node
    }
}
