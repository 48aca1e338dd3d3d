//! Direct process-to-process pipes.

use async_trait::async_trait;
use tracing::debug;

use super::{Descriptor, DumpNode, Process, Stream};
use crate::error::{merge, ProcessError, Result};

/// Connects one output stream of `from` straight into the standard input of `to`.
///
/// The connection is an OS pipe; no buffering layer sits in between. The
/// consumer starts before the producer so nothing the producer writes can
/// precede a reader. Both sides are waited on concurrently and each runs to
/// completion regardless of the other's outcome.
///
/// # Example
///
/// ```rust,no_run
/// use overproc::{Command, Pipe, Process, Stream};
///
/// #[tokio::main]
/// async fn main() -> overproc::Result<()> {
///     let mut pipe = Pipe::new(
///         Command::new("printf").arg("123\\n456\\n"),
///         Stream::Stdout,
///         Command::new("grep").arg("2"),
///     );
///     pipe.start()?;
///     pipe.wait().await?;
///     println!("grep exited with {}", pipe.exit_code());
///     Ok(())
/// }
/// ```
pub struct Pipe {
    from: Box<dyn Process>,
    stream: Stream,
    to: Box<dyn Process>,
}

impl Pipe {
    pub fn new(from: impl Process + 'static, stream: Stream, to: impl Process + 'static) -> Self {
        Self {
            from: Box::new(from),
            stream,
            to: Box::new(to),
        }
    }

    /// Which of the producer's streams feeds the consumer.
    pub const fn stream(&self) -> Stream {
        self.stream
    }
}

#[async_trait]
impl Process for Pipe {
    fn start(&mut self) -> Result<()> {
        if self.stream == Stream::Stdin {
            return Err(ProcessError::invalid_stream("Pipe", self.stream));
        }

        let reader = self.from.descriptor().pipe_output(self.stream)?;
        self.to.input_descriptor().set_stdin(reader)?;

        self.to.start()?;
        self.from.start()?;
        debug!(
            from = %self.from.descriptor().program(),
            to = %self.to.descriptor().program(),
            stream = %self.stream,
            "Pipe started"
        );
        Ok(())
    }

    async fn wait(&mut self) -> Result<()> {
        let (from, to) = tokio::join!(self.from.wait(), self.to.wait());
        merge([from, to])
    }

    fn exit_code(&self) -> i32 {
        self.to.exit_code()
    }

    fn descriptor(&mut self) -> &mut Descriptor {
        self.to.descriptor()
    }

    fn input_descriptor(&mut self) -> &mut Descriptor {
        self.from.input_descriptor()
    }

    fn dump_node(&self) -> DumpNode {
        DumpNode::new("Pipe")
            .attr(format!("stream: {}", self.stream))
            .child("from", self.from.dump_node())
            .child("to", self.to.dump_node())
    }
}
