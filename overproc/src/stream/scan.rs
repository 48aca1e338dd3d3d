//! Line-by-line consumption of a child's output while it runs.

use std::io;
use std::os::fd::OwnedFd;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::net::unix::pipe;
use tokio::sync::oneshot;
use tokio_stream::wrappers::LinesStream;
use tracing::warn;

use super::Destination;
use crate::error::{ProcessError, Result};
use crate::process::{Descriptor, DumpNode};
use crate::Stream;

type PipeLines = Lines<BufReader<pipe::Receiver>>;

/// Destination half of a scanner: connects a direct pipe to the child.
///
/// The matching [`LineScanner`] must be drained while the process runs;
/// a child writing more than the pipe holds blocks until it is read.
#[derive(Debug)]
pub struct ScannerDestination {
    connect: Option<oneshot::Sender<pipe::Receiver>>,
}

impl ScannerDestination {
    /// Create the destination and the scanner that reads from it.
    pub fn new() -> (Self, LineScanner) {
        let (tx, rx) = oneshot::channel();
        (
            Self { connect: Some(tx) },
            LineScanner {
                pending: Some(rx),
                lines: None,
                current: String::new(),
                error: None,
            },
        )
    }
}

#[async_trait]
impl Destination for ScannerDestination {
    fn attach(&mut self, descriptor: &mut Descriptor, stream: Stream) -> Result<()> {
        if stream == Stream::Stdin {
            return Err(ProcessError::invalid_stream("ScannerDestination", stream));
        }
        let Some(connect) = self.connect.take() else {
            return Err(ProcessError::io(
                "scanner already attached",
                io::Error::from(io::ErrorKind::AlreadyExists),
            ));
        };

        let reader = descriptor.pipe_output(stream)?;
        let rx = pipe::Receiver::from_owned_fd(OwnedFd::from(reader))
            .map_err(|e| ProcessError::io(format!("registering {stream} pipe"), e))?;
        if connect.send(rx).is_err() {
            warn!(program = %descriptor.program(), "Scanner dropped before attach; output is discarded");
        }
        Ok(())
    }

    fn dump_node(&self) -> DumpNode {
        DumpNode::label("[Scanner]")
    }
}

/// A lazy, finite, non-restartable sequence of output lines.
///
/// [`scan`](Self::scan) advances to the next line and [`text`](Self::text)
/// returns it. Line terminators (`\n` or `\r\n`) are stripped.
#[derive(Debug)]
pub struct LineScanner {
    pending: Option<oneshot::Receiver<pipe::Receiver>>,
    lines: Option<PipeLines>,
    current: String,
    error: Option<io::Error>,
}

impl LineScanner {
    /// Advance to the next line.
    ///
    /// Returns `false` at end of stream, on a read error (see
    /// [`err`](Self::err)), or if the destination was never attached.
    /// Waits for the owning redirect to start if it has not yet.
    pub async fn scan(&mut self) -> bool {
        let Some(lines) = self.connected().await else {
            return false;
        };

        let next = lines.next_line().await;
        match next {
            Ok(Some(line)) => {
                self.current = line;
                true
            }
            Ok(None) => {
                self.finish();
                false
            }
            Err(e) => {
                self.error = Some(e);
                self.finish();
                false
            }
        }
    }

    /// The line produced by the last successful [`scan`](Self::scan).
    pub fn text(&self) -> &str {
        &self.current
    }

    /// The read error that ended scanning, if any.
    pub const fn err(&self) -> Option<&io::Error> {
        self.error.as_ref()
    }

    /// Convert the remaining lines into a [`Stream`](tokio_stream::Stream).
    pub async fn into_stream(mut self) -> io::Result<LinesStream<BufReader<pipe::Receiver>>> {
        if self.connected().await.is_none() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "scanner is not connected to a running process",
            ));
        }
        self.lines
            .take()
            .map(LinesStream::new)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }

    async fn connected(&mut self) -> Option<&mut PipeLines> {
        if let Some(pending) = self.pending.take() {
            match pending.await {
                Ok(rx) => self.lines = Some(BufReader::new(rx).lines()),
                Err(_) => return None,
            }
        }
        self.lines.as_mut()
    }

    fn finish(&mut self) {
        self.lines = None;
        self.current.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::stream::FileDestination;
    use crate::{Command, Process, Redirect};
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_scan_lines() {
        let (mut dest, mut scanner) = ScannerDestination::new();
        let mut desc = Descriptor::new("printf");
        desc.push_arg("a\\nb\\r\\nc".into());
        dest.attach(&mut desc, Stream::Stdout).unwrap();
        desc.spawn().unwrap();

        let mut out = Vec::new();
        while scanner.scan().await {
            out.push(scanner.text().to_string());
        }
        desc.wait().await.unwrap();

        assert_eq!(out, vec!["a", "b", "c"]);
        assert!(scanner.err().is_none());
        // Exhausted scanners stay exhausted.
        assert!(!scanner.scan().await);
    }

    #[tokio::test]
    async fn test_scan_without_attach() {
        let (dest, mut scanner) = ScannerDestination::new();
        drop(dest);
        assert!(!scanner.scan().await);
        assert!(scanner.into_stream().await.is_err());
    }

    #[tokio::test]
    async fn test_attach_twice_rejected() {
        let (mut dest, _scanner) = ScannerDestination::new();
        let mut first = Descriptor::new("true");
        let mut second = Descriptor::new("true");
        dest.attach(&mut first, Stream::Stdout).unwrap();
        assert!(dest.attach(&mut second, Stream::Stdout).is_err());
    }

    #[tokio::test]
    async fn test_drain_through_redirect_while_running() {
        // Far more than a pipe holds, so the child only finishes if drained.
        let (dest, mut scanner) = ScannerDestination::new();
        let mut redirect = Redirect::new(Command::new("seq").args(["1", "50000"])).stdout(dest);
        redirect.start().unwrap();

        let mut count = 0;
        let mut last = String::new();
        while scanner.scan().await {
            count += 1;
            last = scanner.text().to_string();
        }

        redirect.wait().await.unwrap();
        assert_eq!(count, 50_000);
        assert_eq!(last, "50000");
        assert!(scanner.err().is_none());
        assert_eq!(redirect.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_scanner_ends_when_redirect_fails_to_start() {
        let (dest, mut scanner) = ScannerDestination::new();
        let mut redirect = Redirect::new(Command::new("echo").arg("never"))
            .stdout(dest)
            .stderr(FileDestination::new("/nonexistent_dir/overproc/err.txt"));

        assert!(redirect.start().is_err());
        let scanned = tokio::time::timeout(Duration::from_secs(5), scanner.scan())
            .await
            .expect("scanner hung after a failed start");
        assert!(!scanned);
        assert!(redirect.wait().await.is_err());
    }

    #[tokio::test]
    async fn test_stream_from_stderr() {
        let (mut dest, scanner) = ScannerDestination::new();
        let mut desc = Descriptor::new("sh");
        desc.push_arg("-c".into());
        desc.push_arg("printf 'x\\ny\\n' >&2".into());
        dest.attach(&mut desc, Stream::Stderr).unwrap();
        desc.spawn().unwrap();

        let lines: Vec<String> = scanner
            .into_stream()
            .await
            .unwrap()
            .collect::<io::Result<Vec<_>>>()
            .await
            .unwrap();
        desc.wait().await.unwrap();
        assert_eq!(lines, vec!["x", "y"]);
    }
}
