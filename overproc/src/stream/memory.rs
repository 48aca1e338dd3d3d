//! In-memory output capture.

use std::os::fd::OwnedFd;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::net::unix::pipe;
use tokio::task::JoinHandle;

use super::Destination;
use crate::error::{ProcessError, Result};
use crate::process::{Descriptor, DumpNode};
use crate::Stream;

const CHUNK_SIZE: usize = 8192;

/// Accumulates a child's output in memory.
///
/// Clones share the same buffer, so a caller can keep one clone and hand the
/// other to a [`Redirect`](crate::Redirect). Read it with
/// [`read_all`](Self::read_all) once the redirect has been waited on.
#[derive(Debug, Default)]
pub struct MemoryBuffer {
    data: Arc<Mutex<Vec<u8>>>,
    copier: Option<JoinHandle<std::io::Result<()>>>,
}

impl MemoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes written so far.
    pub fn read_all(&self) -> Vec<u8> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Bytes written so far, lossily decoded as UTF-8.
    pub fn read_string(&self) -> String {
        String::from_utf8_lossy(&self.read_all()).into_owned()
    }
}

impl Clone for MemoryBuffer {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            copier: None,
        }
    }
}

#[async_trait]
impl Destination for MemoryBuffer {
    fn attach(&mut self, descriptor: &mut Descriptor, stream: Stream) -> Result<()> {
        if stream == Stream::Stdin {
            return Err(ProcessError::invalid_stream("MemoryBuffer", stream));
        }

        let reader = descriptor.pipe_output(stream)?;
        let mut rx = pipe::Receiver::from_owned_fd(OwnedFd::from(reader))
            .map_err(|e| ProcessError::io(format!("registering {stream} pipe"), e))?;

        let data = Arc::clone(&self.data);
        self.copier = Some(tokio::spawn(async move {
            let mut chunk = vec![0u8; CHUNK_SIZE];
            loop {
                let n = rx.read(&mut chunk).await?;
                if n == 0 {
                    return Ok(());
                }
                data.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(&chunk[..n]);
            }
        }));
        Ok(())
    }

    /// Wait for the copy task to drain the pipe.
    async fn close(&mut self) -> Result<()> {
        let Some(copier) = self.copier.take() else {
            return Ok(());
        };
        copier
            .await
            .map_err(|e| ProcessError::io("collecting buffered output", std::io::Error::other(e)))?
            .map_err(|e| ProcessError::io("reading buffered output", e))
    }

    fn dump_node(&self) -> DumpNode {
        DumpNode::label("[MemoryBuffer]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_data() {
        let buf = MemoryBuffer::new();
        let other = buf.clone();
        other
            .data
            .lock()
            .unwrap()
            .extend_from_slice(b"shared");
        assert_eq!(buf.read_all(), b"shared");
        assert_eq!(buf.read_string(), "shared");
    }

    #[tokio::test]
    async fn test_close_without_attach() {
        let mut buf = MemoryBuffer::new();
        buf.close().await.unwrap();
        assert!(buf.read_all().is_empty());
    }

    #[tokio::test]
    async fn test_captures_large_output() {
        let mut buf = MemoryBuffer::new();
        let mut desc = Descriptor::new("head");
        desc.push_arg("-c".into());
        desc.push_arg("200000".into());
        desc.set_stdin(std::fs::File::open("/dev/zero").unwrap()).unwrap();

        buf.attach(&mut desc, Stream::Stdout).unwrap();
        desc.spawn().unwrap();
        desc.wait().await.unwrap();
        buf.close().await.unwrap();

        assert_eq!(buf.read_all().len(), 200_000);
    }
}
