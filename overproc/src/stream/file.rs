//! File-backed endpoints.

use std::fs::File;
use std::os::fd::IntoRawFd;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::{Destination, Source};
use crate::error::{ProcessError, Result};
use crate::process::{Descriptor, DumpNode};
use crate::Stream;

/// Close `file`, surfacing the OS error instead of discarding it on drop.
fn close_file(file: File, path: &Path) -> Result<()> {
    nix::unistd::close(file.into_raw_fd())
        .map_err(|errno| ProcessError::io(format!("closing {}", path.display()), errno.into()))
}

/// Feeds a child's standard input from a file.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    file: Option<File>,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&mut self) -> Result<File> {
        let file = match self.file.take() {
            Some(file) => file,
            None => {
                let file = File::open(&self.path)
                    .map_err(|e| ProcessError::io(format!("opening {}", self.path.display()), e))?;
                debug!(path = %self.path.display(), "Opened file source");
                file
            }
        };
        let dup = file.try_clone();
        self.file = Some(file);
        dup.map_err(|e| ProcessError::io(format!("duplicating {}", self.path.display()), e))
    }
}

#[async_trait]
impl Source for FileSource {
    fn attach(&mut self, descriptor: &mut Descriptor) -> Result<()> {
        let file = self.open()?;
        descriptor.set_stdin(file)
    }

    async fn close(&mut self) -> Result<()> {
        match self.file.take() {
            Some(file) => close_file(file, &self.path),
            None => Ok(()),
        }
    }

    fn dump_node(&self) -> DumpNode {
        DumpNode::label(format!("[File {}]", self.path.display()))
    }
}

/// Writes a child's output stream to a file, truncating it first.
#[derive(Debug)]
pub struct FileDestination {
    path: PathBuf,
    file: Option<File>,
}

impl FileDestination {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn create(&mut self) -> Result<File> {
        let file = match self.file.take() {
            Some(file) => file,
            None => {
                let file = File::create(&self.path)
                    .map_err(|e| ProcessError::io(format!("creating {}", self.path.display()), e))?;
                debug!(path = %self.path.display(), "Created file destination");
                file
            }
        };
        let dup = file.try_clone();
        self.file = Some(file);
        dup.map_err(|e| ProcessError::io(format!("duplicating {}", self.path.display()), e))
    }
}

#[async_trait]
impl Destination for FileDestination {
    fn attach(&mut self, descriptor: &mut Descriptor, stream: Stream) -> Result<()> {
        if stream == Stream::Stdin {
            return Err(ProcessError::invalid_stream("FileDestination", stream));
        }
        let file = self.create()?;
        descriptor.set_output(stream, file)
    }

    async fn close(&mut self) -> Result<()> {
        match self.file.take() {
            Some(file) => close_file(file, &self.path),
            None => Ok(()),
        }
    }

    fn dump_node(&self) -> DumpNode {
        DumpNode::label(format!("[File {}]", self.path.display()))
    }
}
