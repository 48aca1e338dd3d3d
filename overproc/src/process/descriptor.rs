//! Spawn descriptor: the configuration and live handle of one OS process.
//!
//! A descriptor exists before its process does. Composites wire standard
//! streams into it ahead of [`Descriptor::spawn`]; the wired handles are moved
//! into the child at spawn time so the parent keeps no stray copies of pipe
//! ends around.

use std::collections::HashMap;
use std::io::{self, PipeReader};
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command as TokioCommand};
use tracing::{debug, info};

use super::Stream;
use crate::error::{ProcessError, Result};

/// Exit code reported before a process has been waited on.
pub const EXIT_CODE_UNKNOWN: i32 = -1;

/// Configuration and live OS handle for a single external process.
#[derive(Debug)]
pub struct Descriptor {
    program: String,
    args: Vec<String>,
    env: Option<HashMap<String, String>>,
    inherit_env: bool,
    current_dir: Option<PathBuf>,
    stdin: Option<Stdio>,
    stdout: Option<Stdio>,
    stderr: Option<Stdio>,
    child: Option<Child>,
    pid: Option<u32>,
    reaped: Arc<Mutex<bool>>,
}

impl Descriptor {
    /// Create an unstarted descriptor for `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: None,
            inherit_env: false,
            current_dir: None,
            stdin: None,
            stdout: None,
            stderr: None,
            child: None,
            pid: None,
            reaped: Arc::default(),
        }
    }

    /// The executable path or name.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The argument list, excluding the program itself.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }

    pub(crate) fn push_arg(&mut self, arg: String) {
        self.args.push(arg);
    }

    pub(crate) fn set_env_var(&mut self, key: String, value: String) {
        self.env.get_or_insert_with(HashMap::new).insert(key, value);
    }

    pub(crate) fn set_inherit_env(&mut self, inherit: bool) {
        self.inherit_env = inherit;
    }

    pub(crate) fn set_current_dir(&mut self, dir: PathBuf) {
        self.current_dir = Some(dir);
    }

    /// The environment the process will be spawned with.
    ///
    /// `None` means the ambient environment is used unchanged. When an
    /// explicit mapping exists and ambient inheritance is enabled, every
    /// ambient variable not already named in the mapping is added to it.
    pub fn resolved_env(&self) -> Option<HashMap<String, String>> {
        let mut env = self.env.clone()?;
        if self.inherit_env {
            for (key, value) in std::env::vars() {
                env.entry(key).or_insert(value);
            }
        }
        Some(env)
    }

    /// Whether [`spawn`](Self::spawn) has succeeded.
    pub const fn is_started(&self) -> bool {
        self.child.is_some()
    }

    /// OS process id, once spawned.
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the process has exited and been waited on.
    pub fn is_reaped(&self) -> bool {
        *self.reaped.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop whatever has been wired to `stream` and not yet spawned.
    ///
    /// Releasing a pipe's write end this way lets its reader see EOF.
    pub(crate) fn clear(&mut self, stream: Stream) {
        let slot = match stream {
            Stream::Stdin => &mut self.stdin,
            Stream::Stdout => &mut self.stdout,
            Stream::Stderr => &mut self.stderr,
        };
        slot.take();
    }

    /// Assign the child's standard input.
    pub fn set_stdin(&mut self, stdio: impl Into<Stdio>) -> Result<()> {
        self.ensure_unstarted()?;
        self.stdin = Some(stdio.into());
        Ok(())
    }

    /// Assign the child's standard output.
    pub fn set_stdout(&mut self, stdio: impl Into<Stdio>) -> Result<()> {
        self.ensure_unstarted()?;
        self.stdout = Some(stdio.into());
        Ok(())
    }

    /// Assign the child's standard error.
    pub fn set_stderr(&mut self, stdio: impl Into<Stdio>) -> Result<()> {
        self.ensure_unstarted()?;
        self.stderr = Some(stdio.into());
        Ok(())
    }

    /// Assign one of the child's output streams.
    pub fn set_output(&mut self, stream: Stream, stdio: impl Into<Stdio>) -> Result<()> {
        match stream {
            Stream::Stdout => self.set_stdout(stdio),
            Stream::Stderr => self.set_stderr(stdio),
            Stream::Stdin => Err(ProcessError::invalid_stream("output wiring", stream)),
        }
    }

    /// Connect a direct OS pipe to one of the child's output streams.
    ///
    /// The write end becomes the child's `stream`; the read end is returned to
    /// the caller. No buffering layer sits between the two.
    pub fn pipe_output(&mut self, stream: Stream) -> Result<PipeReader> {
        if stream == Stream::Stdin {
            return Err(ProcessError::invalid_stream("a direct pipe", stream));
        }
        self.ensure_unstarted()?;
        let (reader, writer) = io::pipe()
            .map_err(|e| ProcessError::io(format!("creating {stream} pipe for `{}`", self.program), e))?;
        self.set_output(stream, writer)?;
        Ok(reader)
    }

    /// Spawn the process with everything wired so far.
    pub fn spawn(&mut self) -> Result<()> {
        self.ensure_unstarted()?;
        debug!(program = %self.program, args = ?self.args, "Starting process");

        let mut cmd = TokioCommand::new(&self.program);
        cmd.args(&self.args);

        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }

        if let Some(env) = self.resolved_env() {
            cmd.env_clear();
            cmd.envs(env);
        }

        if let Some(stdin) = self.stdin.take() {
            cmd.stdin(stdin);
        }
        if let Some(stdout) = self.stdout.take() {
            cmd.stdout(stdout);
        }
        if let Some(stderr) = self.stderr.take() {
            cmd.stderr(stderr);
        }

        // `cmd` drops at the end of this scope, closing the parent's copies of
        // any handles moved into it.
        let child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        self.pid = child.id();
        debug!(program = %self.program, pid = ?self.pid, "Process spawned");
        self.child = Some(child);
        Ok(())
    }

    /// Block until the process exits.
    ///
    /// Repeated calls after exit return the same status.
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        let Some(child) = self.child.as_mut() else {
            return Err(ProcessError::NotStarted {
                program: self.program.clone(),
            });
        };

        let status = child.wait().await.map_err(|source| ProcessError::Wait {
            program: self.program.clone(),
            source,
        })?;
        *self.reaped.lock().unwrap_or_else(PoisonError::into_inner) = true;
        debug!(program = %self.program, pid = ?self.pid, status = %status, "Process exited");
        Ok(status)
    }

    /// A detached handle that can signal this process while it is being waited on.
    pub fn signaller(&self) -> Option<Signaller> {
        self.pid.map(|pid| Signaller {
            program: self.program.clone(),
            pid,
            reaped: Arc::clone(&self.reaped),
        })
    }

    /// Send `signal` to the running process.
    ///
    /// Returns `false` without signalling once the process has been reaped.
    pub fn signal(&self, signal: Signal) -> Result<bool> {
        self.signaller()
            .ok_or_else(|| ProcessError::NotStarted {
                program: self.program.clone(),
            })?
            .send(signal)
    }

    fn ensure_unstarted(&self) -> Result<()> {
        if self.is_started() {
            return Err(ProcessError::AlreadyStarted {
                program: self.program.clone(),
            });
        }
        Ok(())
    }
}

/// Signals one spawned process by pid without borrowing its descriptor.
///
/// Shares the descriptor's reaped flag, so a pid the OS may already have
/// recycled is never signalled.
#[derive(Debug, Clone)]
pub struct Signaller {
    program: String,
    pid: u32,
    reaped: Arc<Mutex<bool>>,
}

impl Signaller {
    /// Deliver `signal` to the process.
    ///
    /// Returns `Ok(false)` without signalling if the process has already been
    /// reaped.
    pub fn send(&self, signal: Signal) -> Result<bool> {
        let reaped = self.reaped.lock().unwrap_or_else(PoisonError::into_inner);
        if *reaped {
            debug!(program = %self.program, pid = self.pid, signal = ?signal, "Process already reaped, not signalling");
            return Ok(false);
        }

        let raw = i32::try_from(self.pid).map_err(|_| ProcessError::Signal {
            program: self.program.clone(),
            pid: self.pid,
            signal,
            source: nix::Error::ESRCH,
        })?;

        kill(Pid::from_raw(raw), signal).map_err(|source| ProcessError::Signal {
            program: self.program.clone(),
            pid: self.pid,
            signal,
            source,
        })?;
        info!(program = %self.program, pid = self.pid, signal = ?signal, "Sent signal");
        Ok(true)
    }

    /// Whether the process has exited and been waited on.
    pub fn is_reaped(&self) -> bool {
        *self.reaped.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The target process id.
    pub const fn pid(&self) -> u32 {
        self.pid
    }
}

/// Map an exit status to the code reported by process nodes.
///
/// Signal terminations map to the negated signal number.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|sig| -sig))
        .unwrap_or(EXIT_CODE_UNKNOWN)
}
