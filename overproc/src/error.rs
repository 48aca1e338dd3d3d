//! Error types and failure aggregation.
//!
//! Composite nodes never drop a constituent failure. Every partial failure
//! from concurrent or sequential work is folded into an [`ErrorSet`] through
//! [`merge`] or [`merge_with`].

use std::fmt;
use std::io;

use nix::sys::signal::Signal;
use thiserror::Error;

/// Template used when no explicit aggregate message is configured.
pub const DEFAULT_TEMPLATE: &str = "multiple errors: {}";

/// Process orchestration errors.
///
/// A nonzero exit status is never represented here; it is read through
/// [`Process::exit_code`](crate::Process::exit_code).
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The executable could not be launched.
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// A stream endpoint could not be opened, created, wired or closed.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Delivering a signal to a running process failed.
    #[error("failed to send {signal:?} to `{program}` (pid {pid}): {source}")]
    Signal {
        program: String,
        pid: u32,
        signal: Signal,
        #[source]
        source: nix::Error,
    },

    /// Waiting on a spawned process failed.
    #[error("failed to wait for `{program}`: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },

    /// `wait` was called on a process that was never started.
    #[error("`{program}` has not been started")]
    NotStarted { program: String },

    /// `start` was called twice, or a descriptor was rewired after spawn.
    #[error("`{program}` has already been started")]
    AlreadyStarted { program: String },

    /// One or more failures collected from a composite operation.
    #[error(transparent)]
    Aggregate(#[from] ErrorSet),
}

impl ProcessError {
    /// Build an [`ProcessError::Io`] from a context message and source error.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Build an [`ProcessError::Io`] for an endpoint wired to a stream it does not accept.
    pub(crate) fn invalid_stream(endpoint: &str, stream: crate::Stream) -> Self {
        Self::io(
            format!("{endpoint} does not accept {stream}"),
            io::Error::from(io::ErrorKind::InvalidInput),
        )
    }
}

/// Result type for process operations.
pub type Result<T> = std::result::Result<T, ProcessError>;

/// An ordered, non-empty collection of failures rendered under one message.
#[derive(Debug)]
pub struct ErrorSet {
    template: String,
    errors: Vec<ProcessError>,
}

impl ErrorSet {
    /// The constituent failures, in the order they were reported.
    pub fn errors(&self) -> &[ProcessError] {
        &self.errors
    }

    /// Consume the set, returning the constituent failures.
    pub fn into_errors(self) -> Vec<ProcessError> {
        self.errors
    }

    /// Number of constituent failures.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Always `false`: an `ErrorSet` is only built from at least one failure.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for ErrorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        match self.template.split_once("{}") {
            Some((head, tail)) => write!(f, "{head}{joined}{tail}"),
            None => write!(f, "{}: {joined}", self.template),
        }
    }
}

impl std::error::Error for ErrorSet {}

/// Merge a sequence of outcomes using [`DEFAULT_TEMPLATE`].
///
/// Successful outcomes are discarded. If every outcome succeeded the result
/// is `Ok(())`; otherwise all failures are returned, in input order, as a
/// single [`ProcessError::Aggregate`].
pub fn merge<I>(results: I) -> Result<()>
where
    I: IntoIterator<Item = Result<()>>,
{
    merge_with(DEFAULT_TEMPLATE, results)
}

/// Merge a sequence of outcomes under a custom message template.
///
/// The first `{}` in `template` is replaced by the constituent messages
/// joined with `"; "`. An empty template falls back to [`DEFAULT_TEMPLATE`].
pub fn merge_with<I>(template: &str, results: I) -> Result<()>
where
    I: IntoIterator<Item = Result<()>>,
{
    let errors: Vec<ProcessError> = results.into_iter().filter_map(Result::err).collect();
    if errors.is_empty() {
        return Ok(());
    }

    let template = if template.is_empty() {
        DEFAULT_TEMPLATE
    } else {
        template
    };

    Err(ProcessError::Aggregate(ErrorSet {
        template: template.to_string(),
        errors,
    }))
}
