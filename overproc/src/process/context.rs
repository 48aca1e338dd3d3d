//! Cancellation guard with two-stage signal escalation.
//!
//! When the guard's token is cancelled (or its deadline passes) while the
//! wrapped node is still running, the guard sends the soft signal, gives the
//! node a grace period to exit, then sends the hard signal. Whatever happens,
//! `wait` reports the wrapped node's own `wait` result.

use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::Signal;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Descriptor, DumpNode, Process, Signaller};
use crate::error::Result;

/// Default grace period between the soft and hard signals.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

/// Signals used to stop a guarded node, and the grace period between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationPolicy {
    /// Sent as soon as cancellation is observed.
    pub soft: Signal,
    /// How long to wait for natural exit after the soft signal.
    pub grace: Duration,
    /// Sent if the node is still running once the grace period elapses.
    pub hard: Signal,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            soft: Signal::SIGTERM,
            grace: DEFAULT_GRACE,
            hard: Signal::SIGKILL,
        }
    }
}

impl EscalationPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn soft(mut self, signal: Signal) -> Self {
        self.soft = signal;
        self
    }

    pub const fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub const fn hard(mut self, signal: Signal) -> Self {
        self.hard = signal;
        self
    }
}

/// Where a guard is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Idle,
    Running,
    SoftSignaled,
    HardSignaled,
    Terminated,
}

/// A node that is stopped by signal when a cancellation token fires.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
///
/// use overproc::{Command, EscalationPolicy, Process, ProcessContext};
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> overproc::Result<()> {
///     let token = CancellationToken::new();
///     let mut sleep = ProcessContext::new(Command::new("sleep").arg("100"), token.clone())
///         .policy(EscalationPolicy::new().grace(Duration::from_secs(1)))
///         .with_timeout(Duration::from_secs(10));
///
///     sleep.start()?;
///     token.cancel();
///     sleep.wait().await?;
///     println!("exit code: {}", sleep.exit_code());
///     Ok(())
/// }
/// ```
pub struct ProcessContext {
    inner: Box<dyn Process>,
    token: CancellationToken,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    policy: EscalationPolicy,
    state: GuardState,
    signals_sent: Vec<Signal>,
}

impl ProcessContext {
    pub fn new(inner: impl Process + 'static, token: CancellationToken) -> Self {
        Self {
            inner: Box::new(inner),
            token,
            timeout: None,
            deadline: None,
            policy: EscalationPolicy::default(),
            state: GuardState::Idle,
            signals_sent: Vec::new(),
        }
    }

    /// Also cancel once `timeout` has elapsed since `start`.
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub const fn policy(mut self, policy: EscalationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub const fn state(&self) -> GuardState {
        self.state
    }

    /// Signals delivered so far, in order.
    pub fn signals_sent(&self) -> &[Signal] {
        &self.signals_sent
    }
}

/// Resolves when `token` is cancelled or `deadline` passes.
async fn cancelled(token: &CancellationToken, deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep_until(deadline) => {
                    debug!("Guard deadline reached");
                }
            }
        }
        None => token.cancelled().await,
    }
}

/// Whether the wrapped process has already been reaped.
fn reaped(signaller: Option<&Signaller>) -> bool {
    signaller.is_some_and(Signaller::is_reaped)
}

/// Deliver `signal`, tolerating failure; the wrapped wait still decides the outcome.
fn deliver(signaller: Option<&Signaller>, signal: Signal, sent: &mut Vec<Signal>) {
    let Some(signaller) = signaller else {
        warn!(signal = ?signal, "No running process to signal");
        return;
    };
    match signaller.send(signal) {
        Ok(true) => sent.push(signal),
        Ok(false) => {}
        Err(e) => warn!(error = %e, "Ignoring signal delivery failure"),
    }
}

#[async_trait]
impl Process for ProcessContext {
    fn start(&mut self) -> Result<()> {
        self.inner.start()?;
        self.deadline = self.timeout.map(|timeout| Instant::now() + timeout);
        self.state = GuardState::Running;
        Ok(())
    }

    async fn wait(&mut self) -> Result<()> {
        let signaller = self.inner.descriptor().signaller();
        let mut wait = self.inner.wait();

        tokio::select! {
            biased;
            result = &mut wait => {
                self.state = GuardState::Terminated;
                return result;
            }
            () = cancelled(&self.token, self.deadline) => {}
        }

        // Natural exit already happened; the rest of the wait is teardown.
        if reaped(signaller.as_ref()) {
            debug!("Cancelled after the process exited, not signalling");
            let result = wait.await;
            self.state = GuardState::Terminated;
            return result;
        }

        self.state = GuardState::SoftSignaled;
        deliver(signaller.as_ref(), self.policy.soft, &mut self.signals_sent);

        if let Ok(result) = tokio::time::timeout(self.policy.grace, &mut wait).await {
            self.state = GuardState::Terminated;
            return result;
        }

        if reaped(signaller.as_ref()) {
            let result = wait.await;
            self.state = GuardState::Terminated;
            return result;
        }

        self.state = GuardState::HardSignaled;
        deliver(signaller.as_ref(), self.policy.hard, &mut self.signals_sent);

        let result = wait.await;
        self.state = GuardState::Terminated;
        result
    }

    fn exit_code(&self) -> i32 {
        self.inner.exit_code()
    }

    fn descriptor(&mut self) -> &mut Descriptor {
        self.inner.descriptor()
    }

    fn input_descriptor(&mut self) -> &mut Descriptor {
        self.inner.input_descriptor()
    }

    fn dump_node(&self) -> DumpNode {
        let mut node = DumpNode::new("ProcessContext")
            .attr(format!("soft: {:?}", self.policy.soft))
            .attr(format!("grace: {:?}", self.policy.grace))
            .attr(format!("hard: {:?}", self.policy.hard));
        if let Some(timeout) = self.timeout {
            node = node.attr(format!("timeout: {timeout:?}"));
        }
        node.child("proc", self.inner.dump_node())
    }
}
