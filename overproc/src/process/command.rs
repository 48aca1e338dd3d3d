//! Leaf process node.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;

use super::descriptor::{exit_code_of, Descriptor, EXIT_CODE_UNKNOWN};
use super::{DumpNode, Process};
use crate::error::Result;

/// A single external process.
///
/// # Example
///
/// ```rust,no_run
/// use overproc::{Command, Process};
///
/// #[tokio::main]
/// async fn main() -> overproc::Result<()> {
///     let mut ls = Command::new("ls").arg("-la").current_dir("/tmp");
///     ls.start()?;
///     ls.wait().await?;
///     println!("Exit code: {}", ls.exit_code());
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Command {
    descriptor: Descriptor,
    exit_code: i32,
}

impl Command {
    /// Create a process for the given program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            descriptor: Descriptor::new(program),
            exit_code: EXIT_CODE_UNKNOWN,
        }
    }

    /// Create a process with an explicit environment.
    ///
    /// With `include_ambient`, ambient variables not named in `env` are added
    /// to it. The result replaces the ambient environment at spawn time.
    pub fn with_env<I, S>(
        program: impl Into<String>,
        args: I,
        env: HashMap<String, String>,
        include_ambient: bool,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(program)
            .args(args)
            .envs(env)
            .inherit_env(include_ambient)
    }

    /// Add an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.descriptor.push_arg(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for arg in args {
            self.descriptor.push_arg(arg.into());
        }
        self
    }

    /// Set an environment variable.
    ///
    /// Once any variable is set the process no longer sees the ambient
    /// environment unless [`inherit_env`](Self::inherit_env) is enabled.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.descriptor.set_env_var(key.into(), value.into());
        self
    }

    /// Set multiple environment variables.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in vars {
            self.descriptor.set_env_var(k.into(), v.into());
        }
        self
    }

    /// Merge ambient variables into an explicit environment.
    pub fn inherit_env(mut self, inherit: bool) -> Self {
        self.descriptor.set_inherit_env(inherit);
        self
    }

    /// Set the working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.descriptor.set_current_dir(dir.into());
        self
    }
}

#[async_trait]
impl Process for Command {
    fn start(&mut self) -> Result<()> {
        self.descriptor.spawn()
    }

    async fn wait(&mut self) -> Result<()> {
        let status = self.descriptor.wait().await?;
        self.exit_code = exit_code_of(status);
        Ok(())
    }

    fn exit_code(&self) -> i32 {
        self.exit_code
    }

    fn descriptor(&mut self) -> &mut Descriptor {
        &mut self.descriptor
    }

    fn dump_node(&self) -> DumpNode {
        DumpNode::new("Process").attr(format!("cmd: {:?}", self.descriptor.argv()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessError;

    #[tokio::test]
    async fn test_exit_code_sentinel_until_wait() {
        let mut proc = Command::new("sh").args(["-c", "exit 3"]);
        assert_eq!(proc.exit_code(), EXIT_CODE_UNKNOWN);

        proc.start().unwrap();
        assert_eq!(proc.exit_code(), EXIT_CODE_UNKNOWN);

        proc.wait().await.unwrap();
        assert_eq!(proc.exit_code(), 3);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_not_an_error() {
        let mut proc = Command::new("false");
        proc.start().unwrap();
        assert!(proc.wait().await.is_ok());
        assert_eq!(proc.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_spawn_error_is_distinct() {
        let mut proc = Command::new("nonexistent_command_12345");
        let err = proc.start().unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
        assert_eq!(proc.exit_code(), EXIT_CODE_UNKNOWN);

        // Never started, so waiting is rejected instead of reporting an exit.
        assert!(matches!(
            proc.wait().await,
            Err(ProcessError::NotStarted { .. })
        ));
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let mut proc = Command::new("true");
        proc.start().unwrap();
        assert!(matches!(
            proc.start(),
            Err(ProcessError::AlreadyStarted { .. })
        ));
        proc.wait().await.unwrap();
        assert_eq!(proc.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_explicit_env_replaces_ambient() {
        // HOME is normally set; with a replaced environment the child must not see it.
        let mut env = HashMap::new();
        env.insert("MY_VAR".to_string(), "test_value".to_string());
        let mut proc = Command::with_env(
            "/bin/sh",
            ["-c", r#"[ "$MY_VAR" = test_value ] && [ -z "$HOME" ]"#],
            env,
            false,
        );
        proc.start().unwrap();
        proc.wait().await.unwrap();
        assert_eq!(proc.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_explicit_env_with_ambient() {
        let mut proc = Command::new("/bin/sh")
            .args(["-c", r#"[ "$MY_VAR" = test_value ] && [ -n "$PATH" ]"#])
            .env("MY_VAR", "test_value")
            .inherit_env(true);
        proc.start().unwrap();
        proc.wait().await.unwrap();
        assert_eq!(proc.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker"), b"").unwrap();

        let mut proc = Command::new("test").args(["-f", "marker"]).current_dir(dir.path());
        proc.start().unwrap();
        proc.wait().await.unwrap();
        assert_eq!(proc.exit_code(), 0);
    }

    #[test]
    fn test_descriptor_available_before_start() {
        let mut proc = Command::new("echo").arg("hello");
        let desc = proc.descriptor();
        assert!(!desc.is_started());
        assert_eq!(desc.argv(), vec!["echo", "hello"]);
    }
}
