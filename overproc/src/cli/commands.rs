//! CLI command execution.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use overproc::stream::{FileDestination, FileSource, ParentDestination, ParentSource};
use overproc::{dump_tree, Command, EscalationPolicy, Pipe, Process, ProcessContext, Redirect, Stream};

use super::args::{split_pipeline, Cli, Commands, GuardArgs};

/// Execute the parsed command line and return the exit code to report.
pub async fn execute(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Run {
            stdin,
            stdout,
            stderr,
            guard,
            command,
        } => {
            let tree = redirected(command_from(&command)?, stdin, stdout, stderr);
            run_guarded(tree, &guard).await
        }
        Commands::Pipe {
            stderr,
            guard,
            commands,
        } => {
            let Some((producer, consumer)) = split_pipeline(&commands) else {
                bail!("expected PRODUCER... ::: CONSUMER...");
            };
            let stream = if stderr { Stream::Stderr } else { Stream::Stdout };
            let tree = Pipe::new(command_from(producer)?, stream, command_from(consumer)?);
            run_guarded(tree, &guard).await
        }
    }
}

fn command_from(words: &[String]) -> Result<Command> {
    let Some((program, args)) = words.split_first() else {
        bail!("no program given");
    };
    Ok(Command::new(program.as_str()).args(args.iter().cloned()))
}

/// Each unspecified stream passes through to the parent.
fn redirected(
    command: Command,
    stdin: Option<PathBuf>,
    stdout: Option<PathBuf>,
    stderr: Option<PathBuf>,
) -> Redirect {
    let redirect = Redirect::new(command);
    let redirect = match stdin {
        Some(path) => redirect.stdin(FileSource::new(path)),
        None => redirect.stdin(ParentSource::new()),
    };
    let redirect = match stdout {
        Some(path) => redirect.stdout(FileDestination::new(path)),
        None => redirect.stdout(ParentDestination::stdout()),
    };
    match stderr {
        Some(path) => redirect.stderr(FileDestination::new(path)),
        None => redirect.stderr(ParentDestination::stderr()),
    }
}

fn seconds(value: f64, flag: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value).with_context(|| format!("invalid --{flag} value: {value}"))
}

async fn run_guarded(tree: impl Process + 'static, args: &GuardArgs) -> Result<i32> {
    let token = CancellationToken::new();
    let policy = EscalationPolicy::new().grace(seconds(args.grace, "grace")?);
    let mut guard = ProcessContext::new(tree, token.clone()).policy(policy);
    if let Some(timeout) = args.timeout {
        guard = guard.with_timeout(seconds(timeout, "timeout")?);
    }

    if args.dump {
        write_dump(&mut std::io::stderr().lock(), &guard).context("failed to print process tree")?;
    }

    let interrupt = tokio::spawn({
        let token = token.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, stopping process tree");
                token.cancel();
            }
        }
    });

    guard.start().context("failed to start process tree")?;
    let waited = guard.wait().await;
    interrupt.abort();
    waited.context("process tree finished with errors")?;

    let code = guard.exit_code();
    debug!(exit_code = code, signals = ?guard.signals_sent(), "Process tree finished");
    Ok(shell_exit_code(code))
}

/// Print the tree as a block of complete lines.
fn write_dump(out: &mut impl Write, tree: &dyn Process) -> std::io::Result<()> {
    writeln!(out, "{}", dump_tree(tree))
}

/// Map a signal exit (negative) to the shell convention of 128 + signal.
const fn shell_exit_code(code: i32) -> i32 {
    if code < 0 {
        128 - code
    } else {
        code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard_args() -> GuardArgs {
        GuardArgs {
            timeout: None,
            grace: 1.0,
            dump: false,
        }
    }

    fn words(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_shell_exit_code() {
        assert_eq!(shell_exit_code(0), 0);
        assert_eq!(shell_exit_code(3), 3);
        assert_eq!(shell_exit_code(-9), 137);
        assert_eq!(shell_exit_code(-15), 143);
    }

    #[test]
    fn test_dump_ends_with_newline() {
        let tree = ProcessContext::new(Command::new("echo").arg("hi"), CancellationToken::new());
        let mut out = Vec::new();
        write_dump(&mut out, &tree).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("ProcessContext{"));
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn test_seconds_rejects_negative() {
        assert!(seconds(-1.0, "grace").is_err());
        assert_eq!(seconds(0.5, "grace").unwrap(), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_run_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let cli = Cli {
            debug: false,
            command: Commands::Run {
                stdin: None,
                stdout: Some(out.clone()),
                stderr: None,
                guard: guard_args(),
                command: vec!["sh".into(), "-c".into(), "echo hi; exit 7".into()],
            },
        };
        assert_eq!(execute(cli).await.unwrap(), 7);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "hi\n");
    }

    #[tokio::test]
    async fn test_run_timeout_reports_signal() {
        let cli = Cli {
            debug: false,
            command: Commands::Run {
                stdin: None,
                stdout: None,
                stderr: None,
                guard: GuardArgs {
                    timeout: Some(0.2),
                    ..guard_args()
                },
                command: words("sleep 100"),
            },
        };
        assert_eq!(execute(cli).await.unwrap(), 128 + 15);
    }

    #[tokio::test]
    async fn test_pipe_exit_code_is_consumer() {
        let cli = Cli {
            debug: false,
            command: Commands::Pipe {
                stderr: false,
                guard: guard_args(),
                commands: words("echo nothing ::: grep absent"),
            },
        };
        assert_eq!(execute(cli).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_pipe_needs_separator() {
        let cli = Cli {
            debug: false,
            command: Commands::Pipe {
                stderr: false,
                guard: guard_args(),
                commands: words("echo hi"),
            },
        };
        assert!(execute(cli).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_program_fails_to_start() {
        let cli = Cli {
            debug: false,
            command: Commands::Run {
                stdin: None,
                stdout: None,
                stderr: None,
                guard: guard_args(),
                command: words("nonexistent_command_12345"),
            },
        };
        let err = execute(cli).await.unwrap_err();
        assert!(err.to_string().contains("failed to start"));
    }
}
