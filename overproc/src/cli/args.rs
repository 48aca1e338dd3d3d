//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Separates the producer from the consumer in `overproc pipe`.
pub const PIPE_SEPARATOR: &str = ":::";

/// overproc - run and compose external processes
#[derive(Parser, Debug)]
#[command(name = "overproc")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    pub debug: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one program with optional redirections
    Run {
        /// Read the program's stdin from this file
        #[arg(long)]
        stdin: Option<PathBuf>,

        /// Write the program's stdout to this file
        #[arg(long)]
        stdout: Option<PathBuf>,

        /// Write the program's stderr to this file
        #[arg(long)]
        stderr: Option<PathBuf>,

        #[command(flatten)]
        guard: GuardArgs,

        /// Program and its arguments
        #[arg(trailing_var_arg = true, required = true, num_args = 1..)]
        command: Vec<String>,
    },

    /// Pipe one program's output into another: PRODUCER... ::: CONSUMER...
    Pipe {
        /// Feed the consumer from the producer's stderr instead of stdout
        #[arg(long)]
        stderr: bool,

        #[command(flatten)]
        guard: GuardArgs,

        /// Producer and consumer, separated by `:::`
        #[arg(trailing_var_arg = true, required = true, num_args = 1..)]
        commands: Vec<String>,
    },
}

/// Options shared by every subcommand that runs a guarded tree.
#[derive(Args, Debug, Clone)]
pub struct GuardArgs {
    /// Stop the tree after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<f64>,

    /// Seconds between the soft and hard stop signals
    #[arg(long, value_name = "SECS", default_value = "5")]
    pub grace: f64,

    /// Print the process tree before running it
    #[arg(long)]
    pub dump: bool,
}

/// Split `PRODUCER... ::: CONSUMER...` at the first separator.
pub fn split_pipeline(words: &[String]) -> Option<(&[String], &[String])> {
    let at = words.iter().position(|w| w == PIPE_SEPARATOR)?;
    let (producer, rest) = words.split_at(at);
    let consumer = &rest[1..];
    if producer.is_empty() || consumer.is_empty() {
        return None;
    }
    Some((producer, consumer))
}
