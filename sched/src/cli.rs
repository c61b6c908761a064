//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// jobsched - recurring job scheduler
#[derive(Parser)]
#[command(
    name = "jobsched",
    about = "Recurring job scheduler that launches worker processes from stored triggers",
    version = env!("GIT_DESCRIBE"),
    after_help = "Logs are written to: ~/.local/share/jobsched/logs/jobsched.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Start the scheduler daemon in the background
    Start {
        /// Run in the foreground and print activity to stdout
        #[arg(long)]
        foreground: bool,
    },

    /// Stop the daemon once its running jobs have finished
    Stop {
        /// Seconds to wait for running jobs to finish
        #[arg(long, default_value = "300")]
        timeout_secs: u64,

        /// Kill the daemon if it has not exited by the timeout
        #[arg(long)]
        force: bool,
    },

    /// Show daemon status and running jobs
    Status {
        /// Show running jobs and counters
        #[arg(short, long)]
        detailed: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Stop launching new jobs; running jobs continue
    Pause,

    /// Start launching jobs again
    Resume,

    /// List stored triggers
    Triggers {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Put a trigger back to idle so it can run again
    Reset {
        /// Trigger id
        id: String,
    },

    /// Show the activity log
    Logs {
        /// Follow log output (like tail -f)
        #[arg(short, long)]
        follow: bool,

        /// Number of lines to show
        #[arg(short, long, default_value = "50")]
        lines: usize,
    },

    /// Internal: Run as daemon process (used by `start`)
    #[command(hide = true)]
    RunDaemon,
}

/// Output format for status/trigger listings
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Table,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "table" => Ok(Self::Table),
            _ => Err(format!("Unknown format: {}. Use: text, json, or table", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
            Self::Table => write!(f, "table"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_no_command() {
        let cli = Cli::parse_from(["jobsched"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_parse_start_foreground() {
        let cli = Cli::parse_from(["jobsched", "start", "--foreground"]);
        assert!(matches!(cli.command, Some(Command::Start { foreground: true })));
    }

    #[test]
    fn test_cli_parse_stop_defaults() {
        let cli = Cli::parse_from(["jobsched", "stop"]);
        assert!(matches!(
            cli.command,
            Some(Command::Stop {
                timeout_secs: 300,
                force: false
            })
        ));
    }

    #[test]
    fn test_cli_parse_stop_forced() {
        let cli = Cli::parse_from(["jobsched", "stop", "--timeout-secs", "5", "--force"]);
        assert!(matches!(
            cli.command,
            Some(Command::Stop {
                timeout_secs: 5,
                force: true
            })
        ));
    }

    #[test]
    fn test_cli_parse_pause_resume() {
        assert!(matches!(Cli::parse_from(["jobsched", "pause"]).command, Some(Command::Pause)));
        assert!(matches!(Cli::parse_from(["jobsched", "resume"]).command, Some(Command::Resume)));
    }

    #[test]
    fn test_cli_parse_reset() {
        let cli = Cli::parse_from(["jobsched", "reset", "nightly-report"]);
        match cli.command {
            Some(Command::Reset { id }) => assert_eq!(id, "nightly-report"),
            _ => panic!("Expected Reset command"),
        }
    }

    #[test]
    fn test_cli_parse_triggers_json() {
        let cli = Cli::parse_from(["jobsched", "triggers", "--format", "json"]);
        assert!(matches!(cli.command, Some(Command::Triggers { format: OutputFormat::Json })));
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("text".parse::<OutputFormat>(), Ok(OutputFormat::Text));
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("table".parse::<OutputFormat>(), Ok(OutputFormat::Table));
        assert!("invalid".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_cli_with_config() {
        let cli = Cli::parse_from(["jobsched", "status", "-c", "/etc/jobsched.yml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/jobsched.yml")));
    }
}
