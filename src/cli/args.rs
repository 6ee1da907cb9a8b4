//! CLI argument definitions

use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;

/// rootcause - iterative root-cause analysis over metrics and logs
#[derive(Debug, Parser)]
#[command(name = "rootcause")]
#[command(about = "Investigate alerts and incident questions across metrics and logs")]
#[command(long_about = r#"
rootcause turns an alert or a free-text question into a root-cause report.
It plans metric and log queries, runs them side by side, judges whether the
evidence explains the incident and refines its plan until it does or the
iteration bound is reached.

EXAMPLES:
  # Investigate an Alertmanager webhook payload
  rootcause start --alert alert.json

  # Ask a question; answer the time-range prompt interactively
  rootcause start --query "checkout 5xx spike" --wait-for-input

  # Answer a suspended investigation later
  rootcause supply inv-3fa2c19d0b7e4a51 2024-05-01T09:45:00Z/2024-05-01T10:15:00Z

  # Inspect progress and read the report
  rootcause status inv-3fa2c19d0b7e4a51
  rootcause report inv-3fa2c19d0b7e4a51 --json

CONFIGURATION:
  Precedence: CLI flags > config file > defaults
  The config file is discovered by searching upward from the working
  directory for .rootcause/config.toml; use --config to name one explicitly.
  Investigation records are kept under .rootcause/state unless
  [store] state_dir or --state-dir says otherwise.

EXIT CODES:
  0 completed, 2 usage or configuration error, 3 failed,
  4 waiting for input, 10 timed out
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding investigation records
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    /// Maximum planning rounds per investigation
    #[arg(long, global = true)]
    pub max_iterations: Option<u32>,

    /// Overall time limit per investigation, in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Reasoning provider (openai or anthropic)
    #[arg(long, global = true)]
    pub llm_provider: Option<String>,

    /// Model name passed to the reasoning provider
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit machine-readable JSON on stdout and JSON log lines on stderr
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start an investigation and follow it until it finishes or needs input
    #[command(group(ArgGroup::new("input").required(true).args(["query", "alert"])))]
    Start {
        /// Free-text description of the incident
        #[arg(long)]
        query: Option<String>,

        /// File holding an Alertmanager webhook payload
        #[arg(long)]
        alert: Option<PathBuf>,

        /// Prompt on stdin when the investigation needs input instead of exiting
        #[arg(long)]
        wait_for_input: bool,
    },

    /// Show the status of an investigation
    Status {
        /// Investigation id
        id: String,
    },

    /// Print the root-cause report of an investigation
    Report {
        /// Investigation id
        id: String,
    },

    /// Answer a suspended investigation and follow it onward
    Supply {
        /// Investigation id
        id: String,

        /// `START/END` (or `START,END`) in RFC 3339, or free text
        value: String,
    },

    /// List every known investigation
    List,

    /// Resume persisted investigations after a restart
    Recover,
}
