// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::ruletest::TestOptions;
use crate::types::{TestFormat, TestType};

/// Command-line arguments for `rulewarden`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "rulewarden",
    version,
    about = "Supervise a rule engine and run ad-hoc rule tests against it.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Rulewarden.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Rulewarden.toml", global = true)]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `RULEWARDEN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Start the engine and supervise it until Ctrl-C or until it exits.
    Run {
        /// Parse + validate, print the engine commands, but don't run them.
        #[arg(long)]
        dry_run: bool,
    },

    /// Test a rule file with a one-off engine invocation.
    TestRule(TestRuleArgs),
}

#[derive(Debug, Clone, Args)]
pub struct TestRuleArgs {
    /// Rule definition to test.
    #[arg(value_name = "RULE_FILE")]
    pub rule_file: PathBuf,

    /// Number of days of data to test against.
    #[arg(long, value_name = "N")]
    pub days: Option<u32>,

    #[arg(long, value_enum, default_value_t = TestFormat::Text)]
    pub format: TestFormat,

    /// Maximum number of documents to query (0 = unbounded).
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub max_results: u64,

    /// Let the engine send alerts for matches.
    #[arg(long)]
    pub alert: bool,

    #[arg(long, value_enum, default_value_t = TestType::Full)]
    pub test_type: TestType,

    /// Print output as it arrives, one JSON event per line.
    #[arg(long)]
    pub stream: bool,
}

impl TestRuleArgs {
    pub fn options(&self) -> TestOptions {
        TestOptions {
            days: self.days,
            format: self.format,
            max_results: self.max_results,
            alert: self.alert,
            test_type: self.test_type,
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
