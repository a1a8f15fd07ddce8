//! Command line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::snapshot::ChangeKind;

#[derive(Parser, Debug)]
#[command(version, about = "Attach a DuckLake lakehouse and stream records into it")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Attach all endpoints and ingest the configured stream until shutdown
    Attach {
        #[command(flatten)]
        config: ConfigArg,
    },
    /// Attach all endpoints, run one query and print the result
    Query {
        #[command(flatten)]
        config: ConfigArg,

        /// SQL to run against the attached session
        #[arg(short, long)]
        sql: String,
    },
    /// Find the latest snapshot with a change and show the table before it
    Snapshots {
        #[command(flatten)]
        config: ConfigArg,

        /// Table to read; defaults to the stream's target table
        #[arg(short, long)]
        table: Option<String>,

        /// Kind of change to look for
        #[arg(long, value_enum, default_value_t = ChangeKind::Deleted)]
        change: ChangeKind,
    },
}

#[derive(Args, Debug)]
pub struct ConfigArg {
    /// Path to the configuration file
    #[arg(short, long, env = "FLOE_CONFIG")]
    pub config: PathBuf,
}

impl CliArgs {
    /// Configuration file named by whichever subcommand was given.
    pub fn config_path(&self) -> &PathBuf {
        match &self.command {
            Command::Attach { config }
            | Command::Query { config, .. }
            | Command::Snapshots { config, .. } => &config.config,
        }
    }
}
