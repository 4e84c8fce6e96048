use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};

use crate::features::queue::OperationKind;

#[derive(Parser)]
#[command(name = "offsync")]
#[command(about = "Queue backend mutations while offline and replay them when connectivity returns")]
#[command(long_about = "offsync - an offline mutation queue

Records create/update/delete mutations against a REST backend while it is
unreachable, persists them locally, and replays them in order once the
backend answers again. Failed deliveries are retried on later passes until
they hit the retry ceiling, after which they wait for manual review.

QUICK START:
  offsync enqueue update lead --payload '{\"id\": 5, \"status\": \"won\"}'
  offsync list                 Show pending mutations
  offsync sync                 Replay the queue now
  offsync watch                Sync automatically whenever the backend is up

OUTPUT FORMATS:
  --output pretty    Human-readable colored output (default)
  --output json      Machine-readable JSON for scripting

For more information on a specific command, run:
  offsync <command> --help")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// Output format for command results
    ///
    /// Use 'pretty' for human-readable colored output, or 'json' for
    /// machine-readable output. Defaults to `general.default_output` from
    /// the config file.
    #[arg(short, long, value_enum, global = true)]
    pub output: Option<OutputFormat>,

    /// Data directory holding config.yaml and offsync.db
    #[arg(long, env = "OFFSYNC_HOME", global = true, value_name = "DIR")]
    pub home: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for command results.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable colored output.
    #[default]
    Pretty,
    /// Machine-readable JSON output.
    Json,
}

/// Operation kind as accepted on the command line.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationArg {
    Create,
    Update,
    Delete,
}

impl From<OperationArg> for OperationKind {
    fn from(arg: OperationArg) -> Self {
        match arg {
            OperationArg::Create => Self::Create,
            OperationArg::Update => Self::Update,
            OperationArg::Delete => Self::Delete,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Queue a mutation for later delivery
    ///
    /// The mutation is persisted immediately and nothing is sent. Updates
    /// and deletes need the record id in `payload.id`.
    ///
    /// # Examples
    ///
    ///   offsync enqueue create lead --payload '{"name": "Acme"}'
    ///   offsync enqueue update lead --payload '{"id": 5, "status": "won"}'
    ///   offsync enqueue delete deal --payload '{"id": "d-17"}'
    #[command(alias = "e")]
    Enqueue {
        /// Kind of mutation
        #[arg(value_enum)]
        operation: OperationArg,

        /// Target resource, e.g. lead, deal, task
        entity: String,

        /// JSON payload forwarded verbatim to the backend
        #[arg(long, short = 'p', default_value = "{}")]
        payload: String,
    },

    /// List queued mutations in delivery order
    ///
    /// # Examples
    ///
    ///   offsync list                 All pending mutations
    ///   offsync list --exhausted     Only those past the retry ceiling
    ///   offsync list -n 5 -o json    First five as JSON
    #[command(alias = "ls")]
    List {
        /// Only show items whose automatic retries are used up
        #[arg(long)]
        exhausted: bool,

        /// Maximum items to show
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },

    /// Remove a queued mutation by id
    ///
    /// Use this to discard an item stuck at the retry ceiling.
    #[command(alias = "rm")]
    Remove {
        /// Queue item id, as shown by `offsync list`
        id: String,
    },

    /// Drop every queued mutation
    Clear {
        /// Required; clearing cannot be undone
        #[arg(long)]
        force: bool,
    },

    /// Show connectivity, queue size and sync status
    ///
    /// Probes the backend health endpoint to report connectivity.
    Status,

    /// Replay the queue against the backend now
    ///
    /// Probes connectivity first and skips the pass when offline.
    ///
    /// # Examples
    ///
    ///   offsync sync                 Probe, then sync if online
    ///   offsync sync --assume-online Skip the probe
    Sync {
        /// Treat the backend as reachable without probing it
        #[arg(long)]
        assume_online: bool,
    },

    /// Watch connectivity and sync whenever the backend comes back
    ///
    /// Polls the backend health endpoint until interrupted with Ctrl-C.
    Watch {
        /// Seconds between probes (defaults to `sync.poll_interval_secs`)
        #[arg(long, short = 'i')]
        interval: Option<u64>,
    },

    /// Show or create the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completion scripts
    ///
    /// # Examples
    ///
    ///   source <(offsync completions bash)
    ///   offsync completions fish > ~/.config/fish/completions/offsync.fish
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Configuration subcommands.
#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration as YAML
    Show,

    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
