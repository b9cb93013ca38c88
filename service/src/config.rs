use crate::discovery::{Filter, DEFAULT_MASTER_SERVER};
use crate::pipeline::{PipelineConfig, DEFAULT_CONCURRENCY};
use crate::scheduler::BacklogOrder;
use clap::{Parser, Subcommand, ValueEnum};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DiscoveryBackend {
    /// Steam Web API server list (needs an API key)
    Web,
    /// Legacy UDP master server
    Master,
}

/// Backlog order as spelled on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BacklogArg {
    /// Oldest queued server first
    Fifo,
    /// Most recently queued server first
    Lifo,
}

impl From<BacklogArg> for BacklogOrder {
    fn from(arg: BacklogArg) -> Self {
        match arg {
            BacklogArg::Fifo => BacklogOrder::Fifo,
            BacklogArg::Lifo => BacklogOrder::Lifo,
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Query every server of an app whose name matches
    Search {
        app_id: u32,
        /// Server name to match, `*` for any
        #[arg(default_value = "*")]
        name: String,
    },
    /// Query the servers behind one address
    Server {
        /// IP, optionally with a port
        ip: String,
    },
}

impl Command {
    pub fn filter(&self) -> Filter {
        match self {
            Command::Search { app_id, name } => Filter::new().app_id(*app_id).name(name),
            Command::Server { ip } => Filter::new().gameaddr(ip),
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Steam Web API key
    #[arg(long, env = "STEAM_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(short, long, value_enum, default_value_t = DiscoveryBackend::Web)]
    pub discovery: DiscoveryBackend,

    /// Master server used by the `master` backend
    #[arg(long, default_value = DEFAULT_MASTER_SERVER)]
    pub master: String,

    /// Per-request timeout in milliseconds
    #[arg(short, long, default_value = "3000")]
    pub timeout_ms: u64,

    /// Maximum number of servers queried at once
    #[arg(short, long, default_value_t = DEFAULT_CONCURRENCY)]
    pub jobs: usize,

    /// Order in which queued servers are picked up
    #[arg(long, value_enum, default_value_t = BacklogArg::Fifo)]
    pub backlog: BacklogArg,

    /// Pretty-print the JSON output
    #[arg(long)]
    pub pretty: bool,
}

impl Args {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            timeout: self.timeout(),
            concurrency: self.jobs,
            backlog_order: self.backlog.into(),
        }
    }

    pub fn api_key(&self) -> &str {
        self.api_key.as_deref().unwrap_or_default()
    }
}
