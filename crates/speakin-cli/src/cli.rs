use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "speakin", about = "Speakin credits escrow and settlement services", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a service
    Serve(ServeArgs),
    /// Ask a running booking service to finish interrupted sagas
    Recover(RecoverArgs),
    /// Inspect a saga log file
    SagaLog(SagaLogArgs),
    /// Print the default configuration
    Config(ConfigArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ServiceArg {
    Ledger,
    Escrow,
    Booking,
    All,
}

#[derive(Args)]
pub struct ServeArgs {
    pub service: ServiceArg,
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Override the bind address of the chosen service
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// Override the booking service's saga log path
    #[arg(long)]
    pub saga_log: Option<PathBuf>,
    /// Skip the recovery sweep at startup
    #[arg(long)]
    pub no_recover: bool,
}

#[derive(Args)]
pub struct RecoverArgs {
    /// Booking service base URL
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    pub url: String,
    /// Admin bearer token
    #[arg(long, env = "SPEAKIN_TOKEN")]
    pub token: String,
    #[arg(long, default_value = "60")]
    pub timeout_secs: u64,
}

#[derive(Args)]
pub struct SagaLogArgs {
    pub path: PathBuf,
    /// Include finished sagas
    #[arg(long)]
    pub all: bool,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Validate this file and print it with defaults filled in
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}
