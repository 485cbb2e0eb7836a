use clap::{Parser, Subcommand};

/// CLI entry point: a top-level `clap` derive with one subcommand per
/// operating mode.
#[derive(Debug, Parser)]
#[clap(author, version, about = "real-time bidding core for a timed vehicle auction platform", long_about = None)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the dispatch engine, event broker, and HTTP surface.
    Serve(ServeCommand),
    /// Parse and print the resolved configuration, then exit.
    Config(ConfigCommand),
}

#[derive(Debug, clap::Args)]
pub struct ServeCommand {
    #[clap(long, env, value_name = "FILE")]
    pub config_file: Option<String>,
}

#[derive(Debug, clap::Args)]
pub struct ConfigCommand {
    #[clap(env)]
    pub config_file: String,
}
