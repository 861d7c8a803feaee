use std::path::PathBuf;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CliArgs {
    /// Config file, defaults are used when it does not exist
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// Log debug output
    #[arg(short, long)]
    pub verbose: bool,

    /// Also append logs to this file
    #[arg(long)]
    pub log_file: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search the marketplace
    Search {
        term: String,

        /// Match publisher names instead of free text
        #[arg(short, long)]
        publisher: bool,

        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Download extensions given as `publisher.name`
    Download {
        #[arg(required = true)]
        identifiers: Vec<String>,

        /// Version to fetch instead of the latest
        #[arg(short, long)]
        version: Option<String>,

        /// Directory to save into
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}
