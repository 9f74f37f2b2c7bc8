use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::api::DEFAULT_BASE_URL;
use crate::store::StoreBackend;

#[derive(Parser, Debug)]
#[command(name = "pokedex-etl")]
#[command(version, about = "Sync PokéAPI data into a local Pokédex and query it")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Where the tables live
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Data directory (defaults to the platform data directory)
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,

    /// Storage backend
    #[arg(short, long, value_enum, default_value_t = StoreBackend::Csv)]
    pub store: StoreBackend,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch every species missing from the store
    Sync {
        #[command(flatten)]
        store: StoreArgs,

        /// PokéAPI base URL
        #[arg(long, default_value = DEFAULT_BASE_URL)]
        base_url: String,

        /// Delay before each request, in milliseconds
        #[arg(long, default_value_t = 100)]
        delay_ms: u64,

        /// Log progress lines instead of drawing the terminal UI
        #[arg(long)]
        plain: bool,
    },

    /// Print one stored Pokémon as JSON
    Show {
        id: u32,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Search stored Pokémon by name or id
    Search {
        query: String,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Print a random sample of stored Pokémon
    Random {
        #[arg(default_value_t = 6)]
        count: usize,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Print the evolution stages containing a Pokémon
    Chain {
        id: u32,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// List table columns
    Columns {
        /// Only this table
        table: Option<String>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
