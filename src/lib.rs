pub mod api;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod etl;
pub mod parser;
pub mod schema;
pub mod store;
pub mod ui;

pub use cli::{Cli, Commands};
pub use config::EtlConfig;
pub use dataset::{Pokedex, PokedexEntry};
pub use error::{RunError, StoreError};
pub use ui::{Phase, SilentUi, Ui, UiApp};
