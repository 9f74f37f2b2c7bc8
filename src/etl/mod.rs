//! Incremental PokéAPI to Pokédex ETL
//!
//! The pipeline for one missing species:
//! - `transform` resolves species -> default form -> Pokémon and builds the record
//! - `evolution` finds the species in its chain and describes the transitions
//! - `damage` combines the run's `types` tables for the species' types
//!
//! `orchestrator::run` drives the whole pass; `runner` moves it onto a worker thread.

pub mod damage;
pub mod evolution;
pub mod orchestrator;
pub mod progress;
pub mod runner;
pub mod transform;
pub mod types;

pub use damage::compute_damage;
pub use evolution::{resolve_evolution, EvolutionLinks};
pub use orchestrator::{run, species_index, sync, RunSummary};
pub use progress::{ChannelProgress, NoProgress, ProgressSink, ProgressSnapshot};
pub use runner::{EtlRunner, RunHandle};
pub use transform::transform;
pub use types::{build_type_tables, TypeTables};
