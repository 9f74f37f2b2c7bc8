//! Persistent, append-only storage for the two Pokédex tables

pub mod csv;
pub mod schema_gen;
pub mod sqlite;

pub use self::csv::CsvStore;
pub use self::sqlite::SqliteStore;

use anyhow::Result;
use clap::ValueEnum;
use std::collections::BTreeSet;
use std::path::Path;

use crate::schema::{DamageRecord, SpeciesId, SpeciesRecord};

/// Storage backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    /// pokemon.csv + damage_relations.csv
    #[default]
    Csv,
    /// pokedex.db
    Sqlite,
}

/// Append-only record storage. Only the sync run writes; queries only read.
pub trait RecordStore {
    /// Ids with a durably written `pokemon` row
    fn existing_ids(&self) -> Result<BTreeSet<SpeciesId>>;

    /// Durably append one species and its damage relations before returning
    fn append(&mut self, species: &SpeciesRecord, damage: &DamageRecord) -> Result<()>;

    fn load_species(&self) -> Result<Vec<SpeciesRecord>>;

    fn load_damage(&self) -> Result<Vec<DamageRecord>>;
}

impl<S: RecordStore + ?Sized> RecordStore for Box<S> {
    fn existing_ids(&self) -> Result<BTreeSet<SpeciesId>> {
        (**self).existing_ids()
    }

    fn append(&mut self, species: &SpeciesRecord, damage: &DamageRecord) -> Result<()> {
        (**self).append(species, damage)
    }

    fn load_species(&self) -> Result<Vec<SpeciesRecord>> {
        (**self).load_species()
    }

    fn load_damage(&self) -> Result<Vec<DamageRecord>> {
        (**self).load_damage()
    }
}

/// Open the selected backend inside `data_dir`
pub fn open_store(backend: StoreBackend, data_dir: &Path) -> Result<Box<dyn RecordStore + Send>> {
    Ok(match backend {
        StoreBackend::Csv => Box::new(CsvStore::new(data_dir)?),
        StoreBackend::Sqlite => Box::new(SqliteStore::open(&data_dir.join(sqlite::DB_FILE_NAME))?),
    })
}
