//! Read-only view over the synced tables, backing the query commands

mod chain;

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;

use crate::schema::{DamageRecord, SpeciesId, SpeciesRecord};
use crate::store::RecordStore;

/// A stored species joined with its damage relations
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PokedexEntry {
    #[serde(flatten)]
    pub record: SpeciesRecord,
    pub damage: Option<DamageRecord>,
}

/// All stored entries, sorted by id
#[derive(Debug, Clone, Default)]
pub struct Pokedex {
    entries: Vec<PokedexEntry>,
    by_id: HashMap<SpeciesId, usize>,
}

impl Pokedex {
    pub fn load<S: RecordStore + ?Sized>(store: &S) -> Result<Self> {
        let species = store.load_species().context("Failed to load pokemon table")?;
        let damage = store
            .load_damage()
            .context("Failed to load damage_relations table")?;
        Ok(Self::from_records(species, damage))
    }

    /// Join the two tables. Later rows win when an id repeats.
    pub fn from_records(species: Vec<SpeciesRecord>, damage: Vec<DamageRecord>) -> Self {
        let damage: HashMap<SpeciesId, DamageRecord> = damage.into_iter().map(|d| (d.id, d)).collect();
        let records: HashMap<SpeciesId, SpeciesRecord> = species.into_iter().map(|s| (s.id, s)).collect();

        let mut entries: Vec<PokedexEntry> = records
            .into_values()
            .map(|record| PokedexEntry {
                damage: damage.get(&record.id).cloned(),
                record,
            })
            .collect();
        entries.sort_by_key(|e| e.record.id);

        let by_id = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.record.id, i))
            .collect();

        Self { entries, by_id }
    }

    pub fn all(&self) -> &[PokedexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: SpeciesId) -> Option<&PokedexEntry> {
        self.by_id.get(&id).map(|&i| &self.entries[i])
    }

    /// Case-insensitive substring match on the name or the decimal id.
    /// A blank query matches everything.
    pub fn search(&self, query: &str) -> Vec<&PokedexEntry> {
        let needle = query.trim().to_lowercase();
        self.entries
            .iter()
            .filter(|e| {
                needle.is_empty()
                    || e.record.name.to_lowercase().contains(&needle)
                    || e.record.id.to_string().contains(&needle)
            })
            .collect()
    }

    /// Up to `count` distinct entries chosen uniformly at random
    pub fn random_sample<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Vec<&PokedexEntry> {
        let count = count.min(self.entries.len());
        self.entries.choose_multiple(rng, count).collect()
    }
}
