use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

use crate::api::model::{NamedResource, TypeDetail};
use crate::api::{ApiClient, Resource, Transport};

/// Types an attacking type deals double/half/no damage to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffenseRelations {
    pub double: BTreeSet<String>,
    pub half: BTreeSet<String>,
    pub none: BTreeSet<String>,
}

/// Per-type damage multipliers for the whole type universe
#[derive(Debug, Clone, Default)]
pub struct TypeTables {
    universe: BTreeSet<String>,
    /// defending type -> attacking type -> multiplier
    defense: BTreeMap<String, BTreeMap<String, f64>>,
    /// attacking type -> relations
    offense: BTreeMap<String, OffenseRelations>,
}

fn names(list: &[NamedResource]) -> impl Iterator<Item = String> + '_ {
    list.iter().map(|r| r.name.clone())
}

impl TypeTables {
    /// Build both tables from the type list and each type's damage relations
    pub fn from_details(type_names: &[String], details: &[TypeDetail]) -> Self {
        let mut tables = Self {
            universe: type_names.iter().cloned().collect(),
            ..Self::default()
        };

        for detail in details {
            let relations = &detail.damage_relations;
            tables.universe.insert(detail.name.clone());

            let row = tables.defense.entry(detail.name.clone()).or_default();
            for (list, factor) in [
                (&relations.double_damage_from, 2.0),
                (&relations.half_damage_from, 0.5),
                (&relations.no_damage_from, 0.0),
            ] {
                for attacker in names(list) {
                    *row.entry(attacker.clone()).or_insert(1.0) *= factor;
                    tables.universe.insert(attacker);
                }
            }

            let offense = tables.offense.entry(detail.name.clone()).or_default();
            offense.double.extend(names(&relations.double_damage_to));
            offense.half.extend(names(&relations.half_damage_to));
            offense.none.extend(names(&relations.no_damage_to));
        }

        tables
    }

    /// Every known type name, sorted
    pub fn universe(&self) -> impl Iterator<Item = &str> {
        self.universe.iter().map(String::as_str)
    }

    /// Multiplier of `attacker` damage against a `defender`; 1.0 when no rule applies
    pub fn multiplier(&self, defender: &str, attacker: &str) -> f64 {
        self.defense
            .get(defender)
            .and_then(|row| row.get(attacker))
            .copied()
            .unwrap_or(1.0)
    }

    pub fn offense(&self, attacker: &str) -> Option<&OffenseRelations> {
        self.offense.get(attacker)
    }

    pub fn len(&self) -> usize {
        self.universe.len()
    }

    pub fn is_empty(&self) -> bool {
        self.universe.is_empty()
    }
}

/// Fetch the type list and every type's relations, once per run
pub fn build_type_tables<T: Transport>(client: &mut ApiClient<T>) -> Result<TypeTables> {
    let type_names: Vec<String> = client
        .fetch_list(&Resource::TypeList)
        .context("Failed to fetch type list")?
        .into_iter()
        .map(|r| r.name)
        .collect();

    let mut details = Vec::with_capacity(type_names.len());
    for name in &type_names {
        let detail: TypeDetail = client
            .fetch_as(&Resource::type_named(name))
            .with_context(|| format!("Failed to fetch type {}", name))?;
        details.push(detail);
    }

    let tables = TypeTables::from_details(&type_names, &details);
    info!(types = tables.len(), "built type damage tables");
    Ok(tables)
}
