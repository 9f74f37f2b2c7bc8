use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::damage::compute_damage;
use super::progress::{ProgressSink, ProgressSnapshot};
use super::transform::transform;
use super::types::{build_type_tables, TypeTables};
use crate::api::{id_from_url, ApiClient, Resource, Transport};
use crate::config::EtlConfig;
use crate::schema::SpeciesId;
use crate::store::{open_store, RecordStore};

/// Counts for one completed run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub missing_total: usize,
    pub written: usize,
    pub failed: usize,
}

/// Full species index, id -> slug
pub fn species_index<T: Transport>(client: &mut ApiClient<T>) -> Result<BTreeMap<SpeciesId, String>> {
    let entries = client
        .fetch_list(&Resource::SpeciesList)
        .context("Failed to fetch species index")?;

    let mut index = BTreeMap::new();
    for entry in entries {
        match id_from_url(&entry.url) {
            Some(id) => {
                index.insert(id, entry.name);
            }
            None => warn!(name = %entry.name, url = %entry.url, "species index entry without numeric id"),
        }
    }
    Ok(index)
}

/// Bring the store up to date with the remote species index.
///
/// Only ids without a stored `pokemon` row are fetched, in ascending order.
/// Each record is durable before the next id starts, so an interrupted run
/// resumes at the first id that was not written.
pub fn run<T, S>(client: &mut ApiClient<T>, store: &mut S, progress: &mut dyn ProgressSink) -> Result<RunSummary>
where
    T: Transport,
    S: RecordStore + ?Sized,
{
    let existing = store.existing_ids().context("Failed to read stored ids")?;
    let index = species_index(client)?;
    let missing: Vec<(SpeciesId, String)> = index
        .into_iter()
        .filter(|(id, _)| !existing.contains(id))
        .collect();

    let total = missing.len();
    info!(stored = existing.len(), missing = total, "discovered sync work");
    progress.report(&ProgressSnapshot::started(total));

    if missing.is_empty() {
        progress.report(&ProgressSnapshot::finished(0, 0));
        return Ok(RunSummary::default());
    }

    let tables = build_type_tables(client)?;
    let mut summary = RunSummary {
        missing_total: total,
        ..RunSummary::default()
    };

    for (position, (id, name)) in missing.iter().enumerate() {
        progress.report(&ProgressSnapshot::working(total, position, *id, name));

        match sync_one(client, store, &tables, *id) {
            Ok(()) => summary.written += 1,
            Err(e) => {
                warn!(id, species = %name, error = %format!("{:#}", e), "skipping species");
                summary.failed += 1;
            }
        }
    }

    progress.report(&ProgressSnapshot::finished(total, total));
    info!(
        written = summary.written,
        failed = summary.failed,
        cached_documents = client.cache().len(),
        cache_hits = client.cache().hits(),
        "sync run finished"
    );
    Ok(summary)
}

fn sync_one<T, S>(client: &mut ApiClient<T>, store: &mut S, tables: &TypeTables, id: SpeciesId) -> Result<()>
where
    T: Transport,
    S: RecordStore + ?Sized,
{
    let record = transform(client, id)?;
    let damage = compute_damage(
        record.id,
        &record.primary_type,
        record.secondary_type.as_deref(),
        tables,
    );
    store
        .append(&record, &damage)
        .with_context(|| format!("Failed to store species {}", record.id))
}

/// Run against the live API with the configured store
pub fn sync(config: &EtlConfig, progress: &mut dyn ProgressSink) -> Result<RunSummary> {
    let mut client = ApiClient::http(config.base_url.clone(), config.policy.clone())?;
    let mut store = open_store(config.backend, &config.data_dir)?;
    run(&mut client, &mut store, progress)
}
