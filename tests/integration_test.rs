//! End-to-end tests of the sync pipeline against an in-memory PokéAPI.
//!
//! The fixture world holds two three-stage chains:
//! bulbasaur (1) -> ivysaur (2) -> venusaur (3) and
//! charmander (4) -> charmeleon (5) -> charizard (6).
//!
//! Run with:
//! ```sh
//! cargo test --test integration_test
//! ```

use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::sync_channel;
use tempfile::TempDir;

use pokedex_etl::api::{ApiClient, MemoryTransport, Resource, RetryPolicy, MEMORY_BASE_URL};
use pokedex_etl::dataset::Pokedex;
use pokedex_etl::error::RunError;
use pokedex_etl::etl::{run, EtlRunner, NoProgress, ProgressSnapshot, RunSummary};
use pokedex_etl::schema::{DAMAGE_RELATIONS, POKEMON};
use pokedex_etl::store::{CsvStore, RecordStore, SqliteStore};

// =============================================================================
// Fixture World
// =============================================================================

const API: &str = "https://pokeapi.co/api/v2";

struct FixtureMon {
    id: u32,
    name: &'static str,
    genus: &'static str,
    types: &'static [&'static str],
    chain: u32,
}

const MONS: &[FixtureMon] = &[
    FixtureMon { id: 1, name: "bulbasaur", genus: "Seed Pokémon", types: &["grass", "poison"], chain: 1 },
    FixtureMon { id: 2, name: "ivysaur", genus: "Seed Pokémon", types: &["grass", "poison"], chain: 1 },
    FixtureMon { id: 3, name: "venusaur", genus: "Seed Pokémon", types: &["grass", "poison"], chain: 1 },
    FixtureMon { id: 4, name: "charmander", genus: "Lizard Pokémon", types: &["fire"], chain: 2 },
    FixtureMon { id: 5, name: "charmeleon", genus: "Flame Pokémon", types: &["fire"], chain: 2 },
    FixtureMon { id: 6, name: "charizard", genus: "Flame Pokémon", types: &["fire", "flying"], chain: 2 },
];

/// (type, double_from, half_from, no_from, double_to, half_to, no_to)
type TypeRow = (
    &'static str,
    &'static [&'static str],
    &'static [&'static str],
    &'static [&'static str],
    &'static [&'static str],
    &'static [&'static str],
    &'static [&'static str],
);

const TYPE_CHART: &[TypeRow] = &[
    ("electric", &["ground"], &["electric", "flying"], &[], &["flying", "water"], &["electric", "grass"], &["ground"]),
    ("fire", &["ground", "rock", "water"], &["fire", "grass"], &[], &["grass"], &["fire", "rock", "water"], &[]),
    ("flying", &["electric", "rock"], &["grass"], &["ground"], &["grass"], &["electric", "rock"], &[]),
    ("grass", &["fire", "flying", "poison"], &["electric", "grass", "ground", "water"], &[], &["ground", "rock", "water"], &["fire", "flying", "grass", "poison"], &[]),
    ("ground", &["grass", "water"], &["poison", "rock"], &["electric"], &["electric", "fire", "poison", "rock"], &["grass"], &["flying"]),
    ("poison", &["ground"], &["grass", "poison"], &[], &["grass"], &["ground", "poison", "rock"], &[]),
    ("rock", &["grass", "ground", "water"], &["fire", "flying", "poison"], &[], &["fire", "flying"], &["ground"], &[]),
    ("water", &["electric", "grass"], &["fire", "water"], &[], &["fire", "ground", "rock"], &["grass", "water"], &[]),
];

fn named(names: &[&str]) -> Value {
    Value::Array(
        names
            .iter()
            .map(|n| json!({"name": n, "url": format!("{}/type/{}/", API, n)}))
            .collect(),
    )
}

fn species_doc(mon: &FixtureMon) -> Value {
    json!({
        "id": mon.id,
        "name": mon.name,
        "generation": {"name": "generation-i", "url": ""},
        "varieties": [{"is_default": true, "pokemon": {"name": mon.name, "url": ""}}],
        "genera": [{"genus": mon.genus, "language": {"name": "en", "url": ""}}],
        "flavor_text_entries": [{
            "flavor_text": format!("The {}\nfixture\u{000c}entry.", mon.name),
            "language": {"name": "en", "url": ""}
        }],
        "evolution_chain": {"url": format!("{}/evolution-chain/{}/", API, mon.chain)},
        "is_legendary": false,
        "is_mythical": false
    })
}

fn pokemon_doc(mon: &FixtureMon) -> Value {
    let types: Vec<Value> = mon
        .types
        .iter()
        .enumerate()
        .map(|(i, t)| json!({"slot": i + 1, "type": {"name": t, "url": ""}}))
        .collect();
    let stats: Vec<Value> = ["hp", "attack", "defense", "special-attack", "special-defense", "speed"]
        .iter()
        .map(|s| json!({"base_stat": 40 + mon.id, "stat": {"name": s, "url": ""}}))
        .collect();

    json!({
        "id": mon.id,
        "name": mon.name,
        "height": 5 + mon.id,
        "weight": 60 + mon.id * 10,
        "types": types,
        "stats": stats,
        "sprites": {
            "front_default": format!("https://img/{}.png", mon.id),
            "other": {"official-artwork": {"front_default": format!("https://img/artwork/{}.png", mon.id)}}
        }
    })
}

fn chain_doc(names: [&str; 3], levels: [u32; 2]) -> Value {
    let link = |name: &str, level: Option<u32>, children: Vec<Value>| {
        let details = match level {
            Some(level) => json!([{"trigger": {"name": "level-up", "url": ""}, "min_level": level}]),
            None => json!([]),
        };
        json!({
            "species": {"name": name, "url": ""},
            "evolution_details": details,
            "evolves_to": children
        })
    };

    let last = link(names[2], Some(levels[1]), vec![]);
    let middle = link(names[1], Some(levels[0]), vec![last]);
    json!({"id": 0, "chain": link(names[0], None, vec![middle])})
}

/// Every document of the fixture world, built once
static FIXTURE_DOCUMENTS: Lazy<Vec<(Resource, Value)>> = Lazy::new(|| {
    let mut docs = Vec::new();

    let species_list: Vec<Value> = MONS
        .iter()
        .map(|m| json!({"name": m.name, "url": format!("{}/pokemon-species/{}/", API, m.id)}))
        .collect();
    docs.push((Resource::SpeciesList, json!({"next": null, "results": species_list})));

    let type_names: Vec<&str> = TYPE_CHART.iter().map(|row| row.0).collect();
    docs.push((Resource::TypeList, json!({"next": null, "results": named(&type_names)})));

    for (name, double_from, half_from, no_from, double_to, half_to, no_to) in TYPE_CHART {
        docs.push((
            Resource::type_named(name),
            json!({
                "name": name,
                "damage_relations": {
                    "double_damage_from": named(double_from),
                    "half_damage_from": named(half_from),
                    "no_damage_from": named(no_from),
                    "double_damage_to": named(double_to),
                    "half_damage_to": named(half_to),
                    "no_damage_to": named(no_to)
                }
            }),
        ));
    }

    for mon in MONS {
        docs.push((Resource::species(mon.id), species_doc(mon)));
        docs.push((Resource::species(mon.name), species_doc(mon)));
        docs.push((Resource::pokemon(mon.name), pokemon_doc(mon)));
    }

    docs.push((Resource::EvolutionChain(1), chain_doc(["bulbasaur", "ivysaur", "venusaur"], [16, 32])));
    docs.push((Resource::EvolutionChain(2), chain_doc(["charmander", "charmeleon", "charizard"], [16, 36])));

    docs
});

fn fixture_transport() -> MemoryTransport {
    let transport = MemoryTransport::new();
    for (resource, document) in FIXTURE_DOCUMENTS.iter() {
        transport.insert(resource, document.clone());
    }
    transport
}

/// A fresh client per run, so each run starts with an empty response cache
fn client(transport: &MemoryTransport) -> ApiClient<MemoryTransport> {
    ApiClient::new(transport.clone(), MEMORY_BASE_URL, RetryPolicy::immediate())
}

fn sync_csv(transport: &MemoryTransport, dir: &TempDir) -> RunSummary {
    let mut store = CsvStore::new(dir.path()).unwrap();
    run(&mut client(transport), &mut store, &mut NoProgress).unwrap()
}

fn all_ids() -> BTreeSet<u32> {
    MONS.iter().map(|m| m.id).collect()
}

// =============================================================================
// Full Sync
// =============================================================================

#[test]
fn test_full_sync_join_integrity() {
    let dir = TempDir::new().unwrap();
    let transport = fixture_transport();

    let summary = sync_csv(&transport, &dir);
    assert_eq!(summary, RunSummary { missing_total: 6, written: 6, failed: 0 });

    let store = CsvStore::new(dir.path()).unwrap();
    assert_eq!(store.existing_ids().unwrap(), all_ids());

    let species_ids: BTreeSet<u32> = store.load_species().unwrap().iter().map(|s| s.id).collect();
    let damage_ids: BTreeSet<u32> = store.load_damage().unwrap().iter().map(|d| d.id).collect();
    assert_eq!(species_ids, damage_ids);

    let dex = Pokedex::load(&store).unwrap();
    assert_eq!(dex.len(), 6);
    for entry in dex.all() {
        assert_eq!(entry.damage.as_ref().unwrap().id, entry.record.id);
    }
}

#[test]
fn test_synced_records_content() {
    let dir = TempDir::new().unwrap();
    sync_csv(&fixture_transport(), &dir);
    let dex = Pokedex::load(&CsvStore::new(dir.path()).unwrap()).unwrap();

    let ivysaur = &dex.get(2).unwrap().record;
    assert_eq!(ivysaur.species, "Seed Pokémon");
    assert_eq!(ivysaur.primary_type, "grass");
    assert_eq!(ivysaur.secondary_type.as_deref(), Some("poison"));
    assert_eq!(ivysaur.height_m, 0.7);
    assert_eq!(ivysaur.weight_kg, 8.0);
    assert_eq!(ivysaur.base_stat_total, Some(42 * 6));
    assert_eq!(ivysaur.flavor_text, "The ivysaur fixture entry.");
    assert_eq!(ivysaur.previous_evolution_id, Some(1));
    assert_eq!(ivysaur.next_evolution_ids, vec![3]);
    assert_eq!(ivysaur.evolution_conditions, "trigger:level-up&level:32");
    assert_eq!(ivysaur.icon_url.as_deref(), Some("https://img/2.png"));

    let bulbasaur = dex.get(1).unwrap().damage.as_ref().unwrap();
    assert_eq!(bulbasaur.double_damage_from, vec!["fire", "flying"]);
    assert_eq!(bulbasaur.half_damage_from, vec!["electric", "grass", "water"]);
    assert!(bulbasaur.no_damage_from.is_empty());

    let charizard = dex.get(6).unwrap().damage.as_ref().unwrap();
    assert_eq!(charizard.double_damage_from, vec!["electric", "rock", "water"]);
    assert_eq!(charizard.half_damage_from, vec!["fire", "grass"]);
    assert_eq!(charizard.no_damage_from, vec!["ground"]);
    assert_eq!(charizard.double_damage_to, vec!["grass"]);
    assert_eq!(charizard.half_damage_to, vec!["electric", "fire", "rock", "water"]);

    assert_eq!(dex.evolution_stages(5), vec![vec![4], vec![5], vec![6]]);
    let found: Vec<u32> = dex.search("CHAR").iter().map(|e| e.record.id).collect();
    assert_eq!(found, vec![4, 5, 6]);
}

#[test]
fn test_csv_files_are_header_tagged() {
    let dir = TempDir::new().unwrap();
    sync_csv(&fixture_transport(), &dir);

    for schema in [&POKEMON, &DAMAGE_RELATIONS] {
        let text = fs::read_to_string(dir.path().join(schema.file_name)).unwrap();
        let header = text.lines().next().unwrap();
        assert_eq!(header, schema.column_names().join(","));
        assert_eq!(text.lines().count(), 7);
    }
}

// =============================================================================
// Incremental Behaviour
// =============================================================================

#[test]
fn test_rerun_on_synced_store_is_noop() {
    let dir = TempDir::new().unwrap();
    let transport = fixture_transport();
    sync_csv(&transport, &dir);

    let pokemon_csv = dir.path().join(POKEMON.file_name);
    let before = fs::read(&pokemon_csv).unwrap();
    let requests_before = transport.requests().len();

    let mut snapshots = Vec::new();
    let mut store = CsvStore::new(dir.path()).unwrap();
    let summary = run(&mut client(&transport), &mut store, &mut |s: &ProgressSnapshot| {
        snapshots.push(s.clone())
    })
    .unwrap();

    assert_eq!(summary, RunSummary::default());
    assert_eq!(snapshots, vec![ProgressSnapshot::started(0), ProgressSnapshot::finished(0, 0)]);

    // Only the species index is consulted
    let new_requests = &transport.requests()[requests_before..];
    assert_eq!(new_requests, [Resource::SpeciesList.path()]);
    assert_eq!(fs::read(&pokemon_csv).unwrap(), before);
}

#[test]
fn test_resume_after_crash() {
    let dir = TempDir::new().unwrap();
    let transport = fixture_transport();

    // The sink aborts the run right before species 4 is fetched
    let crashed = catch_unwind(AssertUnwindSafe(|| {
        let mut store = CsvStore::new(dir.path()).unwrap();
        let mut crash_at_4 = |s: &ProgressSnapshot| {
            if s.current_id == Some(4) {
                panic!("simulated crash");
            }
        };
        run(&mut client(&transport), &mut store, &mut crash_at_4)
    }));
    assert!(crashed.is_err());

    let store = CsvStore::new(dir.path()).unwrap();
    assert_eq!(store.existing_ids().unwrap(), BTreeSet::from([1, 2, 3]));

    let mut first_seen = None;
    let mut store = CsvStore::new(dir.path()).unwrap();
    let summary = run(&mut client(&transport), &mut store, &mut |s: &ProgressSnapshot| {
        if first_seen.is_none() {
            first_seen = s.current_id;
        }
    })
    .unwrap();

    assert_eq!(first_seen, Some(4));
    assert_eq!(summary.written, 3);
    assert_eq!(store.existing_ids().unwrap(), all_ids());
    for id in all_ids() {
        assert_eq!(transport.request_count(&Resource::species(id)), 1, "species {}", id);
    }
}

#[test]
fn test_torn_trailing_row_is_refetched() {
    let dir = TempDir::new().unwrap();
    let transport = fixture_transport();
    sync_csv(&transport, &dir);

    // Drop the last two records, then leave a half-written row behind
    let pokemon_csv = dir.path().join(POKEMON.file_name);
    let text = fs::read_to_string(&pokemon_csv).unwrap();
    let kept: Vec<&str> = text.lines().take(5).collect();
    fs::write(&pokemon_csv, format!("{}\n", kept.join("\n"))).unwrap();
    let mut file = OpenOptions::new().append(true).open(&pokemon_csv).unwrap();
    write!(file, "5,charmeleon,\"Flame Pok").unwrap();
    drop(file);

    let store = CsvStore::new(dir.path()).unwrap();
    assert_eq!(store.existing_ids().unwrap(), BTreeSet::from([1, 2, 3, 4]));

    let summary = sync_csv(&transport, &dir);
    assert_eq!(summary.written, 2);

    let dex = Pokedex::load(&CsvStore::new(dir.path()).unwrap()).unwrap();
    assert_eq!(dex.len(), 6);
    assert_eq!(dex.get(5).unwrap().record.species, "Flame Pokémon");
}

#[test]
fn test_row_cut_before_newline_is_refetched() {
    let dir = TempDir::new().unwrap();
    let transport = fixture_transport();
    sync_csv(&transport, &dir);

    // Rows 1-4 survive, but row 4 loses only its terminating newline
    let pokemon_csv = dir.path().join(POKEMON.file_name);
    let text = fs::read_to_string(&pokemon_csv).unwrap();
    let kept: Vec<&str> = text.lines().take(5).collect();
    fs::write(&pokemon_csv, kept.join("\n")).unwrap();

    let store = CsvStore::new(dir.path()).unwrap();
    assert_eq!(store.existing_ids().unwrap(), BTreeSet::from([1, 2, 3]));

    let summary = sync_csv(&transport, &dir);
    assert_eq!(summary.missing_total, 3);
    assert_eq!(summary.written, 3);

    let store = CsvStore::new(dir.path()).unwrap();
    assert_eq!(store.existing_ids().unwrap(), all_ids());
    let dex = Pokedex::load(&store).unwrap();
    assert_eq!(dex.get(4).unwrap().record.name, "charmander");
}

#[test]
fn test_failing_species_is_skipped_and_retried_next_run() {
    let dir = TempDir::new().unwrap();
    let transport = fixture_transport();
    transport.fail_next(&Resource::pokemon("charmander"), 3);

    let summary = sync_csv(&transport, &dir);
    assert_eq!(summary, RunSummary { missing_total: 6, written: 5, failed: 1 });

    let store = CsvStore::new(dir.path()).unwrap();
    assert_eq!(store.existing_ids().unwrap(), BTreeSet::from([1, 2, 3, 5, 6]));

    // charmeleon still resolved its predecessor once the failures ran out
    let dex = Pokedex::load(&store).unwrap();
    assert_eq!(dex.get(5).unwrap().record.previous_evolution_id, Some(4));

    let summary = sync_csv(&transport, &dir);
    assert_eq!(summary, RunSummary { missing_total: 1, written: 1, failed: 0 });
    assert_eq!(CsvStore::new(dir.path()).unwrap().existing_ids().unwrap(), all_ids());
}

#[test]
fn test_progress_reported_before_each_fetch() {
    let dir = TempDir::new().unwrap();
    let mut store = CsvStore::new(dir.path()).unwrap();
    let mut snapshots = Vec::new();
    run(&mut client(&fixture_transport()), &mut store, &mut |s: &ProgressSnapshot| {
        snapshots.push(s.clone())
    })
    .unwrap();

    assert_eq!(snapshots.len(), 8);
    assert_eq!(snapshots[0], ProgressSnapshot::started(6));
    assert_eq!(snapshots[1], ProgressSnapshot::working(6, 0, 1, "bulbasaur"));
    assert_eq!(snapshots[6], ProgressSnapshot::working(6, 5, 6, "charizard"));
    assert_eq!(snapshots[7], ProgressSnapshot::finished(6, 6));
}

// =============================================================================
// Backends and Runner
// =============================================================================

#[test]
fn test_sqlite_backend_matches_csv() {
    let csv_dir = TempDir::new().unwrap();
    let sqlite_dir = TempDir::new().unwrap();
    let transport = fixture_transport();

    sync_csv(&transport, &csv_dir);
    let mut sqlite = SqliteStore::open(&sqlite_dir.path().join("pokedex.db")).unwrap();
    let summary = run(&mut client(&transport), &mut sqlite, &mut NoProgress).unwrap();
    assert_eq!(summary.written, 6);

    let from_csv = Pokedex::load(&CsvStore::new(csv_dir.path()).unwrap()).unwrap();
    let from_sqlite = Pokedex::load(&sqlite).unwrap();
    assert_eq!(from_csv.all(), from_sqlite.all());

    // Reopening finds everything already stored
    let mut reopened = SqliteStore::open(&sqlite_dir.path().join("pokedex.db")).unwrap();
    let summary = run(&mut client(&transport), &mut reopened, &mut NoProgress).unwrap();
    assert_eq!(summary.missing_total, 0);
}

#[test]
fn test_runner_publishes_snapshots_and_refuses_second_run() {
    let dir = TempDir::new().unwrap();
    let transport = fixture_transport();
    let runner = EtlRunner::new();
    let (start_tx, start_rx) = sync_channel::<()>(0);

    let job_transport = transport.clone();
    let job_dir = dir.path().to_path_buf();
    let mut handle = runner
        .spawn(move |sink| {
            start_rx.recv().ok();
            let mut store = CsvStore::new(&job_dir)?;
            run(&mut client(&job_transport), &mut store, sink)
        })
        .unwrap();

    let err = runner.spawn(|_| Ok(RunSummary::default())).unwrap_err();
    assert!(matches!(err.downcast_ref::<RunError>(), Some(RunError::AlreadyRunning)));

    start_tx.send(()).unwrap();
    while !handle.is_finished() {
        std::thread::yield_now();
    }
    let snapshots = handle.poll();
    assert_eq!(snapshots.first(), Some(&ProgressSnapshot::started(6)));
    assert_eq!(handle.latest(), Some(&ProgressSnapshot::finished(6, 6)));
    assert_eq!(handle.join().unwrap().written, 6);
    assert!(!runner.is_active());
}
