use anyhow::{bail, Context, Result};
use pokedex_etl::{
    cli::{Cli, Commands, StoreArgs},
    config::{resolve_data_dir, EtlConfig},
    dataset::Pokedex,
    etl::{sync, EtlRunner, RunHandle, RunSummary},
    schema::{get_table, table_names, TableSchema, ALL_TABLES},
    store::open_store,
    ui::{show_snapshot, LogUi, Ui, UiApp},
};
use serde::Serialize;
use serde_json::json;
use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use std::thread::sleep;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_NAME: &str = "sync.log";
const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    match cli.command {
        Commands::Sync {
            store,
            base_url,
            delay_ms,
            plain,
        } => {
            let data_dir = resolve_data_dir(store.data_dir)?;
            if plain {
                init_logging_to_stderr();
            } else {
                init_logging_to_file(&data_dir.join(LOG_FILE_NAME))?;
            }

            let config = EtlConfig::new(data_dir)
                .with_backend(store.store)
                .with_base_url(base_url)
                .with_request_delay(Duration::from_millis(delay_ms));
            run_sync(config, plain)?;
        }

        Commands::Show { id, store } => {
            init_logging_to_stderr();
            let dex = load_pokedex(store)?;
            match dex.get(id) {
                Some(entry) => print_json(entry)?,
                None => bail!("Pokémon #{} not found", id),
            }
        }

        Commands::Search { query, store } => {
            init_logging_to_stderr();
            let dex = load_pokedex(store)?;
            print_json(&dex.search(&query))?;
        }

        Commands::Random { count, store } => {
            init_logging_to_stderr();
            let dex = load_pokedex(store)?;
            print_json(&dex.random_sample(count, &mut rand::thread_rng()))?;
        }

        Commands::Chain { id, store } => {
            init_logging_to_stderr();
            let dex = load_pokedex(store)?;
            if dex.get(id).is_none() {
                bail!("Pokémon #{} not found", id);
            }

            let stages: Vec<Vec<_>> = dex
                .evolution_stages(id)
                .into_iter()
                .map(|stage| {
                    stage
                        .into_iter()
                        .map(|member| {
                            json!({
                                "id": member,
                                "name": dex.get(member).map(|e| e.record.name.as_str()),
                            })
                        })
                        .collect()
                })
                .collect();
            print_json(&stages)?;
        }

        Commands::Columns { table } => {
            let tables: Vec<&TableSchema> = match table {
                Some(name) => match get_table(&name) {
                    Some(schema) => vec![schema],
                    None => bail!("Unknown table '{}'. Available: {}", name, table_names().join(", ")),
                },
                None => ALL_TABLES.to_vec(),
            };

            for table in tables {
                println!("{} ({}):", table.name, table.file_name);
                for column in table.columns {
                    let required = if column.nullable { "" } else { " NOT NULL" };
                    println!("  {:<24} {}{}", column.name, column.col_type.sql_type(), required);
                }
                println!();
            }
        }
    }

    Ok(())
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_logging_to_stderr() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// The terminal UI owns the screen, so log lines go to a file instead
fn init_logging_to_file(path: &Path) -> Result<()> {
    let file = File::options()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {:?}", path))?;

    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .init();
    Ok(())
}

fn load_pokedex(args: StoreArgs) -> Result<Pokedex> {
    let data_dir = resolve_data_dir(args.data_dir)?;
    let store = open_store(args.store, &data_dir)?;
    Pokedex::load(&store)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_sync(config: EtlConfig, plain: bool) -> Result<()> {
    let start = Instant::now();
    let runner = EtlRunner::new();
    let job_config = config.clone();
    let mut handle = runner.spawn(move |sink| sync(&job_config, sink))?;

    let summary = if plain {
        let mut ui = LogUi::new();
        while !pump(&mut handle, &mut ui) {
            sleep(POLL_INTERVAL);
        }
        handle.join()?
    } else {
        let mut ui = UiApp::new()?;
        loop {
            if pump(&mut handle, &mut ui) {
                break;
            }
            if ui.check_quit(POLL_INTERVAL) {
                ui.restore()?;
                println!("Left the sync early. Stored records are kept; run sync again to resume.");
                return Ok(());
            }
        }

        match handle.join() {
            Ok(summary) => {
                ui.finish(&summary_line(&summary))?;
                summary
            }
            Err(e) => {
                ui.restore()?;
                return Err(e);
            }
        }
    };

    println!(
        "{} into {:?} in {:.1}s",
        summary_line(&summary),
        config.data_dir(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Show pending snapshots; true once the worker has exited
fn pump<U: Ui>(handle: &mut RunHandle, ui: &mut U) -> bool {
    let finished = handle.is_finished();
    for snapshot in handle.poll() {
        show_snapshot(ui, &snapshot);
    }
    finished
}

fn summary_line(summary: &RunSummary) -> String {
    if summary.missing_total == 0 {
        "Already up to date".to_string()
    } else {
        format!(
            "Synced {} of {} missing species ({} failed)",
            summary.written, summary.missing_total, summary.failed
        )
    }
}
