use anyhow::{Context, Result};
use rusqlite::Connection;
use std::collections::BTreeSet;
use std::path::Path;

use super::schema_gen::{generate_create_table, generate_insert, generate_select};
use super::RecordStore;
use crate::error::StoreError;
use crate::parser::{ParsedRow, SqlValue, TableRecord};
use crate::schema::{DamageRecord, SpeciesId, SpeciesRecord, TableSchema, ALL_TABLES, POKEMON};

pub const DB_FILE_NAME: &str = "pokedex.db";

/// SQLite backend. Each species is committed together with its damage row.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {:?}", db_path))?;

        // WAL keeps readers off the writer's back; FULL sync makes each commit durable
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = FULL;",
        )?;

        let store = Self { conn };
        store.create_tables(db_path)?;
        Ok(store)
    }

    /// Create missing tables and validate the columns of existing ones
    fn create_tables(&self, db_path: &Path) -> Result<()> {
        for schema in ALL_TABLES {
            self.conn
                .execute(&generate_create_table(schema), [])
                .with_context(|| format!("Failed to create table: {}", schema.name))?;

            let found = self.table_columns(schema)?;
            let expected: Vec<String> = schema.column_names().into_iter().map(String::from).collect();
            if !found.iter().any(|c| c == "id") {
                return Err(StoreError::MissingIdColumn {
                    path: db_path.join(schema.name),
                }
                .into());
            }
            if found != expected {
                return Err(StoreError::HeaderMismatch {
                    path: db_path.join(schema.name),
                    expected,
                    found,
                }
                .into());
            }
        }
        Ok(())
    }

    fn table_columns(&self, schema: &TableSchema) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", schema.name))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    fn insert<R: TableRecord>(tx: &rusqlite::Transaction, record: &R) -> Result<()> {
        let mut stmt = tx.prepare_cached(&generate_insert(R::schema()))?;
        for (idx, value) in record.to_row().iter().enumerate() {
            value.bind_to(idx + 1, &mut stmt)?;
        }
        stmt.raw_execute()
            .with_context(|| format!("Failed to insert {} #{}", R::schema().name, record.id()))?;
        Ok(())
    }

    fn read_table<R: TableRecord>(&self) -> Result<Vec<R>> {
        let schema = R::schema();
        let columns = schema.column_names();
        let mut stmt = self.conn.prepare(&generate_select(schema))?;
        let mut rows = stmt.query([])?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut parsed = ParsedRow::default();
            for (idx, name) in columns.iter().enumerate() {
                let value: rusqlite::types::Value = row.get(idx)?;
                parsed.values.insert(name.to_string(), SqlValue::from(value));
            }
            records.push(
                R::from_row(&parsed)
                    .with_context(|| format!("Bad row in table {}", schema.name))?,
            );
        }
        Ok(records)
    }
}

impl RecordStore for SqliteStore {
    fn existing_ids(&self) -> Result<BTreeSet<SpeciesId>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT id FROM {}", POKEMON.name))?;
        let ids = stmt
            .query_map([], |row| row.get::<_, u32>(0))?
            .collect::<rusqlite::Result<BTreeSet<_>>>()?;
        Ok(ids)
    }

    fn append(&mut self, species: &SpeciesRecord, damage: &DamageRecord) -> Result<()> {
        let tx = self.conn.transaction()?;
        Self::insert(&tx, species)?;
        Self::insert(&tx, damage)?;
        tx.commit()?;
        Ok(())
    }

    fn load_species(&self) -> Result<Vec<SpeciesRecord>> {
        self.read_table()
    }

    fn load_damage(&self) -> Result<Vec<DamageRecord>> {
        self.read_table()
    }
}
