use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::RecordStore;
use crate::error::StoreError;
use crate::parser::{ParsedRow, TableRecord};
use crate::schema::{DamageRecord, SpeciesId, SpeciesRecord, TableSchema, POKEMON};

/// CSV backend: one header-tagged UTF-8 file per table.
///
/// Rows are serialized in memory and written with a single `write_all`, then
/// flushed and synced, so a crash leaves at most one torn trailing row.
/// Readers ignore an unterminated last row and drop any row whose field
/// count does not match the header.
pub struct CsvStore {
    dir: PathBuf,
    /// Tables whose header has been checked (or written) by this instance
    prepared: HashSet<&'static str>,
}

impl CsvStore {
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create data directory: {:?}", dir))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            prepared: HashSet::new(),
        })
    }

    pub fn path(&self, schema: &TableSchema) -> PathBuf {
        self.dir.join(schema.file_name)
    }

    /// Header row of a table file; `None` when the file is absent or empty
    fn read_header(path: &Path) -> Result<Option<Vec<String>>> {
        if !path.exists() {
            return Ok(None);
        }
        let mut reader = ::csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("Failed to open: {:?}", path))?;
        let headers: Vec<String> = reader
            .headers()
            .with_context(|| format!("Failed to read header: {:?}", path))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        if headers.iter().all(|h| h.is_empty()) {
            return Ok(None);
        }
        if !headers.iter().any(|h| h == "id") {
            return Err(StoreError::MissingIdColumn {
                path: path.to_path_buf(),
            }
            .into());
        }
        Ok(Some(headers))
    }

    /// Write the header for a new file, or validate the header of an existing one
    fn prepare(&mut self, schema: &'static TableSchema) -> Result<()> {
        if self.prepared.contains(schema.name) {
            return Ok(());
        }

        let path = self.path(schema);
        let expected: Vec<String> = schema.column_names().into_iter().map(String::from).collect();

        match Self::read_header(&path)? {
            None => {
                let bytes = encode_row(&expected)?;
                fs::write(&path, bytes)
                    .with_context(|| format!("Failed to write header: {:?}", path))?;
            }
            Some(found) if found != expected => {
                return Err(StoreError::HeaderMismatch {
                    path,
                    expected,
                    found,
                }
                .into());
            }
            Some(_) => {
                if truncate_torn_row(&path)? == 0 {
                    // The header itself was torn
                    fs::write(&path, encode_row(&expected)?)
                        .with_context(|| format!("Failed to write header: {:?}", path))?;
                }
            }
        }

        self.prepared.insert(schema.name);
        Ok(())
    }

    fn append_record<R: TableRecord>(&mut self, record: &R) -> Result<()> {
        let schema = R::schema();
        self.prepare(schema)?;

        let cells: Vec<String> = record.to_row().iter().map(|v| v.to_text()).collect();
        let bytes = encode_row(&cells)?;

        let path = self.path(schema);
        let mut file = OpenOptions::new()
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open for append: {:?}", path))?;
        file.write_all(&bytes)
            .with_context(|| format!("Failed to append to {:?}", path))?;
        file.flush()?;
        file.sync_data()
            .with_context(|| format!("Failed to sync {:?}", path))?;
        Ok(())
    }

    /// Parse every intact row of a table
    fn read_rows(&self, schema: &TableSchema) -> Result<Vec<ParsedRow>> {
        let path = self.path(schema);
        let Some(headers) = Self::read_header(&path)? else {
            return Ok(Vec::new());
        };

        let bytes = fs::read(&path).with_context(|| format!("Failed to read: {:?}", path))?;
        let intact = intact_len(&bytes);
        if intact < bytes.len() {
            warn!(
                file = %schema.file_name,
                bytes = bytes.len() - intact,
                "ignoring unterminated trailing row"
            );
        }
        let mut reader = ::csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(&bytes[..intact]);

        let mut rows = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            let line = idx + 2;
            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    warn!(file = %schema.file_name, line, error = %e, "dropping unreadable row");
                    continue;
                }
            };
            if record.len() != headers.len() {
                warn!(
                    file = %schema.file_name,
                    line,
                    fields = record.len(),
                    expected = headers.len(),
                    "dropping torn row"
                );
                continue;
            }

            let cells: Vec<String> = record.iter().map(String::from).collect();
            match ParsedRow::from_cells(schema, &headers, &cells) {
                Ok(row) => rows.push(row),
                Err(e) => warn!(file = %schema.file_name, line, error = %e, "dropping malformed row"),
            }
        }
        Ok(rows)
    }

    fn read_table<R: TableRecord>(&self) -> Result<Vec<R>> {
        let schema = R::schema();
        let mut records = Vec::new();
        for row in self.read_rows(schema)? {
            match R::from_row(&row) {
                Ok(record) => records.push(record),
                Err(e) => warn!(file = %schema.file_name, error = %e, "dropping malformed row"),
            }
        }
        Ok(records)
    }
}

impl RecordStore for CsvStore {
    fn existing_ids(&self) -> Result<BTreeSet<SpeciesId>> {
        let mut ids = BTreeSet::new();
        for row in self.read_rows(&POKEMON)? {
            match row.id() {
                Ok(id) => {
                    ids.insert(id);
                }
                Err(e) => warn!(file = %POKEMON.file_name, error = %e, "skipping row without a usable id"),
            }
        }
        Ok(ids)
    }

    // The damage row goes first: the pokemon row is what marks an id as done
    fn append(&mut self, species: &SpeciesRecord, damage: &DamageRecord) -> Result<()> {
        self.append_record(damage)?;
        self.append_record(species)?;
        Ok(())
    }

    fn load_species(&self) -> Result<Vec<SpeciesRecord>> {
        self.read_table()
    }

    fn load_damage(&self) -> Result<Vec<DamageRecord>> {
        self.read_table()
    }
}

fn encode_row<T: AsRef<[u8]>>(cells: &[T]) -> Result<Vec<u8>> {
    let mut writer = ::csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(cells)?;
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to encode row: {}", e.error()))
}

/// Length of the newline-terminated prefix; a row without its `\n` never finished
fn intact_len(bytes: &[u8]) -> usize {
    if bytes.ends_with(b"\n") {
        return bytes.len();
    }
    bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |pos| pos + 1)
}

/// Cut an interrupted trailing write so the next append starts on a fresh line.
/// Returns the file length left behind.
fn truncate_torn_row(path: &Path) -> Result<usize> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read: {:?}", path))?;
    let keep = intact_len(&bytes);
    if keep == bytes.len() {
        return Ok(keep);
    }
    warn!(path = ?path, bytes = bytes.len() - keep, "truncating torn trailing row");

    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .with_context(|| format!("Failed to open: {:?}", path))?;
    file.set_len(keep as u64)?;
    file.sync_data()?;
    Ok(keep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DAMAGE_RELATIONS;
    use crate::store::tests::{sample_damage, sample_species};
    use tempfile::tempdir;

    #[test]
    fn test_append_writes_header_once() {
        let dir = tempdir().unwrap();
        let mut store = CsvStore::new(dir.path()).unwrap();
        store.append(&sample_species(25), &sample_damage(25)).unwrap();
        store.append(&sample_species(26), &sample_damage(26)).unwrap();

        // A second instance must reuse the existing header
        let mut store = CsvStore::new(dir.path()).unwrap();
        store.append(&sample_species(27), &sample_damage(27)).unwrap();

        let text = fs::read_to_string(dir.path().join("pokemon.csv")).unwrap();
        assert_eq!(text.matches("id,name,species").count(), 1);
        assert_eq!(store.existing_ids().unwrap(), BTreeSet::from([25, 26, 27]));

        let species = store.load_species().unwrap();
        assert_eq!(species.len(), 3);
        assert_eq!(species[0], sample_species(25));
        assert_eq!(store.load_damage().unwrap()[2], sample_damage(27));
    }

    #[test]
    fn test_missing_store_is_empty() {
        let dir = tempdir().unwrap();
        let store = CsvStore::new(&dir.path().join("fresh")).unwrap();
        assert!(store.existing_ids().unwrap().is_empty());
        assert!(store.load_species().unwrap().is_empty());
    }

    #[test]
    fn test_header_without_id_is_fatal() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("pokemon.csv"), "name,species\npikachu,Mouse\n").unwrap();
        let store = CsvStore::new(dir.path()).unwrap();

        let err = store.existing_ids().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::MissingIdColumn { .. })
        ));
    }

    #[test]
    fn test_append_refuses_foreign_header() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("damage_relations.csv"), "id,weakness\n1,fire\n").unwrap();
        let mut store = CsvStore::new(dir.path()).unwrap();

        let err = store
            .append(&sample_species(1), &sample_damage(1))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::HeaderMismatch { .. })
        ));
        // Nothing was written to the pokemon table
        assert!(store.existing_ids().unwrap().is_empty());
    }

    #[test]
    fn test_torn_trailing_row_is_dropped_and_truncated() {
        let dir = tempdir().unwrap();
        let mut store = CsvStore::new(dir.path()).unwrap();
        store.append(&sample_species(1), &sample_damage(1)).unwrap();

        // Simulate a crash halfway through a write
        let path = store.path(&DAMAGE_RELATIONS);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"2,ground,\"electr").unwrap();
        drop(file);

        assert_eq!(store.load_damage().unwrap().len(), 1);

        let mut store = CsvStore::new(dir.path()).unwrap();
        store.append(&sample_species(2), &sample_damage(2)).unwrap();
        let damage = store.load_damage().unwrap();
        assert_eq!(damage.len(), 2);
        assert_eq!(damage[1], sample_damage(2));
    }

    #[test]
    fn test_row_missing_only_its_newline_is_not_counted() {
        let dir = tempdir().unwrap();
        let mut store = CsvStore::new(dir.path()).unwrap();
        store.append(&sample_species(1), &sample_damage(1)).unwrap();
        store.append(&sample_species(2), &sample_damage(2)).unwrap();

        // Every field of row 2 is present, but the write stopped before `\n`
        let path = store.path(&POKEMON);
        let text = fs::read_to_string(&path).unwrap();
        fs::write(&path, text.trim_end_matches('\n')).unwrap();

        let store = CsvStore::new(dir.path()).unwrap();
        assert_eq!(store.existing_ids().unwrap(), BTreeSet::from([1]));
        assert_eq!(store.load_species().unwrap().len(), 1);
    }

    #[test]
    fn test_torn_header_is_rewritten() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("pokemon.csv"), POKEMON.column_names().join(",")).unwrap();

        let mut store = CsvStore::new(dir.path()).unwrap();
        store.append(&sample_species(7), &sample_damage(7)).unwrap();
        assert_eq!(store.existing_ids().unwrap(), BTreeSet::from([7]));
    }

    #[test]
    fn test_intact_len() {
        assert_eq!(intact_len(b""), 0);
        assert_eq!(intact_len(b"id\n1\n"), 5);
        assert_eq!(intact_len(b"id\n1,"), 3);
        assert_eq!(intact_len(b"id"), 0);
    }
}
