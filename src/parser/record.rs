use anyhow::{anyhow, bail, Context, Result};
use std::collections::HashMap;

use crate::schema::{
    BaseStats, ColumnType, DamageRecord, SpeciesId, SpeciesRecord, TableSchema, DAMAGE_RELATIONS,
    POKEMON,
};

/// A stored row keyed by column name
#[derive(Debug, Clone, Default)]
pub struct ParsedRow {
    pub values: HashMap<String, SqlValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    pub fn bind_to(&self, idx: usize, stmt: &mut rusqlite::Statement) -> rusqlite::Result<()> {
        match self {
            SqlValue::Null => stmt.raw_bind_parameter(idx, rusqlite::types::Null)?,
            SqlValue::Integer(i) => stmt.raw_bind_parameter(idx, i)?,
            SqlValue::Real(f) => stmt.raw_bind_parameter(idx, f)?,
            SqlValue::Text(s) => stmt.raw_bind_parameter(idx, s.as_str())?,
        }
        Ok(())
    }

    /// Text form used by the CSV backend; NULL becomes an empty cell
    pub fn to_text(&self) -> String {
        match self {
            SqlValue::Null => String::new(),
            SqlValue::Integer(i) => i.to_string(),
            SqlValue::Real(f) => f.to_string(),
            SqlValue::Text(s) => s.clone(),
        }
    }

    fn optional_text(value: Option<&str>) -> Self {
        match value {
            Some(s) if !s.is_empty() => SqlValue::Text(s.to_string()),
            _ => SqlValue::Null,
        }
    }

    fn optional_int(value: Option<u32>) -> Self {
        value
            .map(|v| SqlValue::Integer(v as i64))
            .unwrap_or(SqlValue::Null)
    }
}

impl From<rusqlite::types::Value> for SqlValue {
    fn from(value: rusqlite::types::Value) -> Self {
        use rusqlite::types::Value;
        match value {
            Value::Null => SqlValue::Null,
            Value::Integer(i) => SqlValue::Integer(i),
            Value::Real(f) => SqlValue::Real(f),
            Value::Text(s) => SqlValue::Text(s),
            Value::Blob(b) => SqlValue::Text(String::from_utf8_lossy(&b).into_owned()),
        }
    }
}

/// Parse one CSV cell according to its column type
pub fn parse_cell(text: &str, col_type: ColumnType) -> Result<SqlValue> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(SqlValue::Null);
    }

    let value = match col_type {
        ColumnType::Integer => SqlValue::Integer(
            text.parse()
                .with_context(|| format!("Invalid integer: {:?}", text))?,
        ),
        ColumnType::Real => SqlValue::Real(
            text.parse()
                .with_context(|| format!("Invalid number: {:?}", text))?,
        ),
        ColumnType::Boolean => match text.to_ascii_lowercase().as_str() {
            "1" | "true" => SqlValue::Integer(1),
            "0" | "false" => SqlValue::Integer(0),
            other => bail!("Invalid boolean: {:?}", other),
        },
        ColumnType::Text | ColumnType::IdList | ColumnType::NameList => {
            SqlValue::Text(text.to_string())
        }
    };

    Ok(value)
}

impl ParsedRow {
    /// Build a row from header names and raw CSV cells
    pub fn from_cells(schema: &TableSchema, headers: &[String], cells: &[String]) -> Result<Self> {
        let mut values = HashMap::new();
        for (header, cell) in headers.iter().zip(cells) {
            // Unknown columns are carried as text
            let col_type = schema
                .column(header)
                .map(|c| c.col_type)
                .unwrap_or(ColumnType::Text);
            let value = parse_cell(cell, col_type)
                .with_context(|| format!("Column {}.{}", schema.name, header))?;
            values.insert(header.clone(), value);
        }
        Ok(Self { values })
    }

    fn get(&self, column: &str) -> &SqlValue {
        self.values.get(column).unwrap_or(&SqlValue::Null)
    }

    pub fn int(&self, column: &str) -> Result<Option<i64>> {
        match self.get(column) {
            SqlValue::Null => Ok(None),
            SqlValue::Integer(i) => Ok(Some(*i)),
            SqlValue::Real(f) if f.fract() == 0.0 => Ok(Some(*f as i64)),
            SqlValue::Text(s) => s
                .trim()
                .parse()
                .map(Some)
                .with_context(|| format!("Column {} is not an integer: {:?}", column, s)),
            other => Err(anyhow!("Column {} is not an integer: {:?}", column, other)),
        }
    }

    pub fn u32(&self, column: &str) -> Result<Option<u32>> {
        self.int(column)?
            .map(|v| u32::try_from(v).with_context(|| format!("Column {} out of range", column)))
            .transpose()
    }

    pub fn id(&self) -> Result<SpeciesId> {
        self.u32("id")?.context("Row has an empty id")
    }

    pub fn real(&self, column: &str) -> Result<Option<f64>> {
        match self.get(column) {
            SqlValue::Null => Ok(None),
            SqlValue::Integer(i) => Ok(Some(*i as f64)),
            SqlValue::Real(f) => Ok(Some(*f)),
            SqlValue::Text(s) => s
                .trim()
                .parse()
                .map(Some)
                .with_context(|| format!("Column {} is not a number: {:?}", column, s)),
        }
    }

    pub fn text(&self, column: &str) -> Option<String> {
        match self.get(column) {
            SqlValue::Null => None,
            SqlValue::Text(s) if s.is_empty() => None,
            other => Some(other.to_text()),
        }
    }

    pub fn flag(&self, column: &str) -> Result<bool> {
        Ok(self.int(column)?.unwrap_or(0) != 0)
    }

    pub fn names(&self, column: &str) -> Vec<String> {
        self.text(column)
            .map(|s| split_list(&s).map(str::to_lowercase).collect())
            .unwrap_or_default()
    }

    pub fn ids(&self, column: &str) -> Result<Vec<SpeciesId>> {
        self.text(column)
            .map(|s| {
                split_list(&s)
                    .map(|id| {
                        id.parse()
                            .with_context(|| format!("Column {} has a bad id: {:?}", column, id))
                    })
                    .collect()
            })
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

fn split_list(s: &str) -> impl Iterator<Item = &str> {
    s.split(',').map(str::trim).filter(|item| !item.is_empty())
}

fn join<T: ToString>(items: &[T]) -> SqlValue {
    SqlValue::Text(
        items
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// A record type that maps onto one table
pub trait TableRecord: Sized {
    fn schema() -> &'static TableSchema;

    fn id(&self) -> SpeciesId;

    /// Values in the schema's column order
    fn to_row(&self) -> Vec<SqlValue>;

    fn from_row(row: &ParsedRow) -> Result<Self>;
}

impl TableRecord for SpeciesRecord {
    fn schema() -> &'static TableSchema {
        &POKEMON
    }

    fn id(&self) -> SpeciesId {
        self.id
    }

    fn to_row(&self) -> Vec<SqlValue> {
        let mut row = vec![
            SqlValue::Integer(self.id as i64),
            SqlValue::Text(self.name.clone()),
            SqlValue::Text(self.species.clone()),
            SqlValue::Integer(self.generation as i64),
            SqlValue::optional_text(self.official_artwork_url.as_deref()),
            SqlValue::optional_text(self.sprite_url.as_deref()),
            SqlValue::optional_text(self.icon_url.as_deref()),
            SqlValue::Text(self.primary_type.clone()),
            SqlValue::optional_text(self.secondary_type.as_deref()),
            SqlValue::Real(self.height_m),
            SqlValue::Real(self.weight_kg),
        ];
        row.extend(self.stats.values().into_iter().map(SqlValue::optional_int));
        row.extend([
            SqlValue::optional_int(self.base_stat_total),
            SqlValue::Text(self.flavor_text.clone()),
            SqlValue::optional_int(self.previous_evolution_id),
            join(&self.next_evolution_ids),
            SqlValue::Text(self.evolution_conditions.clone()),
            SqlValue::Integer(self.is_legendary as i64),
            SqlValue::Integer(self.is_mythical as i64),
        ]);
        row
    }

    fn from_row(row: &ParsedRow) -> Result<Self> {
        let stats = BaseStats {
            hp: row.u32("hp")?,
            attack: row.u32("attack")?,
            defense: row.u32("defense")?,
            special_attack: row.u32("special_attack")?,
            special_defense: row.u32("special_defense")?,
            speed: row.u32("speed")?,
        };

        Ok(Self {
            id: row.id()?,
            name: row.text("name").unwrap_or_default(),
            species: row.text("species").unwrap_or_default(),
            generation: row
                .u32("generation")?
                .and_then(|g| u8::try_from(g).ok())
                .unwrap_or(0),
            official_artwork_url: row.text("official_artwork_url"),
            sprite_url: row.text("sprite_url"),
            icon_url: row.text("icon_url"),
            primary_type: row.text("primary_type").unwrap_or_default(),
            secondary_type: row.text("secondary_type"),
            height_m: row.real("height_m")?.unwrap_or(0.0),
            weight_kg: row.real("weight_kg")?.unwrap_or(0.0),
            base_stat_total: row.u32("base_stat_total")?,
            stats,
            flavor_text: row.text("flavor_text").unwrap_or_default(),
            previous_evolution_id: row.u32("previous_evolution_id")?,
            next_evolution_ids: row.ids("next_evolution_id")?,
            evolution_conditions: row.text("evolution_conditions").unwrap_or_default(),
            is_legendary: row.flag("is_legendary")?,
            is_mythical: row.flag("is_mythical")?,
        })
    }
}

impl TableRecord for DamageRecord {
    fn schema() -> &'static TableSchema {
        &DAMAGE_RELATIONS
    }

    fn id(&self) -> SpeciesId {
        self.id
    }

    fn to_row(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Integer(self.id as i64),
            join(&self.double_damage_from),
            join(&self.half_damage_from),
            join(&self.no_damage_from),
            join(&self.double_damage_to),
            join(&self.half_damage_to),
            join(&self.no_damage_to),
        ]
    }

    fn from_row(row: &ParsedRow) -> Result<Self> {
        Ok(Self {
            id: row.id()?,
            double_damage_from: row.names("double_damage_from"),
            half_damage_from: row.names("half_damage_from"),
            no_damage_from: row.names("no_damage_from"),
            double_damage_to: row.names("double_damage_to"),
            half_damage_to: row.names("half_damage_to"),
            no_damage_to: row.names("no_damage_to"),
        })
    }
}
