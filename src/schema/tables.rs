//! Table schema definitions for the two Pokédex datasets

use super::types::*;

pub static POKEMON: TableSchema = TableSchema {
    name: "pokemon",
    file_name: "pokemon.csv",
    columns: &[
        Column::required("id", ColumnType::Integer),
        Column::required("name", ColumnType::Text),
        Column::required("species", ColumnType::Text),
        Column::required("generation", ColumnType::Integer),
        Column::new("official_artwork_url", ColumnType::Text),
        Column::new("sprite_url", ColumnType::Text),
        Column::new("icon_url", ColumnType::Text),
        Column::required("primary_type", ColumnType::Text),
        Column::new("secondary_type", ColumnType::Text),
        Column::required("height_m", ColumnType::Real),
        Column::required("weight_kg", ColumnType::Real),
        Column::new("hp", ColumnType::Integer),
        Column::new("attack", ColumnType::Integer),
        Column::new("defense", ColumnType::Integer),
        Column::new("special_attack", ColumnType::Integer),
        Column::new("special_defense", ColumnType::Integer),
        Column::new("speed", ColumnType::Integer),
        Column::new("base_stat_total", ColumnType::Integer),
        Column::required("flavor_text", ColumnType::Text),
        Column::new("previous_evolution_id", ColumnType::Integer),
        Column::required("next_evolution_id", ColumnType::IdList),
        Column::required("evolution_conditions", ColumnType::Text),
        Column::required("is_legendary", ColumnType::Boolean),
        Column::required("is_mythical", ColumnType::Boolean),
    ],
    foreign_keys: &[],
};

pub static DAMAGE_RELATIONS: TableSchema = TableSchema {
    name: "damage_relations",
    file_name: "damage_relations.csv",
    columns: &[
        Column::required("id", ColumnType::Integer),
        Column::required("double_damage_from", ColumnType::NameList),
        Column::required("half_damage_from", ColumnType::NameList),
        Column::required("no_damage_from", ColumnType::NameList),
        Column::required("double_damage_to", ColumnType::NameList),
        Column::required("half_damage_to", ColumnType::NameList),
        Column::required("no_damage_to", ColumnType::NameList),
    ],
    foreign_keys: &[ForeignKey::new("id", "pokemon")],
};

/// All tables, parents before children
pub static ALL_TABLES: &[&TableSchema] = &[&POKEMON, &DAMAGE_RELATIONS];

/// Get a table schema by name
pub fn get_table(name: &str) -> Option<&'static TableSchema> {
    ALL_TABLES.iter().find(|t| t.name == name).copied()
}

/// Get all table names
pub fn table_names() -> Vec<&'static str> {
    ALL_TABLES.iter().map(|t| t.name).collect()
}
