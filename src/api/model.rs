//! Typed projections of the PokéAPI documents this crate reads.
//!
//! Only the fields the ETL consumes are declared. Anything the API may omit is
//! an `Option` or carries `#[serde(default)]`, so an absent field is an explicit
//! `None`/empty value rather than a deserialization failure.

use serde::Deserialize;
use std::collections::HashMap;

/// `{ "name": ..., "url": ... }` reference to another resource
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NamedResource {
    pub name: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UrlResource {
    pub url: String,
}

/// One page of a list endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceList {
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub results: Vec<NamedResource>,
}

// =============================================================================
// pokemon-species/{id}
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct Species {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub generation: Option<NamedResource>,
    #[serde(default)]
    pub varieties: Vec<Variety>,
    #[serde(default)]
    pub genera: Vec<Genus>,
    #[serde(default)]
    pub flavor_text_entries: Vec<FlavorText>,
    #[serde(default)]
    pub evolution_chain: Option<UrlResource>,
    #[serde(default)]
    pub is_legendary: bool,
    #[serde(default)]
    pub is_mythical: bool,
}

impl Species {
    /// Name of the variety the API marks as default, if any
    pub fn default_variety(&self) -> Option<&str> {
        self.varieties
            .iter()
            .find(|v| v.is_default)
            .map(|v| v.pokemon.name.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Variety {
    #[serde(default)]
    pub is_default: bool,
    pub pokemon: NamedResource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Genus {
    pub genus: String,
    pub language: NamedResource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlavorText {
    pub flavor_text: String,
    pub language: NamedResource,
}

// =============================================================================
// pokemon/{id or name}
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct Pokemon {
    pub id: u32,
    pub name: String,
    /// Decimetres
    #[serde(default)]
    pub height: u32,
    /// Hectograms
    #[serde(default)]
    pub weight: u32,
    #[serde(default)]
    pub types: Vec<PokemonType>,
    #[serde(default)]
    pub stats: Vec<PokemonStat>,
    #[serde(default)]
    pub sprites: Sprites,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PokemonType {
    pub slot: u8,
    #[serde(rename = "type")]
    pub kind: NamedResource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PokemonStat {
    pub base_stat: u32,
    pub stat: NamedResource,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Sprites {
    #[serde(default)]
    pub front_default: Option<String>,
    #[serde(default)]
    pub other: Option<OtherSprites>,
    /// generation -> game/icon set -> sprite set
    #[serde(default)]
    pub versions: Option<HashMap<String, HashMap<String, SpriteSet>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OtherSprites {
    #[serde(default, rename = "official-artwork")]
    pub official_artwork: Option<SpriteSet>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpriteSet {
    #[serde(default)]
    pub front_default: Option<String>,
}

// =============================================================================
// type/{name}
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct TypeDetail {
    pub name: String,
    #[serde(default)]
    pub damage_relations: DamageRelations,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DamageRelations {
    #[serde(default)]
    pub double_damage_from: Vec<NamedResource>,
    #[serde(default)]
    pub half_damage_from: Vec<NamedResource>,
    #[serde(default)]
    pub no_damage_from: Vec<NamedResource>,
    #[serde(default)]
    pub double_damage_to: Vec<NamedResource>,
    #[serde(default)]
    pub half_damage_to: Vec<NamedResource>,
    #[serde(default)]
    pub no_damage_to: Vec<NamedResource>,
}

// =============================================================================
// evolution-chain/{id}
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct EvolutionChain {
    pub chain: ChainLink,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainLink {
    pub species: NamedResource,
    #[serde(default)]
    pub evolves_to: Vec<ChainLink>,
    /// Conditions guarding the transition into this link
    #[serde(default)]
    pub evolution_details: Vec<EvolutionDetail>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvolutionDetail {
    #[serde(default)]
    pub trigger: Option<NamedResource>,
    #[serde(default)]
    pub min_level: Option<u32>,
    #[serde(default)]
    pub item: Option<NamedResource>,
    #[serde(default)]
    pub held_item: Option<NamedResource>,
    #[serde(default)]
    pub time_of_day: Option<String>,
    #[serde(default)]
    pub location: Option<NamedResource>,
    #[serde(default)]
    pub known_move: Option<NamedResource>,
    #[serde(default)]
    pub known_move_type: Option<NamedResource>,
    #[serde(default)]
    pub min_happiness: Option<u32>,
    #[serde(default)]
    pub min_affection: Option<u32>,
    #[serde(default)]
    pub min_beauty: Option<u32>,
    #[serde(default)]
    pub gender: Option<u32>,
    #[serde(default)]
    pub needs_overworld_rain: bool,
    #[serde(default)]
    pub relative_physical_stats: Option<i32>,
    #[serde(default)]
    pub turn_upside_down: bool,
}
