use anyhow::{bail, Context, Result};
use tracing::warn;

use super::evolution::resolve_evolution;
use crate::api::model::{Pokemon, PokemonStat, PokemonType, Species, Sprites};
use crate::api::{ApiClient, Resource, Transport};
use crate::schema::{BaseStats, SpeciesId, SpeciesRecord};

/// Icon set preferred over the plain front sprite
const ICON_GENERATION: &str = "generation-viii";
const ICON_SET: &str = "icons";
const LANGUAGE: &str = "en";

/// Build the normalized record for one species
pub fn transform<T: Transport>(client: &mut ApiClient<T>, species_id: SpeciesId) -> Result<SpeciesRecord> {
    let species: Species = client
        .fetch_as(&Resource::species(species_id))
        .with_context(|| format!("Failed to fetch species {}", species_id))?;

    let form = client.species_to_default_form(&species.name)?;
    let pokemon: Pokemon = client
        .fetch_as(&Resource::pokemon(&form))
        .with_context(|| format!("Failed to fetch pokemon {}", form))?;

    if pokemon.id != species_id {
        warn!(species_id, pokemon_id = pokemon.id, form = %form, "default form id differs from species id");
    }

    let (official_artwork_url, sprite_url, icon_url) = extract_sprites(&pokemon.sprites);
    let (primary_type, secondary_type) = extract_types(&pokemon.types)
        .with_context(|| format!("Pokemon {} has no usable types", pokemon.name))?;
    let stats = extract_stats(&pokemon.stats);
    let evolution = resolve_evolution(client, &species)?;

    Ok(SpeciesRecord {
        id: pokemon.id,
        name: pokemon.name,
        species: display_species(&species),
        generation: generation_number(species.generation.as_ref().map(|g| g.name.as_str())),
        official_artwork_url,
        sprite_url,
        icon_url,
        primary_type,
        secondary_type,
        height_m: tenths(pokemon.height),
        weight_kg: tenths(pokemon.weight),
        base_stat_total: stats.total(),
        stats,
        flavor_text: clean_flavor_text(&species),
        previous_evolution_id: evolution.previous,
        next_evolution_ids: evolution.next,
        evolution_conditions: evolution.conditions,
        is_legendary: species.is_legendary,
        is_mythical: species.is_mythical,
    })
}

fn present(url: &Option<String>) -> Option<String> {
    url.as_ref().filter(|u| !u.is_empty()).cloned()
}

/// (official artwork, front sprite, icon). The icon falls back to the front sprite.
pub fn extract_sprites(sprites: &Sprites) -> (Option<String>, Option<String>, Option<String>) {
    let official = sprites
        .other
        .as_ref()
        .and_then(|o| o.official_artwork.as_ref())
        .and_then(|a| present(&a.front_default));
    let sprite = present(&sprites.front_default);
    let icon = sprites
        .versions
        .as_ref()
        .and_then(|v| v.get(ICON_GENERATION))
        .and_then(|g| g.get(ICON_SET))
        .and_then(|s| present(&s.front_default))
        .or_else(|| sprite.clone());

    (official, sprite, icon)
}

/// Primary and secondary type, ordered by slot
pub fn extract_types(types: &[PokemonType]) -> Result<(String, Option<String>)> {
    let mut sorted: Vec<&PokemonType> = types.iter().collect();
    sorted.sort_by_key(|t| t.slot);

    let mut names = sorted.into_iter().map(|t| t.kind.name.clone());
    let Some(primary) = names.next() else {
        bail!("no types listed");
    };
    Ok((primary, names.next()))
}

pub fn extract_stats(stats: &[PokemonStat]) -> BaseStats {
    let find = |name: &str| stats.iter().find(|s| s.stat.name == name).map(|s| s.base_stat);
    BaseStats {
        hp: find("hp"),
        attack: find("attack"),
        defense: find("defense"),
        special_attack: find("special-attack"),
        special_defense: find("special-defense"),
        speed: find("speed"),
    }
}

/// Decimetres to metres / hectograms to kilograms, rounded to 2 places
pub fn tenths(value: u32) -> f64 {
    (value as f64 / 10.0 * 100.0).round() / 100.0
}

/// `generation-i`..`generation-ix` to 1..9; anything else is 0
pub fn generation_number(slug: Option<&str>) -> u8 {
    const GENERATIONS: [&str; 9] = [
        "generation-i",
        "generation-ii",
        "generation-iii",
        "generation-iv",
        "generation-v",
        "generation-vi",
        "generation-vii",
        "generation-viii",
        "generation-ix",
    ];

    slug.and_then(|slug| GENERATIONS.iter().position(|g| *g == slug))
        .map(|pos| pos as u8 + 1)
        .unwrap_or(0)
}

/// First English flavor text with line and page breaks collapsed to single spaces
pub fn clean_flavor_text(species: &Species) -> String {
    species
        .flavor_text_entries
        .iter()
        .find(|entry| entry.language.name == LANGUAGE)
        .map(|entry| {
            entry
                .flavor_text
                .replace(['\n', '\x0c'], " ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default()
}

/// English genus ("Seed Pokémon"), else the species slug
pub fn display_species(species: &Species) -> String {
    species
        .genera
        .iter()
        .find(|g| g.language.name == LANGUAGE)
        .map(|g| g.genus.clone())
        .unwrap_or_else(|| species.name.clone())
}
