use anyhow::{Context, Result};
use std::collections::HashSet;

use crate::api::model::{ChainLink, EvolutionChain, EvolutionDetail, Species};
use crate::api::{id_from_url, ApiClient, Resource, Transport};
use crate::schema::SpeciesId;

/// Immediate evolution neighbours of one species
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvolutionLinks {
    pub previous: Option<SpeciesId>,
    pub next: Vec<SpeciesId>,
    /// Guarded transitions into each next species, e.g.
    /// `trigger:level-up&level:16, trigger:use-item&use_item:water-stone`
    pub conditions: String,
}

/// Depth-first search for `target`, returning `(parent, node)`.
///
/// Species already visited are not expanded again, so malformed data with a
/// repeated species cannot loop.
pub fn find_node<'a>(root: &'a ChainLink, target: &str) -> Option<(Option<&'a ChainLink>, &'a ChainLink)> {
    let mut stack: Vec<(Option<&ChainLink>, &ChainLink)> = vec![(None, root)];
    let mut visited: HashSet<&str> = HashSet::new();

    while let Some((parent, node)) = stack.pop() {
        if !visited.insert(node.species.name.as_str()) {
            continue;
        }
        if node.species.name == target {
            return Some((parent, node));
        }
        // Reverse so the leftmost child is searched first
        for child in node.evolves_to.iter().rev() {
            stack.push((Some(node), child));
        }
    }

    None
}

/// `key:value` tokens for the present fields of one evolution detail
pub fn describe_detail(detail: &EvolutionDetail) -> Vec<String> {
    fn non_empty(s: &str) -> Option<&str> {
        Some(s).filter(|s| !s.is_empty())
    }

    let mut tokens = Vec::new();
    let mut push = |key: &str, value: Option<String>| {
        if let Some(value) = value {
            tokens.push(format!("{}:{}", key, value));
        }
    };

    let name = |r: &Option<crate::api::model::NamedResource>| {
        r.as_ref()
            .and_then(|r| non_empty(&r.name))
            .map(String::from)
    };

    push("trigger", name(&detail.trigger));
    push("level", detail.min_level.map(|v| v.to_string()));
    push("use_item", name(&detail.item));
    push("held_item", name(&detail.held_item));
    push(
        "time",
        detail
            .time_of_day
            .as_deref()
            .and_then(non_empty)
            .map(String::from),
    );
    push("location", name(&detail.location));
    push("known_move", name(&detail.known_move));
    push("known_move_type", name(&detail.known_move_type));
    push("min_happiness", detail.min_happiness.map(|v| v.to_string()));
    push("min_affection", detail.min_affection.map(|v| v.to_string()));
    push("min_beauty", detail.min_beauty.map(|v| v.to_string()));
    push("gender", detail.gender.map(|v| v.to_string()));
    push(
        "needs_overworld_rain",
        detail.needs_overworld_rain.then(|| "true".to_string()),
    );
    push(
        "relative_physical_stats",
        detail.relative_physical_stats.map(|v| v.to_string()),
    );
    push(
        "turn_upside_down",
        detail.turn_upside_down.then(|| "true".to_string()),
    );

    tokens
}

/// Condition string for every transition out of `node`
pub fn describe_transitions(node: &ChainLink) -> String {
    node.evolves_to
        .iter()
        .flat_map(|child| &child.evolution_details)
        .map(describe_detail)
        .filter(|tokens| !tokens.is_empty())
        .map(|tokens| tokens.join("&"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolve a species' predecessor, successors and transition conditions
pub fn resolve_evolution<T: Transport>(
    client: &mut ApiClient<T>,
    species: &Species,
) -> Result<EvolutionLinks> {
    let Some(chain_id) = species
        .evolution_chain
        .as_ref()
        .and_then(|chain| id_from_url(&chain.url))
    else {
        return Ok(EvolutionLinks::default());
    };

    let chain: EvolutionChain = client
        .fetch_as(&Resource::EvolutionChain(chain_id))
        .with_context(|| format!("Failed to fetch evolution chain {}", chain_id))?;

    let Some((parent, node)) = find_node(&chain.chain, &species.name) else {
        return Ok(EvolutionLinks::default());
    };

    let previous = parent
        .map(|p| client.species_name_to_id(&p.species.name))
        .transpose()?;

    let next = node
        .evolves_to
        .iter()
        .map(|child| client.species_name_to_id(&child.species.name))
        .collect::<Result<Vec<_>>>()?;

    Ok(EvolutionLinks {
        previous,
        next,
        conditions: describe_transitions(node),
    })
}
