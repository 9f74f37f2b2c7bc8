use std::collections::BTreeSet;

use super::types::TypeTables;
use crate::schema::{DamageRecord, SpeciesId};

/// Combine the per-type tables for a species with one or two types.
///
/// Defense multipliers multiply across both types; offense sets are the union
/// of both types' sets. Every output list is sorted.
pub fn compute_damage(
    id: SpeciesId,
    primary: &str,
    secondary: Option<&str>,
    tables: &TypeTables,
) -> DamageRecord {
    let types: Vec<&str> = std::iter::once(primary).chain(secondary).collect();

    let mut record = DamageRecord {
        id,
        ..Default::default()
    };

    // The universe iterates in sorted order, so the lists come out sorted
    for attacker in tables.universe() {
        let combined: f64 = types
            .iter()
            .map(|defender| tables.multiplier(defender, attacker))
            .product();

        if combined == 0.0 {
            record.no_damage_from.push(attacker.to_string());
        } else if combined > 1.0 {
            record.double_damage_from.push(attacker.to_string());
        } else if combined < 1.0 {
            record.half_damage_from.push(attacker.to_string());
        }
    }

    let mut double_to = BTreeSet::new();
    let mut half_to = BTreeSet::new();
    let mut none_to = BTreeSet::new();
    for offense in types.iter().filter_map(|t| tables.offense(t)) {
        double_to.extend(offense.double.iter().cloned());
        half_to.extend(offense.half.iter().cloned());
        none_to.extend(offense.none.iter().cloned());
    }
    record.double_damage_to = double_to.into_iter().collect();
    record.half_damage_to = half_to.into_iter().collect();
    record.no_damage_to = none_to.into_iter().collect();

    record
}
