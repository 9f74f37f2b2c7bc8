//! Normalized records produced by the ETL and read back by the query surface

use serde::{Deserialize, Serialize};

/// Numeric id of a species' default Pokémon form
pub type SpeciesId = u32;

/// The six base stats; any stat the source omits stays `None`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseStats {
    pub hp: Option<u32>,
    pub attack: Option<u32>,
    pub defense: Option<u32>,
    pub special_attack: Option<u32>,
    pub special_defense: Option<u32>,
    pub speed: Option<u32>,
}

impl BaseStats {
    pub fn values(&self) -> [Option<u32>; 6] {
        [
            self.hp,
            self.attack,
            self.defense,
            self.special_attack,
            self.special_defense,
            self.speed,
        ]
    }

    /// Sum of all six stats, or `None` when any of them is missing
    pub fn total(&self) -> Option<u32> {
        self.values().iter().copied().sum()
    }
}

/// One row of the `pokemon` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesRecord {
    pub id: SpeciesId,
    pub name: String,
    /// Display label, the English genus when available
    pub species: String,
    /// 1..=9, or 0 for an unrecognized generation
    pub generation: u8,
    pub official_artwork_url: Option<String>,
    pub sprite_url: Option<String>,
    pub icon_url: Option<String>,
    pub primary_type: String,
    pub secondary_type: Option<String>,
    pub height_m: f64,
    pub weight_kg: f64,
    #[serde(flatten)]
    pub stats: BaseStats,
    pub base_stat_total: Option<u32>,
    pub flavor_text: String,
    pub previous_evolution_id: Option<SpeciesId>,
    pub next_evolution_ids: Vec<SpeciesId>,
    pub evolution_conditions: String,
    pub is_legendary: bool,
    pub is_mythical: bool,
}

impl SpeciesRecord {
    /// Primary type followed by the secondary type, if any
    pub fn types(&self) -> Vec<&str> {
        std::iter::once(self.primary_type.as_str())
            .chain(self.secondary_type.as_deref())
            .collect()
    }
}

/// One row of the `damage_relations` table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageRecord {
    pub id: SpeciesId,
    pub double_damage_from: Vec<String>,
    pub half_damage_from: Vec<String>,
    pub no_damage_from: Vec<String>,
    pub double_damage_to: Vec<String>,
    pub half_damage_to: Vec<String>,
    pub no_damage_to: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_requires_all_stats() {
        let full = BaseStats {
            hp: Some(35),
            attack: Some(55),
            defense: Some(40),
            special_attack: Some(50),
            special_defense: Some(50),
            speed: Some(90),
        };
        assert_eq!(full.total(), Some(320));

        let partial = BaseStats {
            speed: None,
            ..full
        };
        assert_eq!(partial.total(), None);
        assert_eq!(BaseStats::default().total(), None);
    }
}
