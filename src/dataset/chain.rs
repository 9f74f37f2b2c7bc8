use std::collections::HashSet;

use super::Pokedex;
use crate::schema::SpeciesId;

impl Pokedex {
    /// Evolution stages containing `id`, root first.
    ///
    /// Walks `previous_evolution_id` back to the root, then follows
    /// `next_evolution_id` forward one stage at a time. Ids referenced but not
    /// stored still appear in their stage; they just aren't expanded.
    pub fn evolution_stages(&self, id: SpeciesId) -> Vec<Vec<SpeciesId>> {
        let mut root = id;
        let mut seen = HashSet::from([id]);
        while let Some(previous) = self.get(root).and_then(|e| e.record.previous_evolution_id) {
            if !seen.insert(previous) {
                break;
            }
            root = previous;
        }

        let mut stages = Vec::new();
        let mut placed = HashSet::from([root]);
        let mut stage = vec![root];

        while !stage.is_empty() {
            let mut next_stage = Vec::new();
            for member in &stage {
                let Some(entry) = self.get(*member) else {
                    continue;
                };
                for next in &entry.record.next_evolution_ids {
                    if placed.insert(*next) {
                        next_stage.push(*next);
                    }
                }
            }
            stages.push(stage);
            stage = next_stage;
        }

        stages
    }
}
