//! Shared fixtures for unit tests.

use crate::bracket::{build_tree, SlotSource, Tree};
use crate::picks::PickSet;
use crate::types::{CategoryEntrants, Entrant, MatchId, Matchup};
use std::collections::HashMap;

/// `entrants` players named `<name>-p<n>`, seeded 1.. in draw order.
pub fn category(name: &str, entrants: usize) -> CategoryEntrants {
    let matchups = (0..entrants / 2)
        .map(|i| {
            Matchup::new(
                Entrant::seeded((i * 2 + 1).to_string(), format!("{name}-p{}", i * 2)),
                Entrant::seeded((i * 2 + 2).to_string(), format!("{name}-p{}", i * 2 + 1)),
            )
        })
        .collect();
    CategoryEntrants {
        name: name.to_string(),
        matchups,
    }
}

pub fn sixteen_entrant_tree() -> Tree {
    build_tree(&[category("mens", 16)]).unwrap()
}

/// Complete pick set where the top slot wins every match.
pub fn top_slot_picks(tree: &Tree) -> PickSet {
    bracket_picks(tree, |_| 0)
}

/// Complete pick set choosing the winning slot per match with `choose`.
pub fn bracket_picks(tree: &Tree, choose: impl Fn(&MatchId) -> usize) -> PickSet {
    let mut winners: HashMap<usize, String> = HashMap::new();
    let mut picks = PickSet::new();
    for (pos, node) in tree.matches().iter().enumerate() {
        let slot = choose(&node.id);
        let winner = match &node.slots[slot] {
            SlotSource::Entrant(entrant) => entrant.name.clone(),
            SlotSource::Winner { position, .. } => winners[position].clone(),
        };
        winners.insert(pos, winner.clone());
        picks.insert(node.id.clone(), winner);
    }
    picks
}
