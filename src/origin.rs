//! Launchpad origin tagging and the program-id set derived from configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Closed set of launchpad tags. Declaration order is the tie-break priority
/// used when the same program id is (incorrectly) listed under two origins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Pumpfun,
    Letsbonk,
    Moonshot,
    Raydium,
    Orca,
}

impl Origin {
    /// Fixed priority order used for deduplication in the watcher's subscription list.
    pub const PRIORITY: [Origin; 5] = [
        Origin::Pumpfun,
        Origin::Letsbonk,
        Origin::Moonshot,
        Origin::Raydium,
        Origin::Orca,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Pumpfun => "pumpfun",
            Origin::Letsbonk => "letsbonk",
            Origin::Moonshot => "moonshot",
            Origin::Raydium => "raydium",
            Origin::Orca => "orca",
        }
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Maps every configured program id to the single Origin that owns it,
/// assigning ties by `Origin::PRIORITY`. Built once from `Config` and shared
/// read-only by `LaunchWatcher` and `MintValidator`.
#[derive(Debug, Clone, Default)]
pub struct ProgramIdSet {
    owner: HashMap<String, Origin>,
    // `HashMap` iteration order is unspecified, so the priority order the
    // watcher's subscription list depends on is tracked separately here.
    order: Vec<String>,
}

impl ProgramIdSet {
    /// Build from a per-origin list of program ids, in `Origin::PRIORITY` order.
    /// A program id repeated across origins keeps the assignment from the
    /// first (highest-priority) origin that lists it.
    pub fn build(per_origin: &[(Origin, Vec<String>)]) -> Self {
        let mut owner = HashMap::new();
        let mut order = Vec::new();
        let mut ordered: Vec<&(Origin, Vec<String>)> = per_origin.iter().collect();
        ordered.sort_by_key(|(origin, _)| {
            Origin::PRIORITY
                .iter()
                .position(|o| o == origin)
                .unwrap_or(usize::MAX)
        });
        for (origin, ids) in ordered {
            for id in ids {
                if let std::collections::hash_map::Entry::Vacant(e) = owner.entry(id.clone()) {
                    e.insert(*origin);
                    order.push(id.clone());
                }
            }
        }
        Self { owner, order }
    }

    pub fn origin_of(&self, program_id: &str) -> Option<Origin> {
        self.owner.get(program_id).copied()
    }

    pub fn contains(&self, program_id: &str) -> bool {
        self.owner.contains_key(program_id)
    }

    /// Deduplicated list of all subscribed program ids, in insertion (priority) order.
    pub fn subscription_ids(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.owner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tie_break_prefers_higher_priority_origin() {
        let set = ProgramIdSet::build(&[
            (Origin::Orca, vec!["SharedProg111111111111111111111111111111".to_string()]),
            (Origin::Pumpfun, vec!["SharedProg111111111111111111111111111111".to_string()]),
        ]);
        assert_eq!(
            set.origin_of("SharedProg111111111111111111111111111111"),
            Some(Origin::Pumpfun)
        );
    }

    #[test]
    fn dedupes_across_origins() {
        let set = ProgramIdSet::build(&[
            (Origin::Pumpfun, vec!["A".to_string(), "B".to_string()]),
            (Origin::Raydium, vec!["B".to_string(), "C".to_string()]),
        ]);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn subscription_ids_preserve_priority_order() {
        // Built with origins out of priority order and ids interleaved;
        // `subscription_ids` must still come back in Origin::PRIORITY order
        // regardless of HashMap iteration order or construction order.
        let set = ProgramIdSet::build(&[
            (Origin::Orca, vec!["E".to_string()]),
            (Origin::Moonshot, vec!["C".to_string(), "D".to_string()]),
            (Origin::Pumpfun, vec!["A".to_string(), "B".to_string()]),
        ]);
        assert_eq!(set.subscription_ids(), vec!["A", "B", "C", "D", "E"]);
    }
}
