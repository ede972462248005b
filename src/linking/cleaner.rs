//! Link cleaner: reduces a candidate list to the links that are kept.

use super::types::{CandidateList, Direction, cmp_candidates};
use crate::config::{CatalogMode, LinkConfig};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CleanPolicy {
    /// Keep the single best candidate if it reaches the threshold.
    Best { threshold: f64 },
    /// Keep every candidate reaching the threshold.
    AllAbove { threshold: f64 },
    /// Keep everything (cross comparison dump).
    Raw,
}

impl CleanPolicy {
    pub fn for_run(config: &LinkConfig, direction: Direction) -> Self {
        let threshold = config.merit_threshold;
        match (config.catalog_mode, direction) {
            (CatalogMode::MergerTree, _) => CleanPolicy::Best { threshold },
            (CatalogMode::Graph, Direction::Descendant) if config.graph_single_descendant => {
                CleanPolicy::Best { threshold }
            }
            (CatalogMode::Graph, _) => CleanPolicy::AllAbove { threshold },
            (CatalogMode::CrossComparison, _) => CleanPolicy::Raw,
        }
    }
}

/// Clean `list` in place. Running it again on the result changes nothing.
pub fn clean(list: &mut CandidateList, policy: CleanPolicy) {
    list.candidates.sort_by(cmp_candidates);
    match policy {
        CleanPolicy::Best { threshold } => {
            list.candidates.truncate(1);
            list.candidates.retain(|c| c.merit >= threshold);
        }
        CleanPolicy::AllAbove { threshold } => {
            list.candidates.retain(|c| c.merit >= threshold);
        }
        CleanPolicy::Raw => {}
    }
}
