//! Cross-step consistency resolver.
//!
//! Runs once per target snapshot after every claim that can reach it has
//! arrived. In a multi-step tree run each target object keeps its best
//! claimant and the other claimants are demoted so they can search deeper.
//! Single-step trees, graphs and cross-comparison runs accept every claim,
//! so mergers and fragmentations keep their links.

use super::bridge::BridgeRecord;
use super::types::{Claim, cmp_claims};
use crate::config::{CatalogMode, LinkConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvePolicy {
    /// At most one claimant per target object.
    Exclusive,
    /// Any number of claimants per target object.
    Shared,
}

impl ResolvePolicy {
    pub fn for_run(config: &LinkConfig) -> Self {
        match config.catalog_mode {
            // nothing deeper to demote to
            CatalogMode::MergerTree if config.num_steps == 1 => ResolvePolicy::Shared,
            CatalogMode::MergerTree => ResolvePolicy::Exclusive,
            CatalogMode::Graph | CatalogMode::CrossComparison => ResolvePolicy::Shared,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Resolution {
    pub winners: Vec<Claim>,
    pub demoted: Vec<Claim>,
}

pub fn resolve(record: BridgeRecord, policy: ResolvePolicy) -> Resolution {
    let mut out = Resolution::default();
    for mut claims in record.into_claims() {
        match policy {
            ResolvePolicy::Shared => out.winners.extend(claims),
            ResolvePolicy::Exclusive => {
                claims.sort_by(cmp_claims);
                let mut it = claims.into_iter();
                if let Some(best) = it.next() {
                    out.winners.push(best);
                }
                out.demoted.extend(it);
            }
        }
    }
    out
}
