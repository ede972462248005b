//! Cross matcher: per source halo, every target halo sharing particles.

use ahash::AHashMap;
use rayon::prelude::*;
use smallvec::SmallVec;

use super::membership::IndexPass;
use super::merit::{self, Overlap};
use super::types::{Candidate, CandidateList, cmp_candidates};
use crate::catalog::HaloCatalog;
use crate::config::MeritType;

/// Match `source` against the snapshot held by `pass`.
///
/// With `select` set only the flagged source halos are matched (update
/// mode); the others get an empty list. The second value tells whether any
/// list is non-empty.
pub fn cross_match(
    source: &HaloCatalog,
    pass: &IndexPass<'_>,
    depth: usize,
    merit_type: MeritType,
    select: Option<&[bool]>,
) -> (Vec<CandidateList>, bool) {
    let target = pass.catalog();
    let target_snapshot = target.snapshot();
    let rank_weighted = merit_type == MeritType::RankWeighted;

    let lists: Vec<CandidateList> = (0..source.num_halos())
        .into_par_iter()
        .map(|h| {
            let mut list = CandidateList {
                source: h,
                target_snapshot,
                depth,
                candidates: SmallVec::new(),
            };
            if select.is_some_and(|mask| !mask[h]) {
                return list;
            }
            let members = source.members(h);

            let mut share: AHashMap<usize, Overlap> = AHashMap::default();
            for (rank, &pid) in members.iter().enumerate() {
                let Some(owner) = pass.lookup(pid) else {
                    continue;
                };
                let ov = share.entry(owner.halo).or_default();
                ov.shared += 1;
                if owner.core {
                    ov.core += 1;
                }
                if rank_weighted {
                    ov.rank_weight += 1.0 / (rank + 1) as f64;
                }
            }
            if share.is_empty() {
                return list;
            }

            let h_source = if rank_weighted {
                merit::harmonic(members.len())
            } else {
                0.0
            };
            list.candidates = share
                .into_iter()
                .map(|(t, ov)| Candidate {
                    target: t,
                    shared: ov.shared,
                    merit: merit::score(
                        merit_type,
                        &ov,
                        members.len(),
                        target.num_particles(t),
                        h_source,
                    ),
                })
                .collect();
            list.candidates.sort_unstable_by(cmp_candidates);
            list
        })
        .collect();

    let updated = lists.iter().any(|l| !l.is_empty());
    (lists, updated)
}
