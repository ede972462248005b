//! Particle id compaction.
//!
//! Simulations with sparse or very large id ranges would need a huge
//! membership array. Compaction rewrites every id to its rank among the
//! unique ids of the whole store, so the index only spans `0..unique`.
//! The map is built over all snapshots before partitioning, which keeps it
//! identical for every worker.

use ahash::AHashMap;
use itertools::Itertools;
use rayon::prelude::*;

use super::HaloStore;
use crate::config::IdMapping;

/// Direct indexing is kept while the id range is at most this many times
/// the number of stored particles.
const SPARSE_FACTOR: u64 = 8;

/// Pick the id mapping for `store` and the `max_particle_id` that goes with
/// it. Sparse id ranges are compacted; for those the returned bound is only
/// a placeholder until compaction runs.
pub fn choose_id_mapping(store: &HaloStore) -> (u64, IdMapping) {
    let span = store
        .catalogs()
        .iter()
        .filter_map(|c| c.particle_ids().iter().max())
        .max()
        .map_or(1, |&m| m.saturating_add(1));
    let stored = store.total_particles().max(1) as u64;
    if span > stored.saturating_mul(SPARSE_FACTOR) {
        tracing::info!(span, stored, "particle ids are sparse, using compact id mapping");
        (stored, IdMapping::Compact)
    } else {
        (span, IdMapping::Direct)
    }
}

/// Rewrite all particle ids in place and return the new exclusive bound.
pub fn compact_particle_ids(store: &mut HaloStore) -> u64 {
    let unique: Vec<u64> = store
        .catalogs()
        .iter()
        .flat_map(|c| c.particle_ids().iter().copied())
        .sorted_unstable()
        .dedup()
        .collect();

    let mut index: AHashMap<u64, u64> = AHashMap::with_capacity(unique.len());
    for (rank, &pid) in unique.iter().enumerate() {
        index.insert(pid, rank as u64);
    }

    store.catalogs_mut().par_iter_mut().for_each(|cat| {
        for pid in cat.particle_ids_mut() {
            *pid = index[&*pid];
        }
    });

    tracing::info!(
        unique = unique.len(),
        "compacted particle ids to a dense index"
    );
    unique.len() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_ids_select_compaction() {
        let dense = HaloStore::from_members(vec![vec![vec![0, 3, 5]], vec![vec![1, 2]]]);
        assert_eq!(choose_id_mapping(&dense), (6, IdMapping::Direct));
        let sparse = HaloStore::from_members(vec![vec![vec![7, 1 << 60]], vec![vec![7]]]);
        assert_eq!(choose_id_mapping(&sparse), (3, IdMapping::Compact));
    }

    #[test]
    fn compaction_is_order_preserving_and_dense() {
        let mut store = HaloStore::from_members(vec![
            vec![vec![1_000_000, 7], vec![42]],
            vec![vec![7, 42, 99_999_999_999]],
        ]);
        let bound = compact_particle_ids(&mut store);
        assert_eq!(bound, 4);
        assert_eq!(store.catalog(0).members(0), &[2, 0]);
        assert_eq!(store.catalog(0).members(1), &[1]);
        assert_eq!(store.catalog(1).members(0), &[0, 1, 3]);
        assert!(store.check_particle_ids(bound).is_ok());
    }
}
