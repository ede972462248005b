//! Contiguous snapshot ranges per worker, balanced by particle count.

use std::ops::Range;

use crate::catalog::HaloStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub rank: usize,
    pub num_workers: usize,
    /// Snapshots whose objects (as sources and as targets) this worker owns.
    pub owned: Range<usize>,
    /// Snapshots this worker may read: `owned` widened by the step count.
    pub window: Range<usize>,
}

impl Partition {
    pub fn single(num_snapshots: usize) -> Self {
        Self {
            rank: 0,
            num_workers: 1,
            owned: 0..num_snapshots,
            window: 0..num_snapshots,
        }
    }

    #[inline]
    pub fn owns(&self, snapshot: usize) -> bool {
        self.owned.contains(&snapshot)
    }

    #[inline]
    pub fn can_read(&self, snapshot: usize) -> bool {
        self.window.contains(&snapshot)
    }
}

/// Split `0..num_snapshots` into `workers` non-empty contiguous ranges with
/// roughly equal particle counts. Every snapshot weighs at least one so empty
/// snapshots still spread out.
pub fn partition_snapshots(store: &HaloStore, workers: usize, num_steps: usize) -> Vec<Partition> {
    let weights: Vec<u64> = store
        .catalogs()
        .iter()
        .map(|c| c.total_particles() as u64 + 1)
        .collect();
    partition_weights(&weights, workers, num_steps)
}

pub(crate) fn partition_weights(weights: &[u64], workers: usize, num_steps: usize) -> Vec<Partition> {
    let n = weights.len();
    let workers = workers.clamp(1, n.max(1));

    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0u64);
    for &w in weights {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + w);
    }
    let total = prefix[n];

    let mut cuts = Vec::with_capacity(workers + 1);
    cuts.push(0usize);
    for r in 1..workers {
        let goal = total * r as u64 / workers as u64;
        let cut = prefix.partition_point(|&p| p < goal);
        let lo = cuts[r - 1] + 1;
        let hi = n - (workers - r);
        cuts.push(cut.clamp(lo, hi));
    }
    cuts.push(n);

    cuts.windows(2)
        .enumerate()
        .map(|(rank, w)| Partition {
            rank,
            num_workers: workers,
            owned: w[0]..w[1],
            window: w[0].saturating_sub(num_steps)..(w[1] + num_steps).min(n),
        })
        .collect()
}
