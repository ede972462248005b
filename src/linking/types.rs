use std::cmp::Ordering;
use std::ops::Range;

use smallvec::SmallVec;

/// Temporal search direction of one linking pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Look back in time; targets are earlier snapshots.
    Progenitor,
    /// Look forward in time; targets are later snapshots.
    Descendant,
}

impl Direction {
    pub fn name(self) -> &'static str {
        match self {
            Direction::Progenitor => "progenitors",
            Direction::Descendant => "descendants",
        }
    }

    /// Snapshot `depth` steps away from `source`, if it exists.
    #[inline]
    pub fn target(self, source: usize, depth: usize, num_snapshots: usize) -> Option<usize> {
        match self {
            Direction::Progenitor => source.checked_sub(depth),
            Direction::Descendant => Some(source + depth).filter(|&t| t < num_snapshots),
        }
    }

    /// Source snapshots of `range` in the order the sweep visits them.
    pub fn sweep(self, range: Range<usize>) -> Vec<usize> {
        match self {
            Direction::Progenitor => range.rev().collect(),
            Direction::Descendant => range.collect(),
        }
    }

    /// Target whose claims are complete once `source` has been processed.
    #[inline]
    pub fn settled_after(self, source: usize) -> Option<usize> {
        match self {
            Direction::Progenitor => source.checked_sub(1),
            Direction::Descendant => Some(source + 1),
        }
    }

    /// True if `target` lies beyond the start of the sweep over `owned`,
    /// i.e. it belongs to a worker later in the wavefront.
    #[inline]
    pub fn is_downstream(self, target: usize, owned: &Range<usize>) -> bool {
        match self {
            Direction::Progenitor => target < owned.start,
            Direction::Descendant => target >= owned.end,
        }
    }

    /// Rank whose boundary message this rank waits for.
    pub fn upstream(self, rank: usize, workers: usize) -> Option<usize> {
        match self {
            Direction::Progenitor => Some(rank + 1).filter(|&r| r < workers),
            Direction::Descendant => rank.checked_sub(1),
        }
    }

    /// Rank this rank hands its boundary message to.
    pub fn downstream(self, rank: usize, workers: usize) -> Option<usize> {
        match self {
            Direction::Progenitor => rank.checked_sub(1),
            Direction::Descendant => Some(rank + 1).filter(|&r| r < workers),
        }
    }

    /// Ranks in the order their resolution phases run.
    pub fn wavefront(self, workers: usize) -> Vec<usize> {
        match self {
            Direction::Progenitor => (0..workers).rev().collect(),
            Direction::Descendant => (0..workers).collect(),
        }
    }
}

/// One candidate object in the neighbouring snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub target: usize,
    pub shared: u32,
    pub merit: f64,
}

/// Higher merit first, then more shared particles, then lower target index.
#[inline]
pub fn cmp_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    b.merit
        .total_cmp(&a.merit)
        .then_with(|| b.shared.cmp(&a.shared))
        .then_with(|| a.target.cmp(&b.target))
}

/// Candidates of one source object against one target snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateList {
    pub source: usize,
    pub target_snapshot: usize,
    pub depth: usize,
    pub candidates: SmallVec<[Candidate; 4]>,
}

impl CandidateList {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
    pub fn best(&self) -> Option<&Candidate> {
        self.candidates.first()
    }
}

/// A retained link from an object to an object of another snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Link {
    pub snapshot: usize,
    pub index: usize,
    /// Read-order id during linking, final id after renumbering.
    pub halo_id: u64,
    pub merit: f64,
    pub shared: u32,
    pub depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No link yet; `searched` is the deepest step already tried.
    Unlinked { searched: usize },
    /// Claim(s) pending resolution at the given depth.
    Candidate { depth: usize },
    Linked,
    /// Nothing found within reach.
    Terminal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectLinks {
    pub state: LinkState,
    pub links: SmallVec<[Link; 1]>,
}

impl Default for ObjectLinks {
    fn default() -> Self {
        Self {
            state: LinkState::Unlinked { searched: 0 },
            links: SmallVec::new(),
        }
    }
}

impl ObjectLinks {
    pub fn is_unlinked(&self) -> bool {
        matches!(self.state, LinkState::Unlinked { .. })
    }

    pub fn searched(&self) -> Option<usize> {
        match self.state {
            LinkState::Unlinked { searched } => Some(searched),
            _ => None,
        }
    }

    pub(crate) fn demote(&mut self, searched: usize) {
        self.state = LinkState::Unlinked { searched };
        self.links.clear();
    }
}

/// A source object naming a target object as its match. Claims are what
/// Step-Bridging records hold and what crosses partition boundaries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Claim {
    pub source_snapshot: usize,
    pub source: usize,
    pub target_snapshot: usize,
    pub target: usize,
    pub merit: f64,
    pub shared: u32,
    pub depth: usize,
}

impl Claim {
    pub fn link(&self) -> Link {
        Link {
            snapshot: self.target_snapshot,
            index: self.target,
            halo_id: self.target as u64,
            merit: self.merit,
            shared: self.shared,
            depth: self.depth,
        }
    }
}

/// Best claimant first: merit, shared count, shallower depth, source index.
#[inline]
pub fn cmp_claims(a: &Claim, b: &Claim) -> Ordering {
    b.merit
        .total_cmp(&a.merit)
        .then_with(|| b.shared.cmp(&a.shared))
        .then_with(|| a.depth.cmp(&b.depth))
        .then_with(|| a.source_snapshot.cmp(&b.source_snapshot))
        .then_with(|| a.source.cmp(&b.source))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_stop_at_the_edges() {
        assert_eq!(Direction::Progenitor.target(2, 2, 5), Some(0));
        assert_eq!(Direction::Progenitor.target(1, 2, 5), None);
        assert_eq!(Direction::Descendant.target(3, 1, 5), Some(4));
        assert_eq!(Direction::Descendant.target(3, 2, 5), None);
    }

    #[test]
    fn wavefront_neighbours() {
        let d = Direction::Progenitor;
        assert_eq!(d.upstream(0, 3), Some(1));
        assert_eq!(d.upstream(2, 3), None);
        assert_eq!(d.downstream(0, 3), None);
        assert_eq!(d.wavefront(3), vec![2, 1, 0]);
        let d = Direction::Descendant;
        assert_eq!(d.upstream(0, 3), None);
        assert_eq!(d.downstream(2, 3), None);
        assert!(d.is_downstream(7, &(3..7)));
    }

    #[test]
    fn candidate_ties_break_on_shared_then_index() {
        let a = Candidate { target: 4, shared: 5, merit: 0.5 };
        let b = Candidate { target: 2, shared: 5, merit: 0.5 };
        let c = Candidate { target: 1, shared: 3, merit: 0.5 };
        let mut v = vec![c, a, b];
        v.sort_by(cmp_candidates);
        assert_eq!(v.iter().map(|c| c.target).collect::<Vec<_>>(), vec![2, 4, 1]);
    }
}
