use std::collections::{BTreeSet, HashMap};

use proptest::prelude::*;
use smallvec::SmallVec;

use treelink::linking::membership::core_len;
use treelink::linking::{
    BridgeArena, Candidate, CandidateList, Claim, CleanPolicy, Direction, MembershipIndex,
    MembershipMode, clean,
};
use treelink::{
    CatalogMode, HaloCatalog, HaloStore, LinkConfig, LinkError, LinkSet, LinkState,
    SearchDirection, link,
};

const PARTICLES: usize = 60;

/// Per snapshot, each particle's halo (0 = unbound, k = halo k - 1).
fn assignments() -> impl Strategy<Value = Vec<Vec<u8>>> {
    (2usize..6).prop_flat_map(|s| prop::collection::vec(prop::collection::vec(0u8..5, PARTICLES), s))
}

fn store_from(assignments: &[Vec<u8>]) -> HaloStore {
    HaloStore::from_members(
        assignments
            .iter()
            .map(|snapshot| {
                let mut halos = vec![Vec::new(); 4];
                for (p, &a) in snapshot.iter().enumerate() {
                    if a > 0 {
                        halos[a as usize - 1].push(p as u64);
                    }
                }
                halos
            })
            .collect(),
    )
}

/// Every object keeps at most one link; with `exclusive` every target also
/// has at most one claimant.
fn assert_tree(set: &LinkSet, exclusive: bool) {
    let mut claimed: HashMap<(usize, usize), usize> = HashMap::new();
    for s in 0..set.num_snapshots() {
        for (h, obj) in set.snapshot(s).iter().enumerate() {
            assert!(obj.links.len() <= 1, "({s}, {h}) kept {} links", obj.links.len());
            assert!(matches!(obj.state, LinkState::Linked | LinkState::Terminal));
            for l in &obj.links {
                *claimed.entry((l.snapshot, l.index)).or_default() += 1;
            }
        }
    }
    if exclusive {
        assert!(claimed.values().all(|&n| n == 1), "{claimed:?}");
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 48, .. ProptestConfig::default() })]

    #[test]
    fn core_count_is_clamped(n in 0usize..500, frac in 0.0f64..1.0, min in 0usize..60) {
        let expected = ((n as f64 * frac).floor() as usize).max(min).min(n);
        prop_assert_eq!(core_len(n, frac, min), expected);

        let cat = HaloCatalog::new(0, vec![(0..n as u64).collect()]);
        let mut index = MembershipIndex::new(n as u64 + 1).unwrap();
        let mode = MembershipMode::Core { particle_frac: frac, min_numpart: min };
        let pass = index.populate(&cat, mode).unwrap();
        let marked = (0..n as u64)
            .filter(|&pid| pass.lookup(pid).is_some_and(|o| o.core && o.halo == 0))
            .count();
        prop_assert_eq!(marked, expected);
    }

    #[test]
    fn tree_links_are_unique(a in assignments(), steps in 1usize..3) {
        let num_snapshots = a.len();
        let steps = steps.min(num_snapshots - 1);
        let mut store = store_from(&a);
        let config = LinkConfig::new(num_snapshots, PARTICLES as u64)
            .with_num_steps(steps)
            .with_direction(SearchDirection::Both);
        let out = link(&mut store, &config).unwrap();
        assert_tree(out.progenitors().unwrap(), steps > 1);
        assert_tree(out.descendants().unwrap(), steps > 1);
    }

    #[test]
    fn worker_count_never_changes_the_links(a in assignments(), graph in any::<bool>()) {
        let num_snapshots = a.len();
        let store = store_from(&a);
        let mode = if graph { CatalogMode::Graph } else { CatalogMode::MergerTree };
        let config = LinkConfig::new(num_snapshots, PARTICLES as u64)
            .with_num_steps((num_snapshots - 1).min(2))
            .with_direction(SearchDirection::Both)
            .with_mode(mode);
        let reference = link(&mut store.clone(), &config).unwrap();
        for workers in 2..=num_snapshots {
            let split = link(&mut store.clone(), &config.clone().with_workers(workers)).unwrap();
            prop_assert_eq!(&reference, &split);
        }
    }

    #[test]
    fn disjoint_halos_are_terminal(sizes in prop::collection::vec(1usize..8, 2..6)) {
        let mut next = 0u64;
        let snapshots: Vec<Vec<Vec<u64>>> = sizes
            .iter()
            .map(|&n| {
                let halo = (next..next + n as u64).collect();
                next += n as u64;
                vec![halo]
            })
            .collect();
        let num_snapshots = snapshots.len();
        let mut store = HaloStore::from_members(snapshots);
        let config = LinkConfig::new(num_snapshots, next)
            .with_num_steps(num_snapshots - 1)
            .with_direction(SearchDirection::Both);
        let out = link(&mut store, &config).unwrap();
        for set in [out.progenitors().unwrap(), out.descendants().unwrap()] {
            prop_assert_eq!(set.num_links(), 0);
            prop_assert_eq!(set.num_terminal(), num_snapshots);
        }
    }

    #[test]
    fn more_shared_particles_win(size in 4u64..30, x in 1u64..30, y in 0u64..30) {
        let x = 1 + x % (size - 1);
        let y = y % x.min(size - x + 1);
        // X and Y have the same size; the source takes x from X and y from Y
        let big = size * 10;
        let cx: Vec<u64> = (0..size).collect();
        let cy: Vec<u64> = (big..big + size).collect();
        let source: Vec<u64> = (0..x).chain(big..big + y).collect();
        let mut store = HaloStore::from_members(vec![vec![cy, cx], vec![source]]);
        let out = link(&mut store, &LinkConfig::new(2, big + size)).unwrap();
        let best = out.progenitors().unwrap().best(1, 0).copied();
        prop_assert_eq!(best.map(|l| l.index), Some(1));
    }

    #[test]
    fn cleaning_twice_changes_nothing(
        raw in prop::collection::vec((0usize..20, 1u32..50, 0.0f64..1.0), 0..12),
        threshold in 0.0f64..1.0,
        which in 0u8..3,
    ) {
        let policy = match which {
            0 => CleanPolicy::Best { threshold },
            1 => CleanPolicy::AllAbove { threshold },
            _ => CleanPolicy::Raw,
        };
        let mut once = CandidateList {
            source: 0,
            target_snapshot: 0,
            depth: 1,
            candidates: raw
                .into_iter()
                .map(|(target, shared, merit)| Candidate { target, shared, merit })
                .collect::<SmallVec<_>>(),
        };
        clean(&mut once, policy);
        let mut twice = once.clone();
        clean(&mut twice, policy);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn arena_never_serves_released_records(
        ops in prop::collection::vec((0usize..6, any::<bool>()), 1..40),
    ) {
        let mut arena = BridgeArena::new(Direction::Progenitor);
        let mut released = BTreeSet::new();
        for (snapshot, release) in ops {
            let was_released = released.contains(&snapshot);
            if release {
                let result = arena.release(snapshot);
                prop_assert_eq!(result.is_err(), was_released);
                released.insert(snapshot);
            } else {
                let claim = Claim {
                    source_snapshot: snapshot + 1,
                    source: 0,
                    target_snapshot: snapshot,
                    target: 0,
                    merit: 1.0,
                    shared: 1,
                    depth: 1,
                };
                prop_assert_eq!(arena.add(claim, 1).is_err(), was_released);
                prop_assert_eq!(arena.get(snapshot).is_err(), was_released);
            }
        }
        let leaked = arena.live() > 0;
        let finish = arena.finish();
        prop_assert_eq!(finish.is_err(), leaked);
        if let Err(err) = finish {
            let is_bridge = matches!(err, LinkError::Bridge { .. });
            prop_assert!(is_bridge, "expected a bridge error, got {:?}", err);
        }
    }
}
