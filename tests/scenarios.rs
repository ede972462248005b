use treelink::{
    CatalogMode, HaloStore, LinkConfig, LinkOutput, LinkState, MeritType, SearchDirection, link,
};

fn members(range: std::ops::Range<u64>) -> Vec<u64> {
    range.collect()
}

#[test]
fn direct_progenitor_is_the_bigger_overlap() {
    // A (snapshot 1) shares 8 of its 10 particles with B and 2 with C (snapshot 0)
    let b = members(0..10);
    let c = members(20..30);
    let mut a = members(0..8);
    a.extend([20, 21]);
    let mut store = HaloStore::from_members(vec![vec![c, b], vec![a]]);

    let out = link(&mut store, &LinkConfig::new(2, 64)).unwrap();
    let set = out.progenitors().unwrap();
    let best = set.best(1, 0).unwrap();
    assert_eq!((best.snapshot, best.index), (0, 1));
    assert_eq!(best.halo_id, 2);
    assert_eq!(best.shared, 8);
    assert_eq!(best.depth, 1);
    assert_eq!(set.links(1, 0).len(), 1);
}

#[test]
fn vanished_neighbour_is_bridged_at_depth_two() {
    // D at snapshot 2 misses snapshot 1 entirely but keeps 9 of 10 particles of E
    let e = members(0..10);
    let mut d = members(0..9);
    d.push(50);
    let mut store = HaloStore::from_members(vec![vec![e], vec![members(100..110)], vec![d]]);

    let config = LinkConfig::new(3, 128).with_num_steps(2);
    let out = link(&mut store, &config).unwrap();
    let set = out.progenitors().unwrap();
    let best = set.best(2, 0).unwrap();
    assert_eq!((best.snapshot, best.index, best.depth), (0, 0, 2));
    assert_eq!(best.shared, 9);
    assert_eq!(set.get(1, 0).state, LinkState::Terminal);
}

#[test]
fn without_enough_steps_the_gap_stays_open() {
    let mut store = HaloStore::from_members(vec![
        vec![members(0..10)],
        vec![members(100..110)],
        vec![members(0..10)],
    ]);
    let out = link(&mut store, &LinkConfig::new(3, 128)).unwrap();
    let set = out.progenitors().unwrap();
    assert!(set.links(2, 0).is_empty());
    assert_eq!(set.get(2, 0).state, LinkState::Terminal);
}

#[test]
fn mutual_best_match_is_one_graph_edge() {
    let mut store = HaloStore::from_members(vec![
        vec![members(0..10), members(10..20)],
        vec![members(0..10), members(30..40)],
    ]);
    let config = LinkConfig::new(2, 64)
        .with_mode(CatalogMode::Graph)
        .with_direction(SearchDirection::Both);
    let out = link(&mut store, &config).unwrap();
    let LinkOutput::Graph { graph, .. } = &out else {
        panic!("expected a graph, got {}", out.kind());
    };
    assert_eq!(graph.edges().len(), 1);
    let edge = graph.edges()[0];
    assert!(edge.is_mutual());
    assert_eq!((edge.earlier_id, edge.later_id), (1, 1_000_000_000_001));
    assert_eq!(edge.backward.map(|a| a.shared), Some(10));
    assert_eq!(edge.forward.map(|a| a.depth), Some(1));
}

#[test]
fn graph_keeps_every_progenitor_above_threshold() {
    // a merger: the later halo holds most of two earlier halos
    let mut store = HaloStore::from_members(vec![
        vec![members(0..10), members(10..20)],
        vec![members(0..18)],
    ]);
    let config = LinkConfig::new(2, 64)
        .with_mode(CatalogMode::Graph)
        .with_direction(SearchDirection::Both)
        .with_threshold(0.1);
    let out = link(&mut store, &config).unwrap();
    let progenitors = out.progenitors().unwrap();
    assert_eq!(progenitors.links(1, 0).len(), 2);
    let descendants = out.descendants().unwrap();
    assert_eq!(descendants.links(0, 0).len(), 1);
    assert_eq!(descendants.links(0, 1).len(), 1);
    assert_eq!(out.graph().unwrap().num_mutual(), 2);
}

#[test]
fn single_step_tree_keeps_fragments_and_mergers() {
    // a halo splitting in two, then two halos merging back into one
    let mut store = HaloStore::from_members(vec![
        vec![members(0..10)],
        vec![members(0..5), members(5..10)],
        vec![members(0..10)],
    ]);
    let config = LinkConfig::new(3, 64).with_direction(SearchDirection::Both);
    let out = link(&mut store, &config).unwrap();

    let progenitors = out.progenitors().unwrap();
    for h in 0..2 {
        let best = progenitors.best(1, h).unwrap();
        assert_eq!((best.snapshot, best.index), (0, 0));
    }
    let descendants = out.descendants().unwrap();
    for h in 0..2 {
        assert_eq!(descendants.get(1, h).state, LinkState::Linked);
        let best = descendants.best(1, h).unwrap();
        assert_eq!((best.snapshot, best.index), (2, 0));
    }
}

#[test]
fn multi_step_tree_gives_a_shared_progenitor_to_one_claimant_only() {
    let mut store = HaloStore::from_members(vec![
        vec![members(100..110)],
        vec![members(0..20)],
        vec![members(0..10), members(10..20)],
    ]);
    let config = LinkConfig::new(3, 128).with_num_steps(2);
    let out = link(&mut store, &config).unwrap();
    let set = out.progenitors().unwrap();
    let linked: Vec<usize> = (0..2).filter(|&h| !set.links(2, h).is_empty()).collect();
    assert_eq!(linked, vec![0]);
    assert_eq!(set.get(2, 1).state, LinkState::Terminal);
}

#[test]
fn threshold_turns_weak_matches_into_roots() {
    let mut store = HaloStore::from_members(vec![
        vec![members(0..10)],
        vec![(0..2).chain(50..58).collect()],
    ]);
    let config = LinkConfig::new(2, 64).with_threshold(0.1);
    let out = link(&mut store, &config).unwrap();
    assert!(out.progenitors().unwrap().links(1, 0).is_empty());
}

#[test]
fn cross_comparison_dumps_every_candidate() {
    let mut store = HaloStore::from_members(vec![
        vec![members(0..10), members(10..20), members(20..30)],
        vec![(0..4).chain(10..13).chain(20..21).collect()],
    ]);
    let config = LinkConfig::new(2, 64)
        .with_mode(CatalogMode::CrossComparison)
        .with_merit(MeritType::Shared)
        .with_threshold(5.0);
    let out = link(&mut store, &config).unwrap();
    let set = match &out {
        LinkOutput::CrossComparison(set) => set,
        other => panic!("expected crosscomp, got {}", other.kind()),
    };
    let shared: Vec<u32> = set.links(1, 0).iter().map(|l| l.shared).collect();
    assert_eq!(shared, vec![4, 3, 1]);
    assert!(out.descendants().is_none());
}

#[test]
fn core_weighting_prefers_the_halo_holding_the_core() {
    // both candidates share 5 particles, but only X's core is among them
    let source: Vec<u64> = (0..10).collect();
    let x: Vec<u64> = (0..5).chain(100..105).collect();
    let y: Vec<u64> = (200..203).chain(5..10).chain(203..205).collect();
    let mut store = HaloStore::from_members(vec![vec![y, x], vec![source]]);
    let config = LinkConfig::new(2, 256).with_core(0.3, 2);
    let out = link(&mut store, &config).unwrap();
    let best = out.progenitors().unwrap().best(1, 0).unwrap();
    assert_eq!(best.index, 1);
}
