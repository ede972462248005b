//! Link sets handed to the writer.

use itertools::{EitherOrBoth, Itertools};

use crate::catalog::HaloStore;
use crate::linking::types::{Direction, Link, LinkState, ObjectLinks};

/// Final links of one direction, indexed by snapshot and object.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkSet {
    pub direction: Direction,
    objects: Vec<Vec<ObjectLinks>>,
    halo_ids: Vec<Vec<u64>>,
}

/// One row of a flattened link set. Objects without a link have one row
/// with `target = None`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkRecord {
    pub snapshot: usize,
    pub index: usize,
    pub halo_id: u64,
    pub target: Option<Link>,
}

impl LinkSet {
    /// Attach final halo ids to `objects` and every link they hold.
    pub fn new(direction: Direction, mut objects: Vec<Vec<ObjectLinks>>, store: &HaloStore) -> Self {
        for obj in objects.iter_mut().flatten() {
            for link in obj.links.iter_mut() {
                link.halo_id = store.catalog(link.snapshot).halo_id(link.index);
            }
        }
        let halo_ids = store
            .catalogs()
            .iter()
            .map(|c| (0..c.num_halos()).map(|h| c.halo_id(h)).collect())
            .collect();
        Self {
            direction,
            objects,
            halo_ids,
        }
    }

    pub fn num_snapshots(&self) -> usize {
        self.objects.len()
    }

    pub fn snapshot(&self, snapshot: usize) -> &[ObjectLinks] {
        &self.objects[snapshot]
    }

    pub fn get(&self, snapshot: usize, index: usize) -> &ObjectLinks {
        &self.objects[snapshot][index]
    }

    pub fn links(&self, snapshot: usize, index: usize) -> &[Link] {
        &self.objects[snapshot][index].links
    }

    /// Best retained link, if any.
    pub fn best(&self, snapshot: usize, index: usize) -> Option<&Link> {
        self.links(snapshot, index).first()
    }

    pub fn halo_id(&self, snapshot: usize, index: usize) -> u64 {
        self.halo_ids[snapshot][index]
    }

    pub fn num_links(&self) -> usize {
        self.objects.iter().flatten().map(|o| o.links.len()).sum()
    }

    pub fn num_terminal(&self) -> usize {
        self.objects
            .iter()
            .flatten()
            .filter(|o| o.state == LinkState::Terminal)
            .count()
    }

    pub fn records(&self) -> impl Iterator<Item = LinkRecord> + '_ {
        self.objects.iter().enumerate().flat_map(move |(s, objs)| {
            objs.iter().enumerate().flat_map(move |(h, obj)| {
                let halo_id = self.halo_ids[s][h];
                let targets: Vec<Option<Link>> = if obj.links.is_empty() {
                    vec![None]
                } else {
                    obj.links.iter().copied().map(Some).collect()
                };
                targets.into_iter().map(move |target| LinkRecord {
                    snapshot: s,
                    index: h,
                    halo_id,
                    target,
                })
            })
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeAnnotation {
    pub merit: f64,
    pub shared: u32,
    pub depth: usize,
}

impl From<&Link> for EdgeAnnotation {
    fn from(link: &Link) -> Self {
        Self {
            merit: link.merit,
            shared: link.shared,
            depth: link.depth,
        }
    }
}

/// Edge between an earlier and a later object. `backward` is set when the
/// later object chose the earlier one as progenitor, `forward` when the
/// earlier object chose the later one as descendant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphEdge {
    pub earlier: (usize, usize),
    pub later: (usize, usize),
    pub earlier_id: u64,
    pub later_id: u64,
    pub backward: Option<EdgeAnnotation>,
    pub forward: Option<EdgeAnnotation>,
}

impl GraphEdge {
    pub fn is_mutual(&self) -> bool {
        self.backward.is_some() && self.forward.is_some()
    }
}

/// Both search directions merged into one edge list, sorted by
/// (earlier, later).
#[derive(Debug, Clone, PartialEq)]
pub struct HaloGraph {
    edges: Vec<GraphEdge>,
}

type EdgeKey = ((usize, usize), (usize, usize));

fn keyed(set: &LinkSet) -> Vec<(EdgeKey, u64, u64, EdgeAnnotation)> {
    let mut out: Vec<_> = set
        .records()
        .filter_map(|r| {
            let link = r.target?;
            let this = (r.snapshot, r.index);
            let other = (link.snapshot, link.index);
            let ann = EdgeAnnotation::from(&link);
            Some(match set.direction {
                Direction::Progenitor => ((other, this), link.halo_id, r.halo_id, ann),
                Direction::Descendant => ((this, other), r.halo_id, link.halo_id, ann),
            })
        })
        .collect();
    out.sort_unstable_by_key(|e| e.0);
    out
}

impl HaloGraph {
    pub fn build(progenitors: &LinkSet, descendants: &LinkSet) -> Self {
        let backward = keyed(progenitors);
        let forward = keyed(descendants);
        let edges = backward
            .into_iter()
            .merge_join_by(forward, |b, f| b.0.cmp(&f.0))
            .map(|pair| match pair {
                EitherOrBoth::Both(b, f) => GraphEdge {
                    earlier: b.0.0,
                    later: b.0.1,
                    earlier_id: b.1,
                    later_id: b.2,
                    backward: Some(b.3),
                    forward: Some(f.3),
                },
                EitherOrBoth::Left(b) => GraphEdge {
                    earlier: b.0.0,
                    later: b.0.1,
                    earlier_id: b.1,
                    later_id: b.2,
                    backward: Some(b.3),
                    forward: None,
                },
                EitherOrBoth::Right(f) => GraphEdge {
                    earlier: f.0.0,
                    later: f.0.1,
                    earlier_id: f.1,
                    later_id: f.2,
                    backward: None,
                    forward: Some(f.3),
                },
            })
            .collect();
        Self { edges }
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn num_mutual(&self) -> usize {
        self.edges.iter().filter(|e| e.is_mutual()).count()
    }

    /// Edges that end at `object`.
    pub fn progenitors_of(&self, object: (usize, usize)) -> impl Iterator<Item = &GraphEdge> {
        self.edges.iter().filter(move |e| e.later == object)
    }

    /// Edges that start at `object`.
    pub fn descendants_of(&self, object: (usize, usize)) -> impl Iterator<Item = &GraphEdge> {
        let start = self.edges.partition_point(|e| e.earlier < object);
        self.edges[start..]
            .iter()
            .take_while(move |e| e.earlier == object)
    }
}

/// What a run hands to the writer.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkOutput {
    Tree {
        progenitors: Option<LinkSet>,
        descendants: Option<LinkSet>,
    },
    Graph {
        progenitors: LinkSet,
        descendants: LinkSet,
        graph: HaloGraph,
    },
    /// Uncleaned progenitor candidates.
    CrossComparison(LinkSet),
}

impl LinkOutput {
    pub fn progenitors(&self) -> Option<&LinkSet> {
        match self {
            LinkOutput::Tree { progenitors, .. } => progenitors.as_ref(),
            LinkOutput::Graph { progenitors, .. } => Some(progenitors),
            LinkOutput::CrossComparison(set) => Some(set),
        }
    }

    pub fn descendants(&self) -> Option<&LinkSet> {
        match self {
            LinkOutput::Tree { descendants, .. } => descendants.as_ref(),
            LinkOutput::Graph { descendants, .. } => Some(descendants),
            LinkOutput::CrossComparison(_) => None,
        }
    }

    pub fn graph(&self) -> Option<&HaloGraph> {
        match self {
            LinkOutput::Graph { graph, .. } => Some(graph),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LinkOutput::Tree { .. } => "tree",
            LinkOutput::Graph { .. } => "graph",
            LinkOutput::CrossComparison(_) => "crosscomp",
        }
    }
}
