//! One linking pass (progenitors or descendants) over a worker's snapshots.
//!
//! The pass discovers candidate links for every owned source snapshot,
//! bridges gaps up to `num_steps` deep, and resolves each target snapshot
//! once no further claims on it can arrive. Claims on snapshots owned by a
//! worker later in the wavefront are collected in an outbox and handed over
//! through the [`Transport`].

use std::ops::Range;
use std::time::Instant;

use ahash::AHashMap;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;

use super::bridge::BridgeArena;
use super::cleaner::{CleanPolicy, clean};
use super::matcher::cross_match;
use super::membership::{MembershipIndex, MembershipMode};
use super::resolver::{ResolvePolicy, resolve};
use super::types::{Claim, Direction, LinkState, ObjectLinks};
use crate::catalog::{HaloCatalog, HaloStore};
use crate::config::LinkConfig;
use crate::distributed::partition::Partition;
use crate::distributed::transport::{BoundaryMessage, Transport};
use crate::error::{LinkError, Result};
use crate::runtime;

/// Catalog access limited to a worker's window.
#[derive(Clone, Copy)]
pub struct StoreView<'a> {
    store: &'a HaloStore,
    window: &'a Range<usize>,
    rank: usize,
}

impl<'a> StoreView<'a> {
    pub fn new(store: &'a HaloStore, part: &'a Partition) -> Self {
        Self {
            store,
            window: &part.window,
            rank: part.rank,
        }
    }

    pub fn catalog(&self, snapshot: usize) -> Result<&'a HaloCatalog> {
        if !self.window.contains(&snapshot) || snapshot >= self.store.num_snapshots() {
            return Err(LinkError::reconcile(
                self.rank,
                format!("snapshot {snapshot} is outside window {:?}", self.window),
            ));
        }
        Ok(self.store.catalog(snapshot))
    }
}

/// Result of one pass on one worker.
#[derive(Debug, Clone)]
pub struct WorkerLinks {
    pub direction: Direction,
    pub rank: usize,
    pub owned: Range<usize>,
    /// Per owned snapshot, per object.
    pub table: Vec<Vec<ObjectLinks>>,
    /// Final state of objects owned by upstream workers that this worker
    /// resolved or retried, sorted by (snapshot, object).
    pub foreign: Vec<((usize, usize), ObjectLinks)>,
}

pub struct DirectionPass<'a> {
    direction: Direction,
    config: &'a LinkConfig,
    part: &'a Partition,
    view: StoreView<'a>,
    index: MembershipIndex,
    mode: MembershipMode,
    clean_policy: CleanPolicy,
    resolve_policy: ResolvePolicy,
    arena: BridgeArena,
    table: Vec<Vec<ObjectLinks>>,
    foreign: AHashMap<(usize, usize), ObjectLinks>,
    outbox: Vec<Claim>,
    budget: Option<u64>,
}

impl<'a> DirectionPass<'a> {
    pub fn new(
        direction: Direction,
        store: &'a HaloStore,
        config: &'a LinkConfig,
        part: &'a Partition,
    ) -> Result<Self> {
        let table = part
            .owned
            .clone()
            .map(|s| vec![ObjectLinks::default(); store.catalog(s).num_halos()])
            .collect();
        Ok(Self {
            direction,
            config,
            part,
            view: StoreView::new(store, part),
            index: MembershipIndex::new(config.max_particle_id)?,
            mode: MembershipMode::from_config(config),
            clean_policy: CleanPolicy::for_run(config, direction),
            resolve_policy: ResolvePolicy::for_run(config),
            arena: BridgeArena::new(direction),
            table,
            foreign: AHashMap::default(),
            outbox: Vec::new(),
            budget: runtime::memory_budget_bytes(),
        })
    }

    fn object_mut(&mut self, snapshot: usize, object: usize) -> &mut ObjectLinks {
        if self.part.owns(snapshot) {
            &mut self.table[snapshot - self.part.owned.start][object]
        } else {
            self.foreign.entry((snapshot, object)).or_default()
        }
    }

    /// Match every object of owned source snapshot `source` from depth 1.
    pub fn discover(&mut self, source: usize) -> Result<()> {
        let objects: Vec<usize> = (0..self.view.catalog(source)?.num_halos()).collect();
        self.search(source, &objects, 1)
    }

    /// Search links for `objects` of `source`, starting at `first_depth`.
    /// The first depth with a retained link wins; objects still unlinked
    /// after `num_steps` become terminal.
    fn search(&mut self, source: usize, objects: &[usize], first_depth: usize) -> Result<()> {
        let source_cat = self.view.catalog(source)?;
        let mut pending = objects.to_vec();
        let mut select = vec![false; source_cat.num_halos()];

        for depth in first_depth..=self.config.num_steps {
            if pending.is_empty() {
                break;
            }
            let Some(target) = self.direction.target(source, depth, self.config.num_snapshots)
            else {
                break;
            };
            let target_cat = self.view.catalog(target)?;

            select.iter_mut().for_each(|m| *m = false);
            for &h in &pending {
                select[h] = true;
            }
            let (lists, updated) = {
                let pass = self.index.populate(target_cat, self.mode)?;
                cross_match(source_cat, &pass, depth, self.config.merit_type, Some(&select))
            };
            for &h in &pending {
                self.object_mut(source, h).state = LinkState::Unlinked { searched: depth };
            }
            if !updated {
                continue;
            }

            let mut claims = Vec::new();
            for mut list in lists.into_iter().filter(|l| select[l.source]) {
                clean(&mut list, self.clean_policy);
                if list.is_empty() {
                    continue;
                }
                let h = list.source;
                let obj = self.object_mut(source, h);
                obj.state = LinkState::Candidate { depth };
                for c in &list.candidates {
                    let claim = Claim {
                        source_snapshot: source,
                        source: h,
                        target_snapshot: target,
                        target: c.target,
                        merit: c.merit,
                        shared: c.shared,
                        depth,
                    };
                    obj.links.push(claim.link());
                    claims.push(claim);
                }
            }
            for claim in claims {
                self.emit(claim)?;
            }
            pending.retain(|&h| self.object_is_unlinked(source, h));
        }

        for h in pending {
            self.object_mut(source, h).state = LinkState::Terminal;
        }
        Ok(())
    }

    fn object_is_unlinked(&self, snapshot: usize, object: usize) -> bool {
        if self.part.owns(snapshot) {
            self.table[snapshot - self.part.owned.start][object].is_unlinked()
        } else {
            self.foreign
                .get(&(snapshot, object))
                .is_none_or(|o| o.is_unlinked())
        }
    }

    fn emit(&mut self, claim: Claim) -> Result<()> {
        let t = claim.target_snapshot;
        if self.part.owns(t) {
            let halos = self.view.catalog(t)?.num_halos();
            self.arena.add(claim, halos)
        } else if self.direction.is_downstream(t, &self.part.owned) {
            self.outbox.push(claim);
            Ok(())
        } else {
            Err(LinkError::reconcile(
                self.part.rank,
                format!(
                    "claim from snapshot {} lands on snapshot {t}, which is neither owned nor downstream",
                    claim.source_snapshot
                ),
            ))
        }
    }

    /// Resolve owned target `target` and retry whatever it demoted.
    pub fn resolve_target(&mut self, target: usize) -> Result<()> {
        let Some(record) = self.arena.release(target)? else {
            return Ok(());
        };
        let claims = record.num_claims();
        let resolution = resolve(record, self.resolve_policy);

        for w in &resolution.winners {
            self.object_mut(w.source_snapshot, w.source).state = LinkState::Linked;
        }
        for d in &resolution.demoted {
            self.object_mut(d.source_snapshot, d.source).demote(d.depth);
        }
        tracing::debug!(
            pass = self.direction.name(),
            snapshot = target,
            claims,
            demoted = resolution.demoted.len(),
            "resolved"
        );

        // retry per (source snapshot, depth reached), in sweep order
        let groups = resolution
            .demoted
            .iter()
            .map(|d| ((d.source_snapshot, d.depth), d.source))
            .into_group_map();
        let mut keys: Vec<(usize, usize)> = groups.keys().copied().collect();
        match self.direction {
            Direction::Progenitor => keys.sort_unstable_by(|a, b| b.cmp(a)),
            Direction::Descendant => keys.sort_unstable(),
        }
        for key in keys {
            let mut objects = groups[&key].clone();
            objects.sort_unstable();
            self.search(key.0, &objects, key.1 + 1)?;
        }

        runtime::check_memory(target, self.budget)
    }

    /// Take in claims sent by the upstream worker. Claims on owned targets
    /// join the local records; claims further downstream are forwarded.
    pub fn absorb(&mut self, message: BoundaryMessage) -> Result<()> {
        let rank = self.part.rank;
        if message.direction != self.direction {
            return Err(LinkError::reconcile(
                rank,
                format!(
                    "expected a {} message from {}, got {}",
                    self.direction.name(),
                    message.from,
                    message.direction.name()
                ),
            ));
        }
        for claim in message.claims {
            let t = claim.target_snapshot;
            if !self.part.owns(t) {
                if self.direction.is_downstream(t, &self.part.owned) {
                    self.outbox.push(claim);
                    continue;
                }
                return Err(LinkError::reconcile(
                    rank,
                    format!("received a claim on snapshot {t}, which this worker cannot resolve"),
                ));
            }
            let source_cat = self.view.catalog(claim.source_snapshot)?;
            let reachable = self
                .direction
                .target(claim.source_snapshot, claim.depth, self.config.num_snapshots)
                == Some(t);
            if self.part.owns(claim.source_snapshot)
                || claim.source >= source_cat.num_halos()
                || !reachable
            {
                return Err(LinkError::reconcile(
                    rank,
                    format!(
                        "inconsistent claim ({}, {}) -> ({t}, {}) at depth {}",
                        claim.source_snapshot, claim.source, claim.target, claim.depth
                    ),
                ));
            }
            let obj = self.object_mut(claim.source_snapshot, claim.source);
            if obj.state != (LinkState::Candidate { depth: claim.depth }) {
                obj.state = LinkState::Candidate { depth: claim.depth };
                obj.links.clear();
            }
            obj.links.push(claim.link());
            let halos = self.view.catalog(t)?.num_halos();
            self.arena.add(claim, halos)?;
        }
        Ok(())
    }

    fn take_outbox(&mut self) -> BoundaryMessage {
        BoundaryMessage {
            direction: self.direction,
            from: self.part.rank,
            claims: std::mem::take(&mut self.outbox),
        }
    }

    pub fn finish(self) -> Result<WorkerLinks> {
        self.arena.finish()?;
        if !self.index.is_clear() {
            return Err(LinkError::reconcile(
                self.part.rank,
                "membership index left populated",
            ));
        }
        let mut foreign: Vec<_> = self.foreign.into_iter().collect();
        foreign.sort_unstable_by_key(|(k, _)| *k);
        Ok(WorkerLinks {
            direction: self.direction,
            rank: self.part.rank,
            owned: self.part.owned.clone(),
            table: self.table,
            foreign,
        })
    }
}

fn progress_bar(len: usize, visible: bool, direction: Direction) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) =
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40} {pos}/{len} snapshots {msg}")
    {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb.set_message(direction.name());
    pb
}

/// Run one direction on the worker described by `part`.
///
/// The head of the wavefront slides its window: each target is resolved as
/// soon as the source after it has been matched. Other workers match all
/// their sources first, then wait for the upstream message before resolving.
pub fn run_direction<T: Transport>(
    direction: Direction,
    store: &HaloStore,
    config: &LinkConfig,
    part: &Partition,
    transport: &T,
) -> Result<WorkerLinks> {
    let t0 = Instant::now();
    let mut pass = DirectionPass::new(direction, store, config, part)?;
    let sweep = direction.sweep(part.owned.clone());
    let upstream = direction.upstream(part.rank, part.num_workers);
    let downstream = direction.downstream(part.rank, part.num_workers);
    let pb = progress_bar(sweep.len(), config.show_progress, direction);

    match upstream {
        None => {
            for &s in &sweep {
                pass.discover(s)?;
                if let Some(t) = direction.settled_after(s).filter(|&t| part.owns(t)) {
                    pass.resolve_target(t)?;
                }
                pb.inc(1);
            }
        }
        Some(up) => {
            for &s in &sweep {
                pass.discover(s)?;
                pb.inc(1);
            }
            let message = transport.recv(up)?;
            tracing::debug!(
                pass = direction.name(),
                rank = part.rank,
                from = up,
                claims = message.claims.len(),
                "boundary message received"
            );
            pass.absorb(message)?;
            for &t in &sweep {
                pass.resolve_target(t)?;
            }
        }
    }
    // the first swept snapshot is never a settled target in the sliding loop
    for &t in &sweep {
        if !pass.arena.is_released(t) {
            pass.resolve_target(t)?;
        }
    }

    let message = pass.take_outbox();
    match downstream {
        Some(down) => transport.send(down, message)?,
        None if !message.claims.is_empty() => {
            return Err(LinkError::reconcile(
                part.rank,
                format!("{} claims point past the last worker", message.claims.len()),
            ));
        }
        None => {}
    }
    pb.finish_and_clear();

    let out = pass.finish()?;
    tracing::info!(
        pass = direction.name(),
        rank = part.rank,
        snapshots = ?part.owned,
        "done in {:.3}s",
        t0.elapsed().as_secs_f64()
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::transport::LocalTransport;

    fn run(store: &HaloStore, config: &LinkConfig, direction: Direction) -> WorkerLinks {
        let part = Partition::single(store.num_snapshots());
        run_direction(direction, store, config, &part, &LocalTransport).unwrap()
    }

    #[test]
    fn direct_progenitor_beats_weaker_one() {
        // snapshot 1 halo 0 shares 8 particles with (0,0) and 2 with (0,1)
        let mut a: Vec<u64> = (0..8).collect();
        a.extend([20, 21]);
        let store = HaloStore::from_members(vec![
            vec![(0..10).collect(), (20..30).collect()],
            vec![a],
        ]);
        let config = LinkConfig::new(2, 64).with_core(1.0, 0);
        let out = run(&store, &config, Direction::Progenitor);
        let obj = &out.table[1][0];
        assert_eq!(obj.state, LinkState::Linked);
        assert_eq!(obj.links.len(), 1);
        assert_eq!((obj.links[0].snapshot, obj.links[0].index), (0, 0));
        assert!((obj.links[0].merit - 0.64).abs() < 1e-12);
        assert!(out.table[0].iter().all(|o| o.state == LinkState::Terminal));
    }

    #[test]
    fn gap_is_bridged_at_depth_two() {
        let store = HaloStore::from_members(vec![
            vec![(0..10).collect()],
            vec![(100..110).collect()],
            vec![(0..10).collect()],
        ]);
        let config = LinkConfig::new(3, 128).with_num_steps(2).with_core(1.0, 0);
        let out = run(&store, &config, Direction::Progenitor);
        let obj = &out.table[2][0];
        assert_eq!(obj.state, LinkState::Linked);
        assert_eq!((obj.links[0].snapshot, obj.links[0].depth), (0, 2));
        assert_eq!(out.table[1][0].state, LinkState::Terminal);
    }

    #[test]
    fn demoted_claimant_searches_deeper() {
        // (2,0) and (2,1) both best-match (1,0); (2,1) loses and finds (0,0)
        let store = HaloStore::from_members(vec![
            vec![(10..20).collect()],
            vec![(0..10).collect()],
            vec![(0..10).collect(), (0..5).chain(10..15).collect()],
        ]);
        let config = LinkConfig::new(3, 64).with_num_steps(2).with_core(1.0, 0);
        let out = run(&store, &config, Direction::Progenitor);
        assert_eq!(out.table[2][0].links[0].snapshot, 1);
        let loser = &out.table[2][1];
        assert_eq!(loser.state, LinkState::Linked);
        assert_eq!((loser.links[0].snapshot, loser.links[0].depth), (0, 2));
    }

    #[test]
    fn window_is_enforced() {
        let store = HaloStore::from_members(vec![vec![vec![1]], vec![vec![1]], vec![vec![1]]]);
        let part = Partition {
            rank: 0,
            num_workers: 2,
            owned: 0..1,
            window: 0..2,
        };
        let view = StoreView::new(&store, &part);
        assert!(view.catalog(1).is_ok());
        assert!(matches!(view.catalog(2), Err(LinkError::Reconcile { .. })));
    }
}
