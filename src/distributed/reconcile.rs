//! Worker execution and merging of per-worker link tables.

use std::thread;

use crate::catalog::HaloStore;
use crate::config::{CatalogMode, LinkConfig};
use crate::error::{LinkError, Result};
use crate::linking::driver::{WorkerLinks, run_direction};
use crate::linking::types::{Direction, LinkState, ObjectLinks};

use super::partition::Partition;
use super::transport::{ChannelTransport, Transport, channel_mesh};

/// Everything one worker produced.
#[derive(Debug, Clone)]
pub struct WorkerOutput {
    pub rank: usize,
    pub progenitors: Option<WorkerLinks>,
    pub descendants: Option<WorkerLinks>,
}

/// Directions a run searches, in the order they execute.
pub fn directions(config: &LinkConfig) -> Vec<Direction> {
    let mut out = Vec::with_capacity(2);
    if config.search_direction.progenitors() {
        out.push(Direction::Progenitor);
    }
    // cross comparison only dumps progenitor candidates
    if config.search_direction.descendants() && config.catalog_mode != CatalogMode::CrossComparison {
        out.push(Direction::Descendant);
    }
    out
}

pub fn run_worker<T: Transport>(
    store: &HaloStore,
    config: &LinkConfig,
    part: &Partition,
    transport: &T,
) -> Result<WorkerOutput> {
    if transport.rank() != part.rank || transport.num_workers() != part.num_workers {
        return Err(LinkError::reconcile(
            part.rank,
            format!(
                "transport is rank {} of {}, partition is rank {} of {}",
                transport.rank(),
                transport.num_workers(),
                part.rank,
                part.num_workers
            ),
        ));
    }
    let mut out = WorkerOutput {
        rank: part.rank,
        progenitors: None,
        descendants: None,
    };
    for direction in directions(config) {
        let links = run_direction(direction, store, config, part, transport)?;
        match direction {
            Direction::Progenitor => out.progenitors = Some(links),
            Direction::Descendant => out.descendants = Some(links),
        }
    }
    Ok(out)
}

/// Run every partition on its own thread, connected by channels.
pub fn run_threaded(
    store: &HaloStore,
    config: &LinkConfig,
    parts: &[Partition],
) -> Result<Vec<WorkerOutput>> {
    let mesh = channel_mesh(parts.len());
    let results: Vec<Result<WorkerOutput>> = thread::scope(|scope| {
        let handles: Vec<_> = parts
            .iter()
            .zip(mesh)
            .map(|(part, transport): (&Partition, ChannelTransport)| {
                thread::Builder::new()
                    .name(format!("treelink-rank-{}", part.rank))
                    .spawn_scoped(scope, move || run_worker(store, config, part, &transport))
            })
            .collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(rank, handle)| match handle {
                Ok(h) => h
                    .join()
                    .unwrap_or_else(|_| Err(LinkError::reconcile(rank, "worker panicked"))),
                Err(err) => Err(LinkError::reconcile(rank, format!("spawn failed: {err}"))),
            })
            .collect()
    });

    // a failing worker makes its neighbours fail on the closed channel;
    // report the root failure
    if results.iter().any(|r| r.is_err()) {
        let mut errors: Vec<LinkError> = results.into_iter().filter_map(|r| r.err()).collect();
        let root = errors
            .iter()
            .position(|e| !matches!(e, LinkError::Reconcile { .. }))
            .unwrap_or(0);
        return Err(errors.swap_remove(root));
    }
    results.into_iter().collect()
}

/// Combine per-worker tables of one direction into the global table.
///
/// Workers are applied in wavefront order so the updates a later worker made
/// to objects it does not own override the earlier owner's provisional state.
pub fn merge_links(
    direction: Direction,
    store: &HaloStore,
    mut workers: Vec<WorkerLinks>,
) -> Result<Vec<Vec<ObjectLinks>>> {
    let num_workers = workers.len();
    let order = direction.wavefront(num_workers);
    workers.sort_by_key(|w| order.iter().position(|&r| r == w.rank));

    let mut table: Vec<Vec<ObjectLinks>> = store
        .catalogs()
        .iter()
        .map(|c| vec![ObjectLinks::default(); c.num_halos()])
        .collect();
    let mut owner = vec![None; store.num_snapshots()];

    for w in workers {
        if w.direction != direction {
            return Err(LinkError::reconcile(w.rank, "merged links of the wrong direction"));
        }
        for (s, objects) in w.owned.clone().zip(w.table) {
            if owner[s].replace(w.rank).is_some() {
                return Err(LinkError::reconcile(w.rank, format!("snapshot {s} owned twice")));
            }
            table[s] = objects;
        }
        for ((s, h), links) in w.foreign {
            let slot = table
                .get_mut(s)
                .and_then(|t| t.get_mut(h))
                .ok_or_else(|| LinkError::reconcile(w.rank, format!("no object ({s}, {h})")))?;
            *slot = links;
        }
    }

    for (s, objects) in table.iter().enumerate() {
        let Some(rank) = owner[s] else {
            return Err(LinkError::reconcile(0, format!("snapshot {s} has no owner")));
        };
        if let Some(h) = objects
            .iter()
            .position(|o| !matches!(o.state, LinkState::Linked | LinkState::Terminal))
        {
            return Err(LinkError::reconcile(
                rank,
                format!(
                    "{} object ({s}, {h}) left in state {:?}",
                    direction.name(),
                    objects[h].state
                ),
            ));
        }
    }
    Ok(table)
}
