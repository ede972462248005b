//! Top-level entry point: validate, prepare the store, run the workers and
//! assemble the output.

use std::time::Instant;

use crate::catalog::HaloStore;
use crate::catalog::mapping::compact_particle_ids;
use crate::config::{CatalogMode, IdMapping, LinkConfig};
use crate::distributed::{
    LocalTransport, WorkerOutput, directions, merge_links, partition_snapshots, run_threaded,
    run_worker,
};
use crate::error::{ConfigError, Result};
use crate::linking::types::{Direction, ObjectLinks};
use crate::output::{HaloGraph, LinkOutput, LinkSet};

/// Link every snapshot of `store` according to `config`.
///
/// The store is modified in place: particle ids are compacted when
/// `IdMapping::Compact` is selected, and halo ids are renumbered to
/// `snapshot * halo_id_offset + index + 1` once linking is done.
pub fn link(store: &mut HaloStore, config: &LinkConfig) -> Result<LinkOutput> {
    let t0 = Instant::now();
    config.validate()?;
    if store.num_snapshots() != config.num_snapshots {
        return Err(ConfigError::SnapshotCount {
            expected: config.num_snapshots,
            found: store.num_snapshots(),
        }
        .into());
    }
    if config.halo_id_offset <= store.max_halos() as u64 {
        return Err(ConfigError::HaloIdOffset(config.halo_id_offset).into());
    }

    let mut config = config.clone();
    match config.id_mapping {
        IdMapping::Compact => config.max_particle_id = compact_particle_ids(store).max(1),
        IdMapping::Direct => store.check_particle_ids(config.max_particle_id)?,
    }
    tracing::info!(
        halos = store.total_halos(),
        particles = store.total_particles(),
        "linking: {config}"
    );

    let parts = partition_snapshots(store, config.num_workers, config.num_steps);
    let outputs: Vec<WorkerOutput> = if parts.len() == 1 {
        vec![run_worker(store, &config, &parts[0], &LocalTransport)?]
    } else {
        for p in &parts {
            tracing::debug!(rank = p.rank, owned = ?p.owned, window = ?p.window, "partition");
        }
        run_threaded(store, &config, &parts)?
    };

    let mut progenitors: Option<Vec<Vec<ObjectLinks>>> = None;
    let mut descendants: Option<Vec<Vec<ObjectLinks>>> = None;
    for direction in directions(&config) {
        let workers = outputs
            .iter()
            .filter_map(|o| match direction {
                Direction::Progenitor => o.progenitors.clone(),
                Direction::Descendant => o.descendants.clone(),
            })
            .collect();
        let table = merge_links(direction, store, workers)?;
        match direction {
            Direction::Progenitor => progenitors = Some(table),
            Direction::Descendant => descendants = Some(table),
        }
    }
    drop(outputs);

    store.renumber_halo_ids(config.halo_id_offset);
    let progenitors = progenitors.map(|t| LinkSet::new(Direction::Progenitor, t, store));
    let descendants = descendants.map(|t| LinkSet::new(Direction::Descendant, t, store));

    let output = match (config.catalog_mode, progenitors, descendants) {
        (CatalogMode::MergerTree, progenitors, descendants) => LinkOutput::Tree {
            progenitors,
            descendants,
        },
        (CatalogMode::Graph, Some(progenitors), Some(descendants)) => {
            let graph = HaloGraph::build(&progenitors, &descendants);
            LinkOutput::Graph {
                progenitors,
                descendants,
                graph,
            }
        }
        (CatalogMode::CrossComparison, Some(progenitors), _) => {
            LinkOutput::CrossComparison(progenitors)
        }
        (mode, _, _) => {
            return Err(ConfigError::ModeDirection {
                mode: mode.name(),
                direction: config.search_direction.name(),
            }
            .into());
        }
    };

    tracing::info!(
        kind = output.kind(),
        progenitor_links = output.progenitors().map_or(0, |s| s.num_links()),
        descendant_links = output.descendants().map_or(0, |s| s.num_links()),
        workers = parts.len(),
        "linked in {:.3}s",
        t0.elapsed().as_secs_f64()
    );
    Ok(output)
}
