//! npz reading and writing of halo catalogs and link sets.
//!
//! Catalog layout: `meta_num_snapshots.npy` plus, per snapshot `i`,
//! `s{i}_particle_ids.npy` (u64, members of all halos back to back, most
//! bound first) and `s{i}_offsets.npy` (i64, `num_halos + 1` entries).

use anyhow::{Context, Result, bail};
use ndarray::Array1;
use ndarray_npy::{NpzReader, NpzWriter, ReadableElement};
use std::fs::File;
use std::io::{Read, Seek, Write};

use crate::catalog::{HaloCatalog, HaloStore};
use crate::output::{HaloGraph, LinkOutput, LinkSet};

fn read_vec<R: Read + Seek, T: ReadableElement + Clone>(npz: &mut NpzReader<R>, name: &str) -> Result<Vec<T>> {
    let arr: Array1<T> = npz
        .by_name(name)
        .with_context(|| format!("missing {}", name))?;
    Ok(arr.to_vec())
}

pub fn load_catalogs(path: &str) -> Result<HaloStore> {
    let f = File::open(path).with_context(|| format!("open {}", path))?;
    let mut npz = NpzReader::new(f).context("read npz")?;

    let meta: Vec<i64> = read_vec(&mut npz, "meta_num_snapshots.npy")?;
    let Some(&num_snapshots) = meta.first() else {
        bail!("meta_num_snapshots.npy is empty");
    };
    if num_snapshots < 0 {
        bail!("negative snapshot count {}", num_snapshots);
    }

    let mut catalogs = Vec::with_capacity(num_snapshots as usize);
    for s in 0..num_snapshots as usize {
        let particle_ids: Vec<u64> = read_vec(&mut npz, &format!("s{}_particle_ids.npy", s))?;
        let raw: Vec<i64> = read_vec(&mut npz, &format!("s{}_offsets.npy", s))?;
        let offsets = raw
            .iter()
            .map(|&o| usize::try_from(o))
            .collect::<std::result::Result<Vec<usize>, _>>()
            .with_context(|| format!("negative offset in snapshot {}", s))?;
        catalogs.push(HaloCatalog::from_csr(s, particle_ids, offsets)?);
    }
    Ok(HaloStore::new(catalogs)?)
}

pub fn save_catalogs(path: &str, store: &HaloStore) -> Result<()> {
    let f = File::create(path).with_context(|| format!("create {}", path))?;
    let mut npz = NpzWriter::new(f);

    npz.add_array(
        "meta_num_snapshots.npy",
        &Array1::from_vec(vec![store.num_snapshots() as i64]),
    )?;
    for cat in store.catalogs() {
        let s = cat.snapshot();
        npz.add_array(
            &format!("s{}_particle_ids.npy", s),
            &Array1::from_vec(cat.particle_ids().to_vec()),
        )?;
        let offsets: Vec<i64> = cat.offsets().iter().map(|&o| o as i64).collect();
        npz.add_array(&format!("s{}_offsets.npy", s), &Array1::from_vec(offsets))?;
    }
    npz.finish()?;
    Ok(())
}

fn add_link_set<W: Write + Seek>(npz: &mut NpzWriter<W>, prefix: &str, set: &LinkSet) -> Result<()> {
    let mut snapshot = Vec::new();
    let mut halo_id = Vec::new();
    let mut target_snapshot = Vec::new();
    let mut target_halo_id = Vec::new();
    let mut merit = Vec::new();
    let mut shared = Vec::new();
    let mut depth = Vec::new();

    // objects without a link keep one row with target_snapshot = -1
    for r in set.records() {
        snapshot.push(r.snapshot as i64);
        halo_id.push(r.halo_id);
        match r.target {
            Some(link) => {
                target_snapshot.push(link.snapshot as i64);
                target_halo_id.push(link.halo_id);
                merit.push(link.merit);
                shared.push(link.shared as i64);
                depth.push(link.depth as i64);
            }
            None => {
                target_snapshot.push(-1);
                target_halo_id.push(0);
                merit.push(0.0);
                shared.push(0);
                depth.push(0);
            }
        }
    }

    npz.add_array(&format!("{}_snapshot.npy", prefix), &Array1::from_vec(snapshot))?;
    npz.add_array(&format!("{}_halo_id.npy", prefix), &Array1::from_vec(halo_id))?;
    npz.add_array(
        &format!("{}_target_snapshot.npy", prefix),
        &Array1::from_vec(target_snapshot),
    )?;
    npz.add_array(
        &format!("{}_target_halo_id.npy", prefix),
        &Array1::from_vec(target_halo_id),
    )?;
    npz.add_array(&format!("{}_merit.npy", prefix), &Array1::from_vec(merit))?;
    npz.add_array(&format!("{}_shared.npy", prefix), &Array1::from_vec(shared))?;
    npz.add_array(&format!("{}_depth.npy", prefix), &Array1::from_vec(depth))?;
    Ok(())
}

fn add_graph<W: Write + Seek>(npz: &mut NpzWriter<W>, graph: &HaloGraph) -> Result<()> {
    let edges = graph.edges();
    let earlier: Vec<u64> = edges.iter().map(|e| e.earlier_id).collect();
    let later: Vec<u64> = edges.iter().map(|e| e.later_id).collect();
    // NaN marks the direction that did not retain the edge
    let backward: Vec<f64> = edges
        .iter()
        .map(|e| e.backward.map_or(f64::NAN, |a| a.merit))
        .collect();
    let forward: Vec<f64> = edges
        .iter()
        .map(|e| e.forward.map_or(f64::NAN, |a| a.merit))
        .collect();
    npz.add_array("graph_earlier_id.npy", &Array1::from_vec(earlier))?;
    npz.add_array("graph_later_id.npy", &Array1::from_vec(later))?;
    npz.add_array("graph_backward_merit.npy", &Array1::from_vec(backward))?;
    npz.add_array("graph_forward_merit.npy", &Array1::from_vec(forward))?;
    Ok(())
}

/// Write `output` as flat columns: `progenitors_*`, `descendants_*`,
/// `graph_*` or `crosscomp_*`, depending on the run.
pub fn save_links(path: &str, output: &LinkOutput) -> Result<()> {
    let f = File::create(path).with_context(|| format!("create {}", path))?;
    let mut npz = NpzWriter::new(f);

    let mode: i64 = match output {
        LinkOutput::Tree { .. } => 0,
        LinkOutput::Graph { .. } => 1,
        LinkOutput::CrossComparison(_) => 2,
    };
    npz.add_array("meta_mode.npy", &Array1::from_vec(vec![mode]))?;

    match output {
        LinkOutput::Tree {
            progenitors,
            descendants,
        } => {
            if let Some(set) = progenitors {
                add_link_set(&mut npz, "progenitors", set)?;
            }
            if let Some(set) = descendants {
                add_link_set(&mut npz, "descendants", set)?;
            }
        }
        LinkOutput::Graph {
            progenitors,
            descendants,
            graph,
        } => {
            add_link_set(&mut npz, "progenitors", progenitors)?;
            add_link_set(&mut npz, "descendants", descendants)?;
            add_graph(&mut npz, graph)?;
        }
        LinkOutput::CrossComparison(set) => add_link_set(&mut npz, "crosscomp", set)?,
    }

    npz.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> String {
        let dir = std::env::temp_dir().join(format!("treelink-io-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name).to_string_lossy().into_owned()
    }

    #[test]
    fn catalogs_survive_a_save_load_cycle() {
        let store = HaloStore::from_members(vec![
            vec![vec![4, 2, 9], vec![], vec![11]],
            vec![vec![2, 4]],
        ]);
        let path = temp_path("catalogs.npz");
        save_catalogs(&path, &store).unwrap();
        let back = load_catalogs(&path).unwrap();
        assert_eq!(back.num_snapshots(), 2);
        assert_eq!(back.catalog(0).members(0), &[4, 2, 9]);
        assert!(back.catalog(0).members(1).is_empty());
        assert_eq!(back.catalog(1).offsets(), &[0, 2]);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_snapshot_array_is_reported() {
        let path = temp_path("broken.npz");
        {
            let f = File::create(&path).unwrap();
            let mut npz = NpzWriter::new(f);
            npz.add_array("meta_num_snapshots.npy", &Array1::from_vec(vec![1i64]))
                .unwrap();
            npz.finish().unwrap();
        }
        let err = load_catalogs(&path).unwrap_err();
        assert!(format!("{err:#}").contains("s0_particle_ids.npy"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn links_are_written_as_columns() {
        let mut store = HaloStore::from_members(vec![vec![vec![1, 2, 3]], vec![vec![1, 2, 3]]]);
        let output = crate::engine::link(&mut store, &crate::LinkConfig::new(2, 8)).unwrap();
        let path = temp_path("links.npz");
        save_links(&path, &output).unwrap();

        let mut npz = NpzReader::new(File::open(&path).unwrap()).unwrap();
        let targets: Vec<i64> = read_vec(&mut npz, "progenitors_target_snapshot.npy").unwrap();
        assert_eq!(targets, vec![-1, 0]);
        let ids: Vec<u64> = read_vec(&mut npz, "progenitors_target_halo_id.npy").unwrap();
        assert_eq!(ids[1], 1);
        let _ = std::fs::remove_file(&path);
    }
}
