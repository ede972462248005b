//! Halo snapshot store.
//!
//! Each snapshot's halos are stored CSR style: one flat particle id array and
//! an offsets array with `num_halos + 1` entries. Member order is kept as read
//! (most bound first), which the core weighting relies on.

pub mod mapping;

use crate::error::{LinkError, Result};

/// Borrowed view of one halo record.
#[derive(Debug, Clone, Copy)]
pub struct Halo<'a> {
    pub id: u64,
    pub snapshot: usize,
    pub index: usize,
    pub particle_ids: &'a [u64],
}

impl Halo<'_> {
    #[inline]
    pub fn num_particles(&self) -> usize {
        self.particle_ids.len()
    }
}

#[derive(Debug, Clone)]
pub struct HaloCatalog {
    snapshot: usize,
    ids: Vec<u64>,
    particle_ids: Vec<u64>,
    offsets: Vec<usize>,
}

impl HaloCatalog {
    /// Build from per-halo member lists; ids follow read order.
    pub fn new(snapshot: usize, halos: Vec<Vec<u64>>) -> Self {
        let total: usize = halos.iter().map(|h| h.len()).sum();
        let mut particle_ids = Vec::with_capacity(total);
        let mut offsets = Vec::with_capacity(halos.len() + 1);
        offsets.push(0);
        for members in halos {
            particle_ids.extend(members);
            offsets.push(particle_ids.len());
        }
        let ids = (0..offsets.len() as u64 - 1).collect();
        Self {
            snapshot,
            ids,
            particle_ids,
            offsets,
        }
    }

    /// Build from CSR arrays as produced by the loader.
    pub fn from_csr(snapshot: usize, particle_ids: Vec<u64>, offsets: Vec<usize>) -> Result<Self> {
        let malformed = |reason: String| LinkError::Catalog { snapshot, reason };
        let Some(&last) = offsets.last() else {
            return Err(malformed("offsets must hold at least one entry".into()));
        };
        if offsets[0] != 0 {
            return Err(malformed(format!("offsets start at {}", offsets[0])));
        }
        if last != particle_ids.len() {
            return Err(malformed(format!(
                "last offset {} does not equal particle count {}",
                last,
                particle_ids.len()
            )));
        }
        if offsets.windows(2).any(|w| w[0] > w[1]) {
            return Err(malformed("offsets are not monotonic".into()));
        }
        let ids = (0..offsets.len() as u64 - 1).collect();
        Ok(Self {
            snapshot,
            ids,
            particle_ids,
            offsets,
        })
    }

    #[inline]
    pub fn snapshot(&self) -> usize {
        self.snapshot
    }

    #[inline]
    pub fn num_halos(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_halos() == 0
    }

    #[inline]
    pub fn members(&self, h: usize) -> &[u64] {
        &self.particle_ids[self.offsets[h]..self.offsets[h + 1]]
    }

    #[inline]
    pub fn num_particles(&self, h: usize) -> usize {
        self.offsets[h + 1] - self.offsets[h]
    }

    pub fn total_particles(&self) -> usize {
        self.particle_ids.len()
    }

    #[inline]
    pub fn halo_id(&self, h: usize) -> u64 {
        self.ids[h]
    }

    pub fn halo(&self, h: usize) -> Halo<'_> {
        Halo {
            id: self.ids[h],
            snapshot: self.snapshot,
            index: h,
            particle_ids: self.members(h),
        }
    }

    pub fn halos(&self) -> impl Iterator<Item = Halo<'_>> + '_ {
        (0..self.num_halos()).map(move |h| self.halo(h))
    }

    pub fn particle_ids(&self) -> &[u64] {
        &self.particle_ids
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// First offending particle, if any id falls outside `0..max_particle_id`.
    pub fn check_particle_ids(&self, max_particle_id: u64) -> Result<()> {
        for h in 0..self.num_halos() {
            if let Some(&pid) = self.members(h).iter().find(|&&p| p >= max_particle_id) {
                return Err(LinkError::ParticleIdOutOfRange {
                    snapshot: self.snapshot,
                    halo: h,
                    particle_id: pid,
                    max_particle_id,
                });
            }
        }
        Ok(())
    }

    pub(crate) fn particle_ids_mut(&mut self) -> &mut [u64] {
        &mut self.particle_ids
    }
}

/// Ordered sequence of catalogs, one per snapshot.
#[derive(Debug, Clone, Default)]
pub struct HaloStore {
    catalogs: Vec<HaloCatalog>,
}

impl HaloStore {
    /// Catalogs must be given in snapshot order starting at 0.
    pub fn new(catalogs: Vec<HaloCatalog>) -> Result<Self> {
        for (i, cat) in catalogs.iter().enumerate() {
            if cat.snapshot != i {
                return Err(LinkError::Catalog {
                    snapshot: cat.snapshot,
                    reason: format!("found at position {i}"),
                });
            }
        }
        Ok(Self { catalogs })
    }

    /// Convenience constructor from nested member lists, snapshot by snapshot.
    pub fn from_members(snapshots: Vec<Vec<Vec<u64>>>) -> Self {
        let catalogs = snapshots
            .into_iter()
            .enumerate()
            .map(|(s, halos)| HaloCatalog::new(s, halos))
            .collect();
        Self { catalogs }
    }

    #[inline]
    pub fn num_snapshots(&self) -> usize {
        self.catalogs.len()
    }

    #[inline]
    pub fn catalog(&self, snapshot: usize) -> &HaloCatalog {
        &self.catalogs[snapshot]
    }

    pub fn catalogs(&self) -> &[HaloCatalog] {
        &self.catalogs
    }

    pub(crate) fn catalogs_mut(&mut self) -> &mut [HaloCatalog] {
        &mut self.catalogs
    }

    pub fn total_halos(&self) -> usize {
        self.catalogs.iter().map(|c| c.num_halos()).sum()
    }

    pub fn total_particles(&self) -> usize {
        self.catalogs.iter().map(|c| c.total_particles()).sum()
    }

    pub fn max_halos(&self) -> usize {
        self.catalogs.iter().map(|c| c.num_halos()).max().unwrap_or(0)
    }

    pub fn check_particle_ids(&self, max_particle_id: u64) -> Result<()> {
        self.catalogs
            .iter()
            .try_for_each(|c| c.check_particle_ids(max_particle_id))
    }

    /// Replace read-order ids by `snapshot * offset + index + 1`.
    pub fn renumber_halo_ids(&mut self, offset: u64) {
        for cat in &mut self.catalogs {
            let base = cat.snapshot as u64 * offset;
            for (h, id) in cat.ids.iter_mut().enumerate() {
                *id = base + h as u64 + 1;
            }
        }
    }
}
