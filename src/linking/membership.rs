//! Particle membership index.
//!
//! A dense marker array over the whole particle id range: `0` means no owner,
//! `h + 1` incidental membership of halo `h` and `h + 1 + halo_count` core
//! membership. The array is allocated once per direction and populated for
//! one target snapshot at a time through an [`IndexPass`], which resets every
//! entry it wrote when dropped.

use crate::catalog::HaloCatalog;
use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use crate::runtime;

/// Leading particles of an `n`-particle halo that count as core.
#[inline]
pub fn core_len(n: usize, particle_frac: f64, min_numpart: usize) -> usize {
    let scaled = (n as f64 * particle_frac).floor() as usize;
    scaled.max(min_numpart).min(n)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MembershipMode {
    Full,
    Core { particle_frac: f64, min_numpart: usize },
}

impl MembershipMode {
    pub fn from_config(config: &LinkConfig) -> Self {
        if config.core_weighting() {
            MembershipMode::Core {
                particle_frac: config.particle_frac,
                min_numpart: config.min_numpart,
            }
        } else {
            MembershipMode::Full
        }
    }
}

/// Owner of a particle in the indexed snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    pub halo: usize,
    pub core: bool,
}

pub struct MembershipIndex {
    markers: Vec<u32>,
}

impl MembershipIndex {
    /// Allocate an index over `0..max_particle_id`, bounded by the process
    /// memory budget or, without one, by physical memory.
    pub fn new(max_particle_id: u64) -> Result<Self> {
        let budget = runtime::memory_budget_bytes().or_else(runtime::physical_memory_bytes);
        Self::with_budget(max_particle_id, budget)
    }

    /// Allocate an index over `0..max_particle_id`. Fails instead of aborting
    /// when the array exceeds `budget` or cannot be allocated.
    pub fn with_budget(max_particle_id: u64, budget: Option<u64>) -> Result<Self> {
        let bytes = max_particle_id.saturating_mul(size_of::<u32>() as u64);
        let too_large = |reason: String| LinkError::IndexTooLarge {
            max_particle_id,
            bytes,
            reason,
        };
        if let Some(limit) = budget.filter(|&limit| bytes > limit) {
            return Err(too_large(format!("memory budget is {limit} bytes")));
        }
        let len = usize::try_from(max_particle_id)
            .map_err(|_| too_large("id range exceeds the address space".to_string()))?;
        let mut markers = Vec::new();
        markers
            .try_reserve_exact(len)
            .map_err(|err| too_large(err.to_string()))?;
        markers.resize(len, 0);
        tracing::debug!(max_particle_id, bytes, "membership index allocated");
        Ok(Self { markers })
    }

    pub fn capacity(&self) -> u64 {
        self.markers.len() as u64
    }

    /// True when no entry is marked.
    pub fn is_clear(&self) -> bool {
        self.markers.iter().all(|&m| m == 0)
    }

    /// Mark the members of `catalog`. Ids are range checked before anything
    /// is written, so a failed populate leaves the index clear.
    pub fn populate<'a>(
        &'a mut self,
        catalog: &'a HaloCatalog,
        mode: MembershipMode,
    ) -> Result<IndexPass<'a>> {
        let n = catalog.num_halos();
        if n > (u32::MAX as usize - 1) / 2 {
            return Err(LinkError::TooManyHalos {
                snapshot: catalog.snapshot(),
                halos: n,
            });
        }
        catalog.check_particle_ids(self.capacity())?;

        for h in 0..n {
            let marker = h as u32 + 1;
            for &pid in catalog.members(h) {
                self.markers[pid as usize] = marker;
            }
        }
        if let MembershipMode::Core {
            particle_frac,
            min_numpart,
        } = mode
        {
            for h in 0..n {
                let members = catalog.members(h);
                let core = core_len(members.len(), particle_frac, min_numpart);
                let marker = (h + 1 + n) as u32;
                for &pid in &members[..core] {
                    self.markers[pid as usize] = marker;
                }
            }
        }

        Ok(IndexPass {
            markers: &mut self.markers,
            catalog,
            halo_count: n as u32,
        })
    }
}

/// An active comparison pass over one populated snapshot.
pub struct IndexPass<'a> {
    markers: &'a mut [u32],
    catalog: &'a HaloCatalog,
    halo_count: u32,
}

impl IndexPass<'_> {
    #[inline]
    pub fn lookup(&self, particle_id: u64) -> Option<Owner> {
        let m = *self.markers.get(particle_id as usize)?;
        if m == 0 {
            None
        } else if m <= self.halo_count {
            Some(Owner {
                halo: (m - 1) as usize,
                core: false,
            })
        } else {
            Some(Owner {
                halo: (m - 1 - self.halo_count) as usize,
                core: true,
            })
        }
    }

    pub fn catalog(&self) -> &HaloCatalog {
        self.catalog
    }
}

impl Drop for IndexPass<'_> {
    fn drop(&mut self) {
        for &pid in self.catalog.particle_ids() {
            self.markers[pid as usize] = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core_marked(pass: &IndexPass<'_>, halo: usize) -> usize {
        pass.catalog()
            .members(halo)
            .iter()
            .filter(|&&pid| pass.lookup(pid).is_some_and(|o| o.core && o.halo == halo))
            .count()
    }

    #[test]
    fn full_membership_maps_particles_to_halos() {
        let cat = HaloCatalog::new(0, vec![vec![3, 4], vec![7]]);
        let mut index = MembershipIndex::new(10).unwrap();
        {
            let pass = index.populate(&cat, MembershipMode::Full).unwrap();
            assert_eq!(pass.lookup(4), Some(Owner { halo: 0, core: false }));
            assert_eq!(pass.lookup(7), Some(Owner { halo: 1, core: false }));
            assert_eq!(pass.lookup(5), None);
            assert_eq!(pass.lookup(99), None);
        }
        assert!(index.is_clear());
    }

    #[test]
    fn core_mode_marks_leading_particles() {
        let cat = HaloCatalog::new(0, vec![(0..10).collect(), (10..13).collect()]);
        let mut index = MembershipIndex::new(20).unwrap();
        let mode = MembershipMode::Core {
            particle_frac: 0.3,
            min_numpart: 2,
        };
        let pass = index.populate(&cat, mode).unwrap();
        assert_eq!(core_marked(&pass, 0), 3);
        assert_eq!(core_marked(&pass, 1), 2);
        assert_eq!(pass.lookup(0), Some(Owner { halo: 0, core: true }));
        assert_eq!(pass.lookup(9), Some(Owner { halo: 0, core: false }));
        assert_eq!(pass.lookup(11), Some(Owner { halo: 1, core: true }));
    }

    #[test]
    fn out_of_range_id_leaves_index_clear() {
        let cat = HaloCatalog::new(3, vec![vec![1, 2], vec![50]]);
        let mut index = MembershipIndex::new(10).unwrap();
        let err = index.populate(&cat, MembershipMode::Full).err();
        assert!(matches!(
            err,
            Some(LinkError::ParticleIdOutOfRange { particle_id: 50, .. })
        ));
        assert!(index.is_clear());
    }

    #[test]
    fn oversized_index_is_an_error() {
        let err = MembershipIndex::with_budget(1 << 60, None).err();
        assert!(matches!(
            err,
            Some(LinkError::IndexTooLarge { max_particle_id, .. }) if max_particle_id == 1 << 60
        ));
        let err = MembershipIndex::with_budget(1 << 20, Some(1 << 20)).err();
        assert!(matches!(err, Some(LinkError::IndexTooLarge { bytes, .. }) if bytes == 4 << 20));
        assert!(MembershipIndex::with_budget(1 << 10, Some(1 << 20)).is_ok());
    }
}
