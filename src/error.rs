//! Error taxonomy for the linker.
//!
//! Configuration and data errors are raised before or while building the
//! membership index; reconciliation errors abort a distributed run because
//! continuing would make the result depend on the partition. An object with
//! no candidate anywhere is not an error and never shows up here.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LinkError>;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(
        "particle id {particle_id} in halo {halo} of snapshot {snapshot} is outside 0..{max_particle_id}"
    )]
    ParticleIdOutOfRange {
        snapshot: usize,
        halo: usize,
        particle_id: u64,
        max_particle_id: u64,
    },

    #[error("snapshot {snapshot} holds {halos} halos, more than the membership index can address")]
    TooManyHalos { snapshot: usize, halos: usize },

    #[error(
        "membership index over 0..{max_particle_id} needs {bytes} bytes ({reason}); try compact id mapping"
    )]
    IndexTooLarge {
        max_particle_id: u64,
        bytes: u64,
        reason: String,
    },

    #[error("malformed catalog for snapshot {snapshot}: {reason}")]
    Catalog { snapshot: usize, reason: String },

    #[error("reconciliation failed on worker {rank}: {reason}")]
    Reconcile { rank: usize, reason: String },

    #[error("bridge record for snapshot {snapshot}: {reason}")]
    Bridge { snapshot: usize, reason: String },

    #[error("memory budget exceeded: rss {rss_gib:.2} GiB > limit {limit_gib:.2} GiB")]
    MemoryBudget { rss_gib: f64, limit_gib: f64 },
}

impl LinkError {
    pub(crate) fn reconcile(rank: usize, reason: impl Into<String>) -> Self {
        LinkError::Reconcile {
            rank,
            reason: reason.into(),
        }
    }
}

/// Rejected run parameters. Each variant names the offending parameter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("num_snapshots must be at least 1")]
    NoSnapshots,

    #[error("num_steps = {num_steps} is out of range (1..={max})")]
    NumSteps { num_steps: usize, max: usize },

    #[error("merit_type selector {0} is unknown (expected 1..=4)")]
    MeritType(u8),

    #[error("particle_frac = {0} must lie in [0, 1]")]
    ParticleFrac(f64),

    #[error("merit_threshold = {0} must be a finite, non-negative number")]
    MeritThreshold(f64),

    #[error("max_particle_id must be positive")]
    MaxParticleId,

    #[error("halo_id_offset = {0} must be positive and exceed the largest halo count")]
    HaloIdOffset(u64),

    #[error("catalog_mode {mode} cannot be combined with search_direction {direction}")]
    ModeDirection {
        mode: &'static str,
        direction: &'static str,
    },

    #[error("num_workers = {workers} is out of range for {snapshots} snapshots")]
    Workers { workers: usize, snapshots: usize },

    #[error("store holds {found} snapshots but num_snapshots = {expected}")]
    SnapshotCount { expected: usize, found: usize },

    #[error("cannot parse {key}={value:?}")]
    Env { key: String, value: String },
}
