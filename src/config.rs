//! Run configuration.
//!
//! `LinkConfig` carries every knob the engine reads. Values come from code
//! (`Default` plus the `with_*` setters) and may be overlaid from `TREELINK_*`
//! environment variables the same way the runtime reads its thread hints.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Which temporal direction(s) to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchDirection {
    Progenitors,
    Descendants,
    Both,
}

impl SearchDirection {
    pub fn progenitors(self) -> bool {
        self != SearchDirection::Descendants
    }
    pub fn descendants(self) -> bool {
        self != SearchDirection::Progenitors
    }
    pub fn name(self) -> &'static str {
        match self {
            SearchDirection::Progenitors => "progenitors",
            SearchDirection::Descendants => "descendants",
            SearchDirection::Both => "both",
        }
    }
}

impl FromStr for SearchDirection {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, ()> {
        match s.trim().to_ascii_lowercase().as_str() {
            "progenitors" | "progen" | "0" => Ok(SearchDirection::Progenitors),
            "descendants" | "descen" | "1" => Ok(SearchDirection::Descendants),
            "both" | "all" | "2" => Ok(SearchDirection::Both),
            _ => Err(()),
        }
    }
}

/// What the run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogMode {
    /// One progenitor / one descendant per object.
    MergerTree,
    /// Both directions kept, merged into one graph.
    Graph,
    /// Raw, uncleaned progenitor candidate lists.
    CrossComparison,
}

impl CatalogMode {
    pub fn name(self) -> &'static str {
        match self {
            CatalogMode::MergerTree => "tree",
            CatalogMode::Graph => "graph",
            CatalogMode::CrossComparison => "crosscomp",
        }
    }
}

impl FromStr for CatalogMode {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, ()> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tree" | "mergertree" | "0" => Ok(CatalogMode::MergerTree),
            "graph" | "1" => Ok(CatalogMode::Graph),
            "crosscomp" | "cross" | "2" => Ok(CatalogMode::CrossComparison),
            _ => Err(()),
        }
    }
}

/// Merit function selector. The numeric codes are the ones accepted on the
/// command line / environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeritType {
    /// shared² / (N_a · N_b)
    SharedSquaredOverSizes = 1,
    /// shared / N_a
    SharedOverSource = 2,
    /// shared
    Shared = 3,
    /// rank weighted fraction of the source times shared / N_b
    RankWeighted = 4,
}

impl TryFrom<u8> for MeritType {
    type Error = ConfigError;
    fn try_from(code: u8) -> Result<Self, ConfigError> {
        match code {
            1 => Ok(MeritType::SharedSquaredOverSizes),
            2 => Ok(MeritType::SharedOverSource),
            3 => Ok(MeritType::Shared),
            4 => Ok(MeritType::RankWeighted),
            other => Err(ConfigError::MeritType(other)),
        }
    }
}

/// How particle ids address the membership index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdMapping {
    /// Ids are used as indices directly and must be below `max_particle_id`.
    Direct,
    /// Ids are compacted to `0..unique_ids` before linking.
    Compact,
}

impl FromStr for IdMapping {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, ()> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" | "none" | "0" => Ok(IdMapping::Direct),
            "compact" | "1" => Ok(IdMapping::Compact),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub num_snapshots: usize,
    /// Maximum multi-step depth.
    pub num_steps: usize,
    /// Core fraction; core weighting is active only for values strictly in (0, 1).
    pub particle_frac: f64,
    /// Lower bound on the core size of a halo.
    pub min_numpart: usize,
    pub search_direction: SearchDirection,
    pub catalog_mode: CatalogMode,
    pub merit_type: MeritType,
    /// Candidates below this merit are not links (tree and graph modes).
    pub merit_threshold: f64,
    /// Exclusive upper bound of addressable particle ids.
    pub max_particle_id: u64,
    pub id_mapping: IdMapping,
    /// Graph mode: keep only the best descendant of each object.
    pub graph_single_descendant: bool,
    /// Final halo id = snapshot * halo_id_offset + index + 1.
    pub halo_id_offset: u64,
    /// Worker count for the in-process partitioned runner.
    pub num_workers: usize,
    pub show_progress: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            num_snapshots: 1,
            num_steps: 1,
            particle_frac: 1.0,
            min_numpart: 20,
            search_direction: SearchDirection::Progenitors,
            catalog_mode: CatalogMode::MergerTree,
            merit_type: MeritType::SharedSquaredOverSizes,
            merit_threshold: 0.0,
            max_particle_id: 1,
            id_mapping: IdMapping::Direct,
            graph_single_descendant: true,
            halo_id_offset: 1_000_000_000_000,
            num_workers: 1,
            show_progress: false,
        }
    }
}

impl LinkConfig {
    pub fn new(num_snapshots: usize, max_particle_id: u64) -> Self {
        Self {
            num_snapshots,
            max_particle_id,
            ..Self::default()
        }
    }

    pub fn with_num_steps(mut self, num_steps: usize) -> Self {
        self.num_steps = num_steps;
        self
    }

    pub fn with_direction(mut self, direction: SearchDirection) -> Self {
        self.search_direction = direction;
        self
    }

    pub fn with_mode(mut self, mode: CatalogMode) -> Self {
        self.catalog_mode = mode;
        self
    }

    pub fn with_merit(mut self, merit_type: MeritType) -> Self {
        self.merit_type = merit_type;
        self
    }

    pub fn with_threshold(mut self, merit_threshold: f64) -> Self {
        self.merit_threshold = merit_threshold;
        self
    }

    pub fn with_core(mut self, particle_frac: f64, min_numpart: usize) -> Self {
        self.particle_frac = particle_frac;
        self.min_numpart = min_numpart;
        self
    }

    pub fn with_id_mapping(mut self, id_mapping: IdMapping) -> Self {
        self.id_mapping = id_mapping;
        self
    }

    pub fn with_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    pub fn core_weighting(&self) -> bool {
        self.particle_frac > 0.0 && self.particle_frac < 1.0
    }

    /// Number of leading particles of an `n`-particle halo marked as core.
    pub fn core_count(&self, n: usize) -> usize {
        crate::linking::membership::core_len(n, self.particle_frac, self.min_numpart)
    }

    /// Deepest step that can reach another snapshot.
    fn max_steps(&self) -> usize {
        self.num_snapshots.saturating_sub(1).max(1)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_snapshots == 0 {
            return Err(ConfigError::NoSnapshots);
        }
        let max = self.max_steps();
        if self.num_steps == 0 || self.num_steps > max {
            return Err(ConfigError::NumSteps {
                num_steps: self.num_steps,
                max,
            });
        }
        if !self.particle_frac.is_finite() || !(0.0..=1.0).contains(&self.particle_frac) {
            return Err(ConfigError::ParticleFrac(self.particle_frac));
        }
        if !self.merit_threshold.is_finite() || self.merit_threshold < 0.0 {
            return Err(ConfigError::MeritThreshold(self.merit_threshold));
        }
        if self.max_particle_id == 0 && self.id_mapping == IdMapping::Direct {
            return Err(ConfigError::MaxParticleId);
        }
        if self.halo_id_offset == 0 {
            return Err(ConfigError::HaloIdOffset(0));
        }
        let ill_defined = match self.catalog_mode {
            CatalogMode::MergerTree => false,
            CatalogMode::Graph => self.search_direction != SearchDirection::Both,
            CatalogMode::CrossComparison => {
                self.search_direction == SearchDirection::Descendants
            }
        };
        if ill_defined {
            return Err(ConfigError::ModeDirection {
                mode: self.catalog_mode.name(),
                direction: self.search_direction.name(),
            });
        }
        if self.num_workers == 0 || self.num_workers > self.num_snapshots {
            return Err(ConfigError::Workers {
                workers: self.num_workers,
                snapshots: self.num_snapshots,
            });
        }
        Ok(())
    }

    /// Overlay `TREELINK_*` variables from the process environment.
    pub fn from_env(self) -> Result<Self, ConfigError> {
        self.overlay(|key| std::env::var(key).ok())
    }

    /// Overlay values produced by `lookup`; unset keys keep their current value.
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("TREELINK_NUM_SNAPSHOTS") {
            self.num_snapshots = parse_value("TREELINK_NUM_SNAPSHOTS", &v)?;
        }
        if let Some(v) = get("TREELINK_NUM_STEPS") {
            self.num_steps = parse_value("TREELINK_NUM_STEPS", &v)?;
        }
        if let Some(v) = get("TREELINK_PARTICLE_FRAC") {
            self.particle_frac = parse_value("TREELINK_PARTICLE_FRAC", &v)?;
        }
        if let Some(v) = get("TREELINK_MIN_NUMPART") {
            self.min_numpart = parse_value("TREELINK_MIN_NUMPART", &v)?;
        }
        if let Some(v) = get("TREELINK_SEARCH") {
            self.search_direction = parse_value("TREELINK_SEARCH", &v)?;
        }
        if let Some(v) = get("TREELINK_MODE") {
            self.catalog_mode = parse_value("TREELINK_MODE", &v)?;
        }
        if let Some(v) = get("TREELINK_MERIT") {
            let code: u8 = parse_value("TREELINK_MERIT", &v)?;
            self.merit_type = MeritType::try_from(code)?;
        }
        if let Some(v) = get("TREELINK_MERIT_THRESHOLD") {
            self.merit_threshold = parse_value("TREELINK_MERIT_THRESHOLD", &v)?;
        }
        if let Some(v) = get("TREELINK_MAX_PARTICLE_ID") {
            self.max_particle_id = parse_value("TREELINK_MAX_PARTICLE_ID", &v)?;
        }
        if let Some(v) = get("TREELINK_ID_MAPPING") {
            self.id_mapping = parse_value("TREELINK_ID_MAPPING", &v)?;
        }
        if let Some(v) = get("TREELINK_SINGLE_DESCENDANT") {
            self.graph_single_descendant = parse_flag("TREELINK_SINGLE_DESCENDANT", &v)?;
        }
        if let Some(v) = get("TREELINK_HALO_ID_OFFSET") {
            self.halo_id_offset = parse_value("TREELINK_HALO_ID_OFFSET", &v)?;
        }
        if let Some(v) = get("TREELINK_WORKERS") {
            self.num_workers = parse_value("TREELINK_WORKERS", &v)?;
        }
        if let Some(v) = get("TREELINK_PROGRESS") {
            self.show_progress = parse_flag("TREELINK_PROGRESS", &v)?;
        }
        Ok(self)
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse::<T>().map_err(|_| ConfigError::Env {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Env {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}

impl fmt::Display for LinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "snapshots={} steps={} mode={} search={} merit={:?} threshold={} core={}",
            self.num_snapshots,
            self.num_steps,
            self.catalog_mode.name(),
            self.search_direction.name(),
            self.merit_type,
            self.merit_threshold,
            if self.core_weighting() {
                format!("{}/min {}", self.particle_frac, self.min_numpart)
            } else {
                "off".to_string()
            }
        )
    }
}
