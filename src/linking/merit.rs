use crate::config::MeritType;

/// Particles a source halo shares with one target halo.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Overlap {
    pub shared: u32,
    /// Shared particles that sit in the target's core.
    pub core: u32,
    /// Sum of 1 / (rank + 1) over shared particles, rank taken in the source.
    pub rank_weight: f64,
}

/// H(n) = 1 + 1/2 + ... + 1/n, the rank weight of a full overlap.
pub fn harmonic(n: usize) -> f64 {
    (1..=n).map(|k| 1.0 / k as f64).sum()
}

/// Merit of an overlap between a source of `n_source` and a target of
/// `n_target` particles. Higher is better.
pub fn score(
    kind: MeritType,
    overlap: &Overlap,
    n_source: usize,
    n_target: usize,
    source_harmonic: f64,
) -> f64 {
    // core hits count twice
    let shared = (overlap.shared + overlap.core) as f64;
    let n_source = n_source.max(1) as f64;
    let n_target = n_target.max(1) as f64;
    match kind {
        MeritType::SharedSquaredOverSizes => shared * shared / (n_source * n_target),
        MeritType::SharedOverSource => shared / n_source,
        MeritType::Shared => shared,
        MeritType::RankWeighted => {
            let rank = if source_harmonic > 0.0 {
                overlap.rank_weight / source_harmonic
            } else {
                0.0
            };
            rank * shared / n_target
        }
    }
}
