//! Process-level knobs: rayon pool sizing and the resident memory budget.

use rayon::ThreadPoolBuilder;
use std::sync::Once;

use crate::error::{LinkError, Result};

/// Variables consulted for the worker thread count, in priority order.
/// Batch schedulers export the CPU count they granted the job.
const THREAD_HINTS: [&str; 3] = ["TREELINK_THREADS", "RAYON_NUM_THREADS", "SLURM_CPUS_PER_TASK"];

fn threads_from<F: Fn(&str) -> Option<String>>(lookup: F) -> Option<(usize, &'static str)> {
    THREAD_HINTS.iter().find_map(|&key| {
        let count = lookup(key)?.trim().parse::<usize>().ok()?;
        (count > 0).then_some((count, key))
    })
}

/// Size the global rayon pool once per process.
pub fn configure_thread_pool() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let (count, hint) = threads_from(|key| std::env::var(key).ok()).unwrap_or_else(|| {
            let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
            (cores, "available_parallelism")
        });
        let built = ThreadPoolBuilder::new()
            .num_threads(count)
            .thread_name(|i| format!("treelink-worker-{i}"))
            .build_global();
        match built {
            Ok(()) => tracing::info!(threads = count, hint, "rayon pool configured"),
            Err(err) => tracing::warn!("rayon pool left at its default: {err}"),
        }
    });
}

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;

fn parse_budget(raw: Option<String>, multiplier: u64) -> Option<u64> {
    let raw = raw?;
    if raw.trim().is_empty() {
        return None;
    }
    raw.trim()
        .parse::<u64>()
        .ok()
        .map(|v| v.saturating_mul(multiplier))
}

/// Resident set limit from `TREELINK_MAX_RSS_{BYTES,MB,GB}`, first one set wins.
pub fn memory_budget_bytes() -> Option<u64> {
    budget_from(|key| std::env::var(key).ok())
}

fn budget_from<F: Fn(&str) -> Option<String>>(lookup: F) -> Option<u64> {
    parse_budget(lookup("TREELINK_MAX_RSS_BYTES"), 1)
        .or_else(|| parse_budget(lookup("TREELINK_MAX_RSS_MB"), MB))
        .or_else(|| parse_budget(lookup("TREELINK_MAX_RSS_GB"), GB))
}

pub fn current_rss_bytes() -> Option<u64> {
    let contents = std::fs::read_to_string("/proc/self/statm").ok()?;
    let mut parts = contents.split_whitespace();
    let _total = parts.next()?;
    let resident_pages: u64 = parts.next()?.parse().ok()?;
    // SAFETY: sysconf has no preconditions.
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page_size <= 0 {
        return None;
    }
    Some(resident_pages.saturating_mul(page_size as u64))
}

pub fn physical_memory_bytes() -> Option<u64> {
    // SAFETY: sysconf has no preconditions.
    let (pages, page_size) = unsafe {
        (
            libc::sysconf(libc::_SC_PHYS_PAGES),
            libc::sysconf(libc::_SC_PAGESIZE),
        )
    };
    if pages <= 0 || page_size <= 0 {
        return None;
    }
    Some((pages as u64).saturating_mul(page_size as u64))
}

fn bytes_to_gib(bytes: u64) -> f64 {
    bytes as f64 / GB as f64
}

/// Log the current RSS after snapshot `snapshot` released its record and
/// fail if it is above `budget`.
pub fn check_memory(snapshot: usize, budget: Option<u64>) -> Result<()> {
    let Some(rss) = current_rss_bytes() else {
        return Ok(());
    };
    check_rss(snapshot, rss, budget)
}

fn check_rss(snapshot: usize, rss: u64, budget: Option<u64>) -> Result<()> {
    match budget {
        Some(limit) => {
            tracing::debug!(
                snapshot,
                "rss={:.2} GiB (limit {:.2} GiB)",
                bytes_to_gib(rss),
                bytes_to_gib(limit)
            );
            if rss > limit {
                return Err(LinkError::MemoryBudget {
                    rss_gib: bytes_to_gib(rss),
                    limit_gib: bytes_to_gib(limit),
                });
            }
        }
        None => tracing::trace!(snapshot, "rss={:.2} GiB", bytes_to_gib(rss)),
    }
    Ok(())
}
