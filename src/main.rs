use anyhow::{Context, Result, bail};
use std::env;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use treelink::catalog::mapping::choose_id_mapping;
use treelink::{LinkConfig, io, link, runtime};

fn usage() -> ! {
    eprintln!(
        "usage: treelink <catalogs.npz> [links_out.npz]\n\
         \n\
         settings are read from TREELINK_* variables, e.g.\n\
         TREELINK_NUM_STEPS=3 TREELINK_SEARCH=both TREELINK_MODE=graph"
    );
    std::process::exit(1);
}

fn default_output_path(input: &Path) -> PathBuf {
    let parent = input
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("catalogs");
    parent.join(format!("{stem}_links.npz"))
}

fn parse_args() -> Result<(PathBuf, PathBuf)> {
    let mut args = env::args().skip(1);
    let first = args.next().unwrap_or_else(|| usage());
    if first == "-h" || first == "--help" {
        usage();
    }
    let input = PathBuf::from(first);
    if !input.exists() {
        bail!("input {:?} does not exist", input);
    }
    let output = match args.next() {
        Some(explicit) => PathBuf::from(explicit),
        None => match env::var("TREELINK_OUTPUT") {
            Ok(from_env) => PathBuf::from(from_env),
            Err(_) => default_output_path(&input),
        },
    };
    Ok((input, output))
}

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
    runtime::configure_thread_pool();

    let (input, output) = parse_args()?;
    tracing::info!("reading catalogs from {}", input.display());
    let mut store = io::load_catalogs(&input.to_string_lossy())?;

    let (max_pid, id_mapping) = choose_id_mapping(&store);
    let config = LinkConfig::new(store.num_snapshots(), max_pid)
        .with_id_mapping(id_mapping)
        .from_env()
        .context("reading TREELINK_* settings")?;

    let links = link(&mut store, &config).context("linking failed")?;

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
    }
    io::save_links(&output.to_string_lossy(), &links)?;
    tracing::info!("{} links written to {}", links.kind(), output.display());
    Ok(())
}
