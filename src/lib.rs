//! Cross-snapshot linking of halo catalogs into merger trees and graphs.
//!
//! Halos found independently at successive snapshots are matched by the
//! particles they share. For every halo the engine finds its progenitor
//! and/or descendant in neighbouring snapshots, bridges short gaps up to a
//! configurable number of steps, and resolves competing claims so that tree
//! runs keep one link per halo. Runs can be split over several workers and
//! produce the same links as a single worker.
//!
//! ```no_run
//! use treelink::{HaloStore, LinkConfig, SearchDirection, link};
//!
//! let mut store = HaloStore::from_members(vec![
//!     vec![vec![0, 1, 2, 3]],
//!     vec![vec![0, 1, 2, 4]],
//! ]);
//! let config = LinkConfig::new(2, 8).with_direction(SearchDirection::Both);
//! let links = link(&mut store, &config)?;
//! assert_eq!(links.progenitors().map(|s| s.num_links()), Some(1));
//! # Ok::<(), treelink::LinkError>(())
//! ```

pub mod catalog;
pub mod config;
pub mod distributed;
pub mod engine;
pub mod error;
pub mod io;
pub mod linking;
pub mod output;
pub mod runtime;

pub use catalog::{Halo, HaloCatalog, HaloStore};
pub use config::{CatalogMode, IdMapping, LinkConfig, MeritType, SearchDirection};
pub use engine::link;
pub use error::{ConfigError, LinkError, Result};
pub use linking::{Direction, Link, LinkState, ObjectLinks};
pub use output::{EdgeAnnotation, GraphEdge, HaloGraph, LinkOutput, LinkRecord, LinkSet};
