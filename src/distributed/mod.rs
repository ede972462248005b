//! Snapshot partitioning across workers and reconciliation of their
//! boundary claims. A partitioned run produces exactly the links of a
//! single worker run.

pub mod partition;
pub mod reconcile;
pub mod transport;

pub use partition::{Partition, partition_snapshots};
pub use reconcile::{WorkerOutput, directions, merge_links, run_threaded, run_worker};
pub use transport::{BoundaryMessage, ChannelTransport, LocalTransport, Transport, channel_mesh};
