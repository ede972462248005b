//! Point-to-point exchange of boundary claims between workers.
//!
//! The linker only needs ordered, reliable delivery between neighbouring
//! ranks. `LocalTransport` serves single worker runs; `ChannelTransport`
//! connects in-process worker threads. A network transport would implement
//! the same trait.

use std::sync::mpsc::{Receiver, Sender, channel};

use crate::error::{LinkError, Result};
use crate::linking::types::{Claim, Direction};

/// Claims that cross a partition edge, sent from `from` to the next rank in
/// the wavefront.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryMessage {
    pub direction: Direction,
    pub from: usize,
    pub claims: Vec<Claim>,
}

pub trait Transport {
    fn rank(&self) -> usize;
    fn num_workers(&self) -> usize;
    fn send(&self, to: usize, message: BoundaryMessage) -> Result<()>;
    fn recv(&self, from: usize) -> Result<BoundaryMessage>;
}

/// Transport of a run without peers; every exchange is an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalTransport;

impl Transport for LocalTransport {
    fn rank(&self) -> usize {
        0
    }
    fn num_workers(&self) -> usize {
        1
    }
    fn send(&self, to: usize, _message: BoundaryMessage) -> Result<()> {
        Err(LinkError::reconcile(0, format!("no peer {to} in a single worker run")))
    }
    fn recv(&self, from: usize) -> Result<BoundaryMessage> {
        Err(LinkError::reconcile(0, format!("no peer {from} in a single worker run")))
    }
}

pub struct ChannelTransport {
    rank: usize,
    senders: Vec<Sender<BoundaryMessage>>,
    receivers: Vec<Receiver<BoundaryMessage>>,
}

/// Fully connected mesh of `n` endpoints; endpoint `r` gets rank `r`.
pub fn channel_mesh(n: usize) -> Vec<ChannelTransport> {
    // grid[from][to]
    let mut senders: Vec<Vec<Sender<BoundaryMessage>>> = (0..n).map(|_| Vec::with_capacity(n)).collect();
    let mut receivers: Vec<Vec<Option<Receiver<BoundaryMessage>>>> =
        (0..n).map(|_| (0..n).map(|_| None).collect()).collect();
    for from in 0..n {
        for to in 0..n {
            let (tx, rx) = channel();
            senders[from].push(tx);
            receivers[to][from] = Some(rx);
        }
    }
    senders
        .into_iter()
        .zip(receivers)
        .enumerate()
        .map(|(rank, (senders, receivers))| ChannelTransport {
            rank,
            senders,
            receivers: receivers.into_iter().flatten().collect(),
        })
        .collect()
}

impl Transport for ChannelTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn num_workers(&self) -> usize {
        self.senders.len()
    }

    fn send(&self, to: usize, message: BoundaryMessage) -> Result<()> {
        let tx = self
            .senders
            .get(to)
            .ok_or_else(|| LinkError::reconcile(self.rank, format!("unknown peer {to}")))?;
        tx.send(message)
            .map_err(|_| LinkError::reconcile(self.rank, format!("peer {to} hung up")))
    }

    fn recv(&self, from: usize) -> Result<BoundaryMessage> {
        let rx = self
            .receivers
            .get(from)
            .ok_or_else(|| LinkError::reconcile(self.rank, format!("unknown peer {from}")))?;
        rx.recv().map_err(|_| {
            LinkError::reconcile(self.rank, format!("peer {from} exited before sending"))
        })
    }
}
