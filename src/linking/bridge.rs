//! Step-Bridging records.
//!
//! For every target snapshot that can still receive claims, a record lists
//! per target object the source objects currently claiming it. Progenitor
//! and descendant passes use the same record type tagged with their
//! direction. Records live in an arena keyed by snapshot; once released a
//! snapshot can be neither read nor written again.

use std::collections::{BTreeMap, BTreeSet};

use smallvec::SmallVec;

use super::types::{Claim, Direction};
use crate::error::{LinkError, Result};

#[derive(Debug, Clone)]
pub struct BridgeRecord {
    pub direction: Direction,
    pub snapshot: usize,
    claims: Vec<SmallVec<[Claim; 2]>>,
}

impl BridgeRecord {
    pub fn new(direction: Direction, snapshot: usize, num_halos: usize) -> Self {
        Self {
            direction,
            snapshot,
            claims: vec![SmallVec::new(); num_halos],
        }
    }

    pub fn num_objects(&self) -> usize {
        self.claims.len()
    }

    pub fn claims(&self, object: usize) -> &[Claim] {
        &self.claims[object]
    }

    pub fn num_claims(&self) -> usize {
        self.claims.iter().map(|c| c.len()).sum()
    }

    pub(crate) fn add(&mut self, claim: Claim) -> Result<()> {
        let Some(slot) = self.claims.get_mut(claim.target) else {
            return Err(LinkError::Bridge {
                snapshot: self.snapshot,
                reason: format!(
                    "claim on object {} but the snapshot holds {}",
                    claim.target,
                    self.claims.len()
                ),
            });
        };
        slot.push(claim);
        Ok(())
    }

    pub(crate) fn into_claims(self) -> Vec<SmallVec<[Claim; 2]>> {
        self.claims
    }
}

#[derive(Debug)]
pub struct BridgeArena {
    direction: Direction,
    records: BTreeMap<usize, BridgeRecord>,
    released: BTreeSet<usize>,
}

impl BridgeArena {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            records: BTreeMap::new(),
            released: BTreeSet::new(),
        }
    }

    fn released_error(&self, snapshot: usize) -> LinkError {
        LinkError::Bridge {
            snapshot,
            reason: format!("{} record used after release", self.direction.name()),
        }
    }

    /// Record a claim, opening the target's record on first use.
    pub fn add(&mut self, claim: Claim, target_halos: usize) -> Result<()> {
        let snapshot = claim.target_snapshot;
        if self.released.contains(&snapshot) {
            return Err(self.released_error(snapshot));
        }
        let direction = self.direction;
        self.records
            .entry(snapshot)
            .or_insert_with(|| BridgeRecord::new(direction, snapshot, target_halos))
            .add(claim)
    }

    pub fn get(&self, snapshot: usize) -> Result<Option<&BridgeRecord>> {
        if self.released.contains(&snapshot) {
            return Err(self.released_error(snapshot));
        }
        Ok(self.records.get(&snapshot))
    }

    /// Take the record out for resolution. Snapshots without claims yield
    /// `None` but are still marked released.
    pub fn release(&mut self, snapshot: usize) -> Result<Option<BridgeRecord>> {
        if !self.released.insert(snapshot) {
            return Err(self.released_error(snapshot));
        }
        Ok(self.records.remove(&snapshot))
    }

    pub fn is_released(&self, snapshot: usize) -> bool {
        self.released.contains(&snapshot)
    }

    /// Records currently held.
    pub fn live(&self) -> usize {
        self.records.len()
    }

    /// Fails if any record outlived the pass.
    pub fn finish(self) -> Result<()> {
        match self.records.keys().next() {
            Some(&snapshot) => Err(LinkError::Bridge {
                snapshot,
                reason: format!(
                    "{} record(s) never released by the {} pass",
                    self.records.len(),
                    self.direction.name()
                ),
            }),
            None => Ok(()),
        }
    }
}
