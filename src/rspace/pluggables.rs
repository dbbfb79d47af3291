/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Traits at the seams of the tuple space.
//!
//! [`Tuplespace`] is the capability the runtime's setup logic and the reducer are written against, so
//! the same code drives the live [`RSpace`](super::rspace::RSpace), its
//! [`ReplayRSpace`](super::replay_rspace::ReplayRSpace) twin, and the
//! [`ChargingSpace`](crate::accounting::charging_space::ChargingSpace) wrappers around either.
//!
//! [`HistoryStore`] is the byte-level store a space commits its rows into at a checkpoint. See
//! [`history`](super::history) for the backends this crate provides.

use super::{
    errors::{RSpaceError, StoreError},
    internal::{Checkpoint, Datum, MaybeActionResult, SoftCheckpoint, WaitingContinuation},
    trace::Log,
};
use crate::types::term::{BindPattern, ListParWithRandom, TaggedContinuation, Term};

pub trait Tuplespace: Send {
    /// Send `data` on `channel`. If a waiting continuation matches, it is released together with the
    /// data it matched; otherwise `data` is stored on `channel`.
    ///
    /// A persistent datum that fires is not stored. Callers that want it to keep firing produce it again.
    fn produce(
        &mut self,
        channel: Term,
        data: ListParWithRandom,
        persist: bool,
    ) -> Result<MaybeActionResult, RSpaceError>;

    /// Wait on `channels` for data matching `patterns` (one pattern per channel). If data is already
    /// present on every channel, the continuation is released immediately; otherwise it is stored.
    fn consume(
        &mut self,
        channels: Vec<Term>,
        patterns: Vec<BindPattern>,
        continuation: TaggedContinuation,
        persist: bool,
    ) -> Result<MaybeActionResult, RSpaceError>;

    /// Install a permanent continuation on `channels`. Installed continuations are kept outside of the
    /// committed state, are never removed by a match, and take priority over ordinary continuations.
    ///
    /// Returns `Some` without installing anything if data already present would fire the continuation.
    fn install(
        &mut self,
        channels: Vec<Term>,
        patterns: Vec<BindPattern>,
        continuation: TaggedContinuation,
    ) -> Result<MaybeActionResult, RSpaceError>;

    fn get_data(&self, channel: &Term) -> Result<Vec<Datum>, StoreError>;

    /// Get the continuations waiting on exactly `channels`, installed continuations first.
    fn get_waiting_continuations(
        &self,
        channels: &[Term],
    ) -> Result<Vec<WaitingContinuation>, StoreError>;

    /// Get every channel list that a continuation is waiting on and that includes `channel`.
    fn get_joins(&self, channel: &Term) -> Result<Vec<Vec<Term>>, StoreError>;

    fn create_soft_checkpoint(&mut self) -> SoftCheckpoint;

    fn revert_to_soft_checkpoint(&mut self, checkpoint: SoftCheckpoint);

    /// Commit every uncommitted row into the history, and return the resulting root hash together with
    /// the events recorded since the previous checkpoint.
    fn create_checkpoint(&mut self) -> Result<Checkpoint, RSpaceError>;

    /// Commit every uncommitted row and close the history. No operation is valid afterwards.
    fn close(&mut self) -> Result<(), RSpaceError>;
}

/// A tuple space that re-executes a recorded trace, and fails when the execution diverges from it.
pub trait ReplayTuplespace: Tuplespace {
    /// Load the COMM events of `log` as the only COMMs this space may perform.
    fn rig(&mut self, log: &Log);

    /// Check that every rigged COMM has been performed.
    fn check_replay_data(&self) -> Result<(), RSpaceError>;
}

/// A key-value store holding a space's committed rows.
pub trait HistoryStore: Send {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Apply every change in `batch` atomically and durably. If the batch fails, no change in it is
    /// visible.
    fn write(&mut self, batch: HistoryBatch) -> Result<(), StoreError>;

    /// Get every row currently stored, in ascending key order.
    fn entries(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;

    fn close(&mut self) -> Result<(), StoreError>;
}

/// Puts and deletes to be written into a [`HistoryStore`] together. Later changes to a key win.
#[derive(Default)]
pub struct HistoryBatch(pub(crate) Vec<(Vec<u8>, Option<Vec<u8>>)>);

impl HistoryBatch {
    pub fn new() -> HistoryBatch {
        HistoryBatch::default()
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.0.push((key.to_vec(), Some(value.to_vec())));
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.0.push((key.to_vec(), None));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
