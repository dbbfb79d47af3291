/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The live tuple space.

use super::{
    errors::{RSpaceError, StoreError},
    internal::{Checkpoint, Datum, MaybeActionResult, SoftCheckpoint, WaitingContinuation},
    matcher::{FreeVarMatcher, Match},
    pluggables::{HistoryStore, Tuplespace},
    space_core::SpaceCore,
};
use crate::types::term::{BindPattern, ListParWithRandom, TaggedContinuation, Term};

/// A tuple space that records every produce, consume, and COMM it performs. The recorded
/// [log](super::trace::Log) is returned by [`Tuplespace::create_checkpoint`] and can be used to
/// [rig](super::pluggables::ReplayTuplespace::rig) a replay space.
pub struct RSpace<M: Match = FreeVarMatcher> {
    core: SpaceCore<M>,
}

impl<M: Match> RSpace<M> {
    pub fn create(history: Box<dyn HistoryStore>, matcher: M) -> RSpace<M> {
        RSpace {
            core: SpaceCore::new(history, matcher),
        }
    }
}

impl<M: Match> Tuplespace for RSpace<M> {
    fn produce(
        &mut self,
        channel: Term,
        data: ListParWithRandom,
        persist: bool,
    ) -> Result<MaybeActionResult, RSpaceError> {
        self.core.produce(channel, data, persist, |_| Ok(()))
    }

    fn consume(
        &mut self,
        channels: Vec<Term>,
        patterns: Vec<BindPattern>,
        continuation: TaggedContinuation,
        persist: bool,
    ) -> Result<MaybeActionResult, RSpaceError> {
        self.core
            .consume(channels, patterns, continuation, persist, |_| Ok(()))
    }

    fn install(
        &mut self,
        channels: Vec<Term>,
        patterns: Vec<BindPattern>,
        continuation: TaggedContinuation,
    ) -> Result<MaybeActionResult, RSpaceError> {
        self.core.install(channels, patterns, continuation)
    }

    fn get_data(&self, channel: &Term) -> Result<Vec<Datum>, StoreError> {
        self.core.data(channel)
    }

    fn get_waiting_continuations(
        &self,
        channels: &[Term],
    ) -> Result<Vec<WaitingContinuation>, StoreError> {
        self.core.continuations(channels)
    }

    fn get_joins(&self, channel: &Term) -> Result<Vec<Vec<Term>>, StoreError> {
        self.core.joins(channel)
    }

    fn create_soft_checkpoint(&mut self) -> SoftCheckpoint {
        self.core.create_soft_checkpoint()
    }

    fn revert_to_soft_checkpoint(&mut self, checkpoint: SoftCheckpoint) {
        self.core.revert_to_soft_checkpoint(checkpoint)
    }

    fn create_checkpoint(&mut self) -> Result<Checkpoint, RSpaceError> {
        Ok(self.core.create_checkpoint()?)
    }

    fn close(&mut self) -> Result<(), RSpaceError> {
        Ok(self.core.close()?)
    }
}
