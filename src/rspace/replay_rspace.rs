/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The replay twin of [`RSpace`](super::rspace::RSpace).
//!
//! A replay space matches exactly like a live space, so the same execution costs the same phlogiston in
//! both. Every COMM it is about to perform is looked up in the rigged trace and consumed from it; a COMM
//! that is not there fails the operation with [`ReplayError::UnexpectedComm`] before any state changes.

use std::collections::HashMap;

use super::{
    errors::{RSpaceError, ReplayError, StoreError},
    internal::{Checkpoint, Datum, MaybeActionResult, SoftCheckpoint, WaitingContinuation},
    matcher::{FreeVarMatcher, Match},
    pluggables::{HistoryStore, ReplayTuplespace, Tuplespace},
    space_core::SpaceCore,
    trace::{Comm, Event, Log},
};
use crate::types::term::{BindPattern, ListParWithRandom, TaggedContinuation, Term};

pub struct ReplayRSpace<M: Match = FreeVarMatcher> {
    core: SpaceCore<M>,
    replay_data: HashMap<Comm, usize>,
}

impl<M: Match> ReplayRSpace<M> {
    pub fn create(history: Box<dyn HistoryStore>, matcher: M) -> ReplayRSpace<M> {
        ReplayRSpace {
            core: SpaceCore::new(history, matcher),
            replay_data: HashMap::new(),
        }
    }
}

fn take_comm(replay_data: &mut HashMap<Comm, usize>, comm: &Comm) -> Result<(), RSpaceError> {
    match replay_data.get_mut(comm) {
        Some(count) => {
            *count -= 1;
            if *count == 0 {
                replay_data.remove(comm);
            }
            Ok(())
        }
        None => Err(ReplayError::UnexpectedComm {
            consume: comm.consume.hash,
        }
        .into()),
    }
}

impl<M: Match> Tuplespace for ReplayRSpace<M> {
    fn produce(
        &mut self,
        channel: Term,
        data: ListParWithRandom,
        persist: bool,
    ) -> Result<MaybeActionResult, RSpaceError> {
        let replay_data = &mut self.replay_data;
        self.core
            .produce(channel, data, persist, |comm| take_comm(replay_data, comm))
    }

    fn consume(
        &mut self,
        channels: Vec<Term>,
        patterns: Vec<BindPattern>,
        continuation: TaggedContinuation,
        persist: bool,
    ) -> Result<MaybeActionResult, RSpaceError> {
        let replay_data = &mut self.replay_data;
        self.core
            .consume(channels, patterns, continuation, persist, |comm| {
                take_comm(replay_data, comm)
            })
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

impl<M: Match> ReplayTuplespace for ReplayRSpace<M> {
    fn rig(&mut self, log: &Log) {
        self.replay_data.clear();
        for event in log {
            if let Event::Comm(comm) = event {
                *self.replay_data.entry(comm.clone()).or_insert(0) += 1;
            }
        }
        log::debug!(
            "Rigged replay space with {} COMM events",
            self.replay_data.values().sum::<usize>()
        );
    }

    fn check_replay_data(&self) -> Result<(), RSpaceError> {
        let count: usize = self.replay_data.values().sum();
        if count > 0 {
            return Err(ReplayError::UnusedComms { count }.into());
        }
        Ok(())
    }
}
