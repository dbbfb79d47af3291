/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A [`Tuplespace`] wrapper that charges for what its operations store.
//!
//! Before a produce, consume, or install reaches the wrapped space, the storage cost of its arguments
//! is charged. When the operation causes a COMM, [`COMM_EVENT_COST`] is charged, and the storage cost of
//! every non-persistent datum and continuation the COMM removed is refunded.

use super::{
    costs::{storage_cost, COMM_EVENT_COST},
    Cost, CostAccounting,
};
use crate::{
    rspace::{
        errors::{RSpaceError, StoreError},
        internal::{Checkpoint, Datum, MaybeActionResult, SoftCheckpoint, WaitingContinuation},
        pluggables::{ReplayTuplespace, Tuplespace},
        trace::Log,
    },
    types::term::{BindPattern, ListParWithRandom, TaggedContinuation, Term},
};

pub struct ChargingSpace<T: Tuplespace> {
    space: T,
    cost: CostAccounting,
}

impl<T: Tuplespace> ChargingSpace<T> {
    pub fn new(space: T, cost: CostAccounting) -> ChargingSpace<T> {
        ChargingSpace { space, cost }
    }

    pub fn cost(&self) -> &CostAccounting {
        &self.cost
    }

    fn handle_result(&self, result: &MaybeActionResult) -> Result<(), RSpaceError> {
        if let Some((cont, data_list)) = result {
            self.cost.charge(COMM_EVENT_COST)?;

            let mut refund = Cost::new(0);
            for data in data_list {
                if !data.persistent {
                    refund = refund + storage_cost(&data.channel) + storage_cost(&data.removed_datum);
                }
            }
            if !cont.persistent {
                refund = refund + consume_storage_cost(&cont.channels, &cont.patterns, &cont.continuation);
            }
            self.cost.refund(refund);
        }
        Ok(())
    }
}

fn consume_storage_cost(
    channels: &[Term],
    patterns: &[BindPattern],
    continuation: &TaggedContinuation,
) -> Cost {
    storage_cost(&channels.to_vec()) + storage_cost(&patterns.to_vec()) + storage_cost(continuation)
}

impl<T: Tuplespace> Tuplespace for ChargingSpace<T> {
    fn produce(
        &mut self,
        channel: Term,
        data: ListParWithRandom,
        persist: bool,
    ) -> Result<MaybeActionResult, RSpaceError> {
        self.cost
            .charge(storage_cost(&channel) + storage_cost(&data))?;
        let result = self.space.produce(channel, data, persist)?;
        self.handle_result(&result)?;
        Ok(result)
    }

    fn consume(
        &mut self,
        channels: Vec<Term>,
        patterns: Vec<BindPattern>,
        continuation: TaggedContinuation,
        persist: bool,
    ) -> Result<MaybeActionResult, RSpaceError> {
        self.cost
            .charge(consume_storage_cost(&channels, &patterns, &continuation))?;
        let result = self
            .space
            .consume(channels, patterns, continuation, persist)?;
        self.handle_result(&result)?;
        Ok(result)
    }

    fn install(
        &mut self,
        channels: Vec<Term>,
        patterns: Vec<BindPattern>,
        continuation: TaggedContinuation,
    ) -> Result<MaybeActionResult, RSpaceError> {
        self.cost
            .charge(consume_storage_cost(&channels, &patterns, &continuation))?;
        self.space.install(channels, patterns, continuation)
    }

    fn get_data(&self, channel: &Term) -> Result<Vec<Datum>, StoreError> {
        self.space.get_data(channel)
    }

    fn get_waiting_continuations(
        &self,
        channels: &[Term],
    ) -> Result<Vec<WaitingContinuation>, StoreError> {
        self.space.get_waiting_continuations(channels)
    }

    fn get_joins(&self, channel: &Term) -> Result<Vec<Vec<Term>>, StoreError> {
        self.space.get_joins(channel)
    }

    fn create_soft_checkpoint(&mut self) -> SoftCheckpoint {
        self.space.create_soft_checkpoint()
    }

    fn revert_to_soft_checkpoint(&mut self, checkpoint: SoftCheckpoint) {
        self.space.revert_to_soft_checkpoint(checkpoint)
    }

    fn create_checkpoint(&mut self) -> Result<Checkpoint, RSpaceError> {
        self.space.create_checkpoint()
    }

    fn close(&mut self) -> Result<(), RSpaceError> {
        self.space.close()
    }
}

impl<T: ReplayTuplespace> ReplayTuplespace for ChargingSpace<T> {
    fn rig(&mut self, log: &Log) {
        self.space.rig(log)
    }

    fn check_replay_data(&self) -> Result<(), RSpaceError> {
        self.space.check_replay_data()
    }
}
