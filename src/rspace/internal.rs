/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Rows stored in the tuple space, and the values its operations return.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};

use super::trace::{Consume, Log, Produce};
use crate::types::term::{BindPattern, ListParWithRandom, TaggedContinuation, Term};

/// A value waiting on a channel.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Datum {
    pub a: ListParWithRandom,
    pub persist: bool,
    pub source: Produce,
}

impl Datum {
    pub fn create(channel: &Term, a: ListParWithRandom, persist: bool) -> Datum {
        let source = Produce::create(channel, &a, persist);
        Datum { a, persist, source }
    }
}

/// A continuation waiting for data on one or more channels.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct WaitingContinuation {
    pub patterns: Vec<BindPattern>,
    pub continuation: TaggedContinuation,
    pub persist: bool,
    pub source: Consume,
}

impl WaitingContinuation {
    pub fn create(
        channels: &[Term],
        patterns: Vec<BindPattern>,
        continuation: TaggedContinuation,
        persist: bool,
    ) -> WaitingContinuation {
        let source = Consume::create(channels, &patterns, &continuation, persist);
        WaitingContinuation {
            patterns,
            continuation,
            persist,
            source,
        }
    }
}

/// The continuation released by a COMM.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContResult {
    pub continuation: TaggedContinuation,
    pub persistent: bool,
    pub channels: Vec<Term>,
    pub patterns: Vec<BindPattern>,
}

/// The datum matched on one channel of a COMM: what the pattern captured, and the datum as it was
/// stored (or produced).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RSpaceResult {
    pub channel: Term,
    pub matched_datum: ListParWithRandom,
    pub removed_datum: ListParWithRandom,
    pub persistent: bool,
}

/// `None` if the operation only stored its argument, or the released continuation and the matched
/// data if it caused a COMM.
pub type MaybeActionResult = Option<(ContResult, Vec<RSpaceResult>)>;

/// The uncommitted rows of a space: every row changed since the last checkpoint, in full.
///
/// A row present here shadows the history. An empty row here means the history row is to be
/// deleted at the next checkpoint.
#[derive(Clone, Debug, Default)]
pub struct HotStoreState {
    pub data: BTreeMap<Term, Vec<Datum>>,
    pub continuations: BTreeMap<Vec<Term>, Vec<WaitingContinuation>>,
    pub joins: BTreeMap<Term, Vec<Vec<Term>>>,
}

impl HotStoreState {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.continuations.is_empty() && self.joins.is_empty()
    }
}

/// An in-memory snapshot of a space's uncommitted state that the space can be reverted to.
#[derive(Clone, Debug)]
pub struct SoftCheckpoint {
    pub(crate) state: HotStoreState,
    pub log: Log,
}

/// The result of committing a space's uncommitted state into its history.
#[derive(Clone, Debug)]
pub struct Checkpoint {
    /// SHA-256 over every key-value pair of the history, in key order.
    pub root: [u8; 32],

    /// Events recorded since the previous checkpoint.
    pub log: Log,
}
