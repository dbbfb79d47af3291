/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The types defined in [`crate::types::basic`] are "inert" types, i.e., those that are passed around
//! and inspected, but have no active behavior. They follow the newtype pattern and the API for using
//! them is defined in this module.
//!
//! Types specific to a single component (e.g., the [score map](crate::casper::estimator::ScoreMap) of
//! the estimator) are defined next to that component.

use borsh::{BorshDeserialize, BorshSerialize};
use std::{
    fmt::{self, Debug, Display, Formatter},
    ops::{Add, AddAssign},
};

use super::crypto_primitives::VerifyingKey;

/// The content hash of a [block](crate::types::block::BlockMessage). Equality is byte-exact.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct BlockHash([u8; 32]);

impl BlockHash {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Display for BlockHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Debug for BlockHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The identity of a validator, i.e., the bytes of its public key.
///
/// Validators are compared byte-exactly and ordered by their bytes, which is what makes iteration over
/// a [`BlockDag`](crate::casper::block_dag::BlockDag)'s latest messages deterministic.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct Validator([u8; 32]);

impl Validator {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl From<VerifyingKey> for Validator {
    fn from(value: VerifyingKey) -> Self {
        Validator(value.to_bytes())
    }
}

impl From<&VerifyingKey> for Validator {
    fn from(value: &VerifyingKey) -> Self {
        Validator(value.to_bytes())
    }
}

impl Debug for Validator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Bonded weight of a validator as recorded in the state of a particular block.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct Weight(u64);

impl Weight {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for Weight {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Cumulative weighted support of a block, as computed by the
/// [estimator](crate::casper::estimator::build_scores_map).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Score(i64);

impl Score {
    pub const fn new(int: i64) -> Self {
        Self(int)
    }

    pub const fn zero() -> Self {
        Self(0)
    }

    pub const fn int(&self) -> i64 {
        self.0
    }
}

impl Display for Score {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl AddAssign<Weight> for Score {
    fn add_assign(&mut self, rhs: Weight) {
        self.0 = self.0.saturating_add(rhs.0 as i64)
    }
}

impl Add<Weight> for Score {
    type Output = Score;

    fn add(self, rhs: Weight) -> Self::Output {
        Score(self.0.saturating_add(rhs.0 as i64))
    }
}

/// Hashes of the blocks that list a given block among their parents, in the order in which they were
/// inserted into the [block DAG storage](crate::casper::block_dag::BlockDagStorage).
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize, Default)]
pub struct ChildrenList(Vec<BlockHash>);

impl ChildrenList {
    pub(crate) fn new(blocks: Vec<BlockHash>) -> Self {
        Self(blocks)
    }

    pub const fn vec(&self) -> &Vec<BlockHash> {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BlockHash> {
        self.0.iter()
    }

    pub fn contains(&self, block: &BlockHash) -> bool {
        self.0.contains(block)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Push `value` unless it is already present.
    pub(crate) fn push(&mut self, value: BlockHash) {
        if !self.0.contains(&value) {
            self.0.push(value)
        }
    }
}
