/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The fixed cost table.
//!
//! Changing any of these values changes the cost of historical executions, and therefore breaks replay
//! of existing chains.

use borsh::BorshSerialize;

use super::Cost;

pub const SEND_EVAL_COST: Cost = Cost::new(11);

pub const RECEIVE_EVAL_COST: Cost = Cost::new(11);

pub const COMM_EVENT_COST: Cost = Cost::new(10);

/// Charged once per term comparison performed by the matcher.
pub const MATCH_TERM_COST: Cost = Cost::new(1);

pub const STORAGE_COST_PER_BYTE: i64 = 1;

pub const ED25519_VERIFY_COST: Cost = Cost::new(40);

const HASH_COST_PER_BYTE_DIVISOR: i64 = 8;

const HASH_BASE_COST: i64 = 10;

/// Cost of storing `value`, proportional to the length of its Borsh serialization.
pub fn storage_cost<T: BorshSerialize>(value: &T) -> Cost {
    let len = borsh::to_vec(value).map(|bytes| bytes.len()).unwrap_or(0);
    Cost::new(len as i64 * STORAGE_COST_PER_BYTE)
}

/// Cost of hashing an input of `len` bytes.
pub fn hash_cost(len: usize) -> Cost {
    Cost::new(HASH_BASE_COST + len as i64 / HASH_COST_PER_BYTE_DIVISOR)
}
