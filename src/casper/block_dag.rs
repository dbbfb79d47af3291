/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The block DAG as seen by fork choice, and the storage that builds it up block by block.
//!
//! A [`BlockDag`] is an immutable snapshot. It may reference blocks it does not contain: a block's
//! parents are recorded even if they have not been inserted yet, and fork choice simply stops
//! traversing at them.

use std::collections::{BTreeMap, HashMap};

use crate::types::{
    basic::{BlockHash, ChildrenList, Validator},
    block::{BlockMessage, BlockMetadata},
};

/// A snapshot of the block DAG.
#[derive(Clone, Debug, Default)]
pub struct BlockDag {
    latest_messages: BTreeMap<Validator, BlockMetadata>,
    child_map: HashMap<BlockHash, ChildrenList>,
    data_lookup: HashMap<BlockHash, BlockMetadata>,
}

impl BlockDag {
    /// The newest block of every validator that has proposed one, ordered by validator.
    pub fn latest_messages(&self) -> &BTreeMap<Validator, BlockMetadata> {
        &self.latest_messages
    }

    pub fn latest_message(&self, validator: &Validator) -> Option<&BlockMetadata> {
        self.latest_messages.get(validator)
    }

    /// Children of `block`, in the order in which they were inserted.
    pub fn children(&self, block: &BlockHash) -> Option<&ChildrenList> {
        self.child_map.get(block)
    }

    pub fn lookup(&self, block: &BlockHash) -> Option<&BlockMetadata> {
        self.data_lookup.get(block)
    }

    pub fn contains(&self, block: &BlockHash) -> bool {
        self.data_lookup.contains_key(block)
    }

    pub fn len(&self) -> usize {
        self.data_lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data_lookup.is_empty()
    }
}

/// Mutable storage for the block DAG. Hands out [`BlockDag`] snapshots.
#[derive(Clone, Debug, Default)]
pub struct BlockDagStorage {
    dag: BlockDag,
    latest_seq_nums: BTreeMap<Validator, u64>,
}

impl BlockDagStorage {
    pub fn new() -> BlockDagStorage {
        BlockDagStorage::default()
    }

    /// Insert `block` into the DAG, making it a child of each of its parents, and its sender's latest
    /// message unless the sender already has a latest message with a higher sequence number.
    ///
    /// Returns false, and changes nothing, if `block` was already inserted.
    pub fn insert(&mut self, block: &BlockMessage) -> bool {
        self.insert_block(block, true)
    }

    /// Insert the genesis block. Genesis is never any validator's latest message.
    pub fn insert_genesis(&mut self, genesis: &BlockMessage) -> bool {
        self.insert_block(genesis, false)
    }

    fn insert_block(&mut self, block: &BlockMessage, track_latest: bool) -> bool {
        if self.dag.data_lookup.contains_key(&block.hash) {
            return false;
        }

        let metadata = block.metadata();
        for parent in &block.parents {
            self.dag
                .child_map
                .entry(*parent)
                .or_insert_with(|| ChildrenList::new(Vec::new()))
                .push(block.hash);
        }
        self.dag
            .child_map
            .entry(block.hash)
            .or_insert_with(|| ChildrenList::new(Vec::new()));

        let is_latest = track_latest
            && match self.latest_seq_nums.get(&block.sender) {
                Some(seq_num) => block.seq_num > *seq_num,
                None => true,
            };
        if is_latest {
            self.latest_seq_nums.insert(block.sender, block.seq_num);
            self.dag.latest_messages.insert(block.sender, metadata.clone());
        }

        self.dag.data_lookup.insert(block.hash, metadata);
        log::debug!(
            "Inserted block {} into the block DAG, latest message: {}",
            block.hash,
            is_latest
        );
        true
    }

    pub fn contains(&self, block: &BlockHash) -> bool {
        self.dag.contains(block)
    }

    /// Get an immutable snapshot of the DAG as it is now.
    pub fn snapshot(&self) -> BlockDag {
        self.dag.clone()
    }
}
