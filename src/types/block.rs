/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the [`BlockMessage`] type, the [`BlockMetadata`] summary the block DAG keeps of
//! each block, and their associated methods.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::basic::*;
use crate::types::crypto_primitives::{CryptoHasher, Digest};

/// Mapping between validators and their bonded weights, as recorded in a block's post-state.
pub type WeightMap = BTreeMap<Validator, Weight>;

/// A validator-signed block as gossiped between nodes.
///
/// `parents` is ordered: the first parent is the block's "main" parent, and a block with more than one
/// parent is a "merge block".
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct BlockMessage {
    pub hash: BlockHash,
    pub parents: Vec<BlockHash>,
    pub sender: Validator,
    pub seq_num: u64,
    pub bonds: WeightMap,
    pub body: Vec<u8>,
}

impl BlockMessage {
    pub fn new(
        parents: Vec<BlockHash>,
        sender: Validator,
        seq_num: u64,
        bonds: WeightMap,
        body: Vec<u8>,
    ) -> BlockMessage {
        BlockMessage {
            hash: BlockMessage::hash(&parents, &sender, seq_num, &bonds, &body),
            parents,
            sender,
            seq_num,
            bonds,
            body,
        }
    }

    pub fn hash(
        parents: &Vec<BlockHash>,
        sender: &Validator,
        seq_num: u64,
        bonds: &WeightMap,
        body: &Vec<u8>,
    ) -> BlockHash {
        let mut hasher = CryptoHasher::new();
        hasher.update(&borsh::to_vec(parents).unwrap());
        hasher.update(&borsh::to_vec(sender).unwrap());
        hasher.update(&seq_num.to_le_bytes());
        hasher.update(&borsh::to_vec(bonds).unwrap());
        hasher.update(&borsh::to_vec(body).unwrap());
        BlockHash::new(hasher.finalize().into())
    }

    /// Checks if the block's hash matches its contents.
    pub fn is_correct(&self) -> bool {
        self.hash
            == BlockMessage::hash(
                &self.parents,
                &self.sender,
                self.seq_num,
                &self.bonds,
                &self.body,
            )
    }

    /// Whether the block has more than one parent.
    pub fn is_merge_block(&self) -> bool {
        self.parents.len() > 1
    }

    pub fn metadata(&self) -> BlockMetadata {
        BlockMetadata::from(self)
    }
}

/// The parts of a block that fork choice needs: its parents, its sender, and the weight of every bonded
/// validator at that block's state.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct BlockMetadata {
    pub hash: BlockHash,
    pub parents: Vec<BlockHash>,
    pub sender: Validator,
    pub weight_map: WeightMap,
}

impl BlockMetadata {
    /// Weight of `validator` at this block, or zero if it was not bonded at this block.
    pub fn weight_of(&self, validator: &Validator) -> Weight {
        self.weight_map.get(validator).copied().unwrap_or_default()
    }
}

impl From<&BlockMessage> for BlockMetadata {
    fn from(block: &BlockMessage) -> Self {
        BlockMetadata {
            hash: block.hash,
            parents: block.parents.clone(),
            sender: block.sender,
            weight_map: block.bonds.clone(),
        }
    }
}
