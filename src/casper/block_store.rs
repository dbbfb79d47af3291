/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Traits for pluggable block persistence.
//!
//! The [estimator](crate::casper::estimator) resolves the tips it selects through a [`BlockStore`].
//! [`KVBlockStore`] implements it over any key-value store that implements [`KVStore`], storing each
//! block borsh-encoded under its hash.

use std::fmt::{self, Display, Formatter};

use borsh::BorshDeserialize;

use crate::types::{basic::BlockHash, block::BlockMessage};

/// Read-only access to stored blocks. Implementations must be safe to read from concurrently if fork
/// choice is computed concurrently.
pub trait BlockStore {
    fn get(&self, block: &BlockHash) -> Result<Option<BlockMessage>, BlockStoreError>;

    fn put(&mut self, block: &BlockMessage) -> Result<(), BlockStoreError>;

    fn contains(&self, block: &BlockHash) -> Result<bool, BlockStoreError> {
        Ok(self.get(block)?.is_some())
    }
}

pub trait KVStore: KVGet + Clone + Send + 'static {
    type WriteBatch: WriteBatch;

    fn write(&mut self, wb: Self::WriteBatch);
    fn clear(&mut self);
}

pub trait KVGet {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /* ↓↓↓ Block ↓↓↓  */

    fn block(&self, block: &BlockHash) -> Result<Option<BlockMessage>, BlockStoreError> {
        if let Some(bytes) = self.get(&concat(&variables::BLOCKS, &block.bytes())) {
            Ok(Some(BlockMessage::deserialize(&mut &*bytes).map_err(
                |err| BlockStoreError::DeserializeValueError {
                    block: *block,
                    source: err,
                },
            )?))
        } else {
            Ok(None)
        }
    }
}

pub trait WriteBatch {
    fn new() -> Self;
    fn set(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
}

/// Error when trying to read or write a block in a [`BlockStore`].
#[derive(Debug)]
pub enum BlockStoreError {
    /// The bytes stored under a block's hash cannot be deserialized into a [`BlockMessage`].
    DeserializeValueError {
        block: BlockHash,
        source: std::io::Error,
    },

    /// The block's hash does not match its contents.
    IncorrectHash { block: BlockHash },
}

impl Display for BlockStoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BlockStoreError::DeserializeValueError { block, source } => {
                write!(f, "Failed to deserialize block {}: {}", block, source)
            }
            BlockStoreError::IncorrectHash { block } => {
                write!(f, "Block {} does not hash to its own hash", block)
            }
        }
    }
}

impl std::error::Error for BlockStoreError {}

/// A [`BlockStore`] over a pluggable key-value store.
#[derive(Clone)]
pub struct KVBlockStore<K: KVStore> {
    kv_store: K,
}

impl<K: KVStore> KVBlockStore<K> {
    pub fn new(kv_store: K) -> KVBlockStore<K> {
        KVBlockStore { kv_store }
    }

    pub fn kv_store(&self) -> &K {
        &self.kv_store
    }
}

impl<K: KVStore> BlockStore for KVBlockStore<K> {
    fn get(&self, block: &BlockHash) -> Result<Option<BlockMessage>, BlockStoreError> {
        self.kv_store.block(block)
    }

    /// Store `block` under its hash, after checking that the hash matches its contents.
    fn put(&mut self, block: &BlockMessage) -> Result<(), BlockStoreError> {
        if !block.is_correct() {
            return Err(BlockStoreError::IncorrectHash { block: block.hash });
        }

        let mut wb = K::WriteBatch::new();
        wb.set(
            &concat(&variables::BLOCKS, &block.hash.bytes()),
            &borsh::to_vec(block).unwrap(),
        );
        self.kv_store.write(wb);
        Ok(())
    }
}

/// Key prefixes of the values a [`KVBlockStore`] writes.
mod variables {
    pub const BLOCKS: [u8; 1] = [0];
}

/// Takes references to two byteslices and returns a vector containing the bytes of the first one, and
/// then the bytes of the second one.
fn concat(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut res = Vec::with_capacity(a.len() + b.len());
    res.extend_from_slice(a);
    res.extend_from_slice(b);
    res
}
