/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The event trace a live space records and a replay space is rigged with.
//!
//! Every produce and consume is identified by a SHA-256 hash over the Borsh serialization of its
//! arguments. A [`Comm`] records which consume was matched with which produces.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    crypto_primitives::{CryptoHasher, Digest},
    term::{BindPattern, ListParWithRandom, TaggedContinuation, Term},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub struct Produce {
    pub channel_hash: [u8; 32],
    pub hash: [u8; 32],
    pub persistent: bool,
}

impl Produce {
    pub fn create(channel: &Term, data: &ListParWithRandom, persistent: bool) -> Produce {
        let channel_hash = hash_of(&[&borsh::to_vec(channel).unwrap()]);
        let hash = hash_of(&[
            &channel_hash,
            &borsh::to_vec(data).unwrap(),
            &[persistent as u8],
        ]);
        Produce {
            channel_hash,
            hash,
            persistent,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub struct Consume {
    pub channel_hashes: Vec<[u8; 32]>,
    pub hash: [u8; 32],
    pub persistent: bool,
}

impl Consume {
    pub fn create(
        channels: &[Term],
        patterns: &[BindPattern],
        continuation: &TaggedContinuation,
        persistent: bool,
    ) -> Consume {
        let channel_hashes: Vec<[u8; 32]> = channels
            .iter()
            .map(|channel| hash_of(&[&borsh::to_vec(channel).unwrap()]))
            .collect();
        let hash = hash_of(&[
            &borsh::to_vec(&channel_hashes).unwrap(),
            &borsh::to_vec(&patterns.to_vec()).unwrap(),
            &borsh::to_vec(continuation).unwrap(),
            &[persistent as u8],
        ]);
        Consume {
            channel_hashes,
            hash,
            persistent,
        }
    }
}

/// A consume matched with one produce per channel of the consume.
#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct Comm {
    pub consume: Consume,
    pub produces: Vec<Produce>,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum Event {
    Produce(Produce),
    Consume(Consume),
    Comm(Comm),
}

/// The events recorded by a space since its last checkpoint, in the order they happened.
pub type Log = Vec<Event>;

fn hash_of(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = CryptoHasher::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}
