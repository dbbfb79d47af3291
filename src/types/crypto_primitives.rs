/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Cryptographic primitives.
//!
//! The definitions and re-exports in this module provide three categories of cryptographic primitives:
//! 1. **Cryptographic Hashes**: SHA-256 (provided by [`sha2`]), Keccak-256 (provided by [`sha3`]) and
//!    BLAKE2b (provided by [`blake2`]).
//! 2. **Digital Signatures**: provided by the [`ed25519_dalek`] crate.
//! 3. **Deterministic randomness**: [`Blake2b512Random`], a splittable byte stream used to derive fresh
//!    channel names and the registry bootstrap tag.

use blake2::{digest::consts::U32, Blake2b};
use borsh::{BorshDeserialize, BorshSerialize};
use sha3::Keccak256;

// re-exports below.
pub use sha2::Digest;
pub use sha2::Sha256 as CryptoHasher;

pub use ed25519_dalek::{Signature, SignatureError, Signer, SigningKey, Verifier, VerifyingKey};

type Blake2b256 = Blake2b<U32>;

/// Compute the SHA-256 digest of `bytes`.
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = CryptoHasher::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Compute the Keccak-256 digest of `bytes`.
pub fn keccak256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Compute the 256-bit BLAKE2b digest of `bytes`.
pub fn blake2b256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Verify an Ed25519 `signature` over `data` by the holder of `public_key`.
///
/// Returns false (instead of an error) if either the public key or the signature are malformed.
pub fn ed25519_verify(data: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
    let public_key: [u8; 32] = match public_key.try_into() {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let signature: [u8; 64] = match signature.try_into() {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    match VerifyingKey::from_bytes(&public_key) {
        Ok(verifying_key) => verifying_key
            .verify(data, &Signature::from_bytes(&signature))
            .is_ok(),
        Err(_) => false,
    }
}

/// A deterministic, splittable stream of pseudo-random bytes: a node of a BLAKE2b-512 hash tree.
///
/// ## Derivation
///
/// Every stream is a BLAKE2b tree node (digest length 64, no key, maximal depth, inner length 64) and a
/// 128-byte block that is not yet compressed. The block holds up to 112 path bytes followed by a 128-bit
/// little-endian counter.
///
/// - [`create_from_bytes`](Self::create_from_bytes) compresses the seed into a node of fanout 0, in
///   128-byte blocks. A trailing partial block is zero-padded, and an empty seed compresses one zero block.
///   The path and the counter start empty.
/// - [`split_byte`](Self::split_byte) and [`split_short`](Self::split_short) (two bytes, little endian)
///   append to the path of a copy. When the path is full, the whole block is compressed into the node
///   first, and a blank block started.
/// - [`next`](Self::next) finalizes the node as the root over the current block, returns the first half
///   of the 64-byte digest, and increments the counter. The call after it returns the second half.
/// - [`merge`](Self::merge) finalizes every stream as an inner node, and compresses the digests two per
///   block into a fresh node whose fanout is the number of streams (at most 255 per level).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub struct Blake2b512Random {
    node: Blake2b512Block,
    last_block: [u8; BLOCK_LEN],
    path_position: u8,
    hash: [u8; 64],
    /// 0 when the next call to `next` hashes again, 32 when it returns the second half of `hash`.
    position: u8,
}

const BLOCK_LEN: usize = 128;

/// Bytes of a block available to the path. The rest holds the counter.
const PATH_LEN: usize = 112;

/// Maximal fanout of a merge node.
const MAX_FANOUT: usize = 255;

impl Blake2b512Random {
    pub fn create_from_bytes(init: &[u8]) -> Blake2b512Random {
        let mut random = Blake2b512Random::from_node(Blake2b512Block::tree_node(0));
        let mut chunks = init.chunks_exact(BLOCK_LEN);
        for chunk in &mut chunks {
            random.node.update(chunk);
        }
        let remainder = chunks.remainder();
        if !remainder.is_empty() || init.is_empty() {
            let mut padded = [0u8; BLOCK_LEN];
            padded[..remainder.len()].copy_from_slice(remainder);
            random.node.update(&padded);
        }
        random
    }

    /// Get the next 32 bytes of the stream.
    pub fn next(&mut self) -> [u8; 32] {
        let mut output = [0u8; 32];
        if self.position == 0 {
            self.hash = self.node.peek_final_root(&self.last_block);
            let counter = u128::from_le_bytes(self.counter_bytes()).wrapping_add(1);
            self.last_block[PATH_LEN..].copy_from_slice(&counter.to_le_bytes());
            output.copy_from_slice(&self.hash[..32]);
            self.position = 32;
        } else {
            output.copy_from_slice(&self.hash[32..]);
            self.position = 0;
        }
        output
    }

    pub fn split_byte(&self, index: u8) -> Blake2b512Random {
        let mut split = self.child();
        split.add_byte(index);
        split
    }

    pub fn split_short(&self, index: u16) -> Blake2b512Random {
        let mut split = self.child();
        for byte in index.to_le_bytes() {
            split.add_byte(byte);
        }
        split
    }

    /// Derive a single stream from `randoms`. The order of `randoms` matters.
    pub fn merge(randoms: &[Blake2b512Random]) -> Blake2b512Random {
        match randoms.len() {
            0 => Blake2b512Random::create_from_bytes(&[]),
            1 => randoms[0].clone(),
            len if len > MAX_FANOUT => {
                let level: Vec<Blake2b512Random> = randoms
                    .chunks(MAX_FANOUT)
                    .map(Blake2b512Random::merge)
                    .collect();
                Blake2b512Random::merge(&level)
            }
            len => {
                let mut merged = Blake2b512Random::from_node(Blake2b512Block::tree_node(len as u8));
                for pair in randoms.chunks(2) {
                    let mut block = [0u8; BLOCK_LEN];
                    for (half, random) in block.chunks_exact_mut(64).zip(pair) {
                        half.copy_from_slice(&random.node.peek_final_inner(&random.last_block));
                    }
                    merged.node.update(&block);
                }
                merged
            }
        }
    }

    fn from_node(node: Blake2b512Block) -> Blake2b512Random {
        Blake2b512Random {
            node,
            last_block: [0u8; BLOCK_LEN],
            path_position: 0,
            hash: [0u8; 64],
            position: 0,
        }
    }

    /// A copy that hashes afresh on its first `next`.
    fn child(&self) -> Blake2b512Random {
        let mut child = self.clone();
        child.position = 0;
        child
    }

    fn add_byte(&mut self, byte: u8) {
        if self.path_position as usize == PATH_LEN {
            self.node.update(&self.last_block);
            self.last_block = [0u8; BLOCK_LEN];
            self.path_position = 0;
        }
        self.last_block[self.path_position as usize] = byte;
        self.path_position += 1;
    }

    fn counter_bytes(&self) -> [u8; 16] {
        let mut counter = [0u8; 16];
        counter.copy_from_slice(&self.last_block[PATH_LEN..]);
        counter
    }
}

impl std::fmt::Debug for Blake2b512Random {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blake2b512Random")
            .field("chain_value", &self.node.chain_value[0])
            .field("path", &&self.last_block[..self.path_position as usize])
            .field("counter", &u128::from_le_bytes(self.counter_bytes()))
            .field("position", &self.position)
            .finish()
    }
}

const IV: [u64; 8] = [
    0x6a09e667f3bcc908,
    0xbb67ae8584caa73b,
    0x3c6ef372fe94f82b,
    0xa54ff53a5f1d36f1,
    0x510e527fade682d1,
    0x9b05688c2b3e6c1f,
    0x1f83d9abfb41bd6b,
    0x5be0cd19137e2179,
];

const SIGMA: [[usize; 16]; 12] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15],
    [14, 10, 4, 8, 9, 15, 13, 6, 1, 12, 0, 2, 11, 7, 5, 3],
    [11, 8, 12, 0, 5, 2, 15, 13, 10, 14, 3, 6, 7, 1, 9, 4],
    [7, 9, 3, 1, 13, 12, 11, 14, 2, 6, 5, 10, 4, 0, 15, 8],
    [9, 0, 5, 7, 2, 4, 10, 15, 14, 1, 11, 12, 6, 8, 3, 13],
    [2, 12, 6, 10, 0, 11, 8, 3, 4, 13, 7, 5, 15, 14, 1, 9],
    [12, 5, 1, 15, 14, 13, 4, 10, 0, 7, 6, 3, 9, 2, 8, 11],
    [13, 11, 7, 14, 12, 1, 3, 9, 5, 0, 15, 4, 8, 6, 2, 10],
    [6, 15, 14, 9, 11, 3, 0, 8, 12, 2, 13, 7, 1, 4, 10, 5],
    [10, 2, 8, 4, 7, 6, 1, 5, 15, 11, 9, 14, 3, 12, 13, 0],
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15],
    [14, 10, 4, 8, 9, 15, 13, 6, 1, 12, 0, 2, 11, 7, 5, 3],
];

/// The state of a BLAKE2b-512 tree node between blocks.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
struct Blake2b512Block {
    chain_value: [u64; 8],
    /// Bytes compressed so far.
    counter: u128,
}

impl Blake2b512Block {
    /// A node with digest length 64, no key, the given `fanout`, maximal depth, and inner length 64.
    fn tree_node(fanout: u8) -> Blake2b512Block {
        let mut chain_value = IV;
        chain_value[0] ^= 0x40 | (fanout as u64) << 16 | 0xff << 24;
        chain_value[2] ^= 0x40 << 8;
        Blake2b512Block {
            chain_value,
            counter: 0,
        }
    }

    fn update(&mut self, block: &[u8]) {
        self.counter = self.counter.wrapping_add(BLOCK_LEN as u128);
        compress(&mut self.chain_value, block, self.counter, false, false);
    }

    /// The digest of this node if `block` were its last block, with this node as the root.
    fn peek_final_root(&self, block: &[u8]) -> [u8; 64] {
        self.peek_final(block, true)
    }

    /// The digest of this node if `block` were its last block, with this node as an inner node.
    fn peek_final_inner(&self, block: &[u8]) -> [u8; 64] {
        self.peek_final(block, false)
    }

    fn peek_final(&self, block: &[u8], last_node: bool) -> [u8; 64] {
        let mut chain_value = self.chain_value;
        compress(
            &mut chain_value,
            block,
            self.counter.wrapping_add(BLOCK_LEN as u128),
            true,
            last_node,
        );
        let mut digest = [0u8; 64];
        for (bytes, word) in digest.chunks_exact_mut(8).zip(chain_value) {
            bytes.copy_from_slice(&word.to_le_bytes());
        }
        digest
    }
}

/// The BLAKE2b compression function F over one 128-byte `block`.
fn compress(h: &mut [u64; 8], block: &[u8], counter: u128, last_block: bool, last_node: bool) {
    let mut m = [0u64; 16];
    for (word, bytes) in m.iter_mut().zip(block.chunks_exact(8)) {
        let mut le = [0u8; 8];
        le.copy_from_slice(bytes);
        *word = u64::from_le_bytes(le);
    }

    let mut v = [0u64; 16];
    v[..8].copy_from_slice(&h[..]);
    v[8..].copy_from_slice(&IV);
    v[12] ^= counter as u64;
    v[13] ^= (counter >> 64) as u64;
    if last_block {
        v[14] = !v[14];
    }
    if last_node {
        v[15] = !v[15];
    }

    for s in SIGMA.iter() {
        mix(&mut v, 0, 4, 8, 12, m[s[0]], m[s[1]]);
        mix(&mut v, 1, 5, 9, 13, m[s[2]], m[s[3]]);
        mix(&mut v, 2, 6, 10, 14, m[s[4]], m[s[5]]);
        mix(&mut v, 3, 7, 11, 15, m[s[6]], m[s[7]]);
        mix(&mut v, 0, 5, 10, 15, m[s[8]], m[s[9]]);
        mix(&mut v, 1, 6, 11, 12, m[s[10]], m[s[11]]);
        mix(&mut v, 2, 7, 8, 13, m[s[12]], m[s[13]]);
        mix(&mut v, 3, 4, 9, 14, m[s[14]], m[s[15]]);
    }

    for i in 0..8 {
        h[i] ^= v[i] ^ v[i + 8];
    }
}

fn mix(v: &mut [u64; 16], a: usize, b: usize, c: usize, d: usize, x: u64, y: u64) {
    v[a] = v[a].wrapping_add(v[b]).wrapping_add(x);
    v[d] = (v[d] ^ v[a]).rotate_right(32);
    v[c] = v[c].wrapping_add(v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(24);
    v[a] = v[a].wrapping_add(v[b]).wrapping_add(y);
    v[d] = (v[d] ^ v[a]).rotate_right(16);
    v[c] = v[c].wrapping_add(v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(63);
}
