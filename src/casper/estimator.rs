/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Weighted fork choice.
//!
//! ## Scoring
//!
//! [`build_scores_map`] folds the support of every validator's latest message into one [`ScoreMap`]:
//! 1. For every validator, every block reachable backwards from its latest message, through parents the
//!    DAG contains, gains the validator's weight as recorded at that block. Each block is credited once
//!    per validator even if it is reachable through multiple paths.
//! 2. Then, for every validator, every child of its latest message that was scored in step 1, merges
//!    more than one parent, and was proposed by another validator, gains the validator's weight as
//!    recorded at that child.
//!
//! The keys of the resulting map are exactly the blocks reached in step 1. Since step 2 only starts once
//! every chain has been walked, the order in which validators are visited does not affect the result.
//!
//! ## Tip selection
//!
//! [`tips`] starts from genesis and repeatedly replaces each block with its scored children, dropping
//! repeated blocks and sorting by descending score, until a round changes nothing. Blocks with equal
//! scores stay in the order the replacement produced them.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    time::SystemTime,
};

use crate::{
    casper::{
        block_dag::BlockDag,
        block_store::{BlockStore, BlockStoreError},
    },
    events::{BuildScoresEvent, ComputeTipsEvent},
    logging::Logger,
    types::{
        basic::{BlockHash, Score},
        block::BlockMessage,
    },
};

/// The score of every block supported by at least one latest message.
pub type ScoreMap = HashMap<BlockHash, Score>;

/// Fork choice with optional event logging.
#[derive(Clone, Copy, Debug, Default)]
pub struct Estimator {
    log_events: bool,
}

impl Estimator {
    pub fn new(log_events: bool) -> Estimator {
        Estimator { log_events }
    }

    /// See [`build_scores_map`].
    pub fn build_scores_map(&self, dag: &BlockDag) -> ScoreMap {
        let scores = build_scores_map(dag);
        if self.log_events {
            BuildScoresEvent::get_logger()(&BuildScoresEvent {
                timestamp: SystemTime::now(),
                validators: dag.latest_messages().len(),
                scored_blocks: scores.len(),
            });
        }
        scores
    }

    /// See [`tips`].
    pub fn tips<S: BlockStore + ?Sized>(
        &self,
        dag: &BlockDag,
        genesis: &BlockHash,
        block_store: &S,
    ) -> Result<Vec<BlockMessage>, BlockStoreError> {
        let scores = self.build_scores_map(dag);
        let tips = resolve(tip_hashes(dag, genesis, &scores), block_store)?;
        if self.log_events {
            ComputeTipsEvent::get_logger()(&ComputeTipsEvent {
                timestamp: SystemTime::now(),
                genesis: *genesis,
                tips: tips.iter().map(|tip| tip.hash).collect(),
            });
        }
        Ok(tips)
    }
}

/// Score every block supported by the latest messages in `dag`.
///
/// Validators are visited in the order of their bytes, which does not affect the result.
pub fn build_scores_map(dag: &BlockDag) -> ScoreMap {
    let mut scores = ScoreMap::new();

    // Supporting chains.
    for (validator, latest) in dag.latest_messages() {
        let mut visited = HashSet::from([latest.hash]);
        let mut queue = VecDeque::from([latest]);
        while let Some(block) = queue.pop_front() {
            *scores.entry(block.hash).or_insert(Score::zero()) += block.weight_of(validator);
            for parent in &block.parents {
                if let Some(parent_block) = dag.lookup(parent) {
                    if visited.insert(*parent) {
                        queue.push_back(parent_block);
                    }
                }
            }
        }
    }

    // Implicit support through merge blocks.
    for (validator, latest) in dag.latest_messages() {
        if let Some(children) = dag.children(&latest.hash) {
            for child in children.iter() {
                let Some(score) = scores.get_mut(child) else {
                    continue;
                };
                if let Some(child_block) = dag.lookup(child) {
                    if child_block.parents.len() > 1 && child_block.sender != *validator {
                        *score += child_block.weight_of(validator);
                    }
                }
            }
        }
    }

    log::trace!(
        "Scored {} blocks from {} latest messages",
        scores.len(),
        dag.latest_messages().len()
    );
    scores
}

/// Select the fork choice tips of `dag`, highest score first, resolved through `block_store`.
///
/// Tips that `block_store` does not contain are left out. If `dag` has no latest messages, the only tip
/// is `genesis`.
pub fn tips<S: BlockStore + ?Sized>(
    dag: &BlockDag,
    genesis: &BlockHash,
    block_store: &S,
) -> Result<Vec<BlockMessage>, BlockStoreError> {
    let scores = build_scores_map(dag);
    resolve(tip_hashes(dag, genesis, &scores), block_store)
}

/// Hashes of the fork choice tips of `dag` under `scores`, highest score first.
pub fn tip_hashes(dag: &BlockDag, genesis: &BlockHash, scores: &ScoreMap) -> Vec<BlockHash> {
    let mut blocks = vec![*genesis];
    loop {
        let mut replaced = replace_with_scored_children(&blocks, dag, scores);
        replaced.sort_by(|a, b| score_of(b, scores).cmp(&score_of(a, scores)));
        if replaced == blocks {
            return blocks;
        }
        blocks = replaced;
    }
}

/// Replace each of `blocks` by its children that have a score, keeping only the first occurrence of
/// each block.
fn replace_with_scored_children(
    blocks: &[BlockHash],
    dag: &BlockDag,
    scores: &ScoreMap,
) -> Vec<BlockHash> {
    let mut seen = HashSet::new();
    let mut replaced = Vec::with_capacity(blocks.len());
    for block in blocks {
        let scored_children: Vec<BlockHash> = match dag.children(block) {
            Some(children) => children
                .iter()
                .filter(|child| scores.contains_key(child))
                .copied()
                .collect(),
            None => Vec::new(),
        };

        if scored_children.is_empty() {
            if seen.insert(*block) {
                replaced.push(*block);
            }
        } else {
            for child in scored_children {
                if seen.insert(child) {
                    replaced.push(child);
                }
            }
        }
    }
    replaced
}

fn score_of(block: &BlockHash, scores: &ScoreMap) -> Score {
    scores.get(block).copied().unwrap_or_default()
}

fn resolve<S: BlockStore + ?Sized>(
    hashes: Vec<BlockHash>,
    block_store: &S,
) -> Result<Vec<BlockMessage>, BlockStoreError> {
    let mut blocks = Vec::with_capacity(hashes.len());
    for hash in hashes {
        match block_store.get(&hash)? {
            Some(block) => blocks.push(block),
            None => log::debug!("Tip {} is not in the block store, leaving it out", hash),
        }
    }
    Ok(blocks)
}
