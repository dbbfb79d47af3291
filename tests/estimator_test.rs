/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Tests for fork choice: scoring the block DAG and selecting tips.
//!
//! DAGs are built with a [DagFixture], which inserts every proposed block into both a
//! [BlockDagStorage](rho_casper::casper::block_dag::BlockDagStorage) and a block store backed by a
//! [MemDB](common::mem_db::MemDB).

use log::LevelFilter;
use rand::{rngs::StdRng, Rng, SeedableRng};

use rho_casper::{
    casper::{
        block_store::{BlockStore, BlockStoreError},
        estimator::{build_scores_map, tip_hashes, tips, Estimator, ScoreMap},
    },
    types::{
        basic::{BlockHash, Score},
        block::BlockMessage,
    },
};

mod common;

use common::{
    dag::{bonds, validator, DagFixture},
    logging::setup_logger,
};

fn hashes(blocks: &[BlockMessage]) -> Vec<BlockHash> {
    blocks.iter().map(|block| block.hash).collect()
}

#[test]
fn two_validators_on_sibling_blocks_test() {
    setup_logger(LevelFilter::Trace);

    let (a, b) = (validator(1), validator(2));
    let weights = bonds(&[(a, 10), (b, 10)]);
    let mut fixture = DagFixture::new();
    let g = fixture.genesis(weights.clone());
    let x = fixture.propose(a, &[g], weights.clone());
    let y = fixture.propose(b, &[g], weights);
    let dag = fixture.dag();

    let scores = build_scores_map(&dag);
    assert_eq!(scores.len(), 3);
    assert_eq!(scores[&g], Score::new(20));
    assert_eq!(scores[&x], Score::new(10));
    assert_eq!(scores[&y], Score::new(10));

    // X and Y tie, so they stay in the order in which they were inserted as children of G.
    let tips = tips(&dag, &g, &fixture.block_store).unwrap();
    assert_eq!(hashes(&tips), vec![x, y]);
}

#[test]
fn single_validator_chain_test() {
    let a = validator(1);
    let mut fixture = DagFixture::new();
    let g = fixture.genesis(bonds(&[(a, 5)]));
    let fork = fixture.propose(a, &[g], bonds(&[(a, 5)]));
    let b1 = fixture.propose(a, &[g], bonds(&[(a, 6)]));
    let b2 = fixture.propose(a, &[b1], bonds(&[(a, 7)]));
    let b3 = fixture.propose(a, &[b2], bonds(&[(a, 8)]));
    let dag = fixture.dag();

    // Every block on the chain is credited once, with the weight recorded at that block.
    let scores = build_scores_map(&dag);
    assert_eq!(scores[&b3], Score::new(8));
    assert_eq!(scores[&b2], Score::new(7));
    assert_eq!(scores[&b1], Score::new(6));
    assert_eq!(scores[&g], Score::new(5));

    // The abandoned fork is not supported by the latest message.
    assert!(!scores.contains_key(&fork));
    assert_eq!(scores.len(), 4);

    let tips = tips(&dag, &g, &fixture.block_store).unwrap();
    assert_eq!(hashes(&tips), vec![b3]);
}

#[test]
fn common_ancestor_sums_weights_at_ancestor_test() {
    let (a, b) = (validator(1), validator(2));
    let mut fixture = DagFixture::new();
    let g = fixture.genesis(bonds(&[(a, 3), (b, 4)]));
    let x = fixture.propose(a, &[g], bonds(&[(a, 10), (b, 20)]));
    let y = fixture.propose(b, &[g], bonds(&[(a, 10), (b, 20)]));
    let dag = fixture.dag();

    let scores = build_scores_map(&dag);
    assert_eq!(scores[&g], Score::new(7));
    assert_eq!(scores[&x], Score::new(10));
    assert_eq!(scores[&y], Score::new(20));

    let tips = tips(&dag, &g, &fixture.block_store).unwrap();
    assert_eq!(hashes(&tips), vec![y, x]);
}

/// Build a DAG where `merger` proposes a merge block on its own chain and on the latest message of
/// `supporter`, and check that `supporter`'s weight at the merge block is credited to it.
fn check_merge_block_credit(supporter_byte: u8, merger_byte: u8) {
    let (supporter, merger) = (validator(supporter_byte), validator(merger_byte));
    let mut fixture = DagFixture::new();
    let g = fixture.genesis(bonds(&[(supporter, 10), (merger, 7)]));
    let s1 = fixture.propose(supporter, &[g], bonds(&[(supporter, 10), (merger, 7)]));
    let m1 = fixture.propose(merger, &[g], bonds(&[(supporter, 10), (merger, 7)]));
    let merge = fixture.propose(merger, &[m1, s1], bonds(&[(supporter, 12), (merger, 7)]));
    let dag = fixture.dag();

    let scores = build_scores_map(&dag);
    assert_eq!(scores[&merge], Score::new(7 + 12));
    assert_eq!(scores[&s1], Score::new(10 + 7));
    assert_eq!(scores[&m1], Score::new(7));
    assert_eq!(scores[&g], Score::new(10 + 7));

    let tips = tips(&dag, &g, &fixture.block_store).unwrap();
    assert_eq!(hashes(&tips), vec![merge]);
}

#[test]
fn merge_block_credits_supporter_test() {
    check_merge_block_credit(1, 2);
    check_merge_block_credit(2, 1);
}

#[test]
fn no_implicit_credit_for_own_merge_block_test() {
    let (a, b) = (validator(1), validator(2));
    let weights = bonds(&[(a, 10), (b, 7)]);
    let mut fixture = DagFixture::new();
    let g = fixture.genesis(weights.clone());
    let b1 = fixture.propose(b, &[g], weights.clone());
    let latest = fixture.propose_with_seq_num(a, 5, &[g], weights.clone());
    // A merge block by A that is not A's latest message, built on by B.
    let merge = fixture.propose_with_seq_num(a, 3, &[b1, latest], weights.clone());
    let b2 = fixture.propose(b, &[merge], weights);
    let dag = fixture.dag();

    assert_eq!(dag.latest_message(&a).unwrap().hash, latest);
    assert_eq!(dag.latest_message(&b).unwrap().hash, b2);

    let scores = build_scores_map(&dag);
    assert_eq!(scores[&merge], Score::new(7));
    assert_eq!(scores[&latest], Score::new(10 + 7));
    assert_eq!(scores[&b2], Score::new(7));
    assert_eq!(scores[&g], Score::new(10 + 7));
}

#[test]
fn no_latest_messages_test() {
    let mut fixture = DagFixture::new();
    let g = fixture.genesis(bonds(&[(validator(1), 10)]));
    let dag = fixture.dag();

    assert!(dag.latest_messages().is_empty());
    assert!(build_scores_map(&dag).is_empty());

    let tips = tips(&dag, &g, &fixture.block_store).unwrap();
    assert_eq!(hashes(&tips), vec![g]);
}

#[test]
fn three_way_tie_at_depth_two_test() {
    let (a, b, c, d) = (validator(1), validator(2), validator(3), validator(4));
    let weights = bonds(&[(a, 10), (b, 10), (c, 10), (d, 0)]);
    let mut fixture = DagFixture::new();
    let g = fixture.genesis(weights.clone());
    let p = fixture.propose(d, &[g], weights.clone());
    let q2 = fixture.propose(b, &[p], weights.clone());
    let q3 = fixture.propose(c, &[p], weights.clone());
    let q1 = fixture.propose(a, &[p], weights);
    let dag = fixture.dag();

    let scores = build_scores_map(&dag);
    assert_eq!(scores[&p], Score::new(30));
    assert_eq!(scores[&q1], scores[&q2]);
    assert_eq!(scores[&q2], scores[&q3]);

    // Ties keep the order in which the children of P were inserted.
    let tips = tips(&dag, &g, &fixture.block_store).unwrap();
    assert_eq!(hashes(&tips), vec![q2, q3, q1]);
}

#[test]
fn tips_are_ordered_by_score_test() {
    let (a, b) = (validator(1), validator(2));
    let weights = bonds(&[(a, 10), (b, 10)]);
    let mut fixture = DagFixture::new();
    let g = fixture.genesis(weights.clone());
    let low = fixture.propose(a, &[g], weights.clone());
    let high = fixture.propose(b, &[g], weights);
    let dag = fixture.dag();

    // Children of G are listed lowest score first.
    let scores: ScoreMap = [
        (g, Score::new(20)),
        (low, Score::new(3)),
        (high, Score::new(17)),
    ]
    .into_iter()
    .collect();
    assert_eq!(tip_hashes(&dag, &g, &scores), vec![high, low]);

    // Only G is scored: it is its own tip.
    let scores: ScoreMap = [(g, Score::new(20))].into_iter().collect();
    assert_eq!(tip_hashes(&dag, &g, &scores), vec![g]);
}

#[test]
fn dangling_parent_test() {
    let a = validator(1);
    let weights = bonds(&[(a, 10)]);
    let mut fixture = DagFixture::new();
    let g = fixture.genesis(weights.clone());
    let missing = BlockHash::new([9; 32]);
    let z = fixture.propose(a, &[g, missing], weights);
    let dag = fixture.dag();

    let scores = build_scores_map(&dag);
    assert_eq!(scores[&z], Score::new(10));
    assert_eq!(scores[&g], Score::new(10));
    assert!(!scores.contains_key(&missing));

    let tips = tips(&dag, &g, &fixture.block_store).unwrap();
    assert_eq!(hashes(&tips), vec![z]);
}

#[test]
fn unresolvable_tips_are_left_out_test() {
    let (a, b) = (validator(1), validator(2));
    let weights = bonds(&[(a, 10), (b, 20)]);
    let mut fixture = DagFixture::new();
    let g = fixture.genesis(weights.clone());
    let x = fixture.propose(a, &[g], weights.clone());

    // Known to the DAG, but not to the block store.
    let w = BlockMessage::new(vec![g], b, 1, weights, vec![]);
    fixture.storage.insert(&w);
    let dag = fixture.dag();

    let scores = build_scores_map(&dag);
    assert_eq!(tip_hashes(&dag, &g, &scores), vec![w.hash, x]);

    let tips = tips(&dag, &g, &fixture.block_store).unwrap();
    assert_eq!(hashes(&tips), vec![x]);
}

struct FailingBlockStore;

impl BlockStore for FailingBlockStore {
    fn get(&self, block: &BlockHash) -> Result<Option<BlockMessage>, BlockStoreError> {
        Err(BlockStoreError::IncorrectHash { block: *block })
    }

    fn put(&mut self, _: &BlockMessage) -> Result<(), BlockStoreError> {
        Ok(())
    }
}

#[test]
fn block_store_errors_test() {
    let a = validator(1);
    let mut fixture = DagFixture::new();
    let g = fixture.genesis(bonds(&[(a, 10)]));
    fixture.propose(a, &[g], bonds(&[(a, 10)]));
    let dag = fixture.dag();

    assert!(matches!(
        tips(&dag, &g, &FailingBlockStore),
        Err(BlockStoreError::IncorrectHash { .. })
    ));

    let mut tampered = BlockMessage::new(vec![g], a, 2, bonds(&[(a, 10)]), vec![]);
    tampered.body = b"tampered".to_vec();
    assert!(matches!(
        fixture.block_store.put(&tampered),
        Err(BlockStoreError::IncorrectHash { .. })
    ));
    assert!(!fixture.block_store.contains(&tampered.hash).unwrap());
}

#[test]
fn random_dag_properties_test() {
    setup_logger(LevelFilter::Trace);

    let validators: Vec<_> = (1..=4).map(validator).collect();
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..20 {
        let weights = bonds(
            &validators
                .iter()
                .map(|v| (*v, rng.gen_range(1u64, 21)))
                .collect::<Vec<_>>(),
        );
        let mut fixture = DagFixture::new();
        let g = fixture.genesis(weights.clone());
        let mut blocks = vec![g];
        for _ in 0..40 {
            let sender = validators[rng.gen_range(0, validators.len())];
            let first = blocks[rng.gen_range(0, blocks.len())];
            let second = blocks[rng.gen_range(0, blocks.len())];
            let parents = if first == second || rng.gen_bool(0.5) {
                vec![first]
            } else {
                vec![first, second]
            };
            blocks.push(fixture.propose(sender, &parents, weights.clone()));
        }
        let dag = fixture.dag();
        let scores = build_scores_map(&dag);

        // Every latest message descends from genesis.
        let expected: u64 = dag
            .latest_messages()
            .keys()
            .map(|v| weights[v].int())
            .sum();
        assert_eq!(scores[&g], Score::new(expected as i64));

        let tips = Estimator::new(true)
            .tips(&dag, &g, &fixture.block_store)
            .unwrap();
        assert_eq!(tips, self::tips(&dag, &g, &fixture.block_store).unwrap());
        assert!(!tips.is_empty());

        // Sorted by non-increasing score.
        for pair in tips.windows(2) {
            assert!(scores[&pair[0].hash] >= scores[&pair[1].hash]);
        }

        // A fixed point: no tip has a scored child left to descend into.
        for tip in &tips {
            let children = dag.children(&tip.hash).unwrap();
            assert!(children.iter().all(|child| !scores.contains_key(child)));
        }
    }
}
