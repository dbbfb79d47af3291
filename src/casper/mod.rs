/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Fork choice over the validator-signed block DAG.
//!
//! The [estimator](estimator) scores every block by the weight of the validators whose latest messages
//! build on it, and walks from genesis towards the highest scoring [tips](estimator::tips). It reads an
//! immutable [`BlockDag`](block_dag::BlockDag) snapshot, and resolves the tips it picks through a
//! [`BlockStore`](block_store::BlockStore).

pub mod block_dag;

pub mod block_store;

pub mod estimator;
