/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The tuple space: an associative store where produces place data on channels and consumes wait, with
//! patterns, for data to arrive on one or more channels.
//!
//! A runtime owns two spaces: the live [`RSpace`], which records what it does as a
//! [trace](trace::Log), and the [`ReplayRSpace`], which re-executes a recorded trace and fails if the
//! execution diverges from it. Both implement the [`Tuplespace`](pluggables::Tuplespace) capability, so
//! everything above this module is written once and run against either.
//!
//! Uncommitted changes are kept in memory, where they can be rolled back to a
//! [soft checkpoint](internal::SoftCheckpoint). A hard [checkpoint](internal::Checkpoint) commits them
//! into the space's [history](history), whose backend is chosen by [`StorageMode`](history::StorageMode).

pub mod errors;

pub mod history;

pub mod internal;

pub mod matcher;

pub mod pluggables;

pub mod replay_rspace;
pub use replay_rspace::ReplayRSpace;

#[allow(clippy::module_inception)]
pub mod rspace;
pub use rspace::RSpace;

pub(crate) mod space_core;

pub mod trace;
