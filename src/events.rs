/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of the events emitted by the runtime and the estimator.
//!
//! An event for a given action indicates that the action has been completed. Events are printed by the
//! [logging](crate::logging) module if the user enabled event logging.

use std::{path::PathBuf, time::SystemTime};

use crate::{accounting::Cost, rspace::history::StorageMode, types::basic::BlockHash};

/// A runtime was created and is ready to be used.
pub struct CreateRuntimeEvent {
    pub timestamp: SystemTime,
    pub storage_location: PathBuf,
    pub storage_mode: StorageMode,
    /// Root hash of the live space after bootstrapping.
    pub root: [u8; 32],
}

/// The system processes were installed in both spaces.
pub struct InstallSystemProcessesEvent {
    pub timestamp: SystemTime,
    pub processes: usize,
}

/// The registry root was seeded in both spaces.
pub struct InjectRegistryRootEvent {
    pub timestamp: SystemTime,
    pub root_channel: Vec<u8>,
}

pub struct CloseRuntimeEvent {
    pub timestamp: SystemTime,
    pub storage_location: PathBuf,
}

/// A process was evaluated in the live space.
pub struct EvaluateEvent {
    pub timestamp: SystemTime,
    pub cost: Cost,
    pub errors: usize,
}

/// A process was evaluated in the replay space against a recorded trace.
pub struct ReplayEvaluateEvent {
    pub timestamp: SystemTime,
    pub cost: Cost,
    pub errors: usize,
    pub rigged_events: usize,
}

/// A score map was built from a DAG snapshot.
pub struct BuildScoresEvent {
    pub timestamp: SystemTime,
    pub validators: usize,
    pub scored_blocks: usize,
}

/// The fork choice tips were computed.
pub struct ComputeTipsEvent {
    pub timestamp: SystemTime,
    pub genesis: BlockHash,
    pub tips: Vec<BlockHash>,
}
