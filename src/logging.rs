/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the runtime's
//! [configuration](crate::runtime::RuntimeConfiguration) or when constructing an
//! [`Estimator`](crate::casper::estimator::Estimator).
//!
//! This crate logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [ComputeTips](crate::events::ComputeTipsEvent) is printed:
//!
//! ```text
//! ComputeTips, 1701329264, fNGCJyk, 2, Id5u7f6
//! ```
//!
//! In the snippet:
//! - The third value is the first seven characters of the Base64 encoding of the genesis hash.
//! - The fourth value is the number of tips.
//! - The fifth value is the first seven characters of the Base64 encoding of the highest scoring tip.

use std::time::SystemTime;

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};

use crate::events::*;

// Names of each event in PascalCase for printing:
pub const CREATE_RUNTIME: &str = "CreateRuntime";
pub const INSTALL_SYSTEM_PROCESSES: &str = "InstallSystemProcesses";
pub const INJECT_REGISTRY_ROOT: &str = "InjectRegistryRoot";
pub const CLOSE_RUNTIME: &str = "CloseRuntime";

pub const EVALUATE: &str = "Evaluate";
pub const REPLAY_EVALUATE: &str = "ReplayEvaluate";

pub const BUILD_SCORES: &str = "BuildScores";
pub const COMPUTE_TIPS: &str = "ComputeTips";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for CreateRuntimeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |create_runtime_event: &CreateRuntimeEvent| {
            log::info!(
                "{}, {}, {:?}, {:?}, {}",
                CREATE_RUNTIME,
                secs_since_unix_epoch(create_runtime_event.timestamp),
                create_runtime_event.storage_mode,
                create_runtime_event.storage_location,
                first_seven_base64_chars(&create_runtime_event.root)
            )
        };
        Box::new(logger)
    }
}

impl Logger for InstallSystemProcessesEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |install_event: &InstallSystemProcessesEvent| {
            log::info!(
                "{}, {}, {}",
                INSTALL_SYSTEM_PROCESSES,
                secs_since_unix_epoch(install_event.timestamp),
                install_event.processes
            )
        };
        Box::new(logger)
    }
}

impl Logger for InjectRegistryRootEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |inject_event: &InjectRegistryRootEvent| {
            log::info!(
                "{}, {}, {}",
                INJECT_REGISTRY_ROOT,
                secs_since_unix_epoch(inject_event.timestamp),
                first_seven_base64_chars(&inject_event.root_channel)
            )
        };
        Box::new(logger)
    }
}

impl Logger for CloseRuntimeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |close_runtime_event: &CloseRuntimeEvent| {
            log::info!(
                "{}, {}, {:?}",
                CLOSE_RUNTIME,
                secs_since_unix_epoch(close_runtime_event.timestamp),
                close_runtime_event.storage_location
            )
        };
        Box::new(logger)
    }
}

impl Logger for EvaluateEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |evaluate_event: &EvaluateEvent| {
            log::info!(
                "{}, {}, {}, {}",
                EVALUATE,
                secs_since_unix_epoch(evaluate_event.timestamp),
                evaluate_event.cost,
                evaluate_event.errors
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReplayEvaluateEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |replay_evaluate_event: &ReplayEvaluateEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                REPLAY_EVALUATE,
                secs_since_unix_epoch(replay_evaluate_event.timestamp),
                replay_evaluate_event.cost,
                replay_evaluate_event.errors,
                replay_evaluate_event.rigged_events
            )
        };
        Box::new(logger)
    }
}

impl Logger for BuildScoresEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |build_scores_event: &BuildScoresEvent| {
            log::info!(
                "{}, {}, {}, {}",
                BUILD_SCORES,
                secs_since_unix_epoch(build_scores_event.timestamp),
                build_scores_event.validators,
                build_scores_event.scored_blocks
            )
        };
        Box::new(logger)
    }
}

impl Logger for ComputeTipsEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |compute_tips_event: &ComputeTipsEvent| {
            let best = match compute_tips_event.tips.first() {
                Some(tip) => first_seven_base64_chars(&tip.bytes()),
                None => String::from("None"),
            };
            log::info!(
                "{}, {}, {}, {}, {}",
                COMPUTE_TIPS,
                secs_since_unix_epoch(compute_tips_event.timestamp),
                first_seven_base64_chars(&compute_tips_event.genesis.bytes()),
                compute_tips_event.tips.len(),
                best
            )
        };
        Box::new(logger)
    }
}

fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("Event occured before the Unix Epoch.")
        .as_secs()
}
