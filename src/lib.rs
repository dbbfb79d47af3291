/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The execution and fork choice core of a blockchain node.
//!
//! The [runtime](runtime) evaluates process terms against a metered [tuple space](rspace), with a
//! replay twin that re-executes recorded traces, and bootstraps the built-in
//! [system processes](interpreter::system_processes) and name [registry](interpreter::registry).
//! The [estimator](casper::estimator) picks fork choice tips over the validator-signed block DAG.

pub mod accounting;

pub mod casper;

pub mod events;

pub mod interpreter;

pub(crate) mod logging;

pub mod rspace;

pub mod runtime;

pub mod types;
