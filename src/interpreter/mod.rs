/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Running process terms against a tuple space.
//!
//! The [`Reducer`](reduce::Reducer) evaluates processes and dispatches fired continuations, either to
//! process code or to the built-in [system processes](system_processes), which include the name
//! [registry](registry). Errors raised by contract code at execution time are collected in an
//! [`ErrorLog`](errors::ErrorLog) rather than aborting the evaluation.

pub mod errors;

pub mod reduce;

pub mod registry;

pub mod system_processes;
