//! Types and traits that are used across multiple components of the runtime and of fork choice.
//!
//! Other types and traits, specific to single components, can be found in the modules of those
//! components, e.g., [`crate::rspace::pluggables`].

pub mod basic;

pub mod block;

pub mod crypto_primitives;

pub mod term;
