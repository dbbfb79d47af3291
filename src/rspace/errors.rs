/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Errors raised by the tuple space and by its history backends.

use std::fmt::{self, Display, Formatter};

use crate::accounting::OutOfPhlogistonsError;

/// Error raised by a [history backend](super::history). These are propagated unchanged by the layers
/// above, up to the caller of the runtime.
#[derive(Debug)]
pub enum StoreError {
    /// The storage directory could not be created or locked.
    Io(std::io::Error),

    /// The database backing the history failed.
    Backend(rocksdb::Error),

    /// Writing `required` more bytes would exceed the configured storage size limit.
    MapFull { limit: u64, required: u64 },

    /// The value stored at `key` cannot be deserialized into its expected type.
    DeserializeValueError { key: Vec<u8>, source: std::io::Error },

    /// The backend has already been closed.
    Closed,
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(err) => write!(f, "History I/O error: {}", err),
            StoreError::Backend(err) => write!(f, "History database error: {}", err),
            StoreError::MapFull { limit, required } => write!(
                f,
                "History size limit of {} bytes exceeded (required {} bytes)",
                limit, required
            ),
            StoreError::DeserializeValueError { key, source } => {
                write!(f, "Cannot deserialize value at key {:?}: {}", key, source)
            }
            StoreError::Closed => write!(f, "History store is closed"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        StoreError::Io(value)
    }
}

impl From<rocksdb::Error> for StoreError {
    fn from(value: rocksdb::Error) -> Self {
        StoreError::Backend(value)
    }
}

/// Divergence between a replayed execution and the trace it was rigged with.
#[derive(Debug)]
pub enum ReplayError {
    /// A COMM happened during replay that the rigged trace does not contain.
    UnexpectedComm { consume: [u8; 32] },

    /// Replay finished, but `count` COMMs of the rigged trace never happened.
    UnusedComms { count: usize },
}

impl Display for ReplayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ReplayError::UnexpectedComm { consume } => write!(
                f,
                "Unexpected COMM event for consume {:?} during replay",
                &consume[..4]
            ),
            ReplayError::UnusedComms { count } => {
                write!(f, "{} COMM events of the replay log were not used", count)
            }
        }
    }
}

/// Errors that may be encountered when operating on a [tuple space](super::pluggables::Tuplespace).
#[derive(Debug)]
pub enum RSpaceError {
    Store(StoreError),
    OutOfPhlogistons(OutOfPhlogistonsError),
    Replay(ReplayError),

    /// A consume or install whose number of channels and patterns differ.
    InvalidJoin { channels: usize, patterns: usize },
}

impl Display for RSpaceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RSpaceError::Store(err) => Display::fmt(err, f),
            RSpaceError::OutOfPhlogistons(err) => Display::fmt(err, f),
            RSpaceError::Replay(err) => Display::fmt(err, f),
            RSpaceError::InvalidJoin { channels, patterns } => write!(
                f,
                "Channel and pattern counts differ ({} channels, {} patterns)",
                channels, patterns
            ),
        }
    }
}

impl From<StoreError> for RSpaceError {
    fn from(value: StoreError) -> Self {
        RSpaceError::Store(value)
    }
}

impl From<OutOfPhlogistonsError> for RSpaceError {
    fn from(value: OutOfPhlogistonsError) -> Self {
        RSpaceError::OutOfPhlogistons(value)
    }
}

impl From<ReplayError> for RSpaceError {
    fn from(value: ReplayError) -> Self {
        RSpaceError::Replay(value)
    }
}
