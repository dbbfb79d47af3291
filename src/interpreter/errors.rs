/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Errors raised while setting up or running the interpreter, and the [`ErrorLog`] that collects the
//! errors contract code raises at execution time.

use std::{
    fmt::{self, Display, Formatter},
    path::PathBuf,
    sync::{Arc, Mutex},
};

use crate::{
    accounting::OutOfPhlogistonsError,
    rspace::errors::{RSpaceError, ReplayError, StoreError},
};

#[derive(Debug)]
pub enum InterpreterError {
    /// An anomaly during runtime construction. The runtime must not be used.
    Setup(String),

    /// An error raised by a space's history backend, propagated unchanged.
    Store(StoreError),

    OutOfPhlogistons(OutOfPhlogistonsError),

    Replay(ReplayError),

    /// A system process or an operation was called with arguments of the wrong shape.
    IllegalArgument(String),

    /// A continuation refers to a body ref that the dispatch table does not contain.
    UnknownBodyRef(i64),

    /// A send on a bundle that does not permit writing.
    ReadOnlyChannel,

    /// A receive on a bundle that does not permit reading.
    WriteOnlyChannel,

    RuntimeClosed,

    /// Another runtime holds the storage context at this location.
    ContextLocked(PathBuf),
}

impl InterpreterError {
    /// Whether this error aborts the evaluation that raised it, instead of only being recorded in the
    /// error log.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            InterpreterError::Store(_)
                | InterpreterError::OutOfPhlogistons(_)
                | InterpreterError::Replay(_)
        )
    }
}

impl Display for InterpreterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            InterpreterError::Setup(msg) => write!(f, "Setup error: {}", msg),
            InterpreterError::Store(err) => Display::fmt(err, f),
            InterpreterError::OutOfPhlogistons(err) => Display::fmt(err, f),
            InterpreterError::Replay(err) => Display::fmt(err, f),
            InterpreterError::IllegalArgument(msg) => write!(f, "Illegal argument: {}", msg),
            InterpreterError::UnknownBodyRef(body_ref) => {
                write!(f, "No system process is registered for body ref {}", body_ref)
            }
            InterpreterError::ReadOnlyChannel => write!(f, "Trying to send on a non-writeable channel"),
            InterpreterError::WriteOnlyChannel => {
                write!(f, "Trying to receive on a non-readable channel")
            }
            InterpreterError::RuntimeClosed => write!(f, "The runtime has been closed"),
            InterpreterError::ContextLocked(path) => {
                write!(f, "Storage context at {:?} is used by another runtime", path)
            }
        }
    }
}

impl std::error::Error for InterpreterError {}

impl From<StoreError> for InterpreterError {
    fn from(value: StoreError) -> Self {
        InterpreterError::Store(value)
    }
}

impl From<OutOfPhlogistonsError> for InterpreterError {
    fn from(value: OutOfPhlogistonsError) -> Self {
        InterpreterError::OutOfPhlogistons(value)
    }
}

impl From<RSpaceError> for InterpreterError {
    fn from(value: RSpaceError) -> Self {
        match value {
            RSpaceError::Store(err) => InterpreterError::Store(err),
            RSpaceError::OutOfPhlogistons(err) => InterpreterError::OutOfPhlogistons(err),
            RSpaceError::Replay(err) => InterpreterError::Replay(err),
            err @ RSpaceError::InvalidJoin { .. } => InterpreterError::IllegalArgument(err.to_string()),
        }
    }
}

/// A shared sink for errors raised by contract code. Clones refer to the same log.
#[derive(Clone, Debug, Default)]
pub struct ErrorLog(Arc<Mutex<Vec<InterpreterError>>>);

impl ErrorLog {
    pub fn new() -> ErrorLog {
        ErrorLog::default()
    }

    pub fn push(&self, error: InterpreterError) {
        log::debug!("Recording interpreter error: {}", error);
        self.0.lock().unwrap().push(error);
    }

    /// Take every error recorded so far, leaving the log empty. Errors pushed before this call returns
    /// are either returned or left in the log; none are lost.
    pub fn read_and_clear(&self) -> Vec<InterpreterError> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().unwrap().is_empty()
    }
}
