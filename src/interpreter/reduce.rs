/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The reducer: evaluates [`Process`] terms against a tuple space and dispatches the continuations that
//! fire.
//!
//! Sends become produces, and receives become consumes with a [`ParBody`](TaggedContinuation::ParBody)
//! continuation. When a produce or consume fires a continuation, the continuation is appended to a work
//! queue, followed by the produce or consume itself if it was persistent. The outermost call into the
//! reducer drains the queue in order before returning, so the native stack does not grow with the number
//! of COMMs:
//! - A [`BodyRef`](TaggedContinuation::BodyRef) is looked up in the [dispatch table](DispatchTable) and
//!   its system process called with the matched data.
//! - A `ParBody` has the matched captures substituted for its bound variables and is evaluated with the
//!   merge of the random states of the continuation and of the matched data.
//!
//! The space is locked only for the duration of each tuple-space operation, so system processes can
//! call back into the reducer.
//!
//! Errors raised by system processes are recorded in the [`ErrorLog`] and do not abort the evaluation,
//! unless they are [fatal](InterpreterError::is_fatal).

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use super::{
    errors::{ErrorLog, InterpreterError},
    system_processes::{DispatchTable, OutputSink},
};
use crate::{
    accounting::{
        costs::{RECEIVE_EVAL_COST, SEND_EVAL_COST},
        CostAccounting,
    },
    rspace::{
        internal::{ContResult, RSpaceResult},
        pluggables::Tuplespace,
    },
    types::{
        crypto_primitives::Blake2b512Random,
        term::{
            BindPattern, ListParWithRandom, ParWithRandom, Process, TaggedContinuation, Term,
        },
    },
};

pub struct Reducer {
    space: Arc<Mutex<dyn Tuplespace>>,
    dispatch_table: DispatchTable,
    urn_map: HashMap<String, Term>,
    cost: CostAccounting,
    error_log: ErrorLog,
    output: Arc<dyn OutputSink>,
    work: Mutex<WorkQueue>,
}

/// A step left for the drain loop.
enum Work {
    /// Run a continuation that fired.
    Dispatch(ContResult, Vec<RSpaceResult>),
    /// Send a persistent datum that fired again.
    Produce {
        chan: Term,
        data: Vec<Term>,
        rand: Blake2b512Random,
    },
    /// Issue a persistent receive that fired again.
    Consume {
        channels: Vec<Term>,
        patterns: Vec<BindPattern>,
        continuation: TaggedContinuation,
    },
}

#[derive(Default)]
struct WorkQueue {
    items: VecDeque<Work>,
    draining: bool,
}

impl Reducer {
    pub fn new(
        space: Arc<Mutex<dyn Tuplespace>>,
        dispatch_table: DispatchTable,
        urn_map: HashMap<String, Term>,
        cost: CostAccounting,
        error_log: ErrorLog,
        output: Arc<dyn OutputSink>,
    ) -> Reducer {
        Reducer {
            space,
            dispatch_table,
            urn_map,
            cost,
            error_log,
            output,
            work: Mutex::new(WorkQueue::default()),
        }
    }

    pub fn cost(&self) -> &CostAccounting {
        &self.cost
    }

    pub fn output(&self) -> &dyn OutputSink {
        self.output.as_ref()
    }

    pub fn error_log(&self) -> &ErrorLog {
        &self.error_log
    }

    /// Evaluate `process` with random state `rand`, and every continuation it fires.
    pub fn eval(&self, process: &Process, rand: Blake2b512Random) -> Result<(), InterpreterError> {
        self.drained(|| self.eval_process(process, rand))
    }

    /// Send `data` on `chan` and run whatever continuation it fires. A persistent send that fires is sent
    /// again, so that it stays available.
    pub fn produce(
        &self,
        chan: Term,
        data: Vec<Term>,
        rand: Blake2b512Random,
        persistent: bool,
    ) -> Result<(), InterpreterError> {
        self.drained(|| self.issue_produce(writable(chan)?, data, rand, persistent))
    }

    /// Wait on the channels of `binds` and run `continuation` once they all have matching data. A
    /// persistent receive that fires immediately is issued again, so that it keeps waiting.
    pub fn consume(
        &self,
        binds: Vec<(Term, BindPattern)>,
        continuation: TaggedContinuation,
        persistent: bool,
    ) -> Result<(), InterpreterError> {
        self.drained(|| {
            let (channels, patterns) = readable_binds(binds)?;
            self.issue_consume(channels, patterns, continuation, persistent)
        })
    }

    fn eval_process(&self, process: &Process, rand: Blake2b512Random) -> Result<(), InterpreterError> {
        match process {
            Process::Nil => Ok(()),
            Process::Send {
                chan,
                data,
                persistent,
            } => {
                self.cost.charge(SEND_EVAL_COST)?;
                let chan = writable(self.resolve(chan))?;
                self.issue_produce(chan, data.clone(), rand, *persistent)
            }
            Process::Receive {
                binds,
                body,
                persistent,
            } => {
                self.cost.charge(RECEIVE_EVAL_COST)?;
                let (channels, patterns) = readable_binds(
                    binds
                        .iter()
                        .map(|bind| (self.resolve(&bind.source), bind.pattern.clone()))
                        .collect(),
                )?;
                let continuation = TaggedContinuation::ParBody(ParWithRandom {
                    body: (**body).clone(),
                    random_state: rand,
                });
                self.issue_consume(channels, patterns, continuation, *persistent)
            }
            Process::Par(processes) => {
                for (index, process) in processes.iter().enumerate() {
                    let rand = if index <= u8::MAX as usize {
                        rand.split_byte(index as u8)
                    } else {
                        rand.split_short(index as u16)
                    };
                    self.eval_process(process, rand)?;
                }
                Ok(())
            }
        }
    }

    /// Run `step`, then drain the work queue, unless an enclosing call is already draining it.
    fn drained(
        &self,
        step: impl FnOnce() -> Result<(), InterpreterError>,
    ) -> Result<(), InterpreterError> {
        if self.work.lock().unwrap().draining {
            return step();
        }
        self.work.lock().unwrap().draining = true;
        let result = step().and_then(|()| self.drain());

        // A fatal error abandons whatever is still queued.
        let mut work = self.work.lock().unwrap();
        work.items.clear();
        work.draining = false;
        result
    }

    fn drain(&self) -> Result<(), InterpreterError> {
        loop {
            let next = self.work.lock().unwrap().items.pop_front();
            match next {
                None => return Ok(()),
                Some(Work::Dispatch(cont, data)) => self.dispatch(cont, data)?,
                Some(Work::Produce { chan, data, rand }) => {
                    self.issue_produce(chan, data, rand, true)?
                }
                Some(Work::Consume {
                    channels,
                    patterns,
                    continuation,
                }) => self.issue_consume(channels, patterns, continuation, true)?,
            }
        }
    }

    fn issue_produce(
        &self,
        chan: Term,
        data: Vec<Term>,
        rand: Blake2b512Random,
        persistent: bool,
    ) -> Result<(), InterpreterError> {
        let result = self.space.lock().unwrap().produce(
            chan.clone(),
            ListParWithRandom::new(data.clone(), rand.clone()),
            persistent,
        )?;
        if let Some((cont, matched)) = result {
            let mut work = self.work.lock().unwrap();
            work.items.push_back(Work::Dispatch(cont, matched));
            if persistent {
                work.items.push_back(Work::Produce { chan, data, rand });
            }
        }
        Ok(())
    }

    fn issue_consume(
        &self,
        channels: Vec<Term>,
        patterns: Vec<BindPattern>,
        continuation: TaggedContinuation,
        persistent: bool,
    ) -> Result<(), InterpreterError> {
        let result = self.space.lock().unwrap().consume(
            channels.clone(),
            patterns.clone(),
            continuation.clone(),
            persistent,
        )?;
        if let Some((cont, matched)) = result {
            let mut work = self.work.lock().unwrap();
            work.items.push_back(Work::Dispatch(cont, matched));
            if persistent {
                work.items.push_back(Work::Consume {
                    channels,
                    patterns,
                    continuation,
                });
            }
        }
        Ok(())
    }

    fn dispatch(&self, cont: ContResult, data: Vec<RSpaceResult>) -> Result<(), InterpreterError> {
        match cont.continuation {
            TaggedContinuation::BodyRef(body_ref) => {
                let handler = self
                    .dispatch_table
                    .get(&body_ref)
                    .ok_or(InterpreterError::UnknownBodyRef(body_ref))?;
                log::trace!("Dispatching to system process {}", body_ref);
                let args = data.into_iter().map(|d| d.matched_datum).collect();
                match handler(self, args) {
                    Ok(()) => Ok(()),
                    Err(err) if err.is_fatal() => Err(err),
                    Err(err) => {
                        self.error_log.push(err);
                        Ok(())
                    }
                }
            }
            TaggedContinuation::ParBody(ParWithRandom { body, random_state }) => {
                let mut env = Vec::new();
                let mut rands = vec![random_state];
                for datum in data {
                    env.extend(datum.matched_datum.pars);
                    rands.push(datum.matched_datum.random_state);
                }
                self.eval_process(&body.substitute(&env), Blake2b512Random::merge(&rands))
            }
        }
    }

    fn resolve(&self, chan: &Term) -> Term {
        match chan {
            Term::Uri(urn) => self.urn_map.get(urn).cloned().unwrap_or_else(|| chan.clone()),
            _ => chan.clone(),
        }
    }
}

/// Unwrap the bundles around `chan`, checking that each permits writing.
fn writable(chan: Term) -> Result<Term, InterpreterError> {
    match chan {
        Term::Bundle(bundle) if !bundle.write_flag => Err(InterpreterError::ReadOnlyChannel),
        Term::Bundle(bundle) => writable(bundle.body),
        chan => Ok(chan),
    }
}

fn readable_binds(
    binds: Vec<(Term, BindPattern)>,
) -> Result<(Vec<Term>, Vec<BindPattern>), InterpreterError> {
    let mut channels = Vec::with_capacity(binds.len());
    let mut patterns = Vec::with_capacity(binds.len());
    for (chan, pattern) in binds {
        channels.push(readable(chan)?);
        patterns.push(pattern);
    }
    Ok((channels, patterns))
}

/// Unwrap the bundles around `chan`, checking that each permits reading.
fn readable(chan: Term) -> Result<Term, InterpreterError> {
    match chan {
        Term::Bundle(bundle) if !bundle.read_flag => Err(InterpreterError::WriteOnlyChannel),
        Term::Bundle(bundle) => readable(bundle.body),
        chan => Ok(chan),
    }
}
