/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Process-calculus data carried through the tuple space.
//!
//! The runtime treats these as an opaque algebra: channels and payloads are [`Term`]s, receive shapes
//! are [`BindPattern`]s, and what a matched receive releases is a [`TaggedContinuation`]. Everything
//! here is Borsh-serializable, since the [tuple space](crate::rspace) content-addresses and persists
//! it.

use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
};

use borsh::{BorshDeserialize, BorshSerialize};

use super::crypto_primitives::Blake2b512Random;

/// A process-calculus value. Any term may be used as a channel.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub enum Term {
    Nil,
    Bool(bool),
    Int(i64),
    Str(String),
    Uri(String),
    Bytes(Vec<u8>),
    /// An unforgeable name. Contract code can only obtain one by being handed it.
    Private(Vec<u8>),
    Var(Var),
    List(Vec<Term>),
    Tuple(Vec<Term>),
    Map(BTreeMap<Term, Term>),
    Bundle(Box<Bundle>),
}

impl Term {
    /// A private name made of a single byte, as used by the fixed system channels.
    pub fn byte_name(byte: u8) -> Term {
        Term::Private(vec![byte])
    }

    pub fn empty_map() -> Term {
        Term::Map(BTreeMap::new())
    }

    /// Wrap `self` in a bundle restricting what can be done with it.
    pub fn bundle(self, write_flag: bool, read_flag: bool) -> Term {
        Term::Bundle(Box::new(Bundle {
            body: self,
            write_flag,
            read_flag,
        }))
    }

    /// Replace every bound variable `i < env.len()` with `env[i]`, and shift the remaining bound
    /// variables down by `env.len()` so that they keep pointing at binders that have not fired yet.
    pub fn substitute(&self, env: &[Term]) -> Term {
        match self {
            Term::Var(Var::Bound(index)) => {
                let index = *index as usize;
                if index < env.len() {
                    env[index].clone()
                } else {
                    Term::Var(Var::Bound((index - env.len()) as u32))
                }
            }
            Term::List(terms) => Term::List(terms.iter().map(|t| t.substitute(env)).collect()),
            Term::Tuple(terms) => Term::Tuple(terms.iter().map(|t| t.substitute(env)).collect()),
            Term::Map(map) => Term::Map(
                map.iter()
                    .map(|(k, v)| (k.substitute(env), v.substitute(env)))
                    .collect(),
            ),
            Term::Bundle(bundle) => Term::Bundle(Box::new(Bundle {
                body: bundle.body.substitute(env),
                write_flag: bundle.write_flag,
                read_flag: bundle.read_flag,
            })),
            other => other.clone(),
        }
    }
}

impl Display for Term {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Term::Nil => write!(f, "Nil"),
            Term::Bool(b) => write!(f, "{}", b),
            Term::Int(i) => write!(f, "{}", i),
            Term::Str(s) => write!(f, "{:?}", s),
            Term::Uri(uri) => write!(f, "`{}`", uri),
            Term::Bytes(bytes) => write!(f, "0x{}", hex(bytes)),
            Term::Private(bytes) => write!(f, "Unforgeable(0x{})", hex(bytes)),
            Term::Var(Var::Free(i)) => write!(f, "free{}", i),
            Term::Var(Var::Bound(i)) => write!(f, "x{}", i),
            Term::Var(Var::Wildcard) => write!(f, "_"),
            Term::List(terms) => write!(f, "[{}]", join(terms)),
            Term::Tuple(terms) => write!(f, "({})", join(terms)),
            Term::Map(map) => {
                let entries: Vec<String> = map.iter().map(|(k, v)| format!("{} : {}", k, v)).collect();
                write!(f, "{{{}}}", entries.join(", "))
            }
            Term::Bundle(bundle) => {
                let symbol = match (bundle.write_flag, bundle.read_flag) {
                    (true, true) => "bundle0",
                    (true, false) => "bundle+",
                    (false, true) => "bundle-",
                    (false, false) => "bundle",
                };
                write!(f, "{} {{ {} }}", symbol, bundle.body)
            }
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn join(terms: &[Term]) -> String {
    terms
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<String>>()
        .join(", ")
}

/// Variables occurring in patterns (`Free`, `Wildcard`) and in continuation bodies (`Bound`).
///
/// `Free(i)` captures into position `i` of its bind's captures. `Bound(i)` refers to position `i` of the
/// environment a continuation body is substituted with (the concatenated captures of all its binds).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub enum Var {
    Free(u32),
    Bound(u32),
    Wildcard,
}

/// A channel wrapped with read/write permissions.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub struct Bundle {
    pub body: Term,
    pub write_flag: bool,
    pub read_flag: bool,
}

/// The shape a receive expects on one channel: an ordered sequence of patterns, an optional remainder
/// variable that captures any extra values as a list, and the number of free variables the patterns bind.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub struct BindPattern {
    pub patterns: Vec<Term>,
    pub remainder: Option<Var>,
    pub free_count: u32,
}

impl BindPattern {
    /// A pattern made of `arity` free variables, e.g., the pattern of a system process.
    pub fn free_vars(arity: u32, remainder: Option<Var>) -> BindPattern {
        BindPattern {
            patterns: (0..arity).map(|i| Term::Var(Var::Free(i))).collect(),
            free_count: arity + remainder.map_or(0, |_| 1),
            remainder,
        }
    }

    pub fn arity(&self) -> usize {
        self.patterns.len()
    }
}

/// The payload of a produce: a sequence of terms, together with the random state of the process that
/// sent them.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub struct ListParWithRandom {
    pub pars: Vec<Term>,
    pub random_state: Blake2b512Random,
}

impl ListParWithRandom {
    pub fn new(pars: Vec<Term>, random_state: Blake2b512Random) -> Self {
        Self { pars, random_state }
    }
}

/// A process body, together with the random state it will run with.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub struct ParWithRandom {
    pub body: Process,
    pub random_state: Blake2b512Random,
}

/// What a matched receive releases.
///
/// A `BodyRef` refers to a built-in handler in the [system process
/// table](crate::interpreter::system_processes); a `ParBody` is ordinary process code.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub enum TaggedContinuation {
    BodyRef(i64),
    ParBody(ParWithRandom),
}

/// One channel of a receive.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub struct ReceiveBind {
    pub source: Term,
    pub pattern: BindPattern,
}

impl ReceiveBind {
    pub fn new(source: Term, pattern: BindPattern) -> Self {
        Self { source, pattern }
    }
}

/// The process terms the [reducer](crate::interpreter::reduce::Reducer) evaluates.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub enum Process {
    Nil,
    Send {
        chan: Term,
        data: Vec<Term>,
        persistent: bool,
    },
    Receive {
        binds: Vec<ReceiveBind>,
        body: Box<Process>,
        persistent: bool,
    },
    Par(Vec<Process>),
}

impl Process {
    pub fn send(chan: Term, data: Vec<Term>) -> Process {
        Process::Send {
            chan,
            data,
            persistent: false,
        }
    }

    pub fn receive(binds: Vec<ReceiveBind>, body: Process) -> Process {
        Process::Receive {
            binds,
            body: Box::new(body),
            persistent: false,
        }
    }

    /// Substitute `env` into every term of this process. See [`Term::substitute`].
    pub fn substitute(&self, env: &[Term]) -> Process {
        match self {
            Process::Nil => Process::Nil,
            Process::Send {
                chan,
                data,
                persistent,
            } => Process::Send {
                chan: chan.substitute(env),
                data: data.iter().map(|t| t.substitute(env)).collect(),
                persistent: *persistent,
            },
            Process::Receive {
                binds,
                body,
                persistent,
            } => Process::Receive {
                binds: binds
                    .iter()
                    .map(|bind| ReceiveBind {
                        source: bind.source.substitute(env),
                        pattern: bind.pattern.clone(),
                    })
                    .collect(),
                body: Box::new(body.substitute(env)),
                persistent: *persistent,
            },
            Process::Par(processes) => {
                Process::Par(processes.iter().map(|p| p.substitute(env)).collect())
            }
        }
    }
}
