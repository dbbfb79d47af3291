/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Built-in handlers installed as permanent listeners on fixed channels.
//!
//! Every system process is described by a [`Definition`]: the fixed channel it listens on, the number
//! of values it expects there, the [body ref](BodyRefs) identifying its handler, and optionally the URN
//! contract code reaches it by. The runtime builds one [dispatch table](dispatch_table) per space from
//! the same definitions, and [installs](introduce_system_processes) every definition in both spaces.
//!
//! Body refs are part of the trace of every historical execution, so they are never renumbered.

use std::{collections::HashMap, sync::Arc};

use super::{errors::InterpreterError, reduce::Reducer, registry};
use crate::{
    accounting::costs::{hash_cost, ED25519_VERIFY_COST},
    rspace::pluggables::Tuplespace,
    types::{
        crypto_primitives::{blake2b256, ed25519_verify, keccak256, sha256, Blake2b512Random},
        term::{BindPattern, ListParWithRandom, TaggedContinuation, Term, Var},
    },
};

/// The names system processes listen on. All of them are unforgeable: contract code can only reach
/// them through the [URN map](urn_map).
pub struct FixedChannels;

impl FixedChannels {
    pub fn stdout() -> Term {
        Term::byte_name(0)
    }

    pub fn stdout_ack() -> Term {
        Term::byte_name(1)
    }

    pub fn stderr() -> Term {
        Term::byte_name(2)
    }

    pub fn stderr_ack() -> Term {
        Term::byte_name(3)
    }

    pub fn ed25519_verify() -> Term {
        Term::Private(b"ed25519Verify".to_vec())
    }

    pub fn sha256_hash() -> Term {
        Term::Private(b"sha256Hash".to_vec())
    }

    pub fn keccak256_hash() -> Term {
        Term::Private(b"keccak256Hash".to_vec())
    }

    pub fn blake2b256_hash() -> Term {
        Term::Private(b"blake2b256Hash".to_vec())
    }

    pub fn reg_lookup() -> Term {
        Term::byte_name(9)
    }

    pub fn reg_lookup_callback() -> Term {
        Term::byte_name(10)
    }

    pub fn reg_insert() -> Term {
        Term::byte_name(11)
    }

    pub fn reg_insert_callback() -> Term {
        Term::byte_name(12)
    }

    pub fn reg_register_insert_callback() -> Term {
        Term::byte_name(13)
    }

    pub fn reg_delete() -> Term {
        Term::byte_name(14)
    }

    pub fn reg_delete_root_callback() -> Term {
        Term::byte_name(15)
    }

    pub fn reg_delete_callback() -> Term {
        Term::byte_name(16)
    }

    pub fn reg_public_lookup() -> Term {
        Term::byte_name(17)
    }

    pub fn reg_public_register_random() -> Term {
        Term::byte_name(18)
    }

    pub fn reg_public_register_signed() -> Term {
        Term::byte_name(19)
    }

    /// The channel holding the root map of the registry.
    pub fn reg_root() -> Term {
        Term::Private(REG_ROOT.to_vec())
    }
}

const REG_ROOT: [u8; 32] = [
    0xa4, 0xfd, 0x44, 0x7d, 0xed, 0xfc, 0x96, 0x04, 0x85, 0x98, 0x3e, 0xe8, 0x17, 0x63, 0x2c, 0xf3,
    0x6d, 0x79, 0xf4, 0x5f, 0xd1, 0x79, 0x60, 0x19, 0xed, 0xfb, 0x4a, 0x84, 0xa8, 0x1d, 0x16, 0x97,
];

/// Reserved body refs.
pub struct BodyRefs;

impl BodyRefs {
    pub const STDOUT: i64 = 0;
    pub const STDOUT_ACK: i64 = 1;
    pub const STDERR: i64 = 2;
    pub const STDERR_ACK: i64 = 3;
    pub const ED25519_VERIFY: i64 = 4;
    pub const SHA256_HASH: i64 = 5;
    pub const KECCAK256_HASH: i64 = 6;
    pub const BLAKE2B256_HASH: i64 = 7;
    pub const REG_LOOKUP: i64 = 9;
    pub const REG_LOOKUP_CALLBACK: i64 = 10;
    pub const REG_INSERT: i64 = 11;
    pub const REG_INSERT_CALLBACK: i64 = 12;
    pub const REG_REGISTER_INSERT_CALLBACK: i64 = 13;
    pub const REG_DELETE: i64 = 14;
    pub const REG_DELETE_ROOT_CALLBACK: i64 = 15;
    pub const REG_DELETE_CALLBACK: i64 = 16;
    pub const REG_PUBLIC_LOOKUP: i64 = 17;
    pub const REG_PUBLIC_REGISTER_RANDOM: i64 = 18;
    pub const REG_PUBLIC_REGISTER_SIGNED: i64 = 19;
}

/// A system process. Called by the [`Reducer`] of the space the process fired in, with one
/// [`ListParWithRandom`] per channel of the continuation that fired.
pub type Handler = fn(&Reducer, Vec<ListParWithRandom>) -> Result<(), InterpreterError>;

pub type DispatchTable = HashMap<i64, Handler>;

pub struct Definition {
    pub urn: Option<&'static str>,
    pub fixed_channel: Term,
    pub arity: u32,
    pub body_ref: i64,
    pub handler: Handler,
    pub remainder: Option<Var>,
}

impl Definition {
    pub fn bind_pattern(&self) -> BindPattern {
        BindPattern::free_vars(self.arity, self.remainder)
    }

    /// The term contract code receives for this process's URN: its fixed channel, wrapped in a bundle
    /// that only permits sending.
    pub fn urn_entry(&self) -> Option<(String, Term)> {
        self.urn
            .map(|urn| (urn.to_string(), self.fixed_channel.clone().bundle(true, false)))
    }
}

/// Receives what the standard output and standard error processes print.
pub trait OutputSink: Send + Sync {
    fn stdout(&self, line: &str);

    fn stderr(&self, line: &str);
}

/// Prints to the process's standard output and standard error.
pub struct StdOutput;

impl OutputSink for StdOutput {
    fn stdout(&self, line: &str) {
        println!("{}", line)
    }

    fn stderr(&self, line: &str) {
        eprintln!("{}", line)
    }
}

pub fn std_system_processes() -> Vec<Definition> {
    vec![
        Definition {
            urn: Some("rho:io:stdout"),
            fixed_channel: FixedChannels::stdout(),
            arity: 1,
            body_ref: BodyRefs::STDOUT,
            handler: std_out,
            remainder: None,
        },
        Definition {
            urn: Some("rho:io:stdoutAck"),
            fixed_channel: FixedChannels::stdout_ack(),
            arity: 2,
            body_ref: BodyRefs::STDOUT_ACK,
            handler: std_out_ack,
            remainder: None,
        },
        Definition {
            urn: Some("rho:io:stderr"),
            fixed_channel: FixedChannels::stderr(),
            arity: 1,
            body_ref: BodyRefs::STDERR,
            handler: std_err,
            remainder: None,
        },
        Definition {
            urn: Some("rho:io:stderrAck"),
            fixed_channel: FixedChannels::stderr_ack(),
            arity: 2,
            body_ref: BodyRefs::STDERR_ACK,
            handler: std_err_ack,
            remainder: None,
        },
    ]
}

pub fn std_crypto_processes() -> Vec<Definition> {
    vec![
        Definition {
            urn: Some("rho:crypto:ed25519Verify"),
            fixed_channel: FixedChannels::ed25519_verify(),
            arity: 4,
            body_ref: BodyRefs::ED25519_VERIFY,
            handler: ed25519_verify_process,
            remainder: None,
        },
        Definition {
            urn: Some("rho:crypto:sha256Hash"),
            fixed_channel: FixedChannels::sha256_hash(),
            arity: 2,
            body_ref: BodyRefs::SHA256_HASH,
            handler: sha256_hash_process,
            remainder: None,
        },
        Definition {
            urn: Some("rho:crypto:keccak256Hash"),
            fixed_channel: FixedChannels::keccak256_hash(),
            arity: 2,
            body_ref: BodyRefs::KECCAK256_HASH,
            handler: keccak256_hash_process,
            remainder: None,
        },
        Definition {
            urn: Some("rho:crypto:blake2b256Hash"),
            fixed_channel: FixedChannels::blake2b256_hash(),
            arity: 2,
            body_ref: BodyRefs::BLAKE2B256_HASH,
            handler: blake2b256_hash_process,
            remainder: None,
        },
    ]
}

/// Every system process, in installation order.
pub fn all_definitions() -> Vec<Definition> {
    let mut definitions = std_system_processes();
    definitions.extend(std_crypto_processes());
    definitions.extend(registry::std_registry_processes());
    definitions
}

pub fn dispatch_table(definitions: &[Definition]) -> DispatchTable {
    definitions
        .iter()
        .map(|def| (def.body_ref, def.handler))
        .collect()
}

pub fn urn_map(definitions: &[Definition]) -> HashMap<String, Term> {
    definitions.iter().filter_map(Definition::urn_entry).collect()
}

/// Install every definition on its fixed channel in `space`.
///
/// Fails with [`InterpreterError::Setup`] if a fixed channel already has a listener, or if installing
/// would fire immediately.
pub fn introduce_system_processes<T: Tuplespace + ?Sized>(
    space: &mut T,
    definitions: &[Definition],
) -> Result<(), InterpreterError> {
    for def in definitions {
        let channels = vec![def.fixed_channel.clone()];
        if !space.get_waiting_continuations(&channels)?.is_empty() {
            return Err(InterpreterError::Setup(format!(
                "System process {} already has a listener on {}",
                def.body_ref, def.fixed_channel
            )));
        }
        let result = space.install(
            channels,
            vec![def.bind_pattern()],
            TaggedContinuation::BodyRef(def.body_ref),
        )?;
        if result.is_some() {
            return Err(InterpreterError::Setup(
                "Installing can be done only on startup".to_string(),
            ));
        }
    }
    Ok(())
}

/* ↓↓↓ Argument helpers ↓↓↓ */

/// Destructure the arguments of a single-channel system process into exactly `N` terms.
pub(crate) fn single_channel_args<const N: usize>(
    mut args: Vec<ListParWithRandom>,
    process: &str,
) -> Result<([Term; N], Blake2b512Random), InterpreterError> {
    if args.len() != 1 {
        return Err(illegal(process));
    }
    let ListParWithRandom { pars, random_state } = args.remove(0);
    let pars: [Term; N] = pars.try_into().map_err(|_| illegal(process))?;
    Ok((pars, random_state))
}

pub(crate) fn illegal(process: &str) -> InterpreterError {
    InterpreterError::IllegalArgument(format!("{}: unexpected arguments", process))
}

/* ↓↓↓ I/O ↓↓↓ */

fn std_out(reducer: &Reducer, args: Vec<ListParWithRandom>) -> Result<(), InterpreterError> {
    let ([msg], _) = single_channel_args::<1>(args, "stdout")?;
    reducer.output().stdout(&render(&msg));
    Ok(())
}

fn std_out_ack(reducer: &Reducer, args: Vec<ListParWithRandom>) -> Result<(), InterpreterError> {
    let ([msg, ack], rand) = single_channel_args::<2>(args, "stdoutAck")?;
    reducer.output().stdout(&render(&msg));
    reducer.produce(ack, vec![Term::Nil], rand, false)
}

fn std_err(reducer: &Reducer, args: Vec<ListParWithRandom>) -> Result<(), InterpreterError> {
    let ([msg], _) = single_channel_args::<1>(args, "stderr")?;
    reducer.output().stderr(&render(&msg));
    Ok(())
}

fn std_err_ack(reducer: &Reducer, args: Vec<ListParWithRandom>) -> Result<(), InterpreterError> {
    let ([msg, ack], rand) = single_channel_args::<2>(args, "stderrAck")?;
    reducer.output().stderr(&render(&msg));
    reducer.produce(ack, vec![Term::Nil], rand, false)
}

/// Strings are printed without quotes; every other term as it displays.
fn render(term: &Term) -> String {
    match term {
        Term::Str(s) => s.clone(),
        other => other.to_string(),
    }
}

/* ↓↓↓ Crypto ↓↓↓ */

fn ed25519_verify_process(
    reducer: &Reducer,
    args: Vec<ListParWithRandom>,
) -> Result<(), InterpreterError> {
    match single_channel_args::<4>(args, "ed25519Verify")? {
        ([Term::Bytes(data), Term::Bytes(signature), Term::Bytes(public_key), ret], rand) => {
            reducer.cost().charge(ED25519_VERIFY_COST)?;
            let verified = ed25519_verify(&data, &signature, &public_key);
            reducer.produce(ret, vec![Term::Bool(verified)], rand, false)
        }
        _ => Err(InterpreterError::IllegalArgument(
            "ed25519Verify expects data, signature, and public key as byte arrays, and a return channel"
                .to_string(),
        )),
    }
}

fn hash_process(
    reducer: &Reducer,
    args: Vec<ListParWithRandom>,
    process: &str,
    hash: fn(&[u8]) -> [u8; 32],
) -> Result<(), InterpreterError> {
    match single_channel_args::<2>(args, process)? {
        ([Term::Bytes(input), ret], rand) => {
            reducer.cost().charge(hash_cost(input.len()))?;
            reducer.produce(ret, vec![Term::Bytes(hash(&input).to_vec())], rand, false)
        }
        _ => Err(InterpreterError::IllegalArgument(format!(
            "{} expects a byte array and a return channel",
            process
        ))),
    }
}

fn sha256_hash_process(reducer: &Reducer, args: Vec<ListParWithRandom>) -> Result<(), InterpreterError> {
    hash_process(reducer, args, "sha256Hash", sha256)
}

fn keccak256_hash_process(
    reducer: &Reducer,
    args: Vec<ListParWithRandom>,
) -> Result<(), InterpreterError> {
    hash_process(reducer, args, "keccak256Hash", keccak256)
}

fn blake2b256_hash_process(
    reducer: &Reducer,
    args: Vec<ListParWithRandom>,
) -> Result<(), InterpreterError> {
    hash_process(reducer, args, "blake2b256Hash", blake2b256)
}

/// The default output sink.
pub fn std_output() -> Arc<dyn OutputSink> {
    Arc::new(StdOutput)
}
