/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The name registry: a key-value map stored in the tuple space, shared by every contract.
//!
//! ## Layout
//!
//! The registry is a two-level trie. The [root channel](FixedChannels::reg_root) holds a single map from
//! the first byte of a key (as an `Int`) to the private channel of a subtree. Each subtree channel holds
//! a single map from full keys (as `Bytes`) to values. The root is seeded with an empty map by
//! [`inject_empty_registry_root`] when the runtime is created.
//!
//! ## Operations
//!
//! Operations are continuation-passing. An entry handler parks its arguments on a fresh private channel
//! (named from the caller's random state), then waits on the join of a map channel and the parked
//! arguments with a callback body ref. The callback takes the map, puts it back (updated if the
//! operation writes), and either answers on the caller's return channel or descends into a subtree by
//! parking its arguments again.
//!
//! ## Public entries
//!
//! Entries registered through the public entry points are stored as a pair `(nonce, value)` and are
//! identified by a `rho:id:` URI: the URL-safe Base64 encoding of their key.
//! - `insertArbitrary` derives the key from the caller's random state; the nonce is `Nil`.
//! - `insertSigned:ed25519` uses `blake2b256(public_key)` as the key, and requires an ed25519 signature
//!   over the Borsh encoding of the `(nonce, value)` tuple. A signed entry can only be replaced by one
//!   with a greater nonce.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

use super::{
    errors::InterpreterError,
    reduce::Reducer,
    system_processes::{
        illegal, single_channel_args, BodyRefs, Definition, FixedChannels, Handler,
    },
};
use crate::{
    accounting::costs::ED25519_VERIFY_COST,
    rspace::pluggables::Tuplespace,
    types::{
        crypto_primitives::{blake2b256, ed25519_verify, Blake2b512Random},
        term::{BindPattern, ListParWithRandom, TaggedContinuation, Term},
    },
};

const BOOTSTRAP_SEED: &str = "Decentralization is based on the simple notion that it is easier to macrobull***t than microbull***t. \
     Decentralization reduces large structural asymmetries.";

const URI_PREFIX: &str = "rho:id:";

/// The random state the registry root is seeded with, identical on every node and in both spaces.
pub fn bootstrap_rand() -> Blake2b512Random {
    Blake2b512Random::create_from_bytes(BOOTSTRAP_SEED.as_bytes())
}

/// Seed the registry root channel with an empty map, first in `space`, then in `replay_space`.
///
/// # Errors
///
/// - [`InterpreterError::Setup`] if the root channel already holds data in either space, or if the
///   produce fires a continuation in either space.
/// - The error of the underlying store, unchanged, if a produce fails.
pub fn inject_empty_registry_root<S, R>(
    space: &mut S,
    replay_space: &mut R,
) -> Result<(), InterpreterError>
where
    S: Tuplespace + ?Sized,
    R: Tuplespace + ?Sized,
{
    let root = FixedChannels::reg_root();
    if !space.get_data(&root)?.is_empty() || !replay_space.get_data(&root)?.is_empty() {
        return Err(InterpreterError::Setup(
            "Registry root channel is not empty.".to_string(),
        ));
    }

    let datum = ListParWithRandom::new(vec![Term::empty_map()], bootstrap_rand());
    if space.produce(root.clone(), datum.clone(), false)?.is_some() {
        return Err(InterpreterError::Setup(
            "Registry insertion fired continuation.".to_string(),
        ));
    }
    if replay_space.produce(root, datum, false)?.is_some() {
        return Err(InterpreterError::Setup(
            "Registry insertion in replay fired continuation.".to_string(),
        ));
    }
    Ok(())
}

pub fn std_registry_processes() -> Vec<Definition> {
    let internal = |fixed_channel: Term, arity: u32, body_ref: i64, handler: Handler| Definition {
        urn: None,
        fixed_channel,
        arity,
        body_ref,
        handler,
        remainder: None,
    };
    vec![
        internal(FixedChannels::reg_lookup(), 2, BodyRefs::REG_LOOKUP, lookup),
        internal(
            FixedChannels::reg_lookup_callback(),
            2,
            BodyRefs::REG_LOOKUP_CALLBACK,
            lookup_callback,
        ),
        internal(FixedChannels::reg_insert(), 3, BodyRefs::REG_INSERT, insert),
        internal(
            FixedChannels::reg_insert_callback(),
            2,
            BodyRefs::REG_INSERT_CALLBACK,
            insert_callback,
        ),
        internal(
            FixedChannels::reg_register_insert_callback(),
            2,
            BodyRefs::REG_REGISTER_INSERT_CALLBACK,
            register_insert_callback,
        ),
        internal(FixedChannels::reg_delete(), 2, BodyRefs::REG_DELETE, delete),
        internal(
            FixedChannels::reg_delete_root_callback(),
            2,
            BodyRefs::REG_DELETE_ROOT_CALLBACK,
            delete_root_callback,
        ),
        internal(
            FixedChannels::reg_delete_callback(),
            2,
            BodyRefs::REG_DELETE_CALLBACK,
            delete_callback,
        ),
        Definition {
            urn: Some("rho:registry:lookup"),
            fixed_channel: FixedChannels::reg_public_lookup(),
            arity: 2,
            body_ref: BodyRefs::REG_PUBLIC_LOOKUP,
            handler: public_lookup,
            remainder: None,
        },
        Definition {
            urn: Some("rho:registry:insertArbitrary"),
            fixed_channel: FixedChannels::reg_public_register_random(),
            arity: 2,
            body_ref: BodyRefs::REG_PUBLIC_REGISTER_RANDOM,
            handler: public_register_random,
            remainder: None,
        },
        Definition {
            urn: Some("rho:registry:insertSigned:ed25519"),
            fixed_channel: FixedChannels::reg_public_register_signed(),
            arity: 4,
            body_ref: BodyRefs::REG_PUBLIC_REGISTER_SIGNED,
            handler: public_register_signed,
            remainder: None,
        },
    ]
}

/// The `rho:id:` URI of a registry key.
pub fn build_uri(key: &[u8]) -> String {
    format!("{}{}", URI_PREFIX, URL_SAFE_NO_PAD.encode(key))
}

/// The registry key a `rho:id:` URI identifies.
pub fn parse_uri(uri: &str) -> Option<Vec<u8>> {
    let key = URL_SAFE_NO_PAD.decode(uri.strip_prefix(URI_PREFIX)?).ok()?;
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

/* ↓↓↓ Plumbing ↓↓↓ */

/// Park `parked` on a fresh channel, then wait on `chan` together with it, continuing with `callback`.
fn join_with(
    reducer: &Reducer,
    chan: Term,
    parked: Vec<Term>,
    mut rand: Blake2b512Random,
    callback: i64,
) -> Result<(), InterpreterError> {
    let parked_chan = Term::Private(rand.next().to_vec());
    let arity = parked.len() as u32;
    reducer.produce(parked_chan.clone(), parked, rand.clone(), false)?;
    reducer.consume(
        vec![
            (chan, BindPattern::free_vars(1, None)),
            (parked_chan, BindPattern::free_vars(arity, None)),
        ],
        TaggedContinuation::BodyRef(callback),
        false,
    )
}

/// Split the arguments of a callback into the value taken from the joined channel, the parked
/// arguments, and the random state they were parked with.
///
/// Callbacks normally fire on the join set up by [`join_with`]. When called on their own fixed channel,
/// they expect the value and the list of parked arguments as a pair.
fn callback_args(
    args: Vec<ListParWithRandom>,
    process: &str,
) -> Result<(Term, Vec<Term>, Blake2b512Random), InterpreterError> {
    let mut args = args.into_iter();
    match (args.next(), args.next(), args.next()) {
        (Some(joined), Some(parked), None) => {
            let [value]: [Term; 1] = joined.pars.try_into().map_err(|_| illegal(process))?;
            Ok((value, parked.pars, parked.random_state))
        }
        (Some(direct), None, None) => match <[Term; 2]>::try_from(direct.pars) {
            Ok([value, Term::List(parked)]) => Ok((value, parked, direct.random_state)),
            _ => Err(illegal(process)),
        },
        _ => Err(illegal(process)),
    }
}

fn key_bytes(key: Term, process: &str) -> Result<Vec<u8>, InterpreterError> {
    match key {
        Term::Bytes(key) if !key.is_empty() => Ok(key),
        _ => Err(InterpreterError::IllegalArgument(format!(
            "{}: keys must be non-empty byte arrays",
            process
        ))),
    }
}

fn map_entries(map: Term, process: &str) -> Result<BTreeMap<Term, Term>, InterpreterError> {
    match map {
        Term::Map(entries) => Ok(entries),
        _ => Err(InterpreterError::IllegalArgument(format!(
            "{}: registry channel does not hold a map",
            process
        ))),
    }
}

fn put_back(
    reducer: &Reducer,
    chan: Term,
    entries: BTreeMap<Term, Term>,
    rand: Blake2b512Random,
) -> Result<(), InterpreterError> {
    reducer.produce(chan, vec![Term::Map(entries)], rand, false)
}

fn subtree_slot(key: &[u8]) -> Term {
    Term::Int(key[0] as i64)
}

/* ↓↓↓ Lookup ↓↓↓ */

fn lookup(reducer: &Reducer, args: Vec<ListParWithRandom>) -> Result<(), InterpreterError> {
    let ([key, ret], rand) = single_channel_args::<2>(args, "registry lookup")?;
    let key = key_bytes(key, "registry lookup")?;
    start_lookup(reducer, key, ret, false, rand)
}

fn public_lookup(reducer: &Reducer, args: Vec<ListParWithRandom>) -> Result<(), InterpreterError> {
    let ([uri, ret], rand) = single_channel_args::<2>(args, "registry public lookup")?;
    let key = match &uri {
        Term::Uri(uri) => parse_uri(uri),
        _ => None,
    }
    .ok_or_else(|| {
        InterpreterError::IllegalArgument(format!("registry public lookup: {} is not a rho:id URI", uri))
    })?;
    start_lookup(reducer, key, ret, true, rand)
}

fn start_lookup(
    reducer: &Reducer,
    key: Vec<u8>,
    ret: Term,
    public: bool,
    rand: Blake2b512Random,
) -> Result<(), InterpreterError> {
    let root = FixedChannels::reg_root();
    join_with(
        reducer,
        root.clone(),
        vec![Term::Bytes(key), ret, root, Term::Bool(public)],
        rand,
        BodyRefs::REG_LOOKUP_CALLBACK,
    )
}

fn lookup_callback(reducer: &Reducer, args: Vec<ListParWithRandom>) -> Result<(), InterpreterError> {
    const PROCESS: &str = "registry lookup callback";
    let (map, parked, rand) = callback_args(args, PROCESS)?;
    let (key, ret, map_chan, public) = match <[Term; 4]>::try_from(parked) {
        Ok([key, ret, map_chan, Term::Bool(public)]) => (key_bytes(key, PROCESS)?, ret, map_chan, public),
        _ => return Err(illegal(PROCESS)),
    };
    let entries = map_entries(map, PROCESS)?;

    if map_chan == FixedChannels::reg_root() {
        let subtree = entries.get(&subtree_slot(&key)).cloned();
        put_back(reducer, map_chan, entries, rand.split_byte(0))?;
        match subtree {
            Some(subtree) => join_with(
                reducer,
                subtree.clone(),
                vec![Term::Bytes(key), ret, subtree, Term::Bool(public)],
                rand.split_byte(1),
                BodyRefs::REG_LOOKUP_CALLBACK,
            ),
            None => reducer.produce(ret, vec![Term::Nil], rand.split_byte(1), false),
        }
    } else {
        let value = match (entries.get(&Term::Bytes(key)), public) {
            (Some(Term::Tuple(pair)), true) if pair.len() == 2 => pair[1].clone(),
            (Some(_), true) | (None, _) => Term::Nil,
            (Some(value), false) => value.clone(),
        };
        put_back(reducer, map_chan, entries, rand.split_byte(0))?;
        reducer.produce(ret, vec![value], rand.split_byte(1), false)
    }
}

/* ↓↓↓ Insert ↓↓↓ */

fn insert(reducer: &Reducer, args: Vec<ListParWithRandom>) -> Result<(), InterpreterError> {
    let ([key, value, ret], rand) = single_channel_args::<3>(args, "registry insert")?;
    let key = key_bytes(key, "registry insert")?;
    start_insert(reducer, key, value, ret, Term::Nil, rand)
}

/// Insert `value` under `key` and send it on `ret`. If `guard` is an `Int` nonce, an existing signed
/// entry is only replaced if its nonce is smaller; otherwise `Nil` is sent on `ret`.
fn start_insert(
    reducer: &Reducer,
    key: Vec<u8>,
    value: Term,
    ret: Term,
    guard: Term,
    rand: Blake2b512Random,
) -> Result<(), InterpreterError> {
    let root = FixedChannels::reg_root();
    join_with(
        reducer,
        root.clone(),
        vec![Term::Bytes(key), value, ret, root, guard],
        rand,
        BodyRefs::REG_INSERT_CALLBACK,
    )
}

fn insert_callback(reducer: &Reducer, args: Vec<ListParWithRandom>) -> Result<(), InterpreterError> {
    const PROCESS: &str = "registry insert callback";
    let (map, parked, mut rand) = callback_args(args, PROCESS)?;
    let [key, value, ret, map_chan, guard] =
        <[Term; 5]>::try_from(parked).map_err(|_| illegal(PROCESS))?;
    let key = key_bytes(key, PROCESS)?;
    let mut entries = map_entries(map, PROCESS)?;

    if map_chan == FixedChannels::reg_root() {
        let slot = subtree_slot(&key);
        match entries.get(&slot).cloned() {
            Some(subtree) => {
                put_back(reducer, map_chan, entries, rand.split_byte(0))?;
                join_with(
                    reducer,
                    subtree.clone(),
                    vec![Term::Bytes(key), value, ret, subtree, guard],
                    rand.split_byte(1),
                    BodyRefs::REG_INSERT_CALLBACK,
                )
            }
            None => {
                let subtree = Term::Private(rand.next().to_vec());
                entries.insert(slot, subtree.clone());
                put_back(reducer, map_chan, entries, rand.split_byte(0))?;

                let mut subtree_entries = BTreeMap::new();
                subtree_entries.insert(Term::Bytes(key), value.clone());
                put_back(reducer, subtree, subtree_entries, rand.split_byte(1))?;
                reducer.produce(ret, vec![value], rand.split_byte(2), false)
            }
        }
    } else {
        let entry_key = Term::Bytes(key);
        let accepted = match (&guard, entries.get(&entry_key)) {
            (Term::Int(nonce), Some(Term::Tuple(existing))) => match existing.first() {
                Some(Term::Int(previous)) => nonce > previous,
                _ => true,
            },
            _ => true,
        };
        let reply = if accepted {
            entries.insert(entry_key, value.clone());
            value
        } else {
            log::debug!("Rejected registry insert with stale nonce {}", guard);
            Term::Nil
        };
        put_back(reducer, map_chan, entries, rand.split_byte(0))?;
        reducer.produce(ret, vec![reply], rand.split_byte(1), false)
    }
}

/* ↓↓↓ Public registration ↓↓↓ */

fn public_register_random(
    reducer: &Reducer,
    args: Vec<ListParWithRandom>,
) -> Result<(), InterpreterError> {
    let ([value, ret], mut rand) = single_channel_args::<2>(args, "registry insertArbitrary")?;
    let key = blake2b256(&rand.next()).to_vec();
    let uri = Term::Uri(build_uri(&key));
    register(
        reducer,
        key,
        Term::Tuple(vec![Term::Nil, value]),
        uri,
        ret,
        Term::Nil,
        rand,
    )
}

fn public_register_signed(
    reducer: &Reducer,
    args: Vec<ListParWithRandom>,
) -> Result<(), InterpreterError> {
    const PROCESS: &str = "registry insertSigned";
    let (public_key, pair, signature, ret, rand) =
        match single_channel_args::<4>(args, PROCESS)? {
            ([Term::Bytes(public_key), Term::Tuple(pair), Term::Bytes(signature), ret], rand) => {
                (public_key, pair, signature, ret, rand)
            }
            _ => return Err(illegal(PROCESS)),
        };

    let nonce = match pair.as_slice() {
        [Term::Int(nonce), _] => *nonce,
        _ => return reducer.produce(ret, vec![Term::Nil], rand, false),
    };
    let stored = Term::Tuple(pair);
    let signed = borsh::to_vec(&stored)
        .map_err(|err| InterpreterError::IllegalArgument(err.to_string()))?;

    reducer.cost().charge(ED25519_VERIFY_COST)?;
    if !ed25519_verify(&signed, &signature, &public_key) {
        log::debug!("Rejected signed registration with an invalid signature");
        return reducer.produce(ret, vec![Term::Nil], rand, false);
    }

    let key = blake2b256(&public_key).to_vec();
    let uri = Term::Uri(build_uri(&key));
    register(reducer, key, stored, uri, ret, Term::Int(nonce), rand)
}

/// Insert `stored` under `key`, then send `uri` on `ret` if the insert was accepted, or `Nil` if not.
fn register(
    reducer: &Reducer,
    key: Vec<u8>,
    stored: Term,
    uri: Term,
    ret: Term,
    guard: Term,
    mut rand: Blake2b512Random,
) -> Result<(), InterpreterError> {
    let ack = Term::Private(rand.next().to_vec());
    join_with(
        reducer,
        ack.clone(),
        vec![uri, ret],
        rand.split_byte(0),
        BodyRefs::REG_REGISTER_INSERT_CALLBACK,
    )?;
    start_insert(reducer, key, stored, ack, guard, rand.split_byte(1))
}

fn register_insert_callback(
    reducer: &Reducer,
    args: Vec<ListParWithRandom>,
) -> Result<(), InterpreterError> {
    const PROCESS: &str = "registry register insert callback";
    let (inserted, parked, rand) = callback_args(args, PROCESS)?;
    let [uri, ret] = <[Term; 2]>::try_from(parked).map_err(|_| illegal(PROCESS))?;
    let reply = match inserted {
        Term::Nil => Term::Nil,
        _ => uri,
    };
    reducer.produce(ret, vec![reply], rand, false)
}

/* ↓↓↓ Delete ↓↓↓ */

fn delete(reducer: &Reducer, args: Vec<ListParWithRandom>) -> Result<(), InterpreterError> {
    let ([key, ret], rand) = single_channel_args::<2>(args, "registry delete")?;
    let key = key_bytes(key, "registry delete")?;
    join_with(
        reducer,
        FixedChannels::reg_root(),
        vec![Term::Bytes(key), ret],
        rand,
        BodyRefs::REG_DELETE_ROOT_CALLBACK,
    )
}

fn delete_root_callback(
    reducer: &Reducer,
    args: Vec<ListParWithRandom>,
) -> Result<(), InterpreterError> {
    const PROCESS: &str = "registry delete root callback";
    let (map, parked, rand) = callback_args(args, PROCESS)?;
    let [key, ret] = <[Term; 2]>::try_from(parked).map_err(|_| illegal(PROCESS))?;
    let key = key_bytes(key, PROCESS)?;
    let entries = map_entries(map, PROCESS)?;

    let subtree = entries.get(&subtree_slot(&key)).cloned();
    put_back(reducer, FixedChannels::reg_root(), entries, rand.split_byte(0))?;
    match subtree {
        Some(subtree) => join_with(
            reducer,
            subtree.clone(),
            vec![Term::Bytes(key), ret, subtree],
            rand.split_byte(1),
            BodyRefs::REG_DELETE_CALLBACK,
        ),
        None => reducer.produce(ret, vec![Term::Nil], rand.split_byte(1), false),
    }
}

fn delete_callback(reducer: &Reducer, args: Vec<ListParWithRandom>) -> Result<(), InterpreterError> {
    const PROCESS: &str = "registry delete callback";
    let (map, parked, rand) = callback_args(args, PROCESS)?;
    let [key, ret, subtree] = <[Term; 3]>::try_from(parked).map_err(|_| illegal(PROCESS))?;
    let key = key_bytes(key, PROCESS)?;
    let mut entries = map_entries(map, PROCESS)?;

    let removed = entries.remove(&Term::Bytes(key)).unwrap_or(Term::Nil);
    put_back(reducer, subtree, entries, rand.split_byte(0))?;
    reducer.produce(ret, vec![removed], rand.split_byte(1), false)
}
