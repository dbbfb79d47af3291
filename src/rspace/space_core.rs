/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! State and matching logic shared by [`RSpace`](super::rspace::RSpace) and
//! [`ReplayRSpace`](super::replay_rspace::ReplayRSpace).
//!
//! ## Rows
//!
//! A space holds three kinds of rows, keyed in the history by a one byte prefix followed by the Borsh
//! serialization of the row's channel(s):
//!
//! |Prefix|Key|Value|
//! |---|---|---|
//! |`0`|`Term`|`Vec<Datum>`|
//! |`1`|`Vec<Term>`|`Vec<WaitingContinuation>`|
//! |`2`|`Term`|`Vec<Vec<Term>>` (joins)|
//!
//! Changed rows are kept whole in a [hot overlay](HotStoreState) until the next hard checkpoint. Installed
//! continuations and their joins live in a separate table that is never committed.
//!
//! ## Matching order
//!
//! A produce tries the joins of its channel in order, and for each join, the installed continuations
//! first, then the stored continuations in the order they were stored. The produced datum is matched at
//! its channel's position; every other position takes the first stored datum that matches. A consume
//! takes, for every channel, the first stored datum that matches.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    errors::{RSpaceError, StoreError},
    internal::{
        Checkpoint, ContResult, Datum, HotStoreState, MaybeActionResult, RSpaceResult, SoftCheckpoint,
        WaitingContinuation,
    },
    matcher::Match,
    pluggables::{HistoryBatch, HistoryStore},
    trace::{Comm, Event, Log},
};
use crate::types::{
    crypto_primitives::{CryptoHasher, Digest},
    term::{BindPattern, ListParWithRandom, TaggedContinuation, Term},
};

const DATA_PREFIX: u8 = 0;
const CONTINUATIONS_PREFIX: u8 = 1;
const JOINS_PREFIX: u8 = 2;

/// A datum selected for one position of a match.
struct Candidate {
    channel: Term,
    datum: Datum,
    /// Position of `datum` among the data stored on `channel`, or `None` for a datum being produced.
    datum_index: Option<usize>,
    matched: ListParWithRandom,
}

pub(crate) struct SpaceCore<M: Match> {
    history: Box<dyn HistoryStore>,
    hot: HotStoreState,
    installs: BTreeMap<Vec<Term>, Vec<WaitingContinuation>>,
    installed_joins: BTreeMap<Term, Vec<Vec<Term>>>,
    matcher: M,
    log: Log,
}

impl<M: Match> SpaceCore<M> {
    pub(crate) fn new(history: Box<dyn HistoryStore>, matcher: M) -> SpaceCore<M> {
        SpaceCore {
            history,
            hot: HotStoreState::default(),
            installs: BTreeMap::new(),
            installed_joins: BTreeMap::new(),
            matcher,
            log: Log::new(),
        }
    }

    /* ↓↓↓ Operations ↓↓↓ */

    /// Produce `data` on `channel`. `check_comm` is called on the COMM a match would cause before any
    /// state changes; if it fails, the produce fails.
    pub(crate) fn produce<F>(
        &mut self,
        channel: Term,
        data: ListParWithRandom,
        persist: bool,
        mut check_comm: F,
    ) -> Result<MaybeActionResult, RSpaceError>
    where
        F: FnMut(&Comm) -> Result<(), RSpaceError>,
    {
        let datum = Datum::create(&channel, data, persist);
        self.log.push(Event::Produce(datum.source));

        for join in self.joins(&channel)? {
            let position = match join.iter().position(|c| *c == channel) {
                Some(position) => position,
                None => continue,
            };
            let (installed, continuations) = self.continuations_with_install_count(&join)?;
            for (index, continuation) in continuations.into_iter().enumerate() {
                let candidates =
                    match self.find_match(&join, &continuation.patterns, Some((position, &datum)))? {
                        Some(candidates) => candidates,
                        None => continue,
                    };

                let comm = Comm {
                    consume: continuation.source.clone(),
                    produces: candidates.iter().map(|c| c.datum.source).collect(),
                };
                check_comm(&comm)?;
                log::trace!("COMM on produce to {}", channel);
                self.log.push(Event::Comm(comm));

                if index >= installed && !continuation.persist {
                    self.remove_continuation(&join, index - installed)?;
                }
                self.remove_matched_data(&candidates)?;
                return Ok(Some(action_result(join, continuation, candidates)));
            }
        }

        self.store_datum(channel, datum)?;
        Ok(None)
    }

    /// Consume from `channels`. See [`SpaceCore::produce`] for `check_comm`.
    pub(crate) fn consume<F>(
        &mut self,
        channels: Vec<Term>,
        patterns: Vec<BindPattern>,
        continuation: TaggedContinuation,
        persist: bool,
        mut check_comm: F,
    ) -> Result<MaybeActionResult, RSpaceError>
    where
        F: FnMut(&Comm) -> Result<(), RSpaceError>,
    {
        check_join(&channels, &patterns)?;
        let continuation = WaitingContinuation::create(&channels, patterns, continuation, persist);
        self.log.push(Event::Consume(continuation.source.clone()));

        if let Some(candidates) = self.find_match(&channels, &continuation.patterns, None)? {
            let comm = Comm {
                consume: continuation.source.clone(),
                produces: candidates.iter().map(|c| c.datum.source).collect(),
            };
            check_comm(&comm)?;
            log::trace!("COMM on consume from {} channels", channels.len());
            self.log.push(Event::Comm(comm));

            self.remove_matched_data(&candidates)?;
            return Ok(Some(action_result(channels, continuation, candidates)));
        }

        self.store_continuation(channels, continuation)?;
        Ok(None)
    }

    pub(crate) fn install(
        &mut self,
        channels: Vec<Term>,
        patterns: Vec<BindPattern>,
        continuation: TaggedContinuation,
    ) -> Result<MaybeActionResult, RSpaceError> {
        check_join(&channels, &patterns)?;
        let continuation = WaitingContinuation::create(&channels, patterns, continuation, true);

        if let Some(candidates) = self.find_match(&channels, &continuation.patterns, None)? {
            return Ok(Some(action_result(channels, continuation, candidates)));
        }

        for channel in &channels {
            let joins = self.installed_joins.entry(channel.clone()).or_default();
            if !joins.contains(&channels) {
                joins.push(channels.clone());
            }
        }
        self.installs.entry(channels).or_default().push(continuation);
        Ok(None)
    }

    /* ↓↓↓ Reads ↓↓↓ */

    pub(crate) fn data(&self, channel: &Term) -> Result<Vec<Datum>, StoreError> {
        if let Some(data) = self.hot.data.get(channel) {
            return Ok(data.clone());
        }
        Ok(self.read(key(DATA_PREFIX, channel))?.unwrap_or_default())
    }

    pub(crate) fn continuations(
        &self,
        channels: &[Term],
    ) -> Result<Vec<WaitingContinuation>, StoreError> {
        Ok(self.continuations_with_install_count(channels)?.1)
    }

    pub(crate) fn joins(&self, channel: &Term) -> Result<Vec<Vec<Term>>, StoreError> {
        let mut joins = self
            .installed_joins
            .get(channel)
            .cloned()
            .unwrap_or_default();
        for join in self.stored_joins(channel)? {
            if !joins.contains(&join) {
                joins.push(join);
            }
        }
        Ok(joins)
    }

    fn continuations_with_install_count(
        &self,
        channels: &[Term],
    ) -> Result<(usize, Vec<WaitingContinuation>), StoreError> {
        let mut continuations = self.installs.get(channels).cloned().unwrap_or_default();
        let installed = continuations.len();
        continuations.extend(self.stored_continuations(channels)?);
        Ok((installed, continuations))
    }

    fn stored_continuations(
        &self,
        channels: &[Term],
    ) -> Result<Vec<WaitingContinuation>, StoreError> {
        if let Some(continuations) = self.hot.continuations.get(channels) {
            return Ok(continuations.clone());
        }
        Ok(self
            .read(key(CONTINUATIONS_PREFIX, &channels.to_vec()))?
            .unwrap_or_default())
    }

    fn stored_joins(&self, channel: &Term) -> Result<Vec<Vec<Term>>, StoreError> {
        if let Some(joins) = self.hot.joins.get(channel) {
            return Ok(joins.clone());
        }
        Ok(self.read(key(JOINS_PREFIX, channel))?.unwrap_or_default())
    }

    fn read<T: BorshDeserialize>(&self, key: Vec<u8>) -> Result<Option<T>, StoreError> {
        match self.history.get(&key)? {
            None => Ok(None),
            Some(bytes) => T::try_from_slice(&bytes)
                .map(Some)
                .map_err(|source| StoreError::DeserializeValueError { key, source }),
        }
    }

    /* ↓↓↓ Matching ↓↓↓ */

    /// Select one datum for every position of `channels`. If `fixed` is given, the datum at that
    /// position is the one given instead of a stored one.
    fn find_match(
        &self,
        channels: &[Term],
        patterns: &[BindPattern],
        fixed: Option<(usize, &Datum)>,
    ) -> Result<Option<Vec<Candidate>>, RSpaceError> {
        let mut candidates: Vec<Candidate> = Vec::with_capacity(channels.len());
        for (position, (channel, pattern)) in channels.iter().zip(patterns).enumerate() {
            if let Some((fixed_position, datum)) = fixed {
                if position == fixed_position {
                    match self.matcher.get(pattern, &datum.a)? {
                        Some(matched) => {
                            candidates.push(Candidate {
                                channel: channel.clone(),
                                datum: datum.clone(),
                                datum_index: None,
                                matched,
                            });
                            continue;
                        }
                        None => return Ok(None),
                    }
                }
            }

            let mut found = None;
            for (index, datum) in self.data(channel)?.into_iter().enumerate() {
                let taken = candidates
                    .iter()
                    .any(|c| c.channel == *channel && c.datum_index == Some(index));
                if taken {
                    continue;
                }
                if let Some(matched) = self.matcher.get(pattern, &datum.a)? {
                    found = Some(Candidate {
                        channel: channel.clone(),
                        datum,
                        datum_index: Some(index),
                        matched,
                    });
                    break;
                }
            }
            match found {
                Some(candidate) => candidates.push(candidate),
                None => return Ok(None),
            }
        }
        Ok(Some(candidates))
    }

    /* ↓↓↓ Writes ↓↓↓ */

    fn store_datum(&mut self, channel: Term, datum: Datum) -> Result<(), StoreError> {
        let mut data = self.data(&channel)?;
        data.push(datum);
        self.hot.data.insert(channel, data);
        Ok(())
    }

    fn store_continuation(
        &mut self,
        channels: Vec<Term>,
        continuation: WaitingContinuation,
    ) -> Result<(), StoreError> {
        for channel in &channels {
            let mut joins = self.stored_joins(channel)?;
            if !joins.contains(&channels) {
                joins.push(channels.clone());
                self.hot.joins.insert(channel.clone(), joins);
            }
        }
        let mut continuations = self.stored_continuations(&channels)?;
        continuations.push(continuation);
        self.hot.continuations.insert(channels, continuations);
        Ok(())
    }

    fn remove_continuation(&mut self, channels: &[Term], index: usize) -> Result<(), StoreError> {
        let mut continuations = self.stored_continuations(channels)?;
        continuations.remove(index);
        if continuations.is_empty() {
            for channel in channels {
                let mut joins = self.stored_joins(channel)?;
                joins.retain(|join| join != channels);
                self.hot.joins.insert(channel.clone(), joins);
            }
        }
        self.hot.continuations.insert(channels.to_vec(), continuations);
        Ok(())
    }

    fn remove_matched_data(&mut self, candidates: &[Candidate]) -> Result<(), StoreError> {
        let mut removals: BTreeMap<&Term, Vec<usize>> = BTreeMap::new();
        for candidate in candidates {
            if let Some(index) = candidate.datum_index {
                if !candidate.datum.persist {
                    removals.entry(&candidate.channel).or_default().push(index);
                }
            }
        }
        for (channel, mut indices) in removals {
            let mut data = self.data(channel)?;
            indices.sort_unstable_by(|a, b| b.cmp(a));
            for index in indices {
                data.remove(index);
            }
            self.hot.data.insert(channel.clone(), data);
        }
        Ok(())
    }

    /* ↓↓↓ Checkpoints ↓↓↓ */

    pub(crate) fn create_soft_checkpoint(&self) -> SoftCheckpoint {
        SoftCheckpoint {
            state: self.hot.clone(),
            log: self.log.clone(),
        }
    }

    pub(crate) fn revert_to_soft_checkpoint(&mut self, checkpoint: SoftCheckpoint) {
        self.hot = checkpoint.state;
        self.log = checkpoint.log;
    }

    pub(crate) fn create_checkpoint(&mut self) -> Result<Checkpoint, StoreError> {
        self.flush()?;
        let root = self.root_hash()?;
        Ok(Checkpoint {
            root,
            log: std::mem::take(&mut self.log),
        })
    }

    pub(crate) fn close(&mut self) -> Result<(), StoreError> {
        self.flush()?;
        self.history.close()
    }

    /// Commit the hot overlay in one batch. If the batch fails, the overlay is kept.
    fn flush(&mut self) -> Result<(), StoreError> {
        let mut batch = HistoryBatch::new();
        flush_rows(&mut batch, DATA_PREFIX, &self.hot.data);
        flush_rows(&mut batch, CONTINUATIONS_PREFIX, &self.hot.continuations);
        flush_rows(&mut batch, JOINS_PREFIX, &self.hot.joins);
        if !batch.is_empty() {
            self.history.write(batch)?;
        }
        self.hot = HotStoreState::default();
        Ok(())
    }

    fn root_hash(&self) -> Result<[u8; 32], StoreError> {
        let mut hasher = CryptoHasher::new();
        for (key, value) in self.history.entries()? {
            hasher.update((key.len() as u32).to_le_bytes());
            hasher.update(&key);
            hasher.update((value.len() as u32).to_le_bytes());
            hasher.update(&value);
        }
        Ok(hasher.finalize().into())
    }
}

fn check_join(channels: &[Term], patterns: &[BindPattern]) -> Result<(), RSpaceError> {
    if channels.len() != patterns.len() || channels.is_empty() {
        return Err(RSpaceError::InvalidJoin {
            channels: channels.len(),
            patterns: patterns.len(),
        });
    }
    Ok(())
}

fn key<T: BorshSerialize>(prefix: u8, value: &T) -> Vec<u8> {
    let mut key = vec![prefix];
    key.extend(borsh::to_vec(value).unwrap());
    key
}

fn flush_rows<K: BorshSerialize, V: BorshSerialize>(
    batch: &mut HistoryBatch,
    prefix: u8,
    rows: &BTreeMap<K, Vec<V>>,
) {
    for (row_key, values) in rows {
        let key = key(prefix, row_key);
        if values.is_empty() {
            batch.delete(&key);
        } else {
            batch.put(&key, &borsh::to_vec(values).unwrap());
        }
    }
}

fn action_result(
    channels: Vec<Term>,
    continuation: WaitingContinuation,
    candidates: Vec<Candidate>,
) -> (ContResult, Vec<RSpaceResult>) {
    let cont_result = ContResult {
        continuation: continuation.continuation,
        persistent: continuation.persist,
        channels,
        patterns: continuation.patterns,
    };
    let results = candidates
        .into_iter()
        .map(|c| RSpaceResult {
            channel: c.channel,
            matched_datum: c.matched,
            removed_datum: c.datum.a,
            persistent: c.datum.persist,
        })
        .collect();
    (cont_result, results)
}
