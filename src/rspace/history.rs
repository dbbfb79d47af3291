/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! History backends: where a space's rows go when it is checkpointed.
//!
//! The backend is selected by [`StorageMode`]; the logical contract of produce, consume, and install does
//! not depend on it.
//!
//! |Mode|Backend|Values live in|
//! |---|---|---|
//! |`InMemory`|[`MemHistory`]|memory|
//! |`Persistent`|[`RocksHistory`] without value cache|RocksDB, read back on every get|
//! |`Mixed`|[`RocksHistory`] with value cache|memory, with RocksDB as durable copy|
//!
//! The size limit bounds the bytes of the rows currently stored (keys plus values), not the bytes ever
//! written. A batch that would take the history over the limit fails with [`StoreError::MapFull`] and
//! writes nothing.

use std::{collections::BTreeMap, path::Path};

use rocksdb::{IteratorMode, Options, WriteOptions, DB};

use super::{
    errors::StoreError,
    pluggables::{HistoryBatch, HistoryStore},
};

/// How a space persists its history.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageMode {
    InMemory,
    Persistent,
    Mixed,
}

/// Open the history named `name` under `dir` in the given `mode`.
pub fn open_history(
    mode: StorageMode,
    dir: &Path,
    name: &str,
    size_limit: u64,
) -> Result<Box<dyn HistoryStore>, StoreError> {
    match mode {
        StorageMode::InMemory => Ok(Box::new(MemHistory::new())),
        StorageMode::Persistent => Ok(Box::new(RocksHistory::open(
            &dir.join(name),
            size_limit,
            false,
        )?)),
        StorageMode::Mixed => Ok(Box::new(RocksHistory::open(
            &dir.join(name),
            size_limit,
            true,
        )?)),
    }
}

/// A volatile history.
#[derive(Default)]
pub struct MemHistory {
    map: BTreeMap<Vec<u8>, Vec<u8>>,
    closed: bool,
}

impl MemHistory {
    pub fn new() -> MemHistory {
        MemHistory::default()
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.closed {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

impl HistoryStore for MemHistory {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.check_open()?;
        Ok(self.map.get(key).cloned())
    }

    fn write(&mut self, batch: HistoryBatch) -> Result<(), StoreError> {
        self.check_open()?;
        for (key, value) in batch.0 {
            match value {
                Some(value) => {
                    self.map.insert(key, value);
                }
                None => {
                    self.map.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn entries(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        self.check_open()?;
        Ok(self
            .map
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        self.check_open()?;
        self.closed = true;
        Ok(())
    }
}

/// A history kept in a RocksDB database of its own.
pub struct RocksHistory {
    db: Option<DB>,
    /// Every stored row, when values are cached.
    cache: Option<BTreeMap<Vec<u8>, Vec<u8>>>,
    size: u64,
    size_limit: u64,
}

impl RocksHistory {
    pub fn open(path: &Path, size_limit: u64, cache_values: bool) -> Result<RocksHistory, StoreError> {
        let mut options = Options::default();
        options.create_if_missing(true);
        let db = DB::open(&options, path)?;

        let mut size = 0;
        let mut cache = cache_values.then(BTreeMap::new);
        for row in db.iterator(IteratorMode::Start) {
            let (key, value) = row?;
            size += (key.len() + value.len()) as u64;
            if let Some(cache) = cache.as_mut() {
                cache.insert(key.into_vec(), value.into_vec());
            }
        }

        log::debug!("Opened history {:?} holding {} bytes", path, size);

        Ok(RocksHistory {
            db: Some(db),
            cache,
            size,
            size_limit,
        })
    }

    fn db(&self) -> Result<&DB, StoreError> {
        self.db.as_ref().ok_or(StoreError::Closed)
    }

    fn stored_len(&self, key: &[u8]) -> Result<u64, StoreError> {
        let value = match &self.cache {
            Some(cache) => cache.get(key).map(|value| value.len()),
            None => self.db()?.get_pinned(key)?.map(|value| value.len()),
        };
        Ok(value.map_or(0, |len| (key.len() + len) as u64))
    }
}

impl HistoryStore for RocksHistory {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let db = self.db()?;
        match &self.cache {
            Some(cache) => Ok(cache.get(key).cloned()),
            None => Ok(db.get(key)?),
        }
    }

    fn write(&mut self, batch: HistoryBatch) -> Result<(), StoreError> {
        // The last change to a key decides its stored length.
        let mut changes: BTreeMap<&[u8], Option<&[u8]>> = BTreeMap::new();
        for (key, value) in &batch.0 {
            changes.insert(key.as_slice(), value.as_deref());
        }
        let mut required = self.size;
        for (key, value) in &changes {
            required -= self.stored_len(key)?;
            required += value.map_or(0, |value| (key.len() + value.len()) as u64);
        }
        if required > self.size_limit {
            return Err(StoreError::MapFull {
                limit: self.size_limit,
                required,
            });
        }

        let mut write_batch = rocksdb::WriteBatch::default();
        for (key, value) in &batch.0 {
            match value {
                Some(value) => write_batch.put(key, value),
                None => write_batch.delete(key),
            }
        }
        let mut write_options = WriteOptions::default();
        write_options.set_sync(true);
        self.db()?.write_opt(write_batch, &write_options)?;

        self.size = required;
        if let Some(cache) = self.cache.as_mut() {
            for (key, value) in batch.0 {
                match value {
                    Some(value) => {
                        cache.insert(key, value);
                    }
                    None => {
                        cache.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }

    fn entries(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let db = self.db()?;
        if let Some(cache) = &self.cache {
            return Ok(cache
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect());
        }
        db.iterator(IteratorMode::Start)
            .map(|row| -> Result<(Vec<u8>, Vec<u8>), StoreError> {
                let (key, value) = row?;
                Ok((key.into_vec(), value.into_vec()))
            })
            .collect()
    }

    fn close(&mut self) -> Result<(), StoreError> {
        let db = self.db.take().ok_or(StoreError::Closed)?;
        db.flush()?;
        self.cache = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{env, fs, path::PathBuf};

    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        let path = env::temp_dir().join(format!("rho_casper_history_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&path);
        path
    }

    fn put(key: &[u8], value: &[u8]) -> HistoryBatch {
        let mut batch = HistoryBatch::new();
        batch.put(key, value);
        batch
    }

    #[test]
    fn rewriting_rows_does_not_grow_size() {
        for cache_values in [false, true] {
            let path = temp_path(&format!("rewrite_{}", cache_values));
            let mut history = RocksHistory::open(&path, 64, cache_values).unwrap();

            for round in 0..1000u32 {
                history.write(put(b"key", &round.to_le_bytes())).unwrap();
            }
            assert_eq!(history.size, 7);
            assert_eq!(
                history.get(b"key").unwrap(),
                Some(999u32.to_le_bytes().to_vec())
            );

            let mut delete = HistoryBatch::new();
            delete.delete(b"key");
            history.write(delete).unwrap();
            assert_eq!(history.size, 0);
            assert!(history.entries().unwrap().is_empty());

            history.close().unwrap();
            fs::remove_dir_all(&path).unwrap();
        }
    }

    #[test]
    fn batch_over_limit_writes_nothing() {
        let path = temp_path("over_limit");
        let mut history = RocksHistory::open(&path, 16, false).unwrap();
        history.write(put(b"a", b"1")).unwrap();

        let mut batch = HistoryBatch::new();
        batch.put(b"b", b"2");
        batch.put(b"c", &[0; 32]);
        batch.delete(b"a");
        let result = history.write(batch);
        assert!(matches!(
            result,
            Err(StoreError::MapFull {
                limit: 16,
                required: 35
            })
        ));
        assert_eq!(
            history.entries().unwrap(),
            vec![(b"a".to_vec(), b"1".to_vec())]
        );

        history.close().unwrap();
        fs::remove_dir_all(&path).unwrap();
    }

    #[test]
    fn reopen_restores_rows_and_size() {
        let path = temp_path("reopen");
        let mut history = RocksHistory::open(&path, 1024, false).unwrap();
        history.write(put(b"a", b"1")).unwrap();
        history.write(put(b"b", b"22")).unwrap();
        history.close().unwrap();
        assert!(matches!(history.get(b"a"), Err(StoreError::Closed)));

        let mut history = RocksHistory::open(&path, 1024, true).unwrap();
        assert_eq!(history.size, 5);
        assert_eq!(history.get(b"b").unwrap(), Some(b"22".to_vec()));
        history.close().unwrap();
        fs::remove_dir_all(&path).unwrap();
    }
}
