//! A volatile, in-memory [`KVStore`] for holding test blocks.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use rho_casper::casper::block_store::{KVGet, KVStore, WriteBatch};

/// Clones share the same map, so a block store and the test that built it see the same blocks.
#[derive(Clone, Default)]
pub(crate) struct MemDB(Arc<Mutex<BTreeMap<Vec<u8>, Vec<u8>>>>);

impl MemDB {
    pub(crate) fn new() -> MemDB {
        MemDB::default()
    }
}

impl KVStore for MemDB {
    type WriteBatch = MemWriteBatch;

    fn write(&mut self, wb: Self::WriteBatch) {
        let mut map = self.0.lock().unwrap();
        for op in wb.0 {
            match op {
                Op::Set(key, value) => {
                    map.insert(key, value);
                }
                Op::Delete(key) => {
                    map.remove(&key);
                }
            }
        }
    }

    fn clear(&mut self) {
        self.0.lock().unwrap().clear();
    }
}

impl KVGet for MemDB {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.0.lock().unwrap().get(key).cloned()
    }
}

enum Op {
    Set(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// Operations are applied in the order they were added.
pub(crate) struct MemWriteBatch(Vec<Op>);

impl WriteBatch for MemWriteBatch {
    fn new() -> Self {
        MemWriteBatch(Vec::new())
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.0.push(Op::Set(key.to_vec(), value.to_vec()));
    }

    fn delete(&mut self, key: &[u8]) {
        self.0.push(Op::Delete(key.to_vec()));
    }
}
