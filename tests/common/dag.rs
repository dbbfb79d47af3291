use std::collections::HashMap;

use rho_casper::{
    casper::{
        block_dag::{BlockDag, BlockDagStorage},
        block_store::{BlockStore, KVBlockStore},
    },
    types::{
        basic::{BlockHash, Validator, Weight},
        block::{BlockMessage, WeightMap},
    },
};

use super::mem_db::MemDB;

pub(crate) fn validator(byte: u8) -> Validator {
    Validator::new([byte; 32])
}

pub(crate) fn bonds(weights: &[(Validator, u64)]) -> WeightMap {
    weights
        .iter()
        .map(|(validator, weight)| (*validator, Weight::new(*weight)))
        .collect()
}

/// A block DAG under construction, together with a block store holding the same blocks.
pub(crate) struct DagFixture {
    pub(crate) storage: BlockDagStorage,
    pub(crate) block_store: KVBlockStore<MemDB>,
    seq_nums: HashMap<Validator, u64>,
}

impl DagFixture {
    pub(crate) fn new() -> DagFixture {
        DagFixture {
            storage: BlockDagStorage::new(),
            block_store: KVBlockStore::new(MemDB::new()),
            seq_nums: HashMap::new(),
        }
    }

    pub(crate) fn genesis(&mut self, bonds: WeightMap) -> BlockHash {
        let genesis = BlockMessage::new(vec![], validator(0), 0, bonds, b"genesis".to_vec());
        self.storage.insert_genesis(&genesis);
        self.block_store.put(&genesis).unwrap();
        genesis.hash
    }

    /// Propose a block from `sender` on `parents`, with the sender's next sequence number.
    pub(crate) fn propose(
        &mut self,
        sender: Validator,
        parents: &[BlockHash],
        bonds: WeightMap,
    ) -> BlockHash {
        let seq_num = self.seq_nums.get(&sender).map_or(1, |seq_num| seq_num + 1);
        self.propose_with_seq_num(sender, seq_num, parents, bonds)
    }

    pub(crate) fn propose_with_seq_num(
        &mut self,
        sender: Validator,
        seq_num: u64,
        parents: &[BlockHash],
        bonds: WeightMap,
    ) -> BlockHash {
        let block = BlockMessage::new(parents.to_vec(), sender, seq_num, bonds, vec![]);
        let latest = self.seq_nums.entry(sender).or_insert(0);
        *latest = (*latest).max(seq_num);
        self.storage.insert(&block);
        self.block_store.put(&block).unwrap();
        block.hash
    }

    pub(crate) fn dag(&self) -> BlockDag {
        self.storage.snapshot()
    }
}
