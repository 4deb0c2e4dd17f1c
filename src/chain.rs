use super::action::Action;
use super::flow::{ExpiredReason, FlowEntry, SwFlowKey};
use super::table::{Table, TableStats};
use super::table_hash::TableHash2;
use super::table_linear::TableLinear;

// CHAIN
//
// Set of tables chained together in sequence from cheap to expensive.
// Lookup returns the first tier's hit; insert installs into the first tier
// that accepts; delete, modify and the timeout sweep fan out to every tier.

pub const CHAIN_MAX_TABLES: usize = 4;

// Standard configuration.
const HASH_POLY0: u32 = 0x1EDC6F41;
const HASH_POLY1: u32 = 0x741B8CD7;
const HASH_BUCKETS: usize = 0x4000;
const LINEAR_MAX_FLOWS: usize = 100;

pub struct Chain {
    tables: Vec<Box<dyn Table>>
}

impl Chain {

    // The standard two-tier chain: a double-hash table for fully-specified
    // flows backed by a linear table for wildcarded ones.
    pub fn new() -> Chain {
        Chain::with_tables(vec![
            Box::new(TableHash2::new(HASH_POLY0, HASH_BUCKETS,
                                     HASH_POLY1, HASH_BUCKETS)),
            Box::new(TableLinear::new(LINEAR_MAX_FLOWS))
        ])
    }

    pub fn with_tables(tables: Vec<Box<dyn Table>>) -> Chain {
        assert!(tables.len() <= CHAIN_MAX_TABLES, "too many tables in chain");
        Chain { tables }
    }

    pub fn n_tables(&self) -> usize {
        self.tables.len()
    }

    // Search for a flow matching 'key', which must not have any wildcard
    // fields; only exact packet keys reach the classifier.
    pub fn lookup(&mut self, key: &SwFlowKey) -> Option<&mut FlowEntry> {
        debug_assert!(key.wildcards == 0);
        for t in self.tables.iter_mut() {
            if let Some(flow) = t.lookup(key) {
                return Some(flow);
            }
        }
        None
    }

    // Offer 'flow' to each tier in order; the entry is returned if every
    // tier refuses (all tables full).
    pub fn insert(&mut self, mut flow: FlowEntry) -> Result<(), FlowEntry> {
        for t in self.tables.iter_mut() {
            match t.insert(flow) {
                Ok(()) => return Ok(()),
                Err(refused) => flow = refused
            }
        }
        Err(flow)
    }

    pub fn modify(&mut self, pattern: &SwFlowKey, priority: u16, strict: bool,
                  actions: &[Action]) -> usize {
        self.tables.iter_mut()
            .map(|t| t.modify(pattern, priority, strict, actions))
            .sum()
    }

    // Delete any and all flows matching 'pattern', returning them for
    // expiry notification. Expensive for wildcarded patterns, which scan
    // every table in full; cheap for fully specified ones.
    pub fn delete(&mut self, pattern: &SwFlowKey, priority: u16, strict: bool)
                  -> Vec<FlowEntry> {
        let mut deleted = Vec::new();
        for t in self.tables.iter_mut() {
            t.delete(pattern, priority, strict, &mut deleted);
        }
        deleted
    }

    // Remove timed-out entries from all tiers.
    pub fn sweep(&mut self, now: u64) -> Vec<(FlowEntry, ExpiredReason)> {
        let mut expired = Vec::new();
        for t in self.tables.iter_mut() {
            t.sweep(now, &mut expired);
        }
        expired
    }

    pub fn for_each(&self, visit: &mut dyn FnMut(usize, &FlowEntry)) {
        for (i, t) in self.tables.iter().enumerate() {
            t.for_each(&mut |flow| visit(i, flow));
        }
    }

    pub fn stats(&self) -> Vec<TableStats> {
        self.tables.iter().map(|t| t.stats()).collect()
    }

}
