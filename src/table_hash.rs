use super::action::Action;
use super::crc32::Crc32;
use super::flow;
use super::flow::{ExpiredReason, FlowEntry, SwFlowKey};
use super::table::{Table, TableStats};

// EXACT-MATCH HASH TABLES
//
// The cheap classifier tiers. A flow's bucket is selected by a CRC-32 over
// the full key bytes; each bucket holds at most one entry and lookup never
// follows chains. A collision with a non-matching occupant is simply a miss
// at this tier; the chain falls through to the next one.
//
//   TableHash - single hash table, accepts only fully-specified keys
//   TableHash2 - two hash tables with different CRC polynomials composed
//                behind the same contract

pub struct TableHash {
    crc: Crc32,
    buckets: Vec<Option<FlowEntry>>,
    bucket_mask: usize,
    n_flows: usize,
    n_lookup: u64,
    n_matched: u64
}

impl TableHash {

    pub fn new(polynomial: u32, n_buckets: usize) -> TableHash {
        assert!(n_buckets.is_power_of_two(), "bucket count must be 2^n");
        let mut buckets = Vec::new();
        buckets.resize_with(n_buckets, || None);
        TableHash {
            crc: Crc32::new(polynomial),
            buckets,
            bucket_mask: n_buckets - 1,
            n_flows: 0,
            n_lookup: 0,
            n_matched: 0
        }
    }

    fn bucket_of(&self, key: &SwFlowKey) -> usize {
        self.crc.hash(&key.flow.as_bytes()) as usize & self.bucket_mask
    }

}

impl Table for TableHash {

    fn lookup(&mut self, key: &SwFlowKey) -> Option<&mut FlowEntry> {
        self.n_lookup += 1;
        let b = self.bucket_of(key);
        match self.buckets[b] {
            Some(ref mut flow) if flow.key.flow == key.flow => {
                self.n_matched += 1;
                Some(flow)
            }
            _ => None
        }
    }

    fn insert(&mut self, flow: FlowEntry) -> Result<(), FlowEntry> {
        if flow.key.wildcards != 0 {
            return Err(flow);
        }
        let b = self.bucket_of(&flow.key);
        match self.buckets[b] {
            None => {
                self.buckets[b] = Some(flow);
                self.n_flows += 1;
                Ok(())
            }
            Some(ref old) if old.key.flow == flow.key.flow => {
                // Same key: the new entry replaces the occupant.
                self.buckets[b] = Some(flow);
                Ok(())
            }
            Some(_) => Err(flow) // collision, the slot stays taken
        }
    }

    fn modify(&mut self, pattern: &SwFlowKey, _priority: u16, strict: bool,
              actions: &[Action]) -> usize {
        // Strict modification of an exact entry requires an exact pattern;
        // priority is not meaningful for fully-specified flows.
        if strict && pattern.wildcards != 0 {
            return 0;
        }
        let mut count = 0;
        for bucket in self.buckets.iter_mut() {
            if let Some(flow) = bucket {
                if flow::matches_2wild(&flow.key, pattern) {
                    flow.actions = actions.to_vec();
                    count += 1;
                }
            }
        }
        count
    }

    fn delete(&mut self, pattern: &SwFlowKey, _priority: u16, strict: bool,
              deleted: &mut Vec<FlowEntry>) -> usize {
        let mut count = 0;
        if pattern.wildcards == 0 {
            // Direct slot check for fully-specified patterns.
            let b = self.bucket_of(pattern);
            let hit = matches!(&self.buckets[b],
                               Some(flow) if flow.key.flow == pattern.flow);
            if hit {
                deleted.push(self.buckets[b].take().unwrap());
                count = 1;
            }
        } else {
            for bucket in self.buckets.iter_mut() {
                let matched = match bucket {
                    Some(flow) => flow::del_matches(&flow.key, pattern, strict),
                    None => false
                };
                if matched {
                    deleted.push(bucket.take().unwrap());
                    count += 1;
                }
            }
        }
        self.n_flows -= count;
        count
    }

    fn sweep(&mut self, now: u64,
             expired: &mut Vec<(FlowEntry, ExpiredReason)>) {
        for bucket in self.buckets.iter_mut() {
            let reason = match bucket {
                Some(flow) => flow.timed_out(now),
                None => None
            };
            if let Some(reason) = reason {
                expired.push((bucket.take().unwrap(), reason));
                self.n_flows -= 1;
            }
        }
    }

    fn for_each(&self, visit: &mut dyn FnMut(&FlowEntry)) {
        for flow in self.buckets.iter().flatten() {
            visit(flow);
        }
    }

    fn stats(&self) -> TableStats {
        TableStats {
            name: "hash",
            n_flows: self.n_flows,
            max_flows: self.bucket_mask + 1,
            n_lookup: self.n_lookup,
            n_matched: self.n_matched
        }
    }

}

// Double-hash table: two differently-seeded hash tables behind one face.
// Insertion prefers the first and falls back to the second, so a key
// colliding in one table usually still finds a home in the other.
pub struct TableHash2 {
    subtable: [TableHash; 2]
}

impl TableHash2 {

    pub fn new(poly0: u32, buckets0: usize, poly1: u32, buckets1: usize)
               -> TableHash2 {
        TableHash2 {
            subtable: [TableHash::new(poly0, buckets0),
                       TableHash::new(poly1, buckets1)]
        }
    }

}

impl Table for TableHash2 {

    fn lookup(&mut self, key: &SwFlowKey) -> Option<&mut FlowEntry> {
        // NB: written as a split to convince the borrow checker that the
        // returned entry borrows exactly one subtable.
        let (first, second) = self.subtable.split_at_mut(1);
        if let Some(flow) = first[0].lookup(key) {
            return Some(flow);
        }
        second[0].lookup(key)
    }

    fn insert(&mut self, flow: FlowEntry) -> Result<(), FlowEntry> {
        match self.subtable[0].insert(flow) {
            Ok(()) => Ok(()),
            Err(flow) => self.subtable[1].insert(flow)
        }
    }

    fn modify(&mut self, pattern: &SwFlowKey, priority: u16, strict: bool,
              actions: &[Action]) -> usize {
        self.subtable[0].modify(pattern, priority, strict, actions)
            + self.subtable[1].modify(pattern, priority, strict, actions)
    }

    fn delete(&mut self, pattern: &SwFlowKey, priority: u16, strict: bool,
              deleted: &mut Vec<FlowEntry>) -> usize {
        self.subtable[0].delete(pattern, priority, strict, deleted)
            + self.subtable[1].delete(pattern, priority, strict, deleted)
    }

    fn sweep(&mut self, now: u64,
             expired: &mut Vec<(FlowEntry, ExpiredReason)>) {
        self.subtable[0].sweep(now, expired);
        self.subtable[1].sweep(now, expired);
    }

    fn for_each(&self, visit: &mut dyn FnMut(&FlowEntry)) {
        self.subtable[0].for_each(visit);
        self.subtable[1].for_each(visit);
    }

    fn stats(&self) -> TableStats {
        let s0 = self.subtable[0].stats();
        let s1 = self.subtable[1].stats();
        TableStats {
            name: "hash2",
            n_flows: s0.n_flows + s1.n_flows,
            max_flows: s0.max_flows + s1.max_flows,
            n_lookup: s0.n_lookup + s1.n_lookup,
            n_matched: s0.n_matched + s1.n_matched
        }
    }

}
