use super::action::Action;
use super::flow;
use super::flow::{ExpiredReason, FlowEntry, SwFlowKey};
use super::table::{Table, TableStats};

// LINEAR TABLE
//
// The most general classifier tier: an ordered list that accepts any entry,
// wildcarded or not. The list is kept sorted by descending priority with ties
// broken by insertion order, so lookup can simply return the first match.

pub struct TableLinear {
    flows: Vec<FlowEntry>,
    max_flows: usize,
    n_lookup: u64,
    n_matched: u64
}

impl TableLinear {

    pub fn new(max_flows: usize) -> TableLinear {
        TableLinear {
            flows: Vec::new(),
            max_flows,
            n_lookup: 0,
            n_matched: 0
        }
    }

}

impl Table for TableLinear {

    fn lookup(&mut self, key: &SwFlowKey) -> Option<&mut FlowEntry> {
        self.n_lookup += 1;
        for flow in self.flows.iter_mut() {
            if flow::matches_1wild(key, &flow.key) {
                self.n_matched += 1;
                return Some(flow);
            }
        }
        None
    }

    fn insert(&mut self, flow: FlowEntry) -> Result<(), FlowEntry> {
        // An entry with the same priority and the same match replaces the
        // existing one.
        for f in self.flows.iter_mut() {
            if f.priority == flow.priority
                && f.key.wildcards == flow.key.wildcards
                && flow::matches_2wild(&f.key, &flow.key) {
                *f = flow;
                return Ok(());
            }
        }
        if self.flows.len() >= self.max_flows {
            return Err(flow);
        }
        // Sorted position: after every entry of equal or higher priority,
        // so ties resolve in insertion order.
        let pos = self.flows.iter()
            .position(|f| f.priority < flow.priority)
            .unwrap_or(self.flows.len());
        self.flows.insert(pos, flow);
        Ok(())
    }

    fn modify(&mut self, pattern: &SwFlowKey, priority: u16, strict: bool,
              actions: &[Action]) -> usize {
        let mut count = 0;
        for f in self.flows.iter_mut() {
            let matched = if strict {
                f.priority == priority
                    && flow::del_matches(&f.key, pattern, true)
            } else {
                flow::matches_2wild(&f.key, pattern)
            };
            if matched {
                f.actions = actions.to_vec();
                count += 1;
            }
        }
        count
    }

    fn delete(&mut self, pattern: &SwFlowKey, priority: u16, strict: bool,
              deleted: &mut Vec<FlowEntry>) -> usize {
        let mut count = 0;
        let mut i = 0;
        while i < self.flows.len() {
            let f = &self.flows[i];
            let matched = if strict {
                f.priority == priority
                    && flow::del_matches(&f.key, pattern, true)
            } else {
                flow::matches_2wild(&f.key, pattern)
            };
            if matched {
                deleted.push(self.flows.remove(i));
                count += 1;
            } else {
                i += 1;
            }
        }
        count
    }

    fn sweep(&mut self, now: u64,
             expired: &mut Vec<(FlowEntry, ExpiredReason)>) {
        let mut i = 0;
        while i < self.flows.len() {
            match self.flows[i].timed_out(now) {
                Some(reason) => expired.push((self.flows.remove(i), reason)),
                None => i += 1
            }
        }
    }

    fn for_each(&self, visit: &mut dyn FnMut(&FlowEntry)) {
        for flow in self.flows.iter() {
            visit(flow);
        }
    }

    fn stats(&self) -> TableStats {
        TableStats {
            name: "linear",
            n_flows: self.flows.len(),
            max_flows: self.max_flows,
            n_lookup: self.n_lookup,
            n_matched: self.n_matched
        }
    }

}
