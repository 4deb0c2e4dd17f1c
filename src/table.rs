use super::action::Action;
use super::flow::{ExpiredReason, FlowEntry, SwFlowKey};

// FLOW TABLE CONTRACT
//
// All classifier tiers implement the same operation set; the chain holds them
// as trait objects and needs no change when a tier is added.
//
//   lookup - find the entry matching an exact packet key
//   insert - offer an entry; a tier may refuse (wrong shape or full)
//   modify - replace action lists of matching entries in place
//   delete - remove matching entries, handing them back for notification
//   sweep  - remove timed-out entries, handing them back with the reason
//   for_each - visit every entry (statistics service)
//   stats  - tier name and occupancy

#[derive(Clone, Copy, Debug)]
pub struct TableStats {
    pub name: &'static str,
    pub n_flows: usize,
    pub max_flows: usize,
    pub n_lookup: u64,
    pub n_matched: u64
}

pub trait Table {

    fn lookup(&mut self, key: &SwFlowKey) -> Option<&mut FlowEntry>;

    // Ok on acceptance; the entry comes back in Err when refused so the
    // caller can offer it to the next tier.
    fn insert(&mut self, flow: FlowEntry) -> Result<(), FlowEntry>;

    // Replace the action lists of entries matching 'pattern' (two-sided
    // rule), preserving counters and timers. Strict additionally requires
    // equal wildcards and, for wildcarded entries, equal priority. Returns
    // the number of entries touched.
    fn modify(&mut self, pattern: &SwFlowKey, priority: u16, strict: bool,
              actions: &[Action]) -> usize;

    // Remove entries matching 'pattern'; removed entries are appended to
    // 'deleted'. Returns the number removed.
    fn delete(&mut self, pattern: &SwFlowKey, priority: u16, strict: bool,
              deleted: &mut Vec<FlowEntry>) -> usize;

    // Remove entries whose idle or hard timeout has passed.
    fn sweep(&mut self, now: u64, expired: &mut Vec<(FlowEntry, ExpiredReason)>);

    fn for_each(&self, visit: &mut dyn FnMut(&FlowEntry));

    fn stats(&self) -> TableStats;

}
