use super::lib;
use super::buffer::Buffer;
use super::header;
use super::ethernet;
use super::ethernet::{Ethernet, Vlan, LlcSnap, MacAddress};
use super::ipv4;
use super::ipv4::IPv4;
use super::tcp::TCP;
use super::udp::UDP;
use super::arp::Arp;
use super::action::Action;
use super::openflow as ofp;
use super::openflow::OfpMatch;

// FLOW KEYS AND FLOW ENTRIES
//
// The classifier works on a canonical 10-tuple extracted from each Ethernet
// frame. Key fields are kept in network byte order; the wildcard word and the
// derived IPv4 prefix masks are in host byte order.
//
//   FlowKey - the 10-tuple
//   SwFlowKey - key plus wildcards and derived nw_src/nw_dst masks
//   extract(&mut Buffer, u16) -> (FlowKey, bool) - parse a frame into a key,
//       set the buffer's L3/L4 cursors, report IP fragments
//   matches_1wild(a, b) - match under b's wildcards (packet vs rule)
//   matches_2wild(a, b) - match under the union of wildcards (rule vs rule)
//   del_matches(t, d, strict) - deletion filter
//   FlowEntry - installed rule: key, priority, timeouts, counters, actions

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct FlowKey {
    pub in_port: u16,        // network byte order
    pub dl_vlan: u16,        // network byte order, OFP_VLAN_NONE if untagged
    pub dl_src: MacAddress,
    pub dl_dst: MacAddress,
    pub dl_type: u16,        // network byte order
    pub nw_src: u32,         // network byte order
    pub nw_dst: u32,         // network byte order
    pub nw_proto: u8,
    pub tp_src: u16,         // network byte order
    pub tp_dst: u16          // network byte order
}

impl FlowKey {

    // Stable byte rendering, used for bucket hashing. Network-byte-order
    // fields contribute their wire bytes.
    pub fn as_bytes(&self) -> [u8; 31] {
        let mut b = [0u8; 31];
        b[0..2].copy_from_slice(&self.in_port.to_ne_bytes());
        b[2..4].copy_from_slice(&self.dl_vlan.to_ne_bytes());
        b[4..10].copy_from_slice(&self.dl_src);
        b[10..16].copy_from_slice(&self.dl_dst);
        b[16..18].copy_from_slice(&self.dl_type.to_ne_bytes());
        b[18..22].copy_from_slice(&self.nw_src.to_ne_bytes());
        b[22..26].copy_from_slice(&self.nw_dst.to_ne_bytes());
        b[26] = self.nw_proto;
        b[27..29].copy_from_slice(&self.tp_src.to_ne_bytes());
        b[29..31].copy_from_slice(&self.tp_dst.to_ne_bytes());
        b
    }

}

#[derive(Clone, Copy, Debug)]
pub struct SwFlowKey {
    pub flow: FlowKey,
    pub wildcards: u32,   // host byte order
    pub nw_src_mask: u32, // network byte order
    pub nw_dst_mask: u32  // network byte order
}

pub fn make_nw_mask(n_wild_bits: u32) -> u32 {
    let n = n_wild_bits & ((1 << ofp::OFPFW_NW_SRC_BITS) - 1);
    if n < 32 { lib::htonl(!((1u32 << n) - 1)) } else { 0 }
}

impl SwFlowKey {

    pub fn exact(flow: FlowKey) -> SwFlowKey {
        SwFlowKey { flow, wildcards: 0, nw_src_mask: !0, nw_dst_mask: !0 }
    }

    // Build a key from a wire match, sanitizing the wildcards: fields below
    // an unknown layer are forced wild, and undefined fields of known layers
    // are forced exact so such flows stay eligible for the hash tiers.
    pub fn from_match(m: &OfpMatch) -> SwFlowKey {
        let mut wc = m.wildcards & ofp::OFPFW_ALL;
        let mut flow = FlowKey {
            in_port: lib::htons(m.in_port),
            dl_vlan: lib::htons(m.dl_vlan),
            dl_src: m.dl_src,
            dl_dst: m.dl_dst,
            dl_type: lib::htons(m.dl_type),
            ..FlowKey::default()
        };
        if wc & ofp::OFPFW_DL_TYPE != 0 {
            // Can't sensibly match on network or transport headers if the
            // data link type is unknown.
            wc |= ofp::OFPFW_NW | ofp::OFPFW_TP;
        } else if m.dl_type == ethernet::TYPE_IPV4 {
            flow.nw_src = lib::htonl(m.nw_src);
            flow.nw_dst = lib::htonl(m.nw_dst);
            flow.nw_proto = m.nw_proto;
            if wc & ofp::OFPFW_NW_PROTO != 0 {
                // Can't sensibly match on transport headers if the network
                // protocol is unknown.
                wc |= ofp::OFPFW_TP;
            } else if m.nw_proto == ipv4::PROTOCOL_TCP
                   || m.nw_proto == ipv4::PROTOCOL_UDP {
                flow.tp_src = lib::htons(m.tp_src);
                flow.tp_dst = lib::htons(m.tp_dst);
            } else {
                // Transport layer fields are undefined. Mark them as
                // exact-match to let such flows reside in the hash tiers
                // instead of falling into the linear table.
                wc &= !ofp::OFPFW_TP;
            }
        } else {
            // Same for network and transport layers of non-IP frames.
            wc &= !(ofp::OFPFW_NW | ofp::OFPFW_TP);
        }
        SwFlowKey {
            flow,
            wildcards: wc,
            nw_src_mask: make_nw_mask(wc >> ofp::OFPFW_NW_SRC_SHIFT),
            nw_dst_mask: make_nw_mask(wc >> ofp::OFPFW_NW_DST_SHIFT)
        }
    }

    pub fn to_match(&self) -> OfpMatch {
        OfpMatch {
            wildcards: self.wildcards,
            in_port: lib::ntohs(self.flow.in_port),
            dl_src: self.flow.dl_src,
            dl_dst: self.flow.dl_dst,
            dl_vlan: lib::ntohs(self.flow.dl_vlan),
            dl_type: lib::ntohs(self.flow.dl_type),
            nw_src: lib::ntohl(self.flow.nw_src),
            nw_dst: lib::ntohl(self.flow.nw_dst),
            nw_proto: self.flow.nw_proto,
            tp_src: lib::ntohs(self.flow.tp_src),
            tp_dst: lib::ntohs(self.flow.tp_dst)
        }
    }

}

fn fields_match(a: &FlowKey, b: &FlowKey, w: u32,
                src_mask: u32, dst_mask: u32) -> bool {
    (w & ofp::OFPFW_IN_PORT != 0 || a.in_port == b.in_port)
        && (w & ofp::OFPFW_DL_VLAN != 0 || a.dl_vlan == b.dl_vlan)
        && (w & ofp::OFPFW_DL_SRC != 0 || a.dl_src == b.dl_src)
        && (w & ofp::OFPFW_DL_DST != 0 || a.dl_dst == b.dl_dst)
        && (w & ofp::OFPFW_DL_TYPE != 0 || a.dl_type == b.dl_type)
        && ((a.nw_src ^ b.nw_src) & src_mask) == 0
        && ((a.nw_dst ^ b.nw_dst) & dst_mask) == 0
        && (w & ofp::OFPFW_NW_PROTO != 0 || a.nw_proto == b.nw_proto)
        && (w & ofp::OFPFW_TP_SRC != 0 || a.tp_src == b.tp_src)
        && (w & ofp::OFPFW_TP_DST != 0 || a.tp_dst == b.tp_dst)
}

// Match under 'b's wildcards only: the packet-vs-rule case, where 'a' is the
// (exact) packet key and 'b' the table entry.
pub fn matches_1wild(a: &SwFlowKey, b: &SwFlowKey) -> bool {
    fields_match(&a.flow, &b.flow, b.wildcards, b.nw_src_mask, b.nw_dst_mask)
}

// Match under the union of both wildcard sets: the rule-vs-rule case, used
// for overlap tests in modify and delete.
pub fn matches_2wild(a: &SwFlowKey, b: &SwFlowKey) -> bool {
    fields_match(&a.flow, &b.flow, a.wildcards | b.wildcards,
                 a.nw_src_mask & b.nw_src_mask,
                 a.nw_dst_mask & b.nw_dst_mask)
}

// Deletion filter: 't' is the table entry's key, 'd' describes the deletion.
// Strict deletion requires the wildcard sets to be identical as well.
pub fn del_matches(t: &SwFlowKey, d: &SwFlowKey, strict: bool) -> bool {
    if strict && d.wildcards != t.wildcards {
        return false;
    }
    matches_2wild(t, d)
}

fn hdr_at<T>(b: &mut Buffer, ofs: usize) -> Option<header::Header<T>> {
    let s = b.as_mut_slice();
    if ofs > s.len() { return None; }
    header::try_from_mem::<T>(&mut s[ofs..])
}

// Parse a frame into a flow key and set the buffer's L3/L4 offset cursors.
// The second return value reports whether the frame is an IP fragment;
// transport ports are only read from unfragmented datagrams.
pub fn extract(b: &mut Buffer, in_port: u16) -> (FlowKey, bool) {
    let mut flow = FlowKey::default();
    flow.in_port = lib::htons(in_port);
    flow.dl_vlan = lib::htons(ofp::OFP_VLAN_NONE);
    b.l2 = 0;
    b.l3 = None;
    b.l4 = None;

    let eth = match hdr_at::<Ethernet>(b, 0) {
        Some(eth) => eth,
        None => return (flow, false)
    };
    flow.dl_src = *eth.src();
    flow.dl_dst = *eth.dst();
    let mut ofs = ethernet::HEADER_LEN;

    if eth.ethertype() >= ethernet::TYPE_ETH2_CUTOFF {
        // This is an Ethernet II frame.
        flow.dl_type = lib::htons(eth.ethertype());
    } else {
        // This is an 802.2 frame.
        match hdr_at::<LlcSnap>(b, ofs) {
            Some(h) if h.is_snap() => {
                flow.dl_type = lib::htons(h.snap_type());
                ofs += header::size_of::<LlcSnap>();
            }
            Some(_) => {
                flow.dl_type = lib::htons(ethernet::TYPE_NOT_ETH);
                ofs += ethernet::LLC_HEADER_LEN;
            }
            None => return (flow, false)
        }
    }

    // Check for a VLAN tag.
    if flow.dl_type == lib::htons(ethernet::TYPE_VLAN) {
        match hdr_at::<Vlan>(b, ofs) {
            Some(vh) => {
                flow.dl_vlan = lib::htons(vh.vid());
                flow.dl_type = lib::htons(vh.next_type());
                ofs += ethernet::VLAN_HEADER_LEN;
            }
            None => return (flow, false)
        }
    }

    b.l3 = Some(ofs);
    if flow.dl_type == lib::htons(ethernet::TYPE_IPV4) {
        let (proto, l4_ofs, fragment) = match hdr_at::<IPv4>(b, ofs) {
            Some(nh) => {
                flow.nw_src = nh.src();
                flow.nw_dst = nh.dst();
                flow.nw_proto = nh.protocol();
                (nh.protocol(), ofs + nh.header_len(), nh.is_fragment())
            }
            None => return (flow, false)
        };
        b.l4 = Some(l4_ofs);
        if fragment {
            return (flow, true);
        }
        if proto == ipv4::PROTOCOL_TCP {
            match hdr_at::<TCP>(b, l4_ofs) {
                Some(th) => {
                    flow.tp_src = lib::htons(th.src_port());
                    flow.tp_dst = lib::htons(th.dst_port());
                }
                // Too short for a transport header: report no protocol
                // rather than a fake 4-tuple.
                None => { flow.nw_proto = 0; b.l4 = None; }
            }
        } else if proto == ipv4::PROTOCOL_UDP {
            match hdr_at::<UDP>(b, l4_ofs) {
                Some(th) => {
                    flow.tp_src = lib::htons(th.src_port());
                    flow.tp_dst = lib::htons(th.dst_port());
                }
                None => { flow.nw_proto = 0; b.l4 = None; }
            }
        }
    } else if flow.dl_type == lib::htons(ethernet::TYPE_ARP) {
        if let Some(ah) = hdr_at::<Arp>(b, ofs) {
            if ah.is_ethernet_ipv4() {
                flow.nw_src = ah.spa();
                flow.nw_dst = ah.tpa();
            }
        }
    }

    (flow, false)
}

// Why a removed or aged-out flow went away (wire reason codes).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ExpiredReason {
    Idle,
    Hard,
    Delete
}

impl ExpiredReason {
    pub fn wire(self) -> u8 {
        match self {
            ExpiredReason::Idle => ofp::OFPER_IDLE_TIMEOUT,
            ExpiredReason::Hard => ofp::OFPER_HARD_TIMEOUT,
            ExpiredReason::Delete => ofp::OFPER_DELETE
        }
    }
}

// Maximum number of actions in a single flow entry.
pub const MAX_ACTIONS: usize = 16;

// Timeout value meaning "never expire".
pub const OFP_FLOW_PERMANENT: u16 = 0;

#[derive(Clone, Debug)]
pub struct FlowEntry {
    pub key: SwFlowKey,
    pub priority: u16,     // meaningful only when the key has wildcards
    pub idle_timeout: u16, // seconds, 0 = permanent
    pub hard_timeout: u16, // seconds, 0 = permanent
    pub created: u64,
    pub last_used: u64,
    pub packet_count: u64,
    pub byte_count: u64,
    pub actions: Vec<Action>
}

impl FlowEntry {

    pub fn new(key: SwFlowKey, priority: u16, idle_timeout: u16,
               hard_timeout: u16, now: u64, actions: Vec<Action>) -> FlowEntry {
        FlowEntry {
            key, priority, idle_timeout, hard_timeout,
            created: now, last_used: now,
            packet_count: 0, byte_count: 0,
            actions
        }
    }

    pub fn mark_used(&mut self, now: u64, bytes: u64) {
        self.last_used = now;
        self.packet_count += 1;
        self.byte_count += bytes;
    }

    pub fn timed_out(&self, now: u64) -> Option<ExpiredReason> {
        if self.idle_timeout != OFP_FLOW_PERMANENT
            && now > self.last_used + self.idle_timeout as u64 {
            Some(ExpiredReason::Idle)
        } else if self.hard_timeout != OFP_FLOW_PERMANENT
            && now > self.created + self.hard_timeout as u64 {
            Some(ExpiredReason::Hard)
        } else {
            None
        }
    }

    pub fn duration(&self, now: u64) -> u32 {
        now.saturating_sub(self.created) as u32
    }

}
