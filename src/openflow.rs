use super::ethernet::MacAddress;

use std::io;
use std::io::Read;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

// OPENFLOW WIRE SCHEMA
//
// Constants and codecs for the OpenFlow 0.8.x-class control protocol. Every
// message is a length-prefixed record with a common 8-byte header; all
// multi-byte fields are big-endian and all structures are packed. Unlike the
// in-memory protocol headers this schema crosses a byte stream, so fields are
// read and written explicitly instead of cast.
//
//   OfpHeader - the common header {version, type, length, xid}
//   OfpMatch - the wire form of a flow key plus wildcards
//   OfpError - typed protocol failure, converted to ERROR messages
//   start(type, xid) / finish(&mut Vec<u8>) - message assembly
//   put_*(&mut Vec<u8>, v) - big-endian field writers
//   decode helpers for the message bodies the switch consumes

pub const OFP_VERSION: u8 = 0x83;
pub const OFP_HEADER_LEN: usize = 8;
pub const OFP_MATCH_LEN: usize = 36;
pub const OFP_PHY_PORT_LEN: usize = 36;
pub const OFP_MAX_PORT_NAME_LEN: usize = 16;

pub const OFP_DEFAULT_MISS_SEND_LEN: u16 = 128;

// Message types.
pub const OFPT_HELLO: u8 = 0;
pub const OFPT_ERROR: u8 = 1;
pub const OFPT_ECHO_REQUEST: u8 = 2;
pub const OFPT_ECHO_REPLY: u8 = 3;
pub const OFPT_VENDOR: u8 = 4;
pub const OFPT_FEATURES_REQUEST: u8 = 5;
pub const OFPT_FEATURES_REPLY: u8 = 6;
pub const OFPT_GET_CONFIG_REQUEST: u8 = 7;
pub const OFPT_GET_CONFIG_REPLY: u8 = 8;
pub const OFPT_SET_CONFIG: u8 = 9;
pub const OFPT_PACKET_IN: u8 = 10;
pub const OFPT_FLOW_EXPIRED: u8 = 11;
pub const OFPT_PORT_STATUS: u8 = 12;
pub const OFPT_PACKET_OUT: u8 = 13;
pub const OFPT_FLOW_MOD: u8 = 14;
pub const OFPT_PORT_MOD: u8 = 15;
pub const OFPT_STATS_REQUEST: u8 = 16;
pub const OFPT_STATS_REPLY: u8 = 17;

// Reserved port numbers. Physical ports live in [0, OFPP_MAX).
pub const OFPP_MAX: u16 = 0xff00;
pub const OFPP_TABLE: u16 = 0xfff9;
pub const OFPP_NORMAL: u16 = 0xfffa;
pub const OFPP_FLOOD: u16 = 0xfffb;
pub const OFPP_ALL: u16 = 0xfffc;
pub const OFPP_CONTROLLER: u16 = 0xfffd;
pub const OFPP_LOCAL: u16 = 0xfffe;
pub const OFPP_NONE: u16 = 0xffff;

// "Not buffered" sentinel, shared between the wire and the buffer cache.
pub const OFP_NO_BUFFER: u32 = 0xffff_ffff;

// VLAN id sentinel for "no VLAN tag".
pub const OFP_VLAN_NONE: u16 = 0xffff;

// Flow wildcard bits (host byte order).
pub const OFPFW_IN_PORT: u32 = 1 << 0;
pub const OFPFW_DL_VLAN: u32 = 1 << 1;
pub const OFPFW_DL_SRC: u32 = 1 << 2;
pub const OFPFW_DL_DST: u32 = 1 << 3;
pub const OFPFW_DL_TYPE: u32 = 1 << 4;
pub const OFPFW_NW_PROTO: u32 = 1 << 5;
pub const OFPFW_TP_SRC: u32 = 1 << 6;
pub const OFPFW_TP_DST: u32 = 1 << 7;

// IPv4 address wildcards are 6-bit counts of wildcarded low bits; 32 or more
// wildcards the whole address.
pub const OFPFW_NW_SRC_SHIFT: u32 = 8;
pub const OFPFW_NW_SRC_BITS: u32 = 6;
pub const OFPFW_NW_SRC_MASK: u32 = ((1 << OFPFW_NW_SRC_BITS) - 1) << OFPFW_NW_SRC_SHIFT;
pub const OFPFW_NW_SRC_ALL: u32 = 32 << OFPFW_NW_SRC_SHIFT;
pub const OFPFW_NW_DST_SHIFT: u32 = 14;
pub const OFPFW_NW_DST_BITS: u32 = 6;
pub const OFPFW_NW_DST_MASK: u32 = ((1 << OFPFW_NW_DST_BITS) - 1) << OFPFW_NW_DST_SHIFT;
pub const OFPFW_NW_DST_ALL: u32 = 32 << OFPFW_NW_DST_SHIFT;

pub const OFPFW_ALL: u32 = (1 << 20) - 1;

pub const OFPFW_NW: u32 = OFPFW_NW_SRC_MASK | OFPFW_NW_DST_MASK | OFPFW_NW_PROTO;
pub const OFPFW_TP: u32 = OFPFW_TP_SRC | OFPFW_TP_DST;

// Action types.
pub const OFPAT_OUTPUT: u16 = 0;
pub const OFPAT_SET_VLAN_VID: u16 = 1;
pub const OFPAT_SET_VLAN_PCP: u16 = 2;
pub const OFPAT_STRIP_VLAN: u16 = 3;
pub const OFPAT_SET_DL_SRC: u16 = 4;
pub const OFPAT_SET_DL_DST: u16 = 5;
pub const OFPAT_SET_NW_SRC: u16 = 6;
pub const OFPAT_SET_NW_DST: u16 = 7;
pub const OFPAT_SET_TP_SRC: u16 = 8;
pub const OFPAT_SET_TP_DST: u16 = 9;

// Switch configuration flags.
pub const OFPC_SEND_FLOW_EXP: u16 = 1 << 0;
pub const OFPC_FRAG_NORMAL: u16 = 0 << 1;
pub const OFPC_FRAG_DROP: u16 = 1 << 1;
pub const OFPC_FRAG_MASK: u16 = 3 << 1;

// Capability bits advertised in FEATURES_REPLY.
pub const OFPC_FLOW_STATS: u32 = 1 << 0;
pub const OFPC_TABLE_STATS: u32 = 1 << 1;
pub const OFPC_PORT_STATS: u32 = 1 << 2;
pub const OFPC_MULTI_PHY_TX: u32 = 1 << 3;

// Port administrative flags.
pub const OFPPFL_NO_FLOOD: u32 = 1 << 0;
pub const OFPPFL_NO_RECV: u32 = 1 << 1;
pub const OFPPFL_NO_RECV_STP: u32 = 1 << 2;
pub const OFPPFL_NO_FWD: u32 = 1 << 3;

// PACKET_IN reasons.
pub const OFPR_NO_MATCH: u8 = 0;
pub const OFPR_ACTION: u8 = 1;

// FLOW_EXPIRED reasons.
pub const OFPER_IDLE_TIMEOUT: u8 = 0;
pub const OFPER_HARD_TIMEOUT: u8 = 1;
pub const OFPER_DELETE: u8 = 2;

// PORT_STATUS reasons.
pub const OFPPR_ADD: u8 = 0;
pub const OFPPR_DELETE: u8 = 1;
pub const OFPPR_MODIFY: u8 = 2;

// FLOW_MOD commands.
pub const OFPFC_ADD: u16 = 0;
pub const OFPFC_MODIFY: u16 = 1;
pub const OFPFC_MODIFY_STRICT: u16 = 2;
pub const OFPFC_DELETE: u16 = 3;
pub const OFPFC_DELETE_STRICT: u16 = 4;

// STATS_REQUEST / STATS_REPLY subtypes and flags.
pub const OFPST_FLOW: u16 = 1;
pub const OFPST_AGGREGATE: u16 = 2;
pub const OFPST_TABLE: u16 = 3;
pub const OFPST_PORT: u16 = 4;
pub const OFPSF_REPLY_MORE: u16 = 1 << 0;

// Error types and codes.
pub const OFPET_BAD_REQUEST: u16 = 1;
pub const OFPBRC_BAD_VERSION: u16 = 0;
pub const OFPBRC_BAD_TYPE: u16 = 1;
pub const OFPBRC_BAD_LENGTH: u16 = 2;
pub const OFPBRC_BAD_VENDOR: u16 = 3;
pub const OFPBRC_BAD_STAT: u16 = 4;
pub const OFPBRC_BUFFER_UNKNOWN: u16 = 5;

pub const OFPET_BAD_ACTION: u16 = 2;
pub const OFPBAC_BAD_TYPE: u16 = 0;
pub const OFPBAC_BAD_LENGTH: u16 = 1;
pub const OFPBAC_BAD_OUT_PORT: u16 = 2;
pub const OFPBAC_TOO_MANY: u16 = 3;

pub const OFPET_FLOW_MOD_FAILED: u16 = 3;
pub const OFPFMFC_ALL_TABLES_FULL: u16 = 0;

pub const OFPET_PORT_MOD_FAILED: u16 = 4;
pub const OFPPMFC_BAD_PORT: u16 = 0;
pub const OFPPMFC_BAD_HW_ADDR: u16 = 1;

// A protocol failure, carried up to the dispatch boundary and answered with
// an ERROR message there.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OfpError {
    pub err_type: u16,
    pub code: u16
}

impl OfpError {
    pub fn new(err_type: u16, code: u16) -> OfpError {
        OfpError { err_type, code }
    }
    pub fn bad_length() -> OfpError {
        OfpError::new(OFPET_BAD_REQUEST, OFPBRC_BAD_LENGTH)
    }
    pub fn bad_buffer() -> OfpError {
        OfpError::new(OFPET_BAD_REQUEST, OFPBRC_BUFFER_UNKNOWN)
    }
}

// The common message header.
#[derive(Clone, Copy, Debug)]
pub struct OfpHeader {
    pub version: u8,
    pub msg_type: u8,
    pub length: u16,
    pub xid: u32
}

impl OfpHeader {
    pub fn decode(msg: &[u8]) -> Option<OfpHeader> {
        if msg.len() < OFP_HEADER_LEN { return None; }
        Some(OfpHeader {
            version: msg[0],
            msg_type: msg[1],
            length: u16::from_be_bytes([msg[2], msg[3]]),
            xid: u32::from_be_bytes([msg[4], msg[5], msg[6], msg[7]])
        })
    }
}

// Message assembly: start() writes the header with a zero length, finish()
// patches the final length in.
pub fn start(msg_type: u8, xid: u32) -> Vec<u8> {
    let mut b = Vec::with_capacity(64);
    b.push(OFP_VERSION);
    b.push(msg_type);
    put_u16(&mut b, 0);
    put_u32(&mut b, xid);
    b
}

pub fn finish(b: &mut Vec<u8>) {
    let len = b.len() as u16;
    b[2..4].copy_from_slice(&len.to_be_bytes());
}

pub fn put_u8(b: &mut Vec<u8>, v: u8) { b.push(v); }

pub fn put_u16(b: &mut Vec<u8>, v: u16) {
    b.write_u16::<BigEndian>(v).unwrap();
}

pub fn put_u32(b: &mut Vec<u8>, v: u32) {
    b.write_u32::<BigEndian>(v).unwrap();
}

pub fn put_u64(b: &mut Vec<u8>, v: u64) {
    b.write_u64::<BigEndian>(v).unwrap();
}

pub fn put_bytes(b: &mut Vec<u8>, bytes: &[u8]) {
    b.extend_from_slice(bytes);
}

pub fn put_zeros(b: &mut Vec<u8>, n: usize) {
    b.resize(b.len() + n, 0);
}

// Write a fixed-size name field, truncating or zero-padding.
pub fn put_name(b: &mut Vec<u8>, name: &str, len: usize) {
    let bytes = name.as_bytes();
    let n = std::cmp::min(bytes.len(), len - 1);
    b.extend_from_slice(&bytes[..n]);
    put_zeros(b, len - n);
}

type Rd<'a> = io::Cursor<&'a [u8]>;

fn rd_u8(c: &mut Rd) -> Result<u8, OfpError> {
    c.read_u8().map_err(|_| OfpError::bad_length())
}

fn rd_u16(c: &mut Rd) -> Result<u16, OfpError> {
    c.read_u16::<BigEndian>().map_err(|_| OfpError::bad_length())
}

fn rd_u32(c: &mut Rd) -> Result<u32, OfpError> {
    c.read_u32::<BigEndian>().map_err(|_| OfpError::bad_length())
}

fn rd_mac(c: &mut Rd) -> Result<MacAddress, OfpError> {
    let mut mac: MacAddress = [0; 6];
    c.read_exact(&mut mac).map_err(|_| OfpError::bad_length())?;
    Ok(mac)
}

fn rd_skip(c: &mut Rd, n: usize) -> Result<(), OfpError> {
    let mut sink = [0u8; 16];
    let mut left = n;
    while left > 0 {
        let take = std::cmp::min(left, sink.len());
        c.read_exact(&mut sink[..take]).map_err(|_| OfpError::bad_length())?;
        left -= take;
    }
    Ok(())
}

// The wire form of a flow match. Fields are decoded to host byte order; the
// flow module converts into its network-byte-order key.
#[derive(Clone, Copy, Debug, Default)]
pub struct OfpMatch {
    pub wildcards: u32,
    pub in_port: u16,
    pub dl_src: MacAddress,
    pub dl_dst: MacAddress,
    pub dl_vlan: u16,
    pub dl_type: u16,
    pub nw_src: u32,
    pub nw_dst: u32,
    pub nw_proto: u8,
    pub tp_src: u16,
    pub tp_dst: u16
}

impl OfpMatch {

    pub fn decode(c: &mut io::Cursor<&[u8]>) -> Result<OfpMatch, OfpError> {
        let wildcards = rd_u32(c)?;
        let in_port = rd_u16(c)?;
        let dl_src = rd_mac(c)?;
        let dl_dst = rd_mac(c)?;
        let dl_vlan = rd_u16(c)?;
        let dl_type = rd_u16(c)?;
        let nw_src = rd_u32(c)?;
        let nw_dst = rd_u32(c)?;
        let nw_proto = rd_u8(c)?;
        rd_skip(c, 1)?;
        let tp_src = rd_u16(c)?;
        let tp_dst = rd_u16(c)?;
        Ok(OfpMatch { wildcards, in_port, dl_src, dl_dst, dl_vlan, dl_type,
                      nw_src, nw_dst, nw_proto, tp_src, tp_dst })
    }

    pub fn encode(&self, b: &mut Vec<u8>) {
        put_u32(b, self.wildcards);
        put_u16(b, self.in_port);
        put_bytes(b, &self.dl_src);
        put_bytes(b, &self.dl_dst);
        put_u16(b, self.dl_vlan);
        put_u16(b, self.dl_type);
        put_u32(b, self.nw_src);
        put_u32(b, self.nw_dst);
        put_u8(b, self.nw_proto);
        put_zeros(b, 1);
        put_u16(b, self.tp_src);
        put_u16(b, self.tp_dst);
    }

}

// Bodies of the fixed-layout messages the switch consumes.

#[derive(Debug)]
pub struct SwitchConfig {
    pub flags: u16,
    pub miss_send_len: u16
}

impl SwitchConfig {
    pub fn decode(body: &[u8]) -> Result<SwitchConfig, OfpError> {
        let mut c = io::Cursor::new(body);
        let flags = rd_u16(&mut c)?;
        let miss_send_len = rd_u16(&mut c)?;
        Ok(SwitchConfig { flags, miss_send_len })
    }
}

#[derive(Debug)]
pub struct FlowModMsg {
    pub match_: OfpMatch,
    pub command: u16,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub priority: u16,
    pub buffer_id: u32,
    pub actions_ofs: usize // offset of the action list within the body
}

impl FlowModMsg {
    pub fn decode(body: &[u8]) -> Result<FlowModMsg, OfpError> {
        let mut c = io::Cursor::new(body);
        let match_ = OfpMatch::decode(&mut c)?;
        let command = rd_u16(&mut c)?;
        let idle_timeout = rd_u16(&mut c)?;
        let hard_timeout = rd_u16(&mut c)?;
        let priority = rd_u16(&mut c)?;
        let buffer_id = rd_u32(&mut c)?;
        rd_skip(&mut c, 4)?; // reserved
        let actions_ofs = c.position() as usize;
        Ok(FlowModMsg { match_, command, idle_timeout, hard_timeout,
                        priority, buffer_id, actions_ofs })
    }
}

pub struct PacketOutMsg {
    pub buffer_id: u32,
    pub in_port: u16,
    pub n_actions: u16,
    pub rest_ofs: usize // actions then inline frame data
}

impl PacketOutMsg {
    pub fn decode(body: &[u8]) -> Result<PacketOutMsg, OfpError> {
        let mut c = io::Cursor::new(body);
        let buffer_id = rd_u32(&mut c)?;
        let in_port = rd_u16(&mut c)?;
        let n_actions = rd_u16(&mut c)?;
        let rest_ofs = c.position() as usize;
        Ok(PacketOutMsg { buffer_id, in_port, n_actions, rest_ofs })
    }
}

pub struct PortModMsg {
    pub port_no: u16,
    pub hw_addr: MacAddress,
    pub flags: u32
}

impl PortModMsg {
    pub fn decode(body: &[u8]) -> Result<PortModMsg, OfpError> {
        let mut c = io::Cursor::new(body);
        let port_no = rd_u16(&mut c)?;
        let hw_addr = rd_mac(&mut c)?;
        rd_skip(&mut c, OFP_MAX_PORT_NAME_LEN)?;
        let flags = rd_u32(&mut c)?;
        Ok(PortModMsg { port_no, hw_addr, flags })
    }
}

pub struct StatsRequestMsg {
    pub stats_type: u16,
    pub flags: u16,
    pub body_ofs: usize
}

impl StatsRequestMsg {
    pub fn decode(body: &[u8]) -> Result<StatsRequestMsg, OfpError> {
        let mut c = io::Cursor::new(body);
        let stats_type = rd_u16(&mut c)?;
        let flags = rd_u16(&mut c)?;
        let body_ofs = c.position() as usize;
        Ok(StatsRequestMsg { stats_type, flags, body_ofs })
    }
}

// FLOW and AGGREGATE stats requests carry a match and a table filter.
pub struct FlowStatsRequest {
    pub match_: OfpMatch,
    pub table_id: u8
}

pub const TABLE_ID_ALL: u8 = 0xff;

impl FlowStatsRequest {
    pub fn decode(body: &[u8]) -> Result<FlowStatsRequest, OfpError> {
        let mut c = io::Cursor::new(body);
        let match_ = OfpMatch::decode(&mut c)?;
        let table_id = rd_u8(&mut c)?;
        rd_skip(&mut c, 1)?;
        Ok(FlowStatsRequest { match_, table_id })
    }
}

#[cfg(test)]
mod selftest {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let mut msg = start(OFPT_HELLO, 0x01020304);
        finish(&mut msg);
        assert_eq!(msg.len(), OFP_HEADER_LEN);
        let h = OfpHeader::decode(&msg).unwrap();
        assert_eq!(h.version, OFP_VERSION);
        assert_eq!(h.msg_type, OFPT_HELLO);
        assert_eq!(h.length as usize, OFP_HEADER_LEN);
        assert_eq!(h.xid, 0x01020304);
        assert!(OfpHeader::decode(&msg[..7]).is_none());
    }

    #[test]
    fn match_roundtrip() {
        let m = OfpMatch {
            wildcards: OFPFW_DL_VLAN | OFPFW_NW_SRC_MASK,
            in_port: 3,
            dl_src: [1, 2, 3, 4, 5, 6],
            dl_dst: [6, 5, 4, 3, 2, 1],
            dl_vlan: 0xffff,
            dl_type: 0x0800,
            nw_src: 0x0a000001,
            nw_dst: 0x0a000002,
            nw_proto: 6,
            tp_src: 1234,
            tp_dst: 80
        };
        let mut b = Vec::new();
        m.encode(&mut b);
        assert_eq!(b.len(), OFP_MATCH_LEN);
        let mut c = io::Cursor::new(&b[..]);
        let d = OfpMatch::decode(&mut c).unwrap();
        assert_eq!(d.wildcards, m.wildcards);
        assert_eq!(d.in_port, 3);
        assert_eq!(d.dl_src, m.dl_src);
        assert_eq!(d.dl_type, 0x0800);
        assert_eq!(d.nw_dst, 0x0a000002);
        assert_eq!(d.tp_dst, 80);
    }

    #[test]
    fn short_body_is_bad_length() {
        assert_eq!(SwitchConfig::decode(&[0, 1]).unwrap_err(),
                   OfpError::bad_length());
        assert_eq!(FlowModMsg::decode(&[0; 20]).unwrap_err(),
                   OfpError::bad_length());
    }

    #[test]
    fn names_are_padded() {
        let mut b = Vec::new();
        put_name(&mut b, "eth0", OFP_MAX_PORT_NAME_LEN);
        assert_eq!(b.len(), OFP_MAX_PORT_NAME_LEN);
        assert_eq!(&b[..4], b"eth0");
        assert_eq!(b[4], 0);
        let mut b = Vec::new();
        put_name(&mut b, "a-very-long-interface-name", OFP_MAX_PORT_NAME_LEN);
        assert_eq!(b.len(), OFP_MAX_PORT_NAME_LEN);
        assert_eq!(b[OFP_MAX_PORT_NAME_LEN - 1], 0);
    }
}
