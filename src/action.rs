use super::lib;
use super::buffer::Buffer;
use super::checksum;
use super::ethernet;
use super::ethernet::MacAddress;
use super::ipv4;
use super::tcp;
use super::udp;
use super::flow;
use super::flow::SwFlowKey;
use super::openflow as ofp;
use super::openflow::OfpError;

// ACTIONS
//
// The tagged action variant, its wire TLV codec, install-time validation, and
// the setter execution that rewrites packet fields in place with incremental
// checksum fixup. OUTPUT fan-out lives in the datapath, which owns the ports.
//
//   Action - tagged variant over the ten action types
//   decode_list(&[u8]) -> Result<Vec<Action>, OfpError> - parse a TLV list
//   decode_n(&[u8], usize) - parse a counted list (PACKET_OUT), return rest
//   encode_list(&[Action], &mut Vec<u8>) - wire encoding
//   validate(&[Action], in_port, port_exists) - reject looping/unknown outputs
//   execute_setter(&mut Buffer, &mut SwFlowKey, &Action) - apply a rewrite

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Action {
    Output { port: u16, max_len: u16 },
    SetVlanVid(u16), // OFP_VLAN_NONE strips the tag
    SetVlanPcp(u8),
    StripVlan,
    SetDlSrc(MacAddress),
    SetDlDst(MacAddress),
    SetNwSrc(u32),   // host byte order
    SetNwDst(u32),   // host byte order
    SetTpSrc(u16),   // host byte order
    SetTpDst(u16)    // host byte order
}

fn bad_action(code: u16) -> OfpError {
    OfpError::new(ofp::OFPET_BAD_ACTION, code)
}

// Each TLV is {type: u16, len: u16, body}, padded to a multiple of 8 bytes.
fn decode_one(t: u16, body: &[u8]) -> Result<Action, OfpError> {
    let u16_at = |ofs: usize| u16::from_be_bytes([body[ofs], body[ofs + 1]]);
    let need = |n: usize| if body.len() < n {
        Err(bad_action(ofp::OFPBAC_BAD_LENGTH))
    } else {
        Ok(())
    };
    match t {
        ofp::OFPAT_OUTPUT => {
            need(4)?;
            Ok(Action::Output { port: u16_at(0), max_len: u16_at(2) })
        }
        ofp::OFPAT_SET_VLAN_VID => {
            need(2)?;
            Ok(Action::SetVlanVid(u16_at(0)))
        }
        ofp::OFPAT_SET_VLAN_PCP => {
            need(1)?;
            Ok(Action::SetVlanPcp(body[0]))
        }
        ofp::OFPAT_STRIP_VLAN => Ok(Action::StripVlan),
        ofp::OFPAT_SET_DL_SRC | ofp::OFPAT_SET_DL_DST => {
            need(6)?;
            let mut mac: MacAddress = [0; 6];
            mac.copy_from_slice(&body[..6]);
            Ok(if t == ofp::OFPAT_SET_DL_SRC {
                Action::SetDlSrc(mac)
            } else {
                Action::SetDlDst(mac)
            })
        }
        ofp::OFPAT_SET_NW_SRC | ofp::OFPAT_SET_NW_DST => {
            need(4)?;
            let addr = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
            Ok(if t == ofp::OFPAT_SET_NW_SRC {
                Action::SetNwSrc(addr)
            } else {
                Action::SetNwDst(addr)
            })
        }
        ofp::OFPAT_SET_TP_SRC | ofp::OFPAT_SET_TP_DST => {
            need(2)?;
            Ok(if t == ofp::OFPAT_SET_TP_SRC {
                Action::SetTpSrc(u16_at(0))
            } else {
                Action::SetTpDst(u16_at(0))
            })
        }
        _ => Err(bad_action(ofp::OFPBAC_BAD_TYPE))
    }
}

fn decode_tlvs(mut body: &[u8], limit: Option<usize>)
               -> Result<(Vec<Action>, usize), OfpError> {
    let mut actions = Vec::new();
    let mut consumed = 0;
    while !body.is_empty() && limit.map_or(true, |n| actions.len() < n) {
        if body.len() < 4 {
            return Err(bad_action(ofp::OFPBAC_BAD_LENGTH));
        }
        let t = u16::from_be_bytes([body[0], body[1]]);
        let len = u16::from_be_bytes([body[2], body[3]]) as usize;
        if len < 8 || len % 8 != 0 || len > body.len() {
            return Err(bad_action(ofp::OFPBAC_BAD_LENGTH));
        }
        actions.push(decode_one(t, &body[4..len])?);
        if actions.len() > flow::MAX_ACTIONS {
            return Err(bad_action(ofp::OFPBAC_TOO_MANY));
        }
        consumed += len;
        body = &body[len..];
    }
    if let Some(n) = limit {
        if actions.len() < n {
            return Err(bad_action(ofp::OFPBAC_BAD_LENGTH));
        }
    }
    Ok((actions, consumed))
}

// Parse an action list filling the whole of 'body'.
pub fn decode_list(body: &[u8]) -> Result<Vec<Action>, OfpError> {
    decode_tlvs(body, None).map(|(actions, _)| actions)
}

// Parse exactly 'n' actions from the head of 'body'; the remainder (returned
// as an offset) is the inline frame of a PACKET_OUT.
pub fn decode_n(body: &[u8], n: usize) -> Result<(Vec<Action>, usize), OfpError> {
    if n > flow::MAX_ACTIONS {
        return Err(bad_action(ofp::OFPBAC_TOO_MANY));
    }
    decode_tlvs(body, Some(n))
}

fn encode_one(a: &Action, b: &mut Vec<u8>) {
    let tlv = |b: &mut Vec<u8>, t: u16, len: u16| {
        ofp::put_u16(b, t);
        ofp::put_u16(b, len);
    };
    match *a {
        Action::Output { port, max_len } => {
            tlv(b, ofp::OFPAT_OUTPUT, 8);
            ofp::put_u16(b, port);
            ofp::put_u16(b, max_len);
        }
        Action::SetVlanVid(vid) => {
            tlv(b, ofp::OFPAT_SET_VLAN_VID, 8);
            ofp::put_u16(b, vid);
            ofp::put_zeros(b, 2);
        }
        Action::SetVlanPcp(pcp) => {
            tlv(b, ofp::OFPAT_SET_VLAN_PCP, 8);
            ofp::put_u8(b, pcp);
            ofp::put_zeros(b, 3);
        }
        Action::StripVlan => {
            tlv(b, ofp::OFPAT_STRIP_VLAN, 8);
            ofp::put_zeros(b, 4);
        }
        Action::SetDlSrc(mac) | Action::SetDlDst(mac) => {
            let t = if let Action::SetDlSrc(_) = a {
                ofp::OFPAT_SET_DL_SRC
            } else {
                ofp::OFPAT_SET_DL_DST
            };
            tlv(b, t, 16);
            ofp::put_bytes(b, &mac);
            ofp::put_zeros(b, 6);
        }
        Action::SetNwSrc(addr) | Action::SetNwDst(addr) => {
            let t = if let Action::SetNwSrc(_) = a {
                ofp::OFPAT_SET_NW_SRC
            } else {
                ofp::OFPAT_SET_NW_DST
            };
            tlv(b, t, 8);
            ofp::put_u32(b, addr);
        }
        Action::SetTpSrc(port) | Action::SetTpDst(port) => {
            let t = if let Action::SetTpSrc(_) = a {
                ofp::OFPAT_SET_TP_SRC
            } else {
                ofp::OFPAT_SET_TP_DST
            };
            tlv(b, t, 8);
            ofp::put_u16(b, port);
            ofp::put_zeros(b, 2);
        }
    }
}

pub fn encode_list(actions: &[Action], b: &mut Vec<u8>) {
    for a in actions {
        encode_one(a, b);
    }
}

// Bitmap of the supported action types, advertised in FEATURES_REPLY.
pub fn supported_bitmap() -> u32 {
    (1 << ofp::OFPAT_OUTPUT)
        | (1 << ofp::OFPAT_SET_VLAN_VID)
        | (1 << ofp::OFPAT_SET_VLAN_PCP)
        | (1 << ofp::OFPAT_STRIP_VLAN)
        | (1 << ofp::OFPAT_SET_DL_SRC)
        | (1 << ofp::OFPAT_SET_DL_DST)
        | (1 << ofp::OFPAT_SET_NW_SRC)
        | (1 << ofp::OFPAT_SET_NW_DST)
        | (1 << ofp::OFPAT_SET_TP_SRC)
        | (1 << ofp::OFPAT_SET_TP_DST)
}

// Install-time validation. To prevent controller-induced loops, no flow may
// output to TABLE, NONE or its own ingress port; outputs to absent physical
// ports are rejected as well.
pub fn validate<F>(actions: &[Action], in_port: u16, port_exists: F)
                   -> Result<(), OfpError>
    where F: Fn(u16) -> bool
{
    if actions.len() > flow::MAX_ACTIONS {
        return Err(bad_action(ofp::OFPBAC_TOO_MANY));
    }
    for a in actions {
        if let Action::Output { port, .. } = a {
            if *port == ofp::OFPP_TABLE || *port == ofp::OFPP_NONE
                || *port == in_port {
                return Err(bad_action(ofp::OFPBAC_BAD_OUT_PORT));
            }
            if *port < ofp::OFPP_MAX && !port_exists(*port) {
                return Err(bad_action(ofp::OFPBAC_BAD_OUT_PORT));
            }
        }
    }
    Ok(())
}

fn get_u16(b: &Buffer, ofs: usize) -> Result<u16, &'static str> {
    b.at(ofs, 2)
        .map(|s| u16::from_be_bytes([s[0], s[1]]))
        .ok_or("field beyond packet")
}

fn set_u16(b: &mut Buffer, ofs: usize, v: u16) -> Result<(), &'static str> {
    let s = b.at_mut(ofs, 2).ok_or("field beyond packet")?;
    s.copy_from_slice(&v.to_be_bytes());
    Ok(())
}

fn get_u32(b: &Buffer, ofs: usize) -> Result<u32, &'static str> {
    b.at(ofs, 4)
        .map(|s| u32::from_be_bytes([s[0], s[1], s[2], s[3]]))
        .ok_or("field beyond packet")
}

fn set_u32(b: &mut Buffer, ofs: usize, v: u32) -> Result<(), &'static str> {
    let s = b.at_mut(ofs, 4).ok_or("field beyond packet")?;
    s.copy_from_slice(&v.to_be_bytes());
    Ok(())
}

// Remove the 802.1Q tag if present (no-op otherwise).
fn vlan_strip(b: &mut Buffer, key: &mut SwFlowKey) -> Result<(), &'static str> {
    if key.flow.dl_vlan == lib::htons(ofp::OFP_VLAN_NONE) {
        return Ok(());
    }
    if b.len() < ethernet::HEADER_LEN + ethernet::VLAN_HEADER_LEN {
        return Err("tagged frame too short");
    }
    let s = b.as_mut_slice();
    s.copy_within(0..12, 4);
    b.pull(ethernet::VLAN_HEADER_LEN);
    b.l3 = b.l3.map(|ofs| ofs - ethernet::VLAN_HEADER_LEN);
    b.l4 = b.l4.map(|ofs| ofs - ethernet::VLAN_HEADER_LEN);
    key.flow.dl_vlan = lib::htons(ofp::OFP_VLAN_NONE);
    Ok(())
}

// Rewrite the masked TCI bits, inserting a fresh tag between the source MAC
// and the ethertype when the frame is untagged.
fn vlan_modify(b: &mut Buffer, key: &mut SwFlowKey, tci: u16, mask: u16)
               -> Result<(), &'static str> {
    const TCI_OFS: usize = 14; // after the two MACs and the 0x8100 ethertype
    if key.flow.dl_vlan != lib::htons(ofp::OFP_VLAN_NONE) {
        // Modify the masked bits, but maintain the other TCI values.
        let old = get_u16(b, TCI_OFS)?;
        let new = (old & !mask) | (tci & mask);
        set_u16(b, TCI_OFS, new)?;
        key.flow.dl_vlan = lib::htons(new & ethernet::VLAN_VID_MASK);
    } else {
        // Insert a fresh tag.
        if b.len() < ethernet::HEADER_LEN {
            return Err("frame too short");
        }
        b.push(ethernet::VLAN_HEADER_LEN);
        let s = b.as_mut_slice();
        s.copy_within(4..16, 0);
        s[12..14].copy_from_slice(&ethernet::TYPE_VLAN.to_be_bytes());
        s[14..16].copy_from_slice(&(tci & mask).to_be_bytes());
        b.l3 = b.l3.map(|ofs| ofs + ethernet::VLAN_HEADER_LEN);
        b.l4 = b.l4.map(|ofs| ofs + ethernet::VLAN_HEADER_LEN);
        key.flow.dl_vlan = lib::htons(tci & ethernet::VLAN_VID_MASK);
    }
    Ok(())
}

// Rewrite an IPv4 address, fixing up the IP header checksum and, for TCP and
// UDP, the pseudo-header checksum. A UDP checksum stored as zero stays zero
// ("no checksum"); a fixed-up UDP checksum of zero is escaped to 0xffff.
fn modify_nh(b: &mut Buffer, key: &SwFlowKey, src: bool, addr: u32)
             -> Result<(), &'static str> {
    if key.flow.dl_type != lib::htons(ethernet::TYPE_IPV4) {
        return Ok(());
    }
    let l3 = b.l3.ok_or("no network header")?;
    let field_ofs = l3 + if src { 12 } else { 16 };
    let old = get_u32(b, field_ofs)?;
    if let Some(l4) = b.l4 {
        if key.flow.nw_proto == ipv4::PROTOCOL_TCP {
            let csum_ofs = l4 + tcp::CSUM_OFS;
            let old_csum = get_u16(b, csum_ofs)?;
            set_u16(b, csum_ofs, checksum::recalc_csum32(old_csum, old, addr))?;
        } else if key.flow.nw_proto == ipv4::PROTOCOL_UDP {
            let csum_ofs = l4 + udp::CSUM_OFS;
            let old_csum = get_u16(b, csum_ofs)?;
            if old_csum != 0 {
                let mut new_csum = checksum::recalc_csum32(old_csum, old, addr);
                if new_csum == 0 {
                    new_csum = 0xffff;
                }
                set_u16(b, csum_ofs, new_csum)?;
            }
        }
    }
    let csum_ofs = l3 + 10;
    let old_csum = get_u16(b, csum_ofs)?;
    set_u16(b, csum_ofs, checksum::recalc_csum32(old_csum, old, addr))?;
    set_u32(b, field_ofs, addr)
}

// Rewrite a transport port, fixing up the L4 checksum only.
fn modify_th(b: &mut Buffer, key: &SwFlowKey, src: bool, port: u16)
             -> Result<(), &'static str> {
    if key.flow.dl_type != lib::htons(ethernet::TYPE_IPV4) {
        return Ok(());
    }
    let l4 = match b.l4 {
        Some(l4) => l4,
        None => return Ok(())
    };
    let field_ofs = l4 + if src { 0 } else { 2 };
    match key.flow.nw_proto {
        ipv4::PROTOCOL_TCP => {
            let old = get_u16(b, field_ofs)?;
            let csum_ofs = l4 + tcp::CSUM_OFS;
            let old_csum = get_u16(b, csum_ofs)?;
            set_u16(b, csum_ofs, checksum::recalc_csum16(old_csum, old, port))?;
            set_u16(b, field_ofs, port)
        }
        ipv4::PROTOCOL_UDP => {
            let old = get_u16(b, field_ofs)?;
            let csum_ofs = l4 + udp::CSUM_OFS;
            let old_csum = get_u16(b, csum_ofs)?;
            if old_csum != 0 {
                let mut new_csum = checksum::recalc_csum16(old_csum, old, port);
                if new_csum == 0 {
                    new_csum = 0xffff;
                }
                set_u16(b, csum_ofs, new_csum)?;
            }
            set_u16(b, field_ofs, port)
        }
        _ => Ok(())
    }
}

// Apply a single non-OUTPUT action to the packet in place. The key tracks
// rewrites that later actions depend on (the VLAN state).
pub fn execute_setter(b: &mut Buffer, key: &mut SwFlowKey, a: &Action)
                      -> Result<(), &'static str> {
    match *a {
        Action::Output { .. } => Ok(()), // handled by the datapath
        Action::SetVlanVid(vid) => {
            if vid == ofp::OFP_VLAN_NONE {
                vlan_strip(b, key)
            } else {
                vlan_modify(b, key, vid & ethernet::VLAN_VID_MASK,
                            ethernet::VLAN_VID_MASK)
            }
        }
        Action::SetVlanPcp(pcp) => {
            vlan_modify(b, key, (pcp as u16) << ethernet::VLAN_PCP_SHIFT,
                        ethernet::VLAN_PCP_MASK)
        }
        Action::StripVlan => vlan_strip(b, key),
        Action::SetDlSrc(mac) => {
            let s = b.at_mut(b.l2 + 6, 6).ok_or("frame too short")?;
            s.copy_from_slice(&mac);
            Ok(())
        }
        Action::SetDlDst(mac) => {
            let s = b.at_mut(b.l2, 6).ok_or("frame too short")?;
            s.copy_from_slice(&mac);
            Ok(())
        }
        Action::SetNwSrc(addr) => modify_nh(b, key, true, addr),
        Action::SetNwDst(addr) => modify_nh(b, key, false, addr),
        Action::SetTpSrc(port) => modify_th(b, key, true, port),
        Action::SetTpDst(port) => modify_th(b, key, false, port)
    }
}
