use super::action;
use super::buffer::Buffer;
use super::datapath::Datapath;
use super::flow;
use super::flow::{ExpiredReason, FlowEntry, SwFlowKey};
use super::openflow as ofp;
use super::openflow::{OfpError, OfpHeader};
use super::port::Port;

// CONTROL PROTOCOL ENGINE
//
// Parses and dispatches the OpenFlow message set. Every inbound message runs
// through the version gate and a per-type minimum size check; handler
// failures are converted into ERROR replies at this boundary, with the
// offending message prefix echoed as data. The connection always survives a
// bad message.
//
//   input(dp, remote, msg, now) - dispatch one inbound message
//   packet_in / flow_expired / port_status - async message builders
//   encode_phy_port(&Port) - the physical port descriptor

// Longest offending-message prefix echoed in an ERROR.
const ERROR_DATA_MAX: usize = 64;

// Stats replies are chunked at this body size, with the MORE flag on all
// chunks but the last.
const STATS_BODY_MAX: usize = 4096;

type Handler = fn(&mut Datapath, usize, &OfpHeader, &[u8], u64)
                  -> Result<(), OfpError>;

fn handler_for(msg_type: u8) -> Option<(usize, Handler)> {
    match msg_type {
        ofp::OFPT_HELLO => Some((8, recv_hello)),
        ofp::OFPT_ERROR => Some((8, recv_error)),
        ofp::OFPT_ECHO_REQUEST => Some((8, recv_echo_request)),
        ofp::OFPT_ECHO_REPLY => Some((8, recv_echo_reply)),
        ofp::OFPT_VENDOR => Some((8, recv_vendor)),
        ofp::OFPT_FEATURES_REQUEST => Some((8, recv_features_request)),
        ofp::OFPT_GET_CONFIG_REQUEST => Some((8, recv_get_config_request)),
        ofp::OFPT_SET_CONFIG => Some((12, recv_set_config)),
        ofp::OFPT_PACKET_OUT => Some((16, recv_packet_out)),
        ofp::OFPT_FLOW_MOD => Some((8 + ofp::OFP_MATCH_LEN + 16, recv_flow_mod)),
        ofp::OFPT_PORT_MOD => Some((8 + ofp::OFP_PHY_PORT_LEN, recv_port_mod)),
        ofp::OFPT_STATS_REQUEST => Some((12, recv_stats_request)),
        _ => None
    }
}

// Dispatch one message received from 'remote'.
pub fn input(dp: &mut Datapath, remote: usize, msg: &[u8], now: u64) {
    let oh = match OfpHeader::decode(msg) {
        Some(oh) => oh,
        None => {
            dp.log("received too-short control message");
            return;
        }
    };
    // The version gate. A few types are version-agnostic by design.
    let version_free = matches!(oh.msg_type,
                                ofp::OFPT_HELLO | ofp::OFPT_ERROR
                                | ofp::OFPT_ECHO_REQUEST | ofp::OFPT_ECHO_REPLY
                                | ofp::OFPT_VENDOR);
    if oh.version != ofp::OFP_VERSION && !version_free {
        send_error(dp, remote, oh.xid,
                   OfpError::new(ofp::OFPET_BAD_REQUEST,
                                 ofp::OFPBRC_BAD_VERSION), msg);
        return;
    }
    let result = match handler_for(oh.msg_type) {
        Some((min_size, handler)) => {
            if (oh.length as usize) > msg.len()
                || msg.len() < min_size {
                Err(OfpError::bad_length())
            } else {
                handler(dp, remote, &oh, msg, now)
            }
        }
        None => Err(OfpError::new(ofp::OFPET_BAD_REQUEST,
                                  ofp::OFPBRC_BAD_TYPE))
    };
    if let Err(e) = result {
        send_error(dp, remote, oh.xid, e, msg);
    }
}

fn reply(dp: &mut Datapath, remote: usize, msg: Vec<u8>) {
    if let Some(r) = dp.remotes.get_mut(remote) {
        r.rconn.send(msg);
    }
}

fn send_error(dp: &mut Datapath, remote: usize, xid: u32, e: OfpError,
              offending: &[u8]) {
    let mut msg = ofp::start(ofp::OFPT_ERROR, xid);
    ofp::put_u16(&mut msg, e.err_type);
    ofp::put_u16(&mut msg, e.code);
    let n = std::cmp::min(offending.len(), ERROR_DATA_MAX);
    ofp::put_bytes(&mut msg, &offending[..n]);
    ofp::finish(&mut msg);
    reply(dp, remote, msg);
}

fn recv_hello(dp: &mut Datapath, remote: usize, oh: &OfpHeader, _msg: &[u8],
              _now: u64) -> Result<(), OfpError> {
    // Reply in kind, once per connection.
    if let Some(r) = dp.remotes.get_mut(remote) {
        if !r.hello_done {
            r.hello_done = true;
            let mut msg = ofp::start(ofp::OFPT_HELLO, oh.xid);
            ofp::finish(&mut msg);
            r.rconn.send(msg);
        }
    }
    Ok(())
}

fn recv_error(dp: &mut Datapath, _remote: usize, _oh: &OfpHeader, _msg: &[u8],
              _now: u64) -> Result<(), OfpError> {
    // The peer's complaint; worth a note, never a reply (no error loops).
    dp.log("controller reported an error");
    Ok(())
}

fn recv_echo_request(dp: &mut Datapath, remote: usize, oh: &OfpHeader,
                     msg: &[u8], _now: u64) -> Result<(), OfpError> {
    let mut out = ofp::start(ofp::OFPT_ECHO_REPLY, oh.xid);
    ofp::put_bytes(&mut out, &msg[ofp::OFP_HEADER_LEN..]);
    ofp::finish(&mut out);
    reply(dp, remote, out);
    Ok(())
}

fn recv_echo_reply(_dp: &mut Datapath, _remote: usize, _oh: &OfpHeader,
                   _msg: &[u8], _now: u64) -> Result<(), OfpError> {
    Ok(())
}

fn recv_vendor(_dp: &mut Datapath, _remote: usize, _oh: &OfpHeader,
               _msg: &[u8], _now: u64) -> Result<(), OfpError> {
    // No vendor extensions.
    Err(OfpError::new(ofp::OFPET_BAD_REQUEST, ofp::OFPBRC_BAD_VENDOR))
}

fn recv_features_request(dp: &mut Datapath, remote: usize, oh: &OfpHeader,
                         _msg: &[u8], _now: u64) -> Result<(), OfpError> {
    let table_stats = dp.chain.stats();
    let n_exact: usize = table_stats.iter()
        .filter(|s| s.name.starts_with("hash"))
        .map(|s| s.max_flows).sum();
    let n_general: usize = table_stats.iter()
        .filter(|s| !s.name.starts_with("hash"))
        .map(|s| s.max_flows).sum();

    let mut msg = ofp::start(ofp::OFPT_FEATURES_REPLY, oh.xid);
    ofp::put_u64(&mut msg, dp.id);
    ofp::put_u32(&mut msg, n_exact as u32);
    ofp::put_u32(&mut msg, 0); // compressed-match tables: not supported
    ofp::put_u32(&mut msg, n_general as u32);
    ofp::put_u32(&mut msg, u32::MAX); // buffer memory: unbounded
    ofp::put_u32(&mut msg, dp.n_buffers() as u32);
    ofp::put_u32(&mut msg, ofp::OFPC_FLOW_STATS | ofp::OFPC_TABLE_STATS
                 | ofp::OFPC_PORT_STATS | ofp::OFPC_MULTI_PHY_TX);
    ofp::put_u32(&mut msg, action::supported_bitmap());
    for port in &dp.ports {
        let desc = encode_phy_port(port);
        ofp::put_bytes(&mut msg, &desc);
    }
    ofp::finish(&mut msg);
    reply(dp, remote, msg);
    Ok(())
}

fn recv_get_config_request(dp: &mut Datapath, remote: usize, oh: &OfpHeader,
                           _msg: &[u8], _now: u64) -> Result<(), OfpError> {
    let mut msg = ofp::start(ofp::OFPT_GET_CONFIG_REPLY, oh.xid);
    ofp::put_u16(&mut msg, dp.flags);
    ofp::put_u16(&mut msg, dp.miss_send_len);
    ofp::finish(&mut msg);
    reply(dp, remote, msg);
    Ok(())
}

fn recv_set_config(dp: &mut Datapath, _remote: usize, _oh: &OfpHeader,
                   msg: &[u8], _now: u64) -> Result<(), OfpError> {
    let config = ofp::SwitchConfig::decode(&msg[ofp::OFP_HEADER_LEN..])?;
    let mut flags = config.flags
        & (ofp::OFPC_SEND_FLOW_EXP | ofp::OFPC_FRAG_MASK);
    // NORMAL and DROP are the only fragment policies; anything else
    // normalises to DROP.
    if flags & ofp::OFPC_FRAG_MASK != ofp::OFPC_FRAG_NORMAL
        && flags & ofp::OFPC_FRAG_MASK != ofp::OFPC_FRAG_DROP {
        flags = (flags & !ofp::OFPC_FRAG_MASK) | ofp::OFPC_FRAG_DROP;
    }
    dp.flags = flags;
    dp.miss_send_len = config.miss_send_len;
    Ok(())
}

fn recv_packet_out(dp: &mut Datapath, _remote: usize, _oh: &OfpHeader,
                   msg: &[u8], now: u64) -> Result<(), OfpError> {
    let body = &msg[ofp::OFP_HEADER_LEN..];
    let po = ofp::PacketOutMsg::decode(body)?;
    let (actions, actions_len) =
        action::decode_n(&body[po.rest_ofs..], po.n_actions as usize)?;
    let data = &body[po.rest_ofs + actions_len..];

    let mut buffer = if po.buffer_id == ofp::OFP_NO_BUFFER {
        Buffer::from_bytes(data)
    } else {
        dp.buffers.retrieve(po.buffer_id).ok_or_else(OfpError::bad_buffer)?
    };
    let (key, _) = flow::extract(&mut buffer, po.in_port);
    let mut skey = SwFlowKey::exact(key);
    // NO_FWD ports stay reachable for controller-injected packets.
    dp.execute_actions(buffer, po.in_port, &mut skey, &actions, true, now);
    Ok(())
}

fn notify_deleted(dp: &mut Datapath, deleted: Vec<FlowEntry>, now: u64) {
    for f in deleted {
        dp.send_flow_expired(&f, ExpiredReason::Delete, now);
    }
}

fn add_flow(dp: &mut Datapath, fm: &ofp::FlowModMsg,
            actions: Vec<action::Action>, now: u64) -> Result<(), OfpError> {
    let key = SwFlowKey::from_match(&fm.match_);
    let entry = FlowEntry::new(key, fm.priority, fm.idle_timeout,
                               fm.hard_timeout, now, actions.clone());
    if dp.chain.insert(entry).is_err() {
        if fm.buffer_id != ofp::OFP_NO_BUFFER {
            dp.buffers.discard(fm.buffer_id);
        }
        return Err(OfpError::new(ofp::OFPET_FLOW_MOD_FAILED,
                                 ofp::OFPFMFC_ALL_TABLES_FULL));
    }
    run_buffered(dp, fm, &actions, now)
}

fn mod_flow(dp: &mut Datapath, fm: &ofp::FlowModMsg,
            actions: Vec<action::Action>, strict: bool, now: u64)
            -> Result<(), OfpError> {
    let key = SwFlowKey::from_match(&fm.match_);
    dp.chain.modify(&key, fm.priority, strict, &actions);
    run_buffered(dp, fm, &actions, now)
}

// A FLOW_MOD may reference a buffered packet to run the new actions on.
// A stale reference is reported, but does not undo the flow operation.
fn run_buffered(dp: &mut Datapath, fm: &ofp::FlowModMsg,
                actions: &[action::Action], now: u64) -> Result<(), OfpError> {
    if fm.buffer_id == ofp::OFP_NO_BUFFER {
        return Ok(());
    }
    let mut buffer = dp.buffers.retrieve(fm.buffer_id)
        .ok_or_else(OfpError::bad_buffer)?;
    let (key, _) = flow::extract(&mut buffer, fm.match_.in_port);
    let mut skey = SwFlowKey::exact(key);
    dp.execute_actions(buffer, fm.match_.in_port, &mut skey, actions,
                       false, now);
    Ok(())
}

fn recv_flow_mod(dp: &mut Datapath, _remote: usize, _oh: &OfpHeader,
                 msg: &[u8], now: u64) -> Result<(), OfpError> {
    let body = &msg[ofp::OFP_HEADER_LEN..];
    let fm = ofp::FlowModMsg::decode(body)?;
    match fm.command {
        ofp::OFPFC_ADD | ofp::OFPFC_MODIFY | ofp::OFPFC_MODIFY_STRICT => {
            let actions = action::decode_list(&body[fm.actions_ofs..])?;
            action::validate(&actions, fm.match_.in_port,
                             |p| dp.port_exists(p))?;
            match fm.command {
                ofp::OFPFC_ADD => add_flow(dp, &fm, actions, now),
                cmd => mod_flow(dp, &fm, actions,
                                cmd == ofp::OFPFC_MODIFY_STRICT, now)
            }
        }
        ofp::OFPFC_DELETE => {
            let key = SwFlowKey::from_match(&fm.match_);
            let deleted = dp.chain.delete(&key, 0, false);
            notify_deleted(dp, deleted, now);
            Ok(())
        }
        ofp::OFPFC_DELETE_STRICT => {
            let key = SwFlowKey::from_match(&fm.match_);
            let deleted = dp.chain.delete(&key, fm.priority, true);
            notify_deleted(dp, deleted, now);
            Ok(())
        }
        _ => Err(OfpError::new(ofp::OFPET_BAD_REQUEST, ofp::OFPBRC_BAD_TYPE))
    }
}

fn recv_port_mod(dp: &mut Datapath, _remote: usize, _oh: &OfpHeader,
                 msg: &[u8], _now: u64) -> Result<(), OfpError> {
    let pm = ofp::PortModMsg::decode(&msg[ofp::OFP_HEADER_LEN..])?;
    let port = dp.port_mut(pm.port_no)
        .ok_or_else(|| OfpError::new(ofp::OFPET_PORT_MOD_FAILED,
                                     ofp::OFPPMFC_BAD_PORT))?;
    // The hardware address cannot be rewritten on a live port; a mismatch
    // means the request was built against a stale descriptor.
    if pm.hw_addr != port.dev.hw_addr() {
        return Err(OfpError::new(ofp::OFPET_PORT_MOD_FAILED,
                                 ofp::OFPPMFC_BAD_HW_ADDR));
    }
    port.flags = pm.flags
        & (ofp::OFPPFL_NO_FLOOD | ofp::OFPPFL_NO_RECV
           | ofp::OFPPFL_NO_RECV_STP | ofp::OFPPFL_NO_FWD);
    dp.send_port_status(pm.port_no, ofp::OFPPR_MODIFY);
    Ok(())
}

fn recv_stats_request(dp: &mut Datapath, remote: usize, oh: &OfpHeader,
                      msg: &[u8], now: u64) -> Result<(), OfpError> {
    let body = &msg[ofp::OFP_HEADER_LEN..];
    let sr = ofp::StatsRequestMsg::decode(body)?;
    match sr.stats_type {
        ofp::OFPST_FLOW => {
            let fr = ofp::FlowStatsRequest::decode(&body[sr.body_ofs..])?;
            let pattern = SwFlowKey::from_match(&fr.match_);
            let mut entries = Vec::new();
            dp.chain.for_each(&mut |table_id, f| {
                if (fr.table_id == ofp::TABLE_ID_ALL
                    || fr.table_id as usize == table_id)
                    && flow::matches_2wild(&f.key, &pattern) {
                    entries.push(encode_flow_stats(f, table_id as u8, now));
                }
            });
            send_stats_replies(dp, remote, oh.xid, ofp::OFPST_FLOW, entries);
        }
        ofp::OFPST_AGGREGATE => {
            let fr = ofp::FlowStatsRequest::decode(&body[sr.body_ofs..])?;
            let pattern = SwFlowKey::from_match(&fr.match_);
            let mut packets = 0u64;
            let mut bytes = 0u64;
            let mut flows = 0u32;
            dp.chain.for_each(&mut |table_id, f| {
                if (fr.table_id == ofp::TABLE_ID_ALL
                    || fr.table_id as usize == table_id)
                    && flow::matches_2wild(&f.key, &pattern) {
                    packets += f.packet_count;
                    bytes += f.byte_count;
                    flows += 1;
                }
            });
            let mut entry = Vec::new();
            ofp::put_u64(&mut entry, packets);
            ofp::put_u64(&mut entry, bytes);
            ofp::put_u32(&mut entry, flows);
            ofp::put_zeros(&mut entry, 4);
            send_stats_replies(dp, remote, oh.xid, ofp::OFPST_AGGREGATE,
                               vec![entry]);
        }
        ofp::OFPST_TABLE => {
            let entries: Vec<Vec<u8>> = dp.chain.stats().iter().enumerate()
                .map(|(i, s)| {
                    let mut e = Vec::new();
                    ofp::put_u8(&mut e, i as u8);
                    ofp::put_zeros(&mut e, 3);
                    ofp::put_name(&mut e, s.name, ofp::OFP_MAX_PORT_NAME_LEN);
                    ofp::put_u32(&mut e, s.max_flows as u32);
                    ofp::put_u32(&mut e, s.n_flows as u32);
                    ofp::put_u64(&mut e, s.n_lookup);
                    ofp::put_u64(&mut e, s.n_matched);
                    e
                }).collect();
            send_stats_replies(dp, remote, oh.xid, ofp::OFPST_TABLE, entries);
        }
        ofp::OFPST_PORT => {
            let entries: Vec<Vec<u8>> = dp.ports.iter().map(|p| {
                let mut e = Vec::new();
                ofp::put_u16(&mut e, p.port_no);
                ofp::put_zeros(&mut e, 6);
                ofp::put_u64(&mut e, p.rx_count);
                ofp::put_u64(&mut e, p.tx_count);
                ofp::put_u64(&mut e, p.drop_count);
                e
            }).collect();
            send_stats_replies(dp, remote, oh.xid, ofp::OFPST_PORT, entries);
        }
        _ => return Err(OfpError::new(ofp::OFPET_BAD_REQUEST,
                                      ofp::OFPBRC_BAD_STAT))
    }
    Ok(())
}

fn encode_flow_stats(f: &FlowEntry, table_id: u8, now: u64) -> Vec<u8> {
    let mut e = Vec::new();
    ofp::put_u16(&mut e, 72); // entry length
    ofp::put_u8(&mut e, table_id);
    ofp::put_zeros(&mut e, 1);
    f.key.to_match().encode(&mut e);
    ofp::put_u32(&mut e, f.duration(now));
    ofp::put_u16(&mut e, f.priority);
    ofp::put_u16(&mut e, f.idle_timeout);
    ofp::put_u16(&mut e, f.hard_timeout);
    ofp::put_zeros(&mut e, 6);
    ofp::put_u64(&mut e, f.packet_count);
    ofp::put_u64(&mut e, f.byte_count);
    e
}

// Emit one or more STATS_REPLY messages, the MORE flag set on all but the
// last, so no reply outgrows the 16-bit length and no iteration state is
// held across loop passes.
fn send_stats_replies(dp: &mut Datapath, remote: usize, xid: u32,
                      stats_type: u16, entries: Vec<Vec<u8>>) {
    let mut chunks: Vec<Vec<u8>> = vec![Vec::new()];
    for e in entries {
        let last = chunks.last_mut().unwrap();
        if !last.is_empty() && last.len() + e.len() > STATS_BODY_MAX {
            chunks.push(e);
        } else {
            last.extend_from_slice(&e);
        }
    }
    let n = chunks.len();
    for (i, chunk) in chunks.into_iter().enumerate() {
        let mut msg = ofp::start(ofp::OFPT_STATS_REPLY, xid);
        ofp::put_u16(&mut msg, stats_type);
        ofp::put_u16(&mut msg, if i + 1 < n { ofp::OFPSF_REPLY_MORE }
                               else { 0 });
        ofp::put_bytes(&mut msg, &chunk);
        ofp::finish(&mut msg);
        reply(dp, remote, msg);
    }
}

// Builders for the asynchronous switch-to-controller messages.

pub fn packet_in(buffer_id: u32, total_len: u16, in_port: u16, reason: u8,
                 data: &[u8]) -> Vec<u8> {
    let mut msg = ofp::start(ofp::OFPT_PACKET_IN, 0);
    ofp::put_u32(&mut msg, buffer_id);
    ofp::put_u16(&mut msg, total_len);
    ofp::put_u16(&mut msg, in_port);
    ofp::put_u8(&mut msg, reason);
    ofp::put_zeros(&mut msg, 1);
    ofp::put_bytes(&mut msg, data);
    ofp::finish(&mut msg);
    msg
}

pub fn flow_expired(f: &FlowEntry, reason: ExpiredReason, now: u64) -> Vec<u8> {
    let mut msg = ofp::start(ofp::OFPT_FLOW_EXPIRED, 0);
    f.key.to_match().encode(&mut msg);
    ofp::put_u16(&mut msg, f.priority);
    ofp::put_u8(&mut msg, reason.wire());
    ofp::put_zeros(&mut msg, 1);
    ofp::put_u32(&mut msg, f.duration(now));
    ofp::put_u64(&mut msg, f.packet_count);
    ofp::put_u64(&mut msg, f.byte_count);
    ofp::finish(&mut msg);
    msg
}

pub fn port_status(reason: u8, desc: &[u8]) -> Vec<u8> {
    let mut msg = ofp::start(ofp::OFPT_PORT_STATUS, 0);
    ofp::put_u8(&mut msg, reason);
    ofp::put_zeros(&mut msg, 3);
    ofp::put_bytes(&mut msg, desc);
    ofp::finish(&mut msg);
    msg
}

pub fn encode_phy_port(port: &Port) -> Vec<u8> {
    let mut desc = Vec::with_capacity(ofp::OFP_PHY_PORT_LEN);
    ofp::put_u16(&mut desc, port.port_no);
    ofp::put_bytes(&mut desc, &port.dev.hw_addr());
    ofp::put_name(&mut desc, port.dev.name(), ofp::OFP_MAX_PORT_NAME_LEN);
    ofp::put_u32(&mut desc, port.flags);
    ofp::put_u32(&mut desc, 0); // link speed unknown
    ofp::put_u32(&mut desc, port.dev.features());
    desc
}

#[cfg(test)]
mod selftest {
    use super::*;
    use crate::action::Action;
    use crate::datapath::selftest::{msgs_of_type, recv_all, test_dp};
    use crate::ethernet::MacAddress;
    use crate::flow::selftest::tcp_frame;
    use crate::openflow::OfpMatch;
    use crate::vconn::Vconn;

    fn exact_match(in_port: u16) -> OfpMatch {
        let mut b = Buffer::from_bytes(&tcp_frame());
        let (key, _) = flow::extract(&mut b, in_port);
        SwFlowKey::exact(key).to_match()
    }

    // Wild everything except dl_type/nw_proto/tp_dst.
    fn wild_match(tp_dst: u16) -> OfpMatch {
        let mut m = OfpMatch::default();
        m.wildcards = ofp::OFPFW_ALL
            & !(ofp::OFPFW_DL_TYPE | ofp::OFPFW_NW_PROTO | ofp::OFPFW_TP_DST);
        m.dl_type = 0x0800;
        m.nw_proto = 6;
        m.tp_dst = tp_dst;
        m
    }

    fn flow_mod_msg(m: &OfpMatch, command: u16, priority: u16, idle: u16,
                    hard: u16, buffer_id: u32, actions: &[Action]) -> Vec<u8> {
        let mut msg = ofp::start(ofp::OFPT_FLOW_MOD, 42);
        m.encode(&mut msg);
        ofp::put_u16(&mut msg, command);
        ofp::put_u16(&mut msg, idle);
        ofp::put_u16(&mut msg, hard);
        ofp::put_u16(&mut msg, priority);
        ofp::put_u32(&mut msg, buffer_id);
        ofp::put_u32(&mut msg, 0); // reserved
        action::encode_list(actions, &mut msg);
        ofp::finish(&mut msg);
        msg
    }

    fn stats_request_msg(stats_type: u16, body: &[u8]) -> Vec<u8> {
        let mut msg = ofp::start(ofp::OFPT_STATS_REQUEST, 13);
        ofp::put_u16(&mut msg, stats_type);
        ofp::put_u16(&mut msg, 0);
        ofp::put_bytes(&mut msg, body);
        ofp::finish(&mut msg);
        msg
    }

    fn flow_stats_body(m: &OfpMatch, table_id: u8) -> Vec<u8> {
        let mut body = Vec::new();
        m.encode(&mut body);
        ofp::put_u8(&mut body, table_id);
        ofp::put_zeros(&mut body, 1);
        body
    }

    fn port_mod_msg(port_no: u16, hw: MacAddress, flags: u32) -> Vec<u8> {
        let mut msg = ofp::start(ofp::OFPT_PORT_MOD, 21);
        ofp::put_u16(&mut msg, port_no);
        ofp::put_bytes(&mut msg, &hw);
        ofp::put_name(&mut msg, "", ofp::OFP_MAX_PORT_NAME_LEN);
        ofp::put_u32(&mut msg, flags);
        ofp::put_u32(&mut msg, 0);
        ofp::put_u32(&mut msg, 0);
        ofp::finish(&mut msg);
        msg
    }

    fn error_fields(msg: &[u8]) -> (u16, u16) {
        (u16::from_be_bytes([msg[8], msg[9]]),
         u16::from_be_bytes([msg[10], msg[11]]))
    }

    #[test]
    fn hello_replied_once_and_echo_mirrors() {
        let (mut dp, mut peer, _handles) = test_dp();
        dp.run(1);
        let msgs = recv_all(&mut peer);
        assert_eq!(msgs_of_type(&msgs, ofp::OFPT_HELLO).len(), 1,
                   "the switch greets on connect");

        let mut hello = ofp::start(ofp::OFPT_HELLO, 77);
        ofp::finish(&mut hello);
        peer.send(&hello).unwrap();
        peer.send(&hello).unwrap();
        dp.run(2);
        let msgs = recv_all(&mut peer);
        let hellos = msgs_of_type(&msgs, ofp::OFPT_HELLO);
        assert_eq!(hellos.len(), 1, "reply in kind, once");
        assert_eq!(OfpHeader::decode(&hellos[0]).unwrap().xid, 77);

        let mut echo = ofp::start(ofp::OFPT_ECHO_REQUEST, 5);
        ofp::put_bytes(&mut echo, b"ping");
        ofp::finish(&mut echo);
        peer.send(&echo).unwrap();
        dp.run(3);
        let msgs = recv_all(&mut peer);
        let replies = msgs_of_type(&msgs, ofp::OFPT_ECHO_REPLY);
        assert_eq!(replies.len(), 1);
        assert_eq!(OfpHeader::decode(&replies[0]).unwrap().xid, 5);
        assert_eq!(&replies[0][8..], b"ping");
    }

    #[test]
    fn bad_messages_get_errors_and_the_connection_lives() {
        let (mut dp, mut peer, _handles) = test_dp();
        dp.run(1);
        recv_all(&mut peer);

        // Wrong version on a versioned type.
        let mut bad = ofp::start(ofp::OFPT_FEATURES_REQUEST, 9);
        ofp::finish(&mut bad);
        bad[0] = 0x01;
        peer.send(&bad).unwrap();
        dp.run(2);
        let msgs = recv_all(&mut peer);
        let errors = msgs_of_type(&msgs, ofp::OFPT_ERROR);
        assert_eq!(errors.len(), 1);
        assert_eq!(error_fields(&errors[0]),
                   (ofp::OFPET_BAD_REQUEST, ofp::OFPBRC_BAD_VERSION));
        assert_eq!(&errors[0][12..], &bad[..],
                   "offending header echoed as data");

        // Unknown type.
        let mut unknown = ofp::start(99, 10);
        ofp::finish(&mut unknown);
        peer.send(&unknown).unwrap();
        dp.run(3);
        let msgs = recv_all(&mut peer);
        let errors = msgs_of_type(&msgs, ofp::OFPT_ERROR);
        assert_eq!(error_fields(&errors[0]),
                   (ofp::OFPET_BAD_REQUEST, ofp::OFPBRC_BAD_TYPE));

        // Too short for its type.
        let mut short = ofp::start(ofp::OFPT_SET_CONFIG, 11);
        ofp::put_u16(&mut short, 0);
        ofp::finish(&mut short);
        peer.send(&short).unwrap();
        dp.run(4);
        let msgs = recv_all(&mut peer);
        let errors = msgs_of_type(&msgs, ofp::OFPT_ERROR);
        assert_eq!(error_fields(&errors[0]),
                   (ofp::OFPET_BAD_REQUEST, ofp::OFPBRC_BAD_LENGTH));

        // Vendor extensions are not supported, at any version.
        let mut vendor = ofp::start(ofp::OFPT_VENDOR, 12);
        ofp::put_u32(&mut vendor, 0x005c16c7);
        ofp::finish(&mut vendor);
        vendor[0] = 0x01;
        peer.send(&vendor).unwrap();
        dp.run(5);
        let msgs = recv_all(&mut peer);
        let errors = msgs_of_type(&msgs, ofp::OFPT_ERROR);
        assert_eq!(error_fields(&errors[0]),
                   (ofp::OFPET_BAD_REQUEST, ofp::OFPBRC_BAD_VENDOR));

        // After all that abuse the channel still answers.
        let mut echo = ofp::start(ofp::OFPT_ECHO_REQUEST, 6);
        ofp::finish(&mut echo);
        peer.send(&echo).unwrap();
        dp.run(6);
        let msgs = recv_all(&mut peer);
        assert_eq!(msgs_of_type(&msgs, ofp::OFPT_ECHO_REPLY).len(), 1);
    }

    #[test]
    fn features_reply_describes_the_switch() {
        let (mut dp, mut peer, _handles) = test_dp();
        dp.run(1);
        recv_all(&mut peer);
        let mut req = ofp::start(ofp::OFPT_FEATURES_REQUEST, 3);
        ofp::finish(&mut req);
        peer.send(&req).unwrap();
        dp.run(2);
        let msgs = recv_all(&mut peer);
        let replies = msgs_of_type(&msgs, ofp::OFPT_FEATURES_REPLY);
        assert_eq!(replies.len(), 1);
        let r = &replies[0];
        assert_eq!(OfpHeader::decode(r).unwrap().xid, 3);
        assert_eq!(r.len(), 8 + 36 + 4 * ofp::OFP_PHY_PORT_LEN);
        let dpid = u64::from_be_bytes([r[8], r[9], r[10], r[11],
                                       r[12], r[13], r[14], r[15]]);
        assert_eq!(dpid, 0x00004242_42424242);
        let n_exact = u32::from_be_bytes([r[16], r[17], r[18], r[19]]);
        assert_eq!(n_exact, 2 * 0x4000);
        let n_buffers = u32::from_be_bytes([r[32], r[33], r[34], r[35]]);
        assert_eq!(n_buffers, 256);
        // First port descriptor: port 0 with its MAC and name.
        let desc = &r[44..44 + ofp::OFP_PHY_PORT_LEN];
        assert_eq!(u16::from_be_bytes([desc[0], desc[1]]), 0);
        assert_eq!(&desc[2..8], &[0x52, 0x54, 0, 0, 0, 0]);
        assert_eq!(&desc[8..13], b"test0");
    }

    #[test]
    fn set_config_normalises_fragment_policy() {
        let (mut dp, mut peer, _handles) = test_dp();
        dp.run(1);
        recv_all(&mut peer);
        let mut set = ofp::start(ofp::OFPT_SET_CONFIG, 4);
        // Flag bit soup: reassembly (unsupported) plus flow expiry.
        ofp::put_u16(&mut set, ofp::OFPC_SEND_FLOW_EXP | (2 << 1) | 0x8000);
        ofp::put_u16(&mut set, 99);
        ofp::finish(&mut set);
        peer.send(&set).unwrap();
        dp.run(2);
        assert_eq!(dp.flags, ofp::OFPC_SEND_FLOW_EXP | ofp::OFPC_FRAG_DROP);
        assert_eq!(dp.miss_send_len, 99);

        let mut get = ofp::start(ofp::OFPT_GET_CONFIG_REQUEST, 5);
        ofp::finish(&mut get);
        peer.send(&get).unwrap();
        dp.run(3);
        let msgs = recv_all(&mut peer);
        let replies = msgs_of_type(&msgs, ofp::OFPT_GET_CONFIG_REPLY);
        assert_eq!(replies.len(), 1);
        assert_eq!(u16::from_be_bytes([replies[0][8], replies[0][9]]),
                   ofp::OFPC_SEND_FLOW_EXP | ofp::OFPC_FRAG_DROP);
        assert_eq!(u16::from_be_bytes([replies[0][10], replies[0][11]]), 99);
    }

    #[test]
    fn flow_mod_add_then_forward() {
        let (mut dp, mut peer, handles) = test_dp();
        let add = flow_mod_msg(&exact_match(1), ofp::OFPFC_ADD, 0, 0, 0,
                               ofp::OFP_NO_BUFFER,
                               &[Action::Output { port: 2, max_len: 0 }]);
        peer.send(&add).unwrap();
        dp.run(1);
        let msgs = recv_all(&mut peer);
        assert!(msgs_of_type(&msgs, ofp::OFPT_ERROR).is_empty());

        handles[1].inject(&tcp_frame());
        dp.run(2);
        assert_eq!(handles[2].sent(), vec![tcp_frame()]);
        let msgs = recv_all(&mut peer);
        assert!(msgs_of_type(&msgs, ofp::OFPT_PACKET_IN).is_empty());
    }

    #[test]
    fn flow_mod_rejects_looping_actions() {
        let (mut dp, mut peer, handles) = test_dp();
        dp.run(1);
        recv_all(&mut peer);
        for port in [ofp::OFPP_TABLE, ofp::OFPP_NONE, 1 /* ingress */] {
            let add = flow_mod_msg(&exact_match(1), ofp::OFPFC_ADD, 0, 0, 0,
                                   ofp::OFP_NO_BUFFER,
                                   &[Action::Output { port, max_len: 0 }]);
            peer.send(&add).unwrap();
        }
        dp.run(2);
        let msgs = recv_all(&mut peer);
        let errors = msgs_of_type(&msgs, ofp::OFPT_ERROR);
        assert_eq!(errors.len(), 3);
        for e in &errors {
            assert_eq!(error_fields(e),
                       (ofp::OFPET_BAD_ACTION, ofp::OFPBAC_BAD_OUT_PORT));
        }
        // Nothing was installed: the frame still misses.
        handles[1].inject(&tcp_frame());
        dp.run(3);
        let msgs = recv_all(&mut peer);
        assert_eq!(msgs_of_type(&msgs, ofp::OFPT_PACKET_IN).len(), 1);
    }

    #[test]
    fn add_reports_table_full() {
        let (mut dp, mut peer, _handles) = test_dp();
        // The linear tier holds 100 wildcarded flows; number 101 must be
        // refused by every tier.
        for i in 0..100u16 {
            let add = flow_mod_msg(&wild_match(1000 + i), ofp::OFPFC_ADD,
                                   1, 0, 0, ofp::OFP_NO_BUFFER,
                                   &[Action::Output { port: 2, max_len: 0 }]);
            input(&mut dp, 0, &add, 1);
        }
        let add = flow_mod_msg(&wild_match(2000), ofp::OFPFC_ADD, 1, 0, 0,
                               ofp::OFP_NO_BUFFER,
                               &[Action::Output { port: 2, max_len: 0 }]);
        input(&mut dp, 0, &add, 1);
        dp.remotes[0].rconn.run(1);
        let msgs = recv_all(&mut peer);
        let errors = msgs_of_type(&msgs, ofp::OFPT_ERROR);
        assert_eq!(errors.len(), 1);
        assert_eq!(error_fields(&errors[0]),
                   (ofp::OFPET_FLOW_MOD_FAILED, ofp::OFPFMFC_ALL_TABLES_FULL));
    }

    #[test]
    fn delete_strict_distinguishes_priority() {
        let (mut dp, mut peer, handles) = test_dp();
        dp.flags = ofp::OFPC_SEND_FLOW_EXP;
        let low = flow_mod_msg(&wild_match(80), ofp::OFPFC_ADD, 100, 0, 0,
                               ofp::OFP_NO_BUFFER,
                               &[Action::Output { port: 2, max_len: 0 }]);
        let high = flow_mod_msg(&wild_match(80), ofp::OFPFC_ADD, 200, 0, 0,
                                ofp::OFP_NO_BUFFER,
                                &[Action::Output { port: 3, max_len: 0 }]);
        peer.send(&low).unwrap();
        peer.send(&high).unwrap();
        dp.run(1);
        recv_all(&mut peer);

        let del = flow_mod_msg(&wild_match(80), ofp::OFPFC_DELETE_STRICT,
                               100, 0, 0, ofp::OFP_NO_BUFFER, &[]);
        peer.send(&del).unwrap();
        dp.run(2);
        let msgs = recv_all(&mut peer);
        let expired = msgs_of_type(&msgs, ofp::OFPT_FLOW_EXPIRED);
        assert_eq!(expired.len(), 1, "exactly one rule removed");
        assert_eq!(expired[0][8 + 36 + 2], ofp::OFPER_DELETE);
        let priority = u16::from_be_bytes([expired[0][44], expired[0][45]]);
        assert_eq!(priority, 100);

        // The surviving priority-200 rule still classifies.
        handles[1].inject(&tcp_frame());
        dp.run(3);
        assert_eq!(handles[3].sent().len(), 1);
        assert_eq!(handles[2].sent().len(), 0);
    }

    #[test]
    fn modify_swaps_actions_and_keeps_counters() {
        let (mut dp, mut peer, handles) = test_dp();
        let add = flow_mod_msg(&wild_match(80), ofp::OFPFC_ADD, 7, 0, 0,
                               ofp::OFP_NO_BUFFER,
                               &[Action::Output { port: 2, max_len: 0 }]);
        peer.send(&add).unwrap();
        dp.run(1);
        handles[1].inject(&tcp_frame());
        dp.run(2);
        assert_eq!(handles[2].sent().len(), 1);

        let modify = flow_mod_msg(&wild_match(80), ofp::OFPFC_MODIFY, 7, 0, 0,
                                  ofp::OFP_NO_BUFFER,
                                  &[Action::Output { port: 3, max_len: 0 }]);
        peer.send(&modify).unwrap();
        dp.run(3);
        handles[1].inject(&tcp_frame());
        dp.run(4);
        assert_eq!(handles[3].sent().len(), 1);

        // Counters survived the modify.
        recv_all(&mut peer);
        let req = stats_request_msg(
            ofp::OFPST_FLOW,
            &flow_stats_body(&wild_match(80), ofp::TABLE_ID_ALL));
        peer.send(&req).unwrap();
        dp.run(5);
        let msgs = recv_all(&mut peer);
        let replies = msgs_of_type(&msgs, ofp::OFPT_STATS_REPLY);
        assert_eq!(replies.len(), 1);
        let entry = &replies[0][12..];
        assert_eq!(entry.len(), 72);
        let packets = u64::from_be_bytes([
            entry[56], entry[57], entry[58], entry[59],
            entry[60], entry[61], entry[62], entry[63]]);
        assert_eq!(packets, 2);
    }

    #[test]
    fn packet_out_inline_and_buffered() {
        let (mut dp, mut peer, handles) = test_dp();
        dp.run(1);
        recv_all(&mut peer);

        // Inline frame, output to a NO_FWD port: PACKET_OUT overrides.
        dp.port_mut(2).unwrap().flags = ofp::OFPPFL_NO_FWD;
        let mut po = ofp::start(ofp::OFPT_PACKET_OUT, 30);
        ofp::put_u32(&mut po, ofp::OFP_NO_BUFFER);
        ofp::put_u16(&mut po, 1); // declared ingress
        ofp::put_u16(&mut po, 1); // one action
        action::encode_list(&[Action::Output { port: 2, max_len: 0 }],
                            &mut po);
        ofp::put_bytes(&mut po, &tcp_frame());
        ofp::finish(&mut po);
        peer.send(&po).unwrap();
        dp.run(2);
        assert_eq!(handles[2].sent(), vec![tcp_frame()]);

        // Buffered mode: miss, then point PACKET_OUT at the parked packet.
        handles[0].inject(&tcp_frame());
        dp.run(3);
        let msgs = recv_all(&mut peer);
        let pins = msgs_of_type(&msgs, ofp::OFPT_PACKET_IN);
        assert_eq!(pins.len(), 1);
        let buffer_id = u32::from_be_bytes([pins[0][8], pins[0][9],
                                            pins[0][10], pins[0][11]]);
        assert_ne!(buffer_id, ofp::OFP_NO_BUFFER);

        let mut po = ofp::start(ofp::OFPT_PACKET_OUT, 31);
        ofp::put_u32(&mut po, buffer_id);
        ofp::put_u16(&mut po, 0);
        ofp::put_u16(&mut po, 1);
        action::encode_list(&[Action::Output { port: 3, max_len: 0 }],
                            &mut po);
        ofp::finish(&mut po);
        peer.send(&po).unwrap();
        dp.run(4);
        assert_eq!(handles[3].sent(), vec![tcp_frame()],
                   "the buffered packet travels whole");

        // The buffer was consumed; replaying the ID is an error.
        peer.send(&po).unwrap();
        dp.run(5);
        let msgs = recv_all(&mut peer);
        let errors = msgs_of_type(&msgs, ofp::OFPT_ERROR);
        assert_eq!(errors.len(), 1);
        assert_eq!(error_fields(&errors[0]),
                   (ofp::OFPET_BAD_REQUEST, ofp::OFPBRC_BUFFER_UNKNOWN));
    }

    fn packet_out_msg(in_port: u16, actions: &[Action], data: &[u8])
                      -> Vec<u8> {
        let mut msg = ofp::start(ofp::OFPT_PACKET_OUT, 40);
        ofp::put_u32(&mut msg, ofp::OFP_NO_BUFFER);
        ofp::put_u16(&mut msg, in_port);
        ofp::put_u16(&mut msg, actions.len() as u16);
        action::encode_list(actions, &mut msg);
        ofp::put_bytes(&mut msg, data);
        ofp::finish(&mut msg);
        msg
    }

    #[test]
    fn packet_out_table_miss_reaches_the_controller() {
        let (mut dp, mut peer, _handles) = test_dp();
        dp.run(1);
        recv_all(&mut peer);

        // No flow matches: the resubmitted frame misses and comes back as a
        // PACKET_IN, like any other unmatched frame.
        let po = packet_out_msg(1, &[Action::Output { port: ofp::OFPP_TABLE,
                                                      max_len: 0 }],
                                &tcp_frame());
        peer.send(&po).unwrap();
        dp.run(2);
        let msgs = recv_all(&mut peer);
        let pins = msgs_of_type(&msgs, ofp::OFPT_PACKET_IN);
        assert_eq!(pins.len(), 1);
        assert_eq!(pins[0][16], ofp::OFPR_NO_MATCH);
        assert_eq!(u16::from_be_bytes([pins[0][14], pins[0][15]]), 1,
                   "the declared ingress port is echoed");
    }

    #[test]
    fn packet_out_local_resubmit_keeps_no_fwd_override() {
        let (mut dp, mut peer, handles) = test_dp();
        dp.run(1);
        recv_all(&mut peer);
        dp.port_mut(2).unwrap().flags = ofp::OFPPFL_NO_FWD;

        // Local-port traffic goes out the NO_FWD port...
        let add = flow_mod_msg(&exact_match(ofp::OFPP_LOCAL), ofp::OFPFC_ADD,
                               0, 0, 0, ofp::OFP_NO_BUFFER,
                               &[Action::Output { port: 2, max_len: 0 }]);
        peer.send(&add).unwrap();
        // ...and a controller-injected OUTPUT(LOCAL) resubmits into that
        // flow. The injection override carries through, so NO_FWD does not
        // block the delivery.
        let po = packet_out_msg(1, &[Action::Output { port: ofp::OFPP_LOCAL,
                                                      max_len: 0 }],
                                &tcp_frame());
        peer.send(&po).unwrap();
        dp.run(2);
        let msgs = recv_all(&mut peer);
        assert!(msgs_of_type(&msgs, ofp::OFPT_ERROR).is_empty());
        assert_eq!(handles[2].sent(), vec![tcp_frame()]);
    }

    #[test]
    fn flow_mod_add_runs_buffered_packet() {
        let (mut dp, mut peer, handles) = test_dp();
        handles[1].inject(&tcp_frame());
        dp.run(1);
        let msgs = recv_all(&mut peer);
        let pins = msgs_of_type(&msgs, ofp::OFPT_PACKET_IN);
        let buffer_id = u32::from_be_bytes([pins[0][8], pins[0][9],
                                            pins[0][10], pins[0][11]]);

        let add = flow_mod_msg(&exact_match(1), ofp::OFPFC_ADD, 0, 0, 0,
                               buffer_id,
                               &[Action::Output { port: 2, max_len: 0 }]);
        peer.send(&add).unwrap();
        dp.run(2);
        assert_eq!(handles[2].sent(), vec![tcp_frame()],
                   "the parked packet runs through the new flow");
        let msgs = recv_all(&mut peer);
        assert!(msgs_of_type(&msgs, ofp::OFPT_ERROR).is_empty());
    }

    #[test]
    fn stats_cover_flows_tables_and_ports() {
        let (mut dp, mut peer, handles) = test_dp();
        for (tp_dst, priority) in [(80u16, 1u16), (443, 2)] {
            let add = flow_mod_msg(&wild_match(tp_dst), ofp::OFPFC_ADD,
                                   priority, 0, 0, ofp::OFP_NO_BUFFER,
                                   &[Action::Output { port: 2, max_len: 0 }]);
            peer.send(&add).unwrap();
        }
        dp.run(1);
        handles[1].inject(&tcp_frame()); // tp_dst 80
        dp.run(2);
        recv_all(&mut peer);

        // FLOW: both rules, the used one with its counters.
        let req = stats_request_msg(
            ofp::OFPST_FLOW,
            &flow_stats_body(&OfpMatch { wildcards: ofp::OFPFW_ALL,
                                         ..OfpMatch::default() },
                             ofp::TABLE_ID_ALL));
        peer.send(&req).unwrap();
        dp.run(3);
        let msgs = recv_all(&mut peer);
        let replies = msgs_of_type(&msgs, ofp::OFPT_STATS_REPLY);
        assert_eq!(replies.len(), 1);
        assert_eq!((replies[0].len() - 12) / 72, 2);

        // AGGREGATE: one packet total.
        let req = stats_request_msg(
            ofp::OFPST_AGGREGATE,
            &flow_stats_body(&OfpMatch { wildcards: ofp::OFPFW_ALL,
                                         ..OfpMatch::default() },
                             ofp::TABLE_ID_ALL));
        peer.send(&req).unwrap();
        dp.run(4);
        let msgs = recv_all(&mut peer);
        let replies = msgs_of_type(&msgs, ofp::OFPT_STATS_REPLY);
        let body = &replies[0][12..];
        let packets = u64::from_be_bytes([body[0], body[1], body[2], body[3],
                                          body[4], body[5], body[6], body[7]]);
        let flows = u32::from_be_bytes([body[16], body[17],
                                        body[18], body[19]]);
        assert_eq!(packets, 1);
        assert_eq!(flows, 2);

        // TABLE: the two tiers by name.
        let req = stats_request_msg(ofp::OFPST_TABLE, &[]);
        peer.send(&req).unwrap();
        dp.run(5);
        let msgs = recv_all(&mut peer);
        let replies = msgs_of_type(&msgs, ofp::OFPT_STATS_REPLY);
        let body = &replies[0][12..];
        assert_eq!(body.len(), 2 * 44);
        assert_eq!(&body[4..9], b"hash2");
        assert_eq!(&body[44 + 4..44 + 10], b"linear");

        // PORT: all four ports, the ingress one with a receive count.
        let req = stats_request_msg(ofp::OFPST_PORT, &[]);
        peer.send(&req).unwrap();
        dp.run(6);
        let msgs = recv_all(&mut peer);
        let replies = msgs_of_type(&msgs, ofp::OFPT_STATS_REPLY);
        let body = &replies[0][12..];
        assert_eq!(body.len(), 4 * 32);
        let port1 = &body[32..64];
        assert_eq!(u16::from_be_bytes([port1[0], port1[1]]), 1);
        let rx = u64::from_be_bytes([port1[8], port1[9], port1[10], port1[11],
                                     port1[12], port1[13], port1[14],
                                     port1[15]]);
        assert_eq!(rx, 1);
    }

    #[test]
    fn long_flow_dump_paginates_with_more_flag() {
        let (mut dp, mut peer, _handles) = test_dp();
        for i in 0..60u16 {
            let add = flow_mod_msg(&wild_match(1000 + i), ofp::OFPFC_ADD,
                                   1, 0, 0, ofp::OFP_NO_BUFFER,
                                   &[Action::Output { port: 2, max_len: 0 }]);
            input(&mut dp, 0, &add, 1);
        }
        let req = stats_request_msg(
            ofp::OFPST_FLOW,
            &flow_stats_body(&OfpMatch { wildcards: ofp::OFPFW_ALL,
                                         ..OfpMatch::default() },
                             ofp::TABLE_ID_ALL));
        input(&mut dp, 0, &req, 2);
        dp.remotes[0].rconn.run(2);
        let msgs = recv_all(&mut peer);
        let replies = msgs_of_type(&msgs, ofp::OFPT_STATS_REPLY);
        assert_eq!(replies.len(), 2, "60 x 72 bytes takes two replies");
        let flags0 = u16::from_be_bytes([replies[0][10], replies[0][11]]);
        let flags1 = u16::from_be_bytes([replies[1][10], replies[1][11]]);
        assert_eq!(flags0, ofp::OFPSF_REPLY_MORE);
        assert_eq!(flags1, 0);
        let total = (replies[0].len() - 12) / 72 + (replies[1].len() - 12) / 72;
        assert_eq!(total, 60);
    }

    #[test]
    fn port_mod_updates_flags() {
        let (mut dp, mut peer, _handles) = test_dp();
        dp.run(1);
        recv_all(&mut peer);

        let pm = port_mod_msg(2, [0x52, 0x54, 0, 0, 0, 2],
                              ofp::OFPPFL_NO_FLOOD);
        peer.send(&pm).unwrap();
        dp.run(2);
        assert_eq!(dp.port(2).unwrap().flags, ofp::OFPPFL_NO_FLOOD);
        let msgs = recv_all(&mut peer);
        let status = msgs_of_type(&msgs, ofp::OFPT_PORT_STATUS);
        assert_eq!(status.len(), 1);
        assert_eq!(status[0][8], ofp::OFPPR_MODIFY);

        // A stale hardware address is refused.
        let pm = port_mod_msg(2, [0xde, 0xad, 0xbe, 0xef, 0, 0], 0);
        peer.send(&pm).unwrap();
        dp.run(3);
        let msgs = recv_all(&mut peer);
        let errors = msgs_of_type(&msgs, ofp::OFPT_ERROR);
        assert_eq!(error_fields(&errors[0]),
                   (ofp::OFPET_PORT_MOD_FAILED, ofp::OFPPMFC_BAD_HW_ADDR));
        assert_eq!(dp.port(2).unwrap().flags, ofp::OFPPFL_NO_FLOOD,
                   "flags unchanged on refusal");

        // So is an unknown port.
        let pm = port_mod_msg(77, [0, 0, 0, 0, 0, 0], 0);
        peer.send(&pm).unwrap();
        dp.run(4);
        let msgs = recv_all(&mut peer);
        let errors = msgs_of_type(&msgs, ofp::OFPT_ERROR);
        assert_eq!(error_fields(&errors[0]),
                   (ofp::OFPET_PORT_MOD_FAILED, ofp::OFPPMFC_BAD_PORT));
    }
}
