use super::action;
use super::action::Action;
use super::buffer::Buffer;
use super::chain::Chain;
use super::control;
use super::ethernet;
use super::flow;
use super::flow::{ExpiredReason, FlowEntry, SwFlowKey};
use super::lib;
use super::openflow as ofp;
use super::pktbuf::{PacketBuffers, N_PKT_BUFFERS};
use super::port::{Port, PortDev};
use super::rconn::Rconn;
use super::vconn::Pvconn;

use std::io;
use std::time::Duration;

// DATAPATH
//
// The top-level switch object: it owns the classifier chain, the buffer
// cache, the port set and the controller/management connections, and runs
// one pass of the event loop per call to run().
//
//   Datapath::new(dpid, controller) - construct with the standard chain
//   add_port(dev) / del_port(no) - port registry, PORT_STATUS notifications
//   add_listener(pvconn) - accept management connections
//   run(now) - one pass: age flows, move frames, serve control messages
//   execute_actions(...) - the action interpreter (deferred-clone outputs)

// Cap on control messages handled per connection per pass, so a chatty
// controller cannot starve the ports.
const REMOTE_RX_BURST: usize = 50;

pub struct DpStats {
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub drops: u64,
    pub clones: u64,
    pub packet_ins: u64
}

// A connection to the controller or a management client, plus the bit of
// handshake state the protocol engine keeps per peer.
pub struct Remote {
    pub rconn: Rconn,
    pub hello_done: bool
}

impl Remote {
    fn new(rconn: Rconn) -> Remote {
        Remote { rconn, hello_done: false }
    }
}

pub struct Datapath {
    pub id: u64,
    pub chain: Chain,
    pub ports: Vec<Port>,
    pub buffers: PacketBuffers,
    pub flags: u16,
    pub miss_send_len: u16,
    pub remotes: Vec<Remote>, // [0] is the controller connection
    listen: Option<Box<dyn Pvconn>>,
    last_sweep: u64,
    pub stats: DpStats,
    logcap: Box<dyn FnMut() -> bool>
}

impl Datapath {

    pub fn new(id: u64, controller: Rconn) -> Datapath {
        Datapath {
            id,
            chain: Chain::new(),
            ports: Vec::new(),
            buffers: PacketBuffers::new(),
            flags: 0,
            miss_send_len: ofp::OFP_DEFAULT_MISS_SEND_LEN,
            remotes: vec![Remote::new(controller)],
            listen: None,
            last_sweep: 0,
            stats: DpStats {
                rx_packets: 0, tx_packets: 0, drops: 0,
                clones: 0, packet_ins: 0
            },
            logcap: lib::throttle(Duration::new(1, 0))
        }
    }

    pub fn n_buffers(&self) -> usize {
        N_PKT_BUFFERS
    }

    // Rate-limited complaint for per-packet error paths.
    pub fn log(&mut self, what: &str) {
        if (self.logcap)() {
            println!("ofswitch: {}", what);
        }
    }

    pub fn add_listener(&mut self, listen: Box<dyn Pvconn>) {
        assert!(self.listen.is_none());
        self.listen = Some(listen);
    }

    // Register a port on the lowest free index. Counters start from zero.
    pub fn add_port(&mut self, dev: Box<dyn PortDev>) -> io::Result<u16> {
        let mut port_no = 0;
        while self.ports.iter().any(|p| p.port_no == port_no) {
            port_no += 1;
        }
        if port_no >= ofp::OFPP_MAX {
            return Err(io::Error::new(io::ErrorKind::Other, "port set full"));
        }
        self.ports.push(Port::new(port_no, dev));
        self.send_port_status(port_no, ofp::OFPPR_ADD);
        Ok(port_no)
    }

    pub fn del_port(&mut self, port_no: u16) {
        self.send_port_status(port_no, ofp::OFPPR_DELETE);
        self.ports.retain(|p| p.port_no != port_no);
    }

    pub fn port(&self, port_no: u16) -> Option<&Port> {
        self.ports.iter().find(|p| p.port_no == port_no)
    }

    pub fn port_mut(&mut self, port_no: u16) -> Option<&mut Port> {
        self.ports.iter_mut().find(|p| p.port_no == port_no)
    }

    pub fn port_exists(&self, port_no: u16) -> bool {
        self.port(port_no).is_some()
    }

    // One pass of the event loop.
    pub fn run(&mut self, now: u64) {
        // Age flows at one-second granularity.
        if now != self.last_sweep {
            let expired = self.chain.sweep(now);
            for (flow, reason) in expired {
                // The entry is dropped only after the notification is out.
                self.send_flow_expired(&flow, reason, now);
            }
            self.last_sweep = now;
        }

        // One non-blocking receive attempt per port.
        let port_nos: Vec<u16> = self.ports.iter().map(|p| p.port_no).collect();
        for port_no in port_nos {
            let received = match self.port_mut(port_no) {
                Some(port) => port.dev.recv(),
                None => continue
            };
            match received {
                Ok(Some(frame)) => {
                    if let Some(port) = self.port_mut(port_no) {
                        port.rx_count += 1;
                    }
                    self.stats.rx_packets += 1;
                    let buffer = Buffer::from_bytes(&frame);
                    self.fwd_port_input(buffer, port_no, false, now);
                }
                Ok(None) => {}
                Err(e) => {
                    println!("ofswitch: error receiving on port {}: {}",
                             port_no, e);
                    self.del_port(port_no);
                }
            }
        }

        // Serve the controller and management connections.
        let mut i = 0;
        while i < self.remotes.len() {
            self.remotes[i].rconn.run(now);
            if self.remotes[i].rconn.take_reconnected() {
                self.remotes[i].hello_done = false;
                let mut hello = ofp::start(ofp::OFPT_HELLO, 0);
                ofp::finish(&mut hello);
                self.remotes[i].rconn.send(hello);
            }
            // Process a bounded number of commands from the remote so that
            // packet forwarding doesn't starve.
            for _ in 0..REMOTE_RX_BURST {
                match self.remotes[i].rconn.recv(now) {
                    Some(msg) => control::input(self, i, &msg, now),
                    None => break
                }
            }
            self.remotes[i].rconn.run(now);
            if self.remotes[i].rconn.is_alive() {
                i += 1;
            } else {
                println!("ofswitch: dropping connection to {}",
                         self.remotes[i].rconn.name());
                self.remotes.remove(i);
            }
        }

        // Accept new management connections.
        if let Some(listen) = self.listen.as_mut() {
            loop {
                match listen.accept() {
                    Ok(Some(vconn)) => {
                        self.remotes.push(
                            Remote::new(Rconn::from_vconn(vconn)));
                    }
                    Ok(None) => break,
                    Err(e) => {
                        println!("ofswitch: accept failed: {}", e);
                        break;
                    }
                }
            }
        }
    }

    // Classify 'buffer' and execute the matching flow's actions. The buffer
    // comes back on a miss so the caller decides what a miss means.
    fn run_flow_through_tables(&mut self, mut buffer: Buffer, in_port: u16,
                               ignore_no_fwd: bool, now: u64)
                               -> Option<Buffer> {
        let (key, fragment) = flow::extract(&mut buffer, in_port);
        if fragment
            && self.flags & ofp::OFPC_FRAG_MASK == ofp::OFPC_FRAG_DROP {
            self.stats.drops += 1;
            return None;
        }
        if let Some(port) = self.port(in_port) {
            let stp = key.dl_dst == ethernet::ADDR_STP;
            let blocked = if stp { ofp::OFPPFL_NO_RECV_STP }
                          else   { ofp::OFPPFL_NO_RECV };
            if port.flags & blocked != 0 {
                self.stats.drops += 1;
                return None;
            }
        }
        let mut skey = SwFlowKey::exact(key);
        let actions = match self.chain.lookup(&skey) {
            Some(flow) => {
                flow.mark_used(now, buffer.len() as u64);
                Some(flow.actions.clone())
            }
            None => None
        };
        match actions {
            Some(actions) => {
                self.execute_actions(buffer, in_port, &mut skey, &actions,
                                     ignore_no_fwd, now);
                None
            }
            None => Some(buffer)
        }
    }

    // A frame arrived on 'in_port': classify it, and hand misses to the
    // controller as PACKET_IN. 'ignore_no_fwd' carries the PACKET_OUT
    // override through LOCAL and TABLE resubmissions.
    pub fn fwd_port_input(&mut self, buffer: Buffer, in_port: u16,
                          ignore_no_fwd: bool, now: u64) {
        if let Some(buffer) =
            self.run_flow_through_tables(buffer, in_port, ignore_no_fwd,
                                         now) {
            let max_len = self.miss_send_len as usize;
            self.output_control(buffer, in_port, max_len,
                                ofp::OFPR_NO_MATCH, now);
        }
    }

    // Walk an action list over 'buffer'. Every output needs its own copy of
    // the packet, but the common case is a single output at the end of the
    // list, so sending is deferred until the next output (clone) or the end
    // of the list (no clone).
    pub fn execute_actions(&mut self, mut buffer: Buffer, in_port: u16,
                           key: &mut SwFlowKey, actions: &[Action],
                           ignore_no_fwd: bool, now: u64) {
        let mut pending: Option<(u16, u16)> = None;
        for a in actions {
            if let Some((port, max_len)) = pending.take() {
                let copy = buffer.clone_buffer();
                self.stats.clones += 1;
                self.do_output(copy, in_port, max_len, port,
                               ignore_no_fwd, now);
            }
            match a {
                Action::Output { port, max_len } => {
                    pending = Some((*port, *max_len));
                }
                _ => {
                    if let Err(what) = action::execute_setter(&mut buffer,
                                                              key, a) {
                        self.log(what);
                        self.stats.drops += 1;
                        return;
                    }
                }
            }
        }
        match pending {
            Some((port, max_len)) => {
                self.do_output(buffer, in_port, max_len, port,
                               ignore_no_fwd, now);
            }
            None => { self.stats.drops += 1; }
        }
    }

    fn do_output(&mut self, buffer: Buffer, in_port: u16, max_len: u16,
                 out_port: u16, ignore_no_fwd: bool, now: u64) {
        match out_port {
            ofp::OFPP_CONTROLLER => {
                let max_len = if max_len == 0 { usize::MAX }
                              else { max_len as usize };
                self.output_control(buffer, in_port, max_len,
                                    ofp::OFPR_ACTION, now);
            }
            ofp::OFPP_FLOOD => {
                self.flood(buffer, in_port, false, ignore_no_fwd);
            }
            ofp::OFPP_ALL => {
                self.flood(buffer, in_port, true, ignore_no_fwd);
            }
            ofp::OFPP_LOCAL => {
                // Loop the frame back in as if received on the local port.
                self.fwd_port_input(buffer, ofp::OFPP_LOCAL, ignore_no_fwd,
                                    now);
            }
            ofp::OFPP_TABLE => {
                // Re-run the classifier; a miss goes to the controller like
                // any other unmatched frame.
                self.fwd_port_input(buffer, in_port, ignore_no_fwd, now);
            }
            ofp::OFPP_NONE => { self.stats.drops += 1; }
            ofp::OFPP_NORMAL => {
                self.log("normal processing not implemented, dropping");
                self.stats.drops += 1;
            }
            port => self.output_packet(buffer, port, ignore_no_fwd)
        }
    }

    fn output_packet(&mut self, buffer: Buffer, out_port: u16,
                     ignore_no_fwd: bool) {
        if out_port < ofp::OFPP_MAX {
            if let Some(port) = self.ports.iter_mut()
                .find(|p| p.port_no == out_port) {
                if !ignore_no_fwd && !port.may_forward() {
                    self.stats.drops += 1;
                    return;
                }
                match port.dev.send(buffer.as_slice()) {
                    Ok(true) => {
                        port.tx_count += 1;
                        self.stats.tx_packets += 1;
                    }
                    Ok(false) => {
                        port.drop_count += 1;
                        self.stats.drops += 1;
                    }
                    Err(_) => {
                        port.drop_count += 1;
                        self.stats.drops += 1;
                    }
                }
                return;
            }
        }
        self.stats.drops += 1;
        self.log("can't forward to bad port");
    }

    // Send to every eligible port except the ingress one. FLOOD honors the
    // NO_FLOOD flag, ALL does not.
    fn flood(&mut self, buffer: Buffer, in_port: u16, all: bool,
             ignore_no_fwd: bool) {
        let outs: Vec<u16> = self.ports.iter()
            .filter(|p| p.port_no != in_port)
            .filter(|p| all || p.in_flood_set())
            .filter(|p| ignore_no_fwd || p.may_forward())
            .map(|p| p.port_no)
            .collect();
        if outs.is_empty() {
            self.stats.drops += 1;
            return;
        }
        for &port_no in &outs[..outs.len() - 1] {
            let copy = buffer.clone_buffer();
            self.stats.clones += 1;
            self.output_packet(copy, port_no, ignore_no_fwd);
        }
        self.output_packet(buffer, outs[outs.len() - 1], ignore_no_fwd);
    }

    // Park the packet in the buffer cache and send the controller a
    // PACKET_IN carrying at most 'max_len' bytes of it. If the cache
    // refuses, the whole packet travels inline.
    pub fn output_control(&mut self, mut buffer: Buffer, in_port: u16,
                          max_len: usize, reason: u8, now: u64) {
        let buffer_id = self.buffers.save(&buffer, now);
        let total_len = buffer.len();
        if buffer_id != ofp::OFP_NO_BUFFER && buffer.len() > max_len {
            buffer.truncate(max_len);
        }
        let msg = control::packet_in(buffer_id, total_len as u16, in_port,
                                     reason, buffer.as_slice());
        self.stats.packet_ins += 1;
        self.send_to_controller(msg);
    }

    pub fn send_to_controller(&mut self, msg: Vec<u8>) {
        if let Some(remote) = self.remotes.first_mut() {
            remote.rconn.send(msg);
        }
    }

    pub fn send_flow_expired(&mut self, flow: &FlowEntry,
                             reason: ExpiredReason, now: u64) {
        if self.flags & ofp::OFPC_SEND_FLOW_EXP != 0 {
            let msg = control::flow_expired(flow, reason, now);
            self.send_to_controller(msg);
        }
    }

    pub fn send_port_status(&mut self, port_no: u16, reason: u8) {
        let desc = match self.port(port_no) {
            Some(port) => control::encode_phy_port(port),
            None => return
        };
        let msg = control::port_status(reason, &desc);
        self.send_to_controller(msg);
    }

    // Occupancy report, printed by the daemon on demand and at exit.
    pub fn report(&self) {
        println!("datapath {:016x}:", self.id);
        for (i, stats) in self.chain.stats().iter().enumerate() {
            println!("  table {} ({}): {}/{} flows, {} lookups, {} matched",
                     i, stats.name,
                     lib::comma_value(stats.n_flows as u64),
                     lib::comma_value(stats.max_flows as u64),
                     lib::comma_value(stats.n_lookup),
                     lib::comma_value(stats.n_matched));
        }
        for p in &self.ports {
            println!("  port {} ({}): rx {} tx {} drop {}",
                     p.port_no, p.dev.name(),
                     lib::comma_value(p.rx_count),
                     lib::comma_value(p.tx_count),
                     lib::comma_value(p.drop_count));
        }
        println!("  rx {} tx {} drops {} clones {} packet-ins {}",
                 lib::comma_value(self.stats.rx_packets),
                 lib::comma_value(self.stats.tx_packets),
                 lib::comma_value(self.stats.drops),
                 lib::comma_value(self.stats.clones),
                 lib::comma_value(self.stats.packet_ins));
    }

}
