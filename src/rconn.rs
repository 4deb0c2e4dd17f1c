use super::vconn;
use super::vconn::{Recv, Vconn};

use std::cmp;
use std::collections::VecDeque;
use std::io;
use std::mem;

// RCONN: RELIABLE CONNECTION
//
// Wraps a Vconn with an outbound queue and, for actively opened connections,
// automatic reconnect with exponential backoff (1 s doubling to a 60 s cap).
// When the queue is congested new messages are dropped and counted; there is
// no unbounded buffering toward a slow controller.
//
//   Rconn::connect(endpoint) - active connection that keeps reconnecting
//   Rconn::from_vconn(vconn) - passive connection, dead once it drops
//   run(now) - reconnect if due, flush queued sends
//   recv(now) -> Option<Vec<u8>> - next inbound message, if any
//   send(msg) - queue a message (drops when congested)
//   take_reconnected() - true once per (re)connect; the caller sends HELLO

const TXQ_LIMIT: usize = 128;
const BACKOFF_START: u64 = 1;
const BACKOFF_MAX: u64 = 60;

type Connector = Box<dyn Fn() -> io::Result<Box<dyn Vconn>>>;

pub struct Rconn {
    name: String,
    vconn: Option<Box<dyn Vconn>>,
    connector: Option<Connector>,
    txq: VecDeque<Vec<u8>>,
    txq_dropped: u64,
    backoff: u64,
    retry_at: u64,
    reconnected: bool,
    dead: bool
}

impl Rconn {

    pub fn connect(endpoint: &str) -> Rconn {
        let ep = endpoint.to_string();
        Rconn {
            name: endpoint.to_string(),
            vconn: None,
            connector: Some(Box::new(move || vconn::connect(&ep))),
            txq: VecDeque::new(),
            txq_dropped: 0,
            backoff: BACKOFF_START,
            retry_at: 0,
            reconnected: false,
            dead: false
        }
    }

    pub fn from_vconn(vconn: Box<dyn Vconn>) -> Rconn {
        Rconn {
            name: vconn.name().to_string(),
            vconn: Some(vconn),
            connector: None,
            txq: VecDeque::new(),
            txq_dropped: 0,
            backoff: BACKOFF_START,
            retry_at: 0,
            reconnected: true,
            dead: false
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_alive(&self) -> bool {
        !self.dead
    }

    pub fn is_connected(&self) -> bool {
        self.vconn.is_some()
    }

    pub fn txq_dropped(&self) -> u64 {
        self.txq_dropped
    }

    // True exactly once after each successful (re)connect.
    pub fn take_reconnected(&mut self) -> bool {
        mem::take(&mut self.reconnected)
    }

    fn disconnect(&mut self, now: u64) {
        self.vconn = None;
        self.txq.clear();
        if self.connector.is_none() {
            self.dead = true;
        } else {
            self.retry_at = now + self.backoff;
            self.backoff = cmp::min(self.backoff * 2, BACKOFF_MAX);
        }
    }

    pub fn run(&mut self, now: u64) {
        if self.vconn.is_none() && !self.dead {
            match &self.connector {
                Some(connect) if now >= self.retry_at => {
                    match connect() {
                        Ok(v) => {
                            self.vconn = Some(v);
                            self.backoff = BACKOFF_START;
                            self.reconnected = true;
                        }
                        Err(_) => {
                            self.retry_at = now + self.backoff;
                            self.backoff = cmp::min(self.backoff * 2,
                                                    BACKOFF_MAX);
                        }
                    }
                }
                Some(_) => {}
                None => self.dead = true
            }
        }
        // Drain the queue as far as the connection accepts.
        let mut failed = false;
        if let Some(v) = self.vconn.as_mut() {
            while let Some(msg) = self.txq.front() {
                match v.send(msg) {
                    Ok(true) => { self.txq.pop_front(); }
                    Ok(false) => break,
                    Err(_) => { failed = true; break; }
                }
            }
            if !failed && v.flush().is_err() {
                failed = true;
            }
        }
        if failed {
            self.disconnect(now);
        }
    }

    pub fn recv(&mut self, now: u64) -> Option<Vec<u8>> {
        let result = self.vconn.as_mut()?.recv();
        match result {
            Ok(Recv::Msg(msg)) => Some(msg),
            Ok(Recv::Again) => None,
            Ok(Recv::Eof) | Err(_) => {
                self.disconnect(now);
                None
            }
        }
    }

    pub fn send(&mut self, msg: Vec<u8>) {
        if self.vconn.is_none() && self.connector.is_none() {
            return;
        }
        if self.txq.len() >= TXQ_LIMIT {
            self.txq_dropped += 1;
        } else {
            self.txq.push_back(msg);
        }
    }

}
