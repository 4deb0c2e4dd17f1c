use super::openflow as ofp;

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::rc::Rc;

// VCONN: CONTROL MESSAGE TRANSPORT
//
// The message transport consumed by the control engine. A Vconn delivers and
// accepts whole OpenFlow messages without blocking; the length-prefixed
// framing over the byte stream is done here, not below.
//
//   Recv - result of a non-blocking receive: message, would-block, or EOF
//   Vconn - non-blocking send/recv of whole messages
//   Pvconn - passive endpoint accepting new Vconns
//   connect("tcp:HOST:PORT") / listen("tcp:HOST:PORT") - TCP implementations
//   loopback_pair() - in-memory pair, for composing a switch and a
//                     controller in one process

pub enum Recv {
    Msg(Vec<u8>),
    Again,
    Eof
}

pub trait Vconn {
    fn recv(&mut self) -> io::Result<Recv>;
    // Returns false when the connection cannot accept the message right now.
    fn send(&mut self, msg: &[u8]) -> io::Result<bool>;
    fn flush(&mut self) -> io::Result<()> { Ok(()) }
    fn name(&self) -> &str;
}

pub trait Pvconn {
    fn accept(&mut self) -> io::Result<Option<Box<dyn Vconn>>>;
    fn name(&self) -> &str;
}

fn strip_scheme(endpoint: &str) -> io::Result<&str> {
    match endpoint.split_once(':') {
        Some(("tcp", rest)) => Ok(rest),
        Some(_) => Ok(endpoint), // bare HOST:PORT
        None => Err(io::Error::new(io::ErrorKind::InvalidInput,
                                   format!("bad endpoint: {}", endpoint)))
    }
}

pub fn connect(endpoint: &str) -> io::Result<Box<dyn Vconn>> {
    let addr = strip_scheme(endpoint)?;
    let stream = TcpStream::connect(addr)?;
    stream.set_nonblocking(true)?;
    stream.set_nodelay(true)?;
    Ok(Box::new(TcpVconn::new(stream, endpoint.to_string())))
}

pub fn listen(endpoint: &str) -> io::Result<Box<dyn Pvconn>> {
    let addr = strip_scheme(endpoint)?;
    let listener = TcpListener::bind(addr)?;
    listener.set_nonblocking(true)?;
    Ok(Box::new(TcpPvconn { listener, name: endpoint.to_string() }))
}

// Bound on unflushed outbound bytes before send() starts refusing.
const OUTBUF_LIMIT: usize = 1 << 16;

pub struct TcpVconn {
    stream: TcpStream,
    name: String,
    inbuf: Vec<u8>,
    outbuf: Vec<u8>
}

impl TcpVconn {

    pub fn new(stream: TcpStream, name: String) -> TcpVconn {
        TcpVconn { stream, name, inbuf: Vec::new(), outbuf: Vec::new() }
    }

    // A whole message at the head of inbuf, if one has arrived.
    fn take_msg(&mut self) -> io::Result<Option<Vec<u8>>> {
        if self.inbuf.len() < ofp::OFP_HEADER_LEN {
            return Ok(None);
        }
        let length = u16::from_be_bytes([self.inbuf[2], self.inbuf[3]]) as usize;
        if length < ofp::OFP_HEADER_LEN {
            return Err(io::Error::new(io::ErrorKind::InvalidData,
                                      "framed length shorter than header"));
        }
        if self.inbuf.len() < length {
            return Ok(None);
        }
        let rest = self.inbuf.split_off(length);
        let msg = std::mem::replace(&mut self.inbuf, rest);
        Ok(Some(msg))
    }

}

impl Vconn for TcpVconn {

    fn recv(&mut self) -> io::Result<Recv> {
        loop {
            if let Some(msg) = self.take_msg()? {
                return Ok(Recv::Msg(msg));
            }
            let mut chunk = [0u8; 4096];
            match self.stream.read(&mut chunk) {
                Ok(0) => return Ok(Recv::Eof),
                Ok(n) => self.inbuf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(Recv::Again);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e)
            }
        }
    }

    fn send(&mut self, msg: &[u8]) -> io::Result<bool> {
        if self.outbuf.len() + msg.len() > OUTBUF_LIMIT {
            self.flush()?;
            if self.outbuf.len() + msg.len() > OUTBUF_LIMIT {
                return Ok(false);
            }
        }
        self.outbuf.extend_from_slice(msg);
        self.flush()?;
        Ok(true)
    }

    fn flush(&mut self) -> io::Result<()> {
        while !self.outbuf.is_empty() {
            match self.stream.write(&self.outbuf) {
                Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero,
                                                   "connection closed")),
                Ok(n) => { self.outbuf.drain(..n); }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e)
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

}

pub struct TcpPvconn {
    listener: TcpListener,
    name: String
}

impl Pvconn for TcpPvconn {

    fn accept(&mut self) -> io::Result<Option<Box<dyn Vconn>>> {
        match self.listener.accept() {
            Ok((stream, peer)) => {
                stream.set_nonblocking(true)?;
                stream.set_nodelay(true)?;
                Ok(Some(Box::new(TcpVconn::new(stream,
                                               format!("tcp:{}", peer)))))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e)
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

}

// In-memory connection pair. Each side's sends appear on the other side's
// receive queue; either side may hang up.
pub struct Loopback {
    name: String,
    tx: Rc<RefCell<VecDeque<Vec<u8>>>>,
    rx: Rc<RefCell<VecDeque<Vec<u8>>>>,
    closed: Rc<Cell<bool>>
}

pub fn loopback_pair() -> (Loopback, Loopback) {
    let a_to_b = Rc::new(RefCell::new(VecDeque::new()));
    let b_to_a = Rc::new(RefCell::new(VecDeque::new()));
    let closed = Rc::new(Cell::new(false));
    (Loopback { name: "loopback:a".to_string(),
                tx: a_to_b.clone(), rx: b_to_a.clone(),
                closed: closed.clone() },
     Loopback { name: "loopback:b".to_string(),
                tx: b_to_a, rx: a_to_b, closed })
}

impl Loopback {
    pub fn close(&self) {
        self.closed.set(true);
    }
}

impl Vconn for Loopback {

    fn recv(&mut self) -> io::Result<Recv> {
        match self.rx.borrow_mut().pop_front() {
            Some(msg) => Ok(Recv::Msg(msg)),
            None if self.closed.get() => Ok(Recv::Eof),
            None => Ok(Recv::Again)
        }
    }

    fn send(&mut self, msg: &[u8]) -> io::Result<bool> {
        if self.closed.get() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe,
                                      "peer hung up"));
        }
        self.tx.borrow_mut().push_back(msg.to_vec());
        Ok(true)
    }

    fn name(&self) -> &str {
        &self.name
    }

}

#[cfg(test)]
mod selftest {
    use super::*;

    #[test]
    fn loopback_delivers_both_ways() {
        let (mut a, mut b) = loopback_pair();
        assert!(matches!(a.recv().unwrap(), Recv::Again));
        a.send(&[1, 2, 3]).unwrap();
        match b.recv().unwrap() {
            Recv::Msg(m) => assert_eq!(m, vec![1, 2, 3]),
            _ => panic!("expected message")
        }
        b.send(&[4]).unwrap();
        assert!(matches!(a.recv().unwrap(), Recv::Msg(_)));
        b.close();
        assert!(matches!(a.recv().unwrap(), Recv::Eof));
        assert!(a.send(&[5]).is_err());
    }

    #[test]
    fn tcp_framing() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        client.set_nonblocking(true).unwrap();
        let (server, _) = listener.accept().unwrap();
        server.set_nonblocking(true).unwrap();
        let mut client = TcpVconn::new(client, "client".to_string());
        let mut server = TcpVconn::new(server, "server".to_string());

        let mut msg = ofp::start(ofp::OFPT_ECHO_REQUEST, 7);
        ofp::put_bytes(&mut msg, b"ping");
        ofp::finish(&mut msg);
        // Send two back to back; they must come out as two whole messages.
        assert!(client.send(&msg).unwrap());
        assert!(client.send(&msg).unwrap());

        let mut got = Vec::new();
        for _ in 0..1000 {
            match server.recv().unwrap() {
                Recv::Msg(m) => got.push(m),
                Recv::Again => std::thread::sleep(
                    std::time::Duration::from_millis(1)),
                Recv::Eof => panic!("unexpected eof")
            }
            if got.len() == 2 { break; }
        }
        assert_eq!(got.len(), 2);
        assert_eq!(got[0], msg);
        assert_eq!(got[1], msg);
    }

    #[test]
    fn endpoint_syntax() {
        assert!(connect("no-port").is_err());
        assert!(listen("tcp:127.0.0.1:0").is_ok());
    }
}
