use super::ethernet::MacAddress;
use super::openflow as ofp;

use std::io;

// PORT SET
//
// A switch port pairs a logical index with a driver for the underlying
// device. The registry entry carries the administrative flags and running
// counters; the driver moves frames.
//
//   PortDev - the driver contract consumed by the datapath
//   Port - registry entry: index, driver, flags, counters

pub trait PortDev {
    // Ok(true) transmitted; Ok(false) dropped by backpressure. An Err is a
    // non-recoverable device failure and removes the port.
    fn send(&mut self, frame: &[u8]) -> io::Result<bool>;
    // Ok(None) when no frame is waiting.
    fn recv(&mut self) -> io::Result<Option<Vec<u8>>>;
    fn mtu(&self) -> usize { 1500 }
    fn hw_addr(&self) -> MacAddress;
    fn features(&self) -> u32 { 0 }
    fn name(&self) -> &str;
}

pub struct Port {
    pub port_no: u16,
    pub dev: Box<dyn PortDev>,
    pub flags: u32,
    pub rx_count: u64,
    pub tx_count: u64,
    pub drop_count: u64
}

impl Port {

    pub fn new(port_no: u16, dev: Box<dyn PortDev>) -> Port {
        Port {
            port_no,
            dev,
            flags: 0,
            rx_count: 0,
            tx_count: 0,
            drop_count: 0
        }
    }

    pub fn in_flood_set(&self) -> bool {
        self.flags & ofp::OFPPFL_NO_FLOOD == 0
    }

    pub fn may_forward(&self) -> bool {
        self.flags & ofp::OFPPFL_NO_FWD == 0
    }

}
