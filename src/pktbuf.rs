use super::buffer::Buffer;
use super::openflow::OFP_NO_BUFFER;

// PACKET BUFFERING
//
// Packets sent to the controller in a PACKET_IN are parked here so that the
// controller can refer back to them by a 32-bit opaque ID instead of echoing
// the payload. The ID divides into a slot number (low bits) and a cookie
// (high bits); the cookie distinguishes packets that have occupied the same
// slot over time, so a stale ID misses instead of yielding the wrong packet.
//
//   PacketBuffers::new() - the fixed ring of N_PKT_BUFFERS slots
//   save(&Buffer, now) -> u32 - park a copy, OFP_NO_BUFFER when refused
//   retrieve(id) -> Option<Buffer> - take the packet out, exactly once
//   discard(id) - drop the packet if the ID is still live

pub const PKT_BUFFER_BITS: u32 = 8;
pub const N_PKT_BUFFERS: usize = 1 << PKT_BUFFER_BITS;
const PKT_BUFFER_MASK: u32 = N_PKT_BUFFERS as u32 - 1;
pub const PKT_COOKIE_BITS: u32 = 32 - PKT_BUFFER_BITS;

// A slot younger than this is not overwritten by a later save.
const OVERWRITE_SECS: u64 = 1;

struct Slot {
    packet: Option<Buffer>,
    cookie: u32,
    timeout: u64
}

pub struct PacketBuffers {
    slots: Vec<Slot>,
    idx: usize,
    misses: u64
}

impl PacketBuffers {

    pub fn new() -> PacketBuffers {
        let mut slots = Vec::new();
        slots.resize_with(N_PKT_BUFFERS,
                          || Slot { packet: None, cookie: 0, timeout: 0 });
        PacketBuffers { slots, idx: 0, misses: 0 }
    }

    // Park a copy of 'packet' and return its ID, or OFP_NO_BUFFER if the
    // next slot is occupied by a packet younger than OVERWRITE_SECS.
    pub fn save(&mut self, packet: &Buffer, now: u64) -> u32 {
        self.idx = (self.idx + 1) & PKT_BUFFER_MASK as usize;
        let p = &mut self.slots[self.idx];
        if p.packet.is_some() && now < p.timeout {
            return OFP_NO_BUFFER;
        }
        p.packet = Some(packet.clone_buffer());
        // Don't use the maximum cookie value since the all-bits-1 id is
        // special.
        p.cookie += 1;
        if p.cookie >= (1 << PKT_COOKIE_BITS) - 1 {
            p.cookie = 0;
        }
        p.timeout = now + OVERWRITE_SECS;
        self.idx as u32 | (p.cookie << PKT_BUFFER_BITS)
    }

    // Transfer the packet out. A cookie mismatch is not an error, just a
    // stale ID issued for an earlier occupant of the slot.
    pub fn retrieve(&mut self, id: u32) -> Option<Buffer> {
        let p = &mut self.slots[(id & PKT_BUFFER_MASK) as usize];
        if p.cookie == id >> PKT_BUFFER_BITS {
            p.packet.take()
        } else {
            self.misses += 1;
            None
        }
    }

    pub fn discard(&mut self, id: u32) {
        let p = &mut self.slots[(id & PKT_BUFFER_MASK) as usize];
        if p.cookie == id >> PKT_BUFFER_BITS {
            p.packet = None;
        }
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

}
