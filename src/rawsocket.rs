use super::lib;
use super::ethernet::MacAddress;
use super::port::PortDev;

use std::ffi;
use std::io;
use std::mem;
use std::ptr;

// RAW SOCKET PORT DRIVER
//
// PortDev implementation over a Linux AF_PACKET socket bound to a network
// interface. Frame I/O is non-blocking; readiness is probed with select(2)
// so a quiet device costs one syscall per pass.

pub struct RawSocket {
    sock: i32,
    ifname: String,
    hw: MacAddress,
    mtu: usize,
    fdset: FdSet
}

impl RawSocket {

    pub fn open(ifname: &str) -> io::Result<RawSocket> {
        let sock = open_raw_socket(ifname)?;
        let hw = if_hwaddr(sock, ifname)?;
        let mtu = if_mtu(sock, ifname)?;
        Ok(RawSocket {
            sock,
            ifname: ifname.to_string(),
            hw,
            mtu,
            fdset: FdSet::new()
        })
    }

}

impl Drop for RawSocket {
    fn drop(&mut self) {
        unsafe { libc::close(self.sock); }
    }
}

impl PortDev for RawSocket {

    fn send(&mut self, frame: &[u8]) -> io::Result<bool> {
        if !writable(self.sock, &mut self.fdset)? {
            return Ok(false); // device backlogged, caller counts a drop
        }
        let written = unsafe {
            libc::write(self.sock,
                        frame.as_ptr() as *const ffi::c_void,
                        frame.len())
        };
        if written == frame.len() as isize {
            Ok(true)
        } else if written == -1 && errno_would_block() {
            Ok(false)
        } else {
            Err(io::Error::last_os_error())
        }
    }

    fn recv(&mut self) -> io::Result<Option<Vec<u8>>> {
        if !readable(self.sock, &mut self.fdset)? {
            return Ok(None);
        }
        let mut frame = vec![0u8; self.mtu + 18]; // headers and a VLAN tag
        let read = unsafe {
            libc::read(self.sock,
                       frame.as_mut_ptr() as *mut ffi::c_void,
                       frame.len())
        };
        if read > 0 {
            frame.truncate(read as usize);
            Ok(Some(frame))
        } else if read == -1 && errno_would_block() {
            Ok(None)
        } else {
            Err(io::Error::last_os_error())
        }
    }

    fn mtu(&self) -> usize {
        self.mtu
    }

    fn hw_addr(&self) -> MacAddress {
        self.hw
    }

    fn name(&self) -> &str {
        &self.ifname
    }

}

fn open_raw_socket(ifname: &str) -> io::Result<i32> {
    let index = unsafe { libc::if_nametoindex(cstr(ifname)?.as_ptr()) };
    if index == 0 {
        return Err(io::Error::new(io::ErrorKind::NotFound,
                                  format!("no such interface: {}", ifname)));
    }
    let af_packet = libc::AF_PACKET;
    let sock_rawnoblock = libc::SOCK_RAW | libc::SOCK_NONBLOCK;
    let proto_eth = lib::htons(libc::ETH_P_ALL as u16) as i32;
    let sock = unsafe { libc::socket(af_packet, sock_rawnoblock, proto_eth) };
    if sock == -1 {
        return Err(io::Error::last_os_error());
    }
    unsafe {
        let addr = libc::sockaddr_ll {
            sll_family: af_packet as u16,
            sll_ifindex: index as i32,
            sll_protocol: proto_eth as u16,
            // Unset / zero
            sll_addr: [0; 8],
            sll_hatype: 0,
            sll_halen: 0,
            sll_pkttype: 0
        };
        let sa = &addr as *const libc::sockaddr_ll as *const libc::sockaddr;
        let addrlen = mem::size_of::<libc::sockaddr_ll>() as u32;
        if libc::bind(sock, sa, addrlen) == -1 {
            let err = io::Error::last_os_error();
            libc::close(sock);
            return Err(err);
        }
    }
    Ok(sock)
}

fn ifreq_for(ifname: &str) -> io::Result<libc::ifreq> {
    let mut ifr: libc::ifreq = unsafe { mem::zeroed() };
    let bytes = ifname.as_bytes();
    if bytes.len() >= ifr.ifr_name.len() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput,
                                  "interface name too long"));
    }
    for (dst, &src) in ifr.ifr_name.iter_mut().zip(bytes.iter()) {
        *dst = src as libc::c_char;
    }
    Ok(ifr)
}

fn if_hwaddr(sock: i32, ifname: &str) -> io::Result<MacAddress> {
    let mut ifr = ifreq_for(ifname)?;
    if unsafe { libc::ioctl(sock, libc::SIOCGIFHWADDR, &mut ifr) } == -1 {
        return Err(io::Error::last_os_error());
    }
    let sa_data = unsafe { ifr.ifr_ifru.ifru_hwaddr.sa_data };
    let mut hw: MacAddress = [0; 6];
    for (dst, &src) in hw.iter_mut().zip(sa_data.iter()) {
        *dst = src as u8;
    }
    Ok(hw)
}

fn if_mtu(sock: i32, ifname: &str) -> io::Result<usize> {
    let mut ifr = ifreq_for(ifname)?;
    if unsafe { libc::ioctl(sock, libc::SIOCGIFMTU, &mut ifr) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { ifr.ifr_ifru.ifru_mtu } as usize)
}

fn readable(sock: i32, fdset: &mut FdSet) -> io::Result<bool> {
    select_one(sock, fdset, true)
}

fn writable(sock: i32, fdset: &mut FdSet) -> io::Result<bool> {
    select_one(sock, fdset, false)
}

fn select_one(sock: i32, fdset: &mut FdSet, read: bool) -> io::Result<bool> {
    let fdmax = sock + 1;
    let timeout = &mut libc::timeval { tv_sec: 0, tv_usec: 0 };
    loop {
        fdset.set(sock);
        let (readfds, writefds) = if read {
            (fdset.as_mut_ptr(), ptr::null_mut())
        } else {
            (ptr::null_mut(), fdset.as_mut_ptr())
        };
        let ret = unsafe {
            libc::select(fdmax, readfds, writefds, ptr::null_mut(), timeout)
        };
        if ret == 1 {
            return Ok(true);
        }
        if ret == 0 {
            return Ok(false);
        }
        if !matches!(errno(), libc::EAGAIN | libc::EINTR) {
            return Err(io::Error::last_os_error());
        }
    }
}

fn cstr(s: &str) -> io::Result<ffi::CString> {
    ffi::CString::new(s)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput,
                                    "embedded NUL in name"))
}

fn errno() -> i32 {
    io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

fn errno_would_block() -> bool {
    matches!(errno(), libc::EAGAIN | libc::EINTR)
}

struct FdSet(libc::fd_set);

impl FdSet {
    fn new() -> FdSet {
        unsafe {
            let mut raw_fd_set = mem::MaybeUninit::<libc::fd_set>::uninit();
            libc::FD_ZERO(raw_fd_set.as_mut_ptr());
            FdSet(raw_fd_set.assume_init())
        }
    }
    fn set(&mut self, fd: i32) {
        unsafe { libc::FD_SET(fd, &mut self.0) }
    }
    fn as_mut_ptr(&mut self) -> *mut libc::fd_set {
        &mut self.0
    }
}
