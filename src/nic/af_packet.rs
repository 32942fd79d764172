// RAWLINK — AF_PACKET PORT
// Raw-socket port for running the endpoint on a real interface (veth pairs,
// lab NICs). The socket is bound to the interface with ETH_P_ALL and set
// non-blocking, so both engine passes stay poll-shaped. Frames that are not
// ours arrive too and are rejected by the decoder, same as a promiscuous
// poll-mode port.

use std::io;
use std::mem;

use tracing::info;

use crate::nic::{MacAddr, NicPort};
use crate::pool::{FrameBuf, FramePool};
use crate::protocol::wire::fmt_mac;

struct OwnedFd(i32);

impl Drop for OwnedFd {
    fn drop(&mut self) {
        if self.0 >= 0 {
            unsafe { libc::close(self.0) };
        }
    }
}

pub struct AfPacketPort {
    fd: OwnedFd,
    #[allow(dead_code)]
    ifindex: i32,
    mac: MacAddr,
}

impl AfPacketPort {
    pub fn open(ifname: &str) -> io::Result<Self> {
        if ifname.is_empty() || ifname.len() >= libc::IF_NAMESIZE {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "bad interface name"));
        }

        let proto = (libc::ETH_P_ALL as u16).to_be() as i32;
        let raw = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_RAW | libc::SOCK_NONBLOCK, proto) };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        let fd = OwnedFd(raw);

        let mut ifr: libc::ifreq = unsafe { mem::zeroed() };
        for (dst, src) in ifr.ifr_name.iter_mut().zip(ifname.as_bytes()) {
            *dst = *src as libc::c_char;
        }

        if unsafe { libc::ioctl(fd.0, libc::SIOCGIFINDEX, &mut ifr) } < 0 {
            return Err(io::Error::last_os_error());
        }
        let ifindex = unsafe { ifr.ifr_ifru.ifru_ifindex };

        if unsafe { libc::ioctl(fd.0, libc::SIOCGIFHWADDR, &mut ifr) } < 0 {
            return Err(io::Error::last_os_error());
        }
        let mut mac = [0u8; 6];
        let hwaddr = unsafe { ifr.ifr_ifru.ifru_hwaddr };
        for (dst, src) in mac.iter_mut().zip(hwaddr.sa_data.iter()) {
            *dst = *src as u8;
        }

        let mut sll: libc::sockaddr_ll = unsafe { mem::zeroed() };
        sll.sll_family = libc::AF_PACKET as libc::c_ushort;
        sll.sll_protocol = (libc::ETH_P_ALL as u16).to_be();
        sll.sll_ifindex = ifindex;
        let rc = unsafe {
            libc::bind(
                fd.0,
                &sll as *const libc::sockaddr_ll as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        info!(iface = ifname, mac = %fmt_mac(mac), ifindex, "af_packet port bound");
        Ok(AfPacketPort { fd, ifindex, mac })
    }
}

impl NicPort for AfPacketPort {
    fn mac(&self) -> MacAddr {
        self.mac
    }

    fn rx_burst(&mut self, pool: &mut FramePool, out: &mut Vec<FrameBuf>, max: usize) -> usize {
        let mut received = 0;
        while received < max {
            let Some(mut buf) = pool.alloc() else { break };
            let storage = buf.storage_mut();
            let n = unsafe {
                libc::recv(self.fd.0, storage.as_mut_ptr() as *mut libc::c_void, storage.len(), 0)
            };
            if n <= 0 {
                pool.free(buf);
                break;
            }
            // Oversize frames are truncated to the buffer; the decoder
            // rejects them via the declared-length check.
            buf.set_len((n as usize).min(buf.capacity()));
            out.push(buf);
            received += 1;
        }
        received
    }

    fn tx_burst(&mut self, pool: &mut FramePool, frames: &mut Vec<FrameBuf>) -> usize {
        let mut accepted = 0;
        for frame in frames.iter() {
            let bytes = frame.bytes();
            let n = unsafe {
                libc::send(self.fd.0, bytes.as_ptr() as *const libc::c_void, bytes.len(), 0)
            };
            // EAGAIN, ENOBUFS and transient device errors all look the same
            // from the engine: not accepted this tick.
            if n < 0 {
                break;
            }
            accepted += 1;
        }
        for frame in frames.drain(..accepted) {
            pool.free(frame);
        }
        accepted
    }

    fn tx_one(&mut self, pool: &mut FramePool, frame: FrameBuf) -> Option<FrameBuf> {
        let bytes = frame.bytes();
        let n = unsafe {
            libc::send(self.fd.0, bytes.as_ptr() as *const libc::c_void, bytes.len(), 0)
        };
        if n < 0 {
            return Some(frame);
        }
        pool.free(frame);
        None
    }
}
