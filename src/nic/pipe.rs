// RAWLINK — PIPE PORT
// Two cross-connected in-memory ports standing in for a cable. Frames are
// copied on TX into a bounded queue and copied back out into the receiver's
// pool on RX, so each side's buffer accounting matches a real poll-mode
// port. An optional drop hook models wire loss: a dropped frame counts as
// accepted by the NIC and then vanishes, which is exactly what the sender
// observes on a real link.

use crate::nic::{MacAddr, NicPort};
use crate::pool::{FrameBuf, FramePool};
use crate::ring::{self, Consumer, Producer};

type DropFn = Box<dyn FnMut(&[u8]) -> bool + Send>;

pub struct PipePort {
    mac: MacAddr,
    to_peer: Producer<Vec<u8>>,
    from_peer: Consumer<Vec<u8>>,
    drop_fn: Option<DropFn>,
    injected_drops: u64,
    overflow_drops: u64,
}

impl PipePort {
    /// Build a connected pair. `depth` is rounded up to a power of two;
    /// it models the link's in-flight capacity.
    pub fn pair(depth: usize) -> (PipePort, PipePort) {
        let depth = depth.next_power_of_two().max(2);
        let (a_tx, b_rx) = match ring::ring(depth) {
            Ok(r) => r,
            Err(_) => unreachable!(),
        };
        let (b_tx, a_rx) = match ring::ring(depth) {
            Ok(r) => r,
            Err(_) => unreachable!(),
        };
        let a = PipePort {
            mac: [0x02, 0x00, 0x00, 0x00, 0x00, 0x0A],
            to_peer: a_tx,
            from_peer: a_rx,
            drop_fn: None,
            injected_drops: 0,
            overflow_drops: 0,
        };
        let b = PipePort {
            mac: [0x02, 0x00, 0x00, 0x00, 0x00, 0x0B],
            to_peer: b_tx,
            from_peer: b_rx,
            drop_fn: None,
            injected_drops: 0,
            overflow_drops: 0,
        };
        (a, b)
    }

    /// Install a loss model on this port's TX side. Returning true drops
    /// the frame after the NIC has accepted it.
    pub fn set_drop_fn(&mut self, f: impl FnMut(&[u8]) -> bool + Send + 'static) {
        self.drop_fn = Some(Box::new(f));
    }

    pub fn injected_drops(&self) -> u64 {
        self.injected_drops
    }

    /// Frames lost because the receiver had no buffers or the frame was
    /// larger than its pool's buffers.
    pub fn overflow_drops(&self) -> u64 {
        self.overflow_drops
    }
}

impl NicPort for PipePort {
    fn mac(&self) -> MacAddr {
        self.mac
    }

    fn rx_burst(&mut self, pool: &mut FramePool, out: &mut Vec<FrameBuf>, max: usize) -> usize {
        let mut received = 0;
        while received < max {
            let Some(bytes) = self.from_peer.dequeue() else { break };
            let Some(mut buf) = pool.alloc() else {
                // No receive buffers: the frame is lost, as on hardware.
                self.overflow_drops += 1;
                break;
            };
            if bytes.len() > buf.capacity() {
                pool.free(buf);
                self.overflow_drops += 1;
                continue;
            }
            buf.storage_mut()[..bytes.len()].copy_from_slice(&bytes);
            buf.set_len(bytes.len());
            out.push(buf);
            received += 1;
        }
        received
    }

    fn tx_burst(&mut self, pool: &mut FramePool, frames: &mut Vec<FrameBuf>) -> usize {
        let mut accepted = 0;
        for frame in frames.iter() {
            let lose = match self.drop_fn.as_mut() {
                Some(f) => f(frame.bytes()),
                None => false,
            };
            if lose {
                self.injected_drops += 1;
                accepted += 1;
                continue;
            }
            match self.to_peer.enqueue(frame.bytes().to_vec()) {
                Ok(()) => accepted += 1,
                Err(_) => break, // link full: backpressure
            }
        }
        for frame in frames.drain(..accepted) {
            pool.free(frame);
        }
        accepted
    }

    fn tx_one(&mut self, pool: &mut FramePool, frame: FrameBuf) -> Option<FrameBuf> {
        let lose = match self.drop_fn.as_mut() {
            Some(f) => f(frame.bytes()),
            None => false,
        };
        if lose {
            self.injected_drops += 1;
            pool.free(frame);
            return None;
        }
        match self.to_peer.enqueue(frame.bytes().to_vec()) {
            Ok(()) => {
                pool.free(frame);
                None
            }
            Err(_) => Some(frame),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_cross_the_pipe() {
        let (mut a, mut b) = PipePort::pair(16);
        let mut pool_a = FramePool::new(64, 4);
        let mut pool_b = FramePool::new(64, 4);

        let mut frame = pool_a.alloc().unwrap();
        frame.storage_mut()[..3].copy_from_slice(&[1, 2, 3]);
        frame.set_len(3);
        assert!(a.tx_one(&mut pool_a, frame).is_none());
        assert_eq!(pool_a.available(), 4);

        let mut out = Vec::new();
        assert_eq!(b.rx_burst(&mut pool_b, &mut out, 8), 1);
        assert_eq!(out[0].bytes(), &[1, 2, 3]);
    }

    #[test]
    fn drop_hook_consumes_frames() {
        let (mut a, mut b) = PipePort::pair(16);
        let mut pool_a = FramePool::new(64, 4);
        let mut pool_b = FramePool::new(64, 4);

        a.set_drop_fn(|_| true);
        let frame = pool_a.alloc().unwrap();
        assert!(a.tx_one(&mut pool_a, frame).is_none());
        assert_eq!(a.injected_drops(), 1);

        let mut out = Vec::new();
        assert_eq!(b.rx_burst(&mut pool_b, &mut out, 8), 0);
    }

    #[test]
    fn full_link_pushes_back() {
        let (mut a, _b) = PipePort::pair(2);
        let mut pool = FramePool::new(64, 8);
        for _ in 0..2 {
            let frame = pool.alloc().unwrap();
            assert!(a.tx_one(&mut pool, frame).is_none());
        }
        let frame = pool.alloc().unwrap();
        assert!(a.tx_one(&mut pool, frame).is_some());
    }
}
