// RAWLINK — URP ENGINE
// Best-effort datagram transfer. No reliability, no reordering, no loss
// recovery: sequence numbers identify frames, they do not order them.
// TX pulls a burst of payloads, frames them, and submits until the NIC
// accepts everything. RX parses a burst and burst-enqueues deliveries;
// whatever the inbound ring cannot take is dropped on the spot, because
// spinning here would turn sustained overload into head-of-line blocking
// the protocol never promised to avoid.

use tracing::{debug, trace};

use crate::engine::clock;
use crate::nic::{MacAddr, NicPort};
use crate::pool::{FrameBuf, FramePool};
use crate::protocol::payload::Datagram;
use crate::protocol::wire::{self, fmt_mac, URP_OPCODE_DATA};
use crate::ring::{Consumer, Producer};

#[derive(Clone, Copy, Debug, Default)]
pub struct UrpStats {
    pub tx_datagrams: u64,
    pub tx_nic_spins: u64,
    pub rx_frames: u64,
    pub rx_malformed: u64,
    pub rx_non_data: u64,
    pub rx_delivered: u64,
    pub rx_ring_drops: u64,
    pub alloc_failures: u64,
}

pub struct UrpEngine<P: NicPort> {
    port: P,
    pool: FramePool,
    src_mac: MacAddr,
    default_peer: MacAddr,
    outbound: Consumer<Box<Datagram>>,
    inbound: Producer<Box<Datagram>>,
    tx_burst: usize,
    rx_burst: usize,

    tx_seq: u32,
    learned_peer: Option<MacAddr>,

    payload_scratch: Vec<Box<Datagram>>,
    frame_scratch: Vec<FrameBuf>,
    rx_scratch: Vec<FrameBuf>,
    deliver_scratch: Vec<Box<Datagram>>,
    stats: UrpStats,
}

impl<P: NicPort> UrpEngine<P> {
    pub(crate) fn new(
        port: P,
        pool: FramePool,
        default_peer: MacAddr,
        outbound: Consumer<Box<Datagram>>,
        inbound: Producer<Box<Datagram>>,
        tx_burst: usize,
        rx_burst: usize,
    ) -> Self {
        let src_mac = port.mac();
        UrpEngine {
            port,
            pool,
            src_mac,
            default_peer,
            outbound,
            inbound,
            tx_burst,
            rx_burst,
            tx_seq: 0,
            learned_peer: None,
            payload_scratch: Vec::new(),
            frame_scratch: Vec::new(),
            rx_scratch: Vec::new(),
            deliver_scratch: Vec::new(),
            stats: UrpStats::default(),
        }
    }

    #[inline(always)]
    pub fn stats(&self) -> &UrpStats {
        &self.stats
    }

    /// One tick: RX pass, then TX pass. Returns true if any frame moved.
    pub fn progress(&mut self) -> bool {
        let rx_active = self.rx();
        let tx_active = self.tx();
        rx_active || tx_active
    }

    fn tx(&mut self) -> bool {
        let mut payloads = std::mem::take(&mut self.payload_scratch);
        let n = self.outbound.dequeue_burst(self.tx_burst, &mut payloads);
        if n == 0 {
            self.payload_scratch = payloads;
            return false;
        }

        let dst = self.learned_peer.unwrap_or(self.default_peer);
        let mut frames = std::mem::take(&mut self.frame_scratch);
        for payload in payloads.drain(..) {
            let Some(mut frame) = self.pool.alloc() else {
                // Best effort: without a buffer the datagram is gone.
                self.stats.alloc_failures += 1;
                continue;
            };
            let len = match wire::encode_urp(
                frame.storage_mut(), dst, self.src_mac, self.tx_seq, payload.payload(),
            ) {
                Ok(len) => len,
                Err(_) => {
                    self.pool.free(frame);
                    continue;
                }
            };
            frame.set_len(len);
            self.tx_seq = self.tx_seq.wrapping_add(1);
            self.stats.tx_datagrams += 1;
            frames.push(frame);
            // Payload container released here.
        }

        // Submit the whole burst; retry until the NIC accepts everything.
        while !frames.is_empty() {
            let sent = self.port.tx_burst(&mut self.pool, &mut frames);
            if sent == 0 {
                self.stats.tx_nic_spins += 1;
                clock::pause();
            }
        }

        self.frame_scratch = frames;
        self.payload_scratch = payloads;
        true
    }

    fn rx(&mut self) -> bool {
        let mut frames = std::mem::take(&mut self.rx_scratch);
        let n = self.port.rx_burst(&mut self.pool, &mut frames, self.rx_burst);
        let mut deliver = std::mem::take(&mut self.deliver_scratch);

        for frame in frames.drain(..) {
            self.stats.rx_frames += 1;
            match wire::decode_urp(frame.bytes()) {
                Ok(v) if v.opcode == URP_OPCODE_DATA => {
                    if self.learned_peer.is_none() {
                        debug!(peer = %fmt_mac(v.src_mac), "peer learned");
                    }
                    self.learned_peer = Some(v.src_mac);
                    deliver.push(Box::new(Datagram::from_wire(v.payload)));
                }
                Ok(_) => {
                    self.stats.rx_non_data += 1;
                }
                Err(_) => {
                    self.stats.rx_malformed += 1;
                    trace!("malformed frame dropped");
                }
            }
            self.pool.free(frame);
        }

        // Drop-on-full at the inbound boundary: unreliable by contract.
        let accepted = self.inbound.enqueue_burst(&mut deliver);
        self.stats.rx_delivered += accepted as u64;
        self.stats.rx_ring_drops += deliver.len() as u64;
        deliver.clear();

        self.rx_scratch = frames;
        self.deliver_scratch = deliver;
        n > 0
    }
}
