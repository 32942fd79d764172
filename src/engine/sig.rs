// RAWLINK — SIG ENGINE
// Per-channel stop-and-wait reliability: in-order delivery, single-seqno
// acknowledgement, timeout-driven retransmission. One tick is an RX pass
// followed by a TX pass, so a fresh ACK retires its pending transmission
// before the TX pass considers new work.
//
// Channel state is three flat 65536-entry arrays (O(1) lookup, channels are
// implicit and allocated by first use). Channels currently in WAIT_ACK are
// also tracked in a small list so the timeout scan touches only in-flight
// channels. Sequence numbers wrap modulo 2^32 per channel.
//
// Submission draining: SPSC rings have no peek, so the TX pass pulls a
// bounded burst into a deferred list and walks it in order, sending each
// entry whose channel is IDLE and holding back entries whose channel is
// still in WAIT_ACK. The stall is per channel: a blocked channel's backlog
// never gates an unrelated channel's submissions. Per-channel order is
// list order, which is submission order; nothing is dropped.
// Retransmission always takes precedence over new submissions.

use tracing::{debug, trace};

use crate::engine::clock::{self, CycleClock};
use crate::nic::{MacAddr, NicPort};
use crate::pool::{FrameBuf, FramePool};
use crate::protocol::payload::{SigRecv, SigSend};
use crate::protocol::wire::{self, fmt_mac, SIG_OPCODE_ACK};
use crate::ring::{Consumer, Producer};

pub const CHANNEL_COUNT: usize = 1 << 16;

#[derive(Clone)]
struct PendingSlot {
    active: bool,
    seq: u32,
    last_tx_cycles: u64,
    copy: SigSend,
}

impl PendingSlot {
    const IDLE: PendingSlot = PendingSlot {
        active: false,
        seq: 0,
        last_tx_cycles: 0,
        copy: SigSend::EMPTY,
    };
}

enum SendOutcome {
    Sent,
    /// TX queue accepted zero frames, or no frame buffer was available.
    /// The state machine does not advance; the next tick retries.
    NotSent,
}

/// Per-engine counters. Steady-state faults only ever show up here.
#[derive(Clone, Copy, Debug, Default)]
pub struct SigStats {
    pub rx_frames: u64,
    pub rx_malformed: u64,
    pub rx_acks: u64,
    pub rx_delivered: u64,
    pub rx_duplicates: u64,
    pub rx_gap_drops: u64,
    pub tx_data: u64,
    pub tx_retransmits: u64,
    pub tx_acks: u64,
    pub tx_nic_stalls: u64,
    pub alloc_failures: u64,
    pub inbound_full_spins: u64,
}

pub struct SigEngine<P: NicPort> {
    port: P,
    pool: FramePool,
    src_mac: MacAddr,
    default_peer: MacAddr,
    outbound: Consumer<Box<SigSend>>,
    inbound: Producer<Box<SigRecv>>,
    clock: CycleClock,
    timeout_cycles: u64,
    tx_burst: usize,
    rx_burst: usize,

    next_seq: Box<[u32]>,
    expect_seq: Box<[u32]>,
    pending: Box<[PendingSlot]>,
    /// Channels currently in WAIT_ACK. Swap-removed on ACK.
    wait_ack: Vec<u16>,
    /// Submissions drained from the ring but not yet sent: their channel is
    /// in WAIT_ACK, or the TX queue pushed back. Kept in drain order, which
    /// preserves per-channel FIFO. Bounded by tx_burst so one stalled
    /// channel cannot pull the whole ring into engine memory.
    deferred: Vec<Box<SigSend>>,
    learned_peer: Option<MacAddr>,

    rx_scratch: Vec<FrameBuf>,
    tx_scratch: Vec<Box<SigSend>>,
    stats: SigStats,
}

impl<P: NicPort> SigEngine<P> {
    pub(crate) fn new(
        port: P,
        pool: FramePool,
        default_peer: MacAddr,
        outbound: Consumer<Box<SigSend>>,
        inbound: Producer<Box<SigRecv>>,
        clock: CycleClock,
        timeout_cycles: u64,
        tx_burst: usize,
        rx_burst: usize,
    ) -> Self {
        let src_mac = port.mac();
        SigEngine {
            port,
            pool,
            src_mac,
            default_peer,
            outbound,
            inbound,
            clock,
            timeout_cycles,
            tx_burst,
            rx_burst,
            next_seq: vec![0u32; CHANNEL_COUNT].into_boxed_slice(),
            expect_seq: vec![0u32; CHANNEL_COUNT].into_boxed_slice(),
            pending: vec![PendingSlot::IDLE; CHANNEL_COUNT].into_boxed_slice(),
            wait_ack: Vec::new(),
            deferred: Vec::new(),
            learned_peer: None,
            rx_scratch: Vec::new(),
            tx_scratch: Vec::new(),
            stats: SigStats::default(),
        }
    }

    #[inline(always)]
    pub fn stats(&self) -> &SigStats {
        &self.stats
    }

    /// Channels currently holding an unacknowledged frame.
    #[inline(always)]
    pub fn in_flight(&self) -> usize {
        self.wait_ack.len()
    }

    /// One tick: RX pass, then TX pass. Returns true if any frame moved.
    pub fn progress(&mut self) -> bool {
        let rx_active = self.rx();
        let tx_active = self.tx();
        rx_active || tx_active
    }

    // ========================================================================
    // RX PASS
    // ========================================================================

    fn rx(&mut self) -> bool {
        let mut frames = std::mem::take(&mut self.rx_scratch);
        let n = self.port.rx_burst(&mut self.pool, &mut frames, self.rx_burst);
        for frame in frames.drain(..) {
            self.stats.rx_frames += 1;
            match wire::decode_sig(frame.bytes()) {
                Ok(v) => {
                    if self.learned_peer.is_none() {
                        debug!(peer = %fmt_mac(v.src_mac), "peer learned");
                    }
                    self.learned_peer = Some(v.src_mac);
                    if v.opcode == SIG_OPCODE_ACK {
                        self.stats.rx_acks += 1;
                        self.on_ack(v.channel_id, v.seq);
                    } else {
                        self.on_data(v.channel_id, v.seq, v.opcode, v.payload);
                    }
                }
                Err(_) => {
                    self.stats.rx_malformed += 1;
                    trace!("malformed frame dropped");
                }
            }
            self.pool.free(frame);
        }
        self.rx_scratch = frames;
        n > 0
    }

    fn on_ack(&mut self, channel_id: u16, seq: u32) {
        let ch = channel_id as usize;
        let slot = &mut self.pending[ch];
        // Any ACK that does not match the outstanding frame is ignored.
        if slot.active && slot.seq == seq {
            slot.active = false;
            self.next_seq[ch] = self.next_seq[ch].wrapping_add(1);
            if let Some(pos) = self.wait_ack.iter().position(|&c| c == channel_id) {
                self.wait_ack.swap_remove(pos);
            }
        }
    }

    fn on_data(&mut self, channel_id: u16, seq: u32, opcode: u16, payload: &[u8]) {
        let ch = channel_id as usize;
        let expect = self.expect_seq[ch];
        if seq == expect {
            self.expect_seq[ch] = expect.wrapping_add(1);
            let mut rec = Box::new(SigRecv::new(channel_id, seq, opcode, payload));
            // Reliability forbids dropping here: spin until the consumer
            // frees a slot. Consumers must drain eagerly.
            loop {
                match self.inbound.enqueue(rec) {
                    Ok(()) => break,
                    Err(back) => {
                        rec = back;
                        self.stats.inbound_full_spins += 1;
                        clock::pause();
                    }
                }
            }
            self.stats.rx_delivered += 1;
            self.send_ack(channel_id, seq);
        } else if seq == expect.wrapping_sub(1) {
            // The sender retransmitted because our ACK was lost. Answer
            // again, deliver nothing.
            self.stats.rx_duplicates += 1;
            self.send_ack(channel_id, seq);
        } else {
            // Gap: not acknowledged, the sender's timer recovers it.
            self.stats.rx_gap_drops += 1;
        }
    }

    fn send_ack(&mut self, channel_id: u16, seq: u32) {
        let dst = self.learned_peer.unwrap_or(self.default_peer);
        let Some(mut frame) = self.pool.alloc() else {
            self.stats.alloc_failures += 1;
            return;
        };
        let len = match wire::encode_sig(
            frame.storage_mut(), dst, self.src_mac, channel_id, seq, SIG_OPCODE_ACK, &[],
        ) {
            Ok(len) => len,
            Err(_) => {
                self.pool.free(frame);
                return;
            }
        };
        frame.set_len(len);
        match self.port.tx_one(&mut self.pool, frame) {
            None => self.stats.tx_acks += 1,
            Some(frame) => {
                // A squeezed-out ACK looks like wire loss to the peer; its
                // retransmission will earn another one.
                self.stats.tx_nic_stalls += 1;
                self.pool.free(frame);
            }
        }
    }

    // ========================================================================
    // TX PASS
    // ========================================================================

    fn tx(&mut self) -> bool {
        // Retransmissions take precedence over new submissions.
        let mut active = self.retransmit_expired();

        // Work list: held-back submissions first, then a top-up burst from
        // the outbound ring, capped at tx_burst entries in flight here.
        let mut work = std::mem::take(&mut self.deferred);
        if work.len() < self.tx_burst {
            self.outbound.dequeue_burst(self.tx_burst - work.len(), &mut work);
        }
        if work.is_empty() {
            return active;
        }

        let mut held = std::mem::take(&mut self.tx_scratch);
        let mut nic_stalled = false;
        for rec in work.drain(..) {
            let ch = rec.channel_id() as usize;
            // Stop-and-wait per channel: a frame already in flight (or one
            // sent earlier in this very pass) holds this submission back
            // without touching any other channel's entries.
            if nic_stalled || self.pending[ch].active {
                held.push(rec);
                continue;
            }
            let seq = self.next_seq[ch];
            let dst = self.learned_peer.unwrap_or(self.default_peer);
            match self.build_and_send(dst, &rec, seq) {
                SendOutcome::Sent => {
                    let now = self.clock.now();
                    let slot = &mut self.pending[ch];
                    slot.active = true;
                    slot.seq = seq;
                    slot.last_tx_cycles = now;
                    slot.copy = (*rec).clone();
                    self.wait_ack.push(rec.channel_id());
                    self.stats.tx_data += 1;
                    active = true;
                }
                SendOutcome::NotSent => {
                    // next_seq unadvanced; the payload is effectively
                    // re-submitted on the next tick. Later entries would
                    // only hit the same wall, so they are held as-is.
                    nic_stalled = true;
                    held.push(rec);
                }
            }
        }
        self.tx_scratch = work;
        self.deferred = held;
        active
    }

    fn retransmit_expired(&mut self) -> bool {
        if self.wait_ack.is_empty() {
            return false;
        }
        let now = self.clock.now();
        let mut active = false;
        for i in 0..self.wait_ack.len() {
            let ch = self.wait_ack[i] as usize;
            let slot = &self.pending[ch];
            debug_assert!(slot.active);
            if now.wrapping_sub(slot.last_tx_cycles) < self.timeout_cycles {
                continue;
            }
            let seq = slot.seq;
            let copy = slot.copy.clone();
            let dst = self.learned_peer.unwrap_or(self.default_peer);
            if let SendOutcome::Sent = self.build_and_send(dst, &copy, seq) {
                self.pending[ch].last_tx_cycles = now;
                self.stats.tx_retransmits += 1;
                active = true;
            }
        }
        active
    }

    fn build_and_send(&mut self, dst: MacAddr, rec: &SigSend, seq: u32) -> SendOutcome {
        let Some(mut frame) = self.pool.alloc() else {
            self.stats.alloc_failures += 1;
            return SendOutcome::NotSent;
        };
        let len = match wire::encode_sig(
            frame.storage_mut(), dst, self.src_mac,
            rec.channel_id(), seq, rec.opcode(), rec.payload(),
        ) {
            Ok(len) => len,
            Err(_) => {
                self.pool.free(frame);
                return SendOutcome::NotSent;
            }
        };
        frame.set_len(len);
        match self.port.tx_one(&mut self.pool, frame) {
            None => SendOutcome::Sent,
            Some(frame) => {
                self.stats.tx_nic_stalls += 1;
                self.pool.free(frame);
                SendOutcome::NotSent
            }
        }
    }
}
