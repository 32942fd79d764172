// RAWLINK — PAYLOAD CONTAINERS
// Fixed-capacity message containers carried by the application rings.
// Producers own a container until enqueue; the engine takes ownership on
// dequeue, copies the bytes into a frame, and releases it. Inbound
// containers are built by the RX path and owned by the consumer after
// dequeue. Lengths are validated at construction so a queued container can
// never fail to encode.

use crate::error::Error;
use crate::protocol::wire::{SIG_MAX_PAYLOAD, SIG_OPCODE_DATA, URP_MAX_PAYLOAD};

/// Outbound SIG submission: logical channel, application opcode, payload.
#[derive(Clone)]
pub struct SigSend {
    channel_id: u16,
    opcode: u16,
    len: u16,
    data: [u8; SIG_MAX_PAYLOAD],
}

impl SigSend {
    pub const EMPTY: SigSend = SigSend {
        channel_id: 0,
        opcode: SIG_OPCODE_DATA,
        len: 0,
        data: [0; SIG_MAX_PAYLOAD],
    };

    /// DATA submission on `channel_id`. Fails with `FrameTooLarge` when the
    /// payload exceeds the SIG ceiling.
    pub fn data(channel_id: u16, payload: &[u8]) -> Result<Self, Error> {
        Self::with_opcode(channel_id, SIG_OPCODE_DATA, payload)
    }

    /// Submission with an application-defined opcode.
    pub fn with_opcode(channel_id: u16, opcode: u16, payload: &[u8]) -> Result<Self, Error> {
        if payload.len() > SIG_MAX_PAYLOAD {
            return Err(Error::FrameTooLarge);
        }
        let mut rec = SigSend { channel_id, opcode, len: payload.len() as u16, data: [0; SIG_MAX_PAYLOAD] };
        rec.data[..payload.len()].copy_from_slice(payload);
        Ok(rec)
    }

    #[inline(always)]
    pub fn channel_id(&self) -> u16 { self.channel_id }
    #[inline(always)]
    pub fn opcode(&self) -> u16 { self.opcode }
    #[inline(always)]
    pub fn payload(&self) -> &[u8] { &self.data[..self.len as usize] }
}

/// Inbound SIG delivery: the accepted frame's channel, sequence, opcode and
/// payload bytes.
#[derive(Clone)]
pub struct SigRecv {
    pub channel_id: u16,
    pub seq: u32,
    pub opcode: u16,
    len: u16,
    data: [u8; SIG_MAX_PAYLOAD],
}

impl SigRecv {
    /// Built by the RX path from a validated frame; `payload` is already
    /// bounded by the decoder.
    pub(crate) fn new(channel_id: u16, seq: u32, opcode: u16, payload: &[u8]) -> Self {
        let mut rec = SigRecv { channel_id, seq, opcode, len: payload.len() as u16, data: [0; SIG_MAX_PAYLOAD] };
        rec.data[..payload.len()].copy_from_slice(payload);
        rec
    }

    #[inline(always)]
    pub fn payload(&self) -> &[u8] { &self.data[..self.len as usize] }
}

/// URP datagram, outbound or inbound.
#[derive(Clone)]
pub struct Datagram {
    len: u16,
    data: [u8; URP_MAX_PAYLOAD],
}

impl Datagram {
    pub fn new(payload: &[u8]) -> Result<Self, Error> {
        if payload.len() > URP_MAX_PAYLOAD {
            return Err(Error::FrameTooLarge);
        }
        let mut d = Datagram { len: payload.len() as u16, data: [0; URP_MAX_PAYLOAD] };
        d.data[..payload.len()].copy_from_slice(payload);
        Ok(d)
    }

    pub(crate) fn from_wire(payload: &[u8]) -> Self {
        let mut d = Datagram { len: payload.len() as u16, data: [0; URP_MAX_PAYLOAD] };
        d.data[..payload.len()].copy_from_slice(payload);
        d
    }

    #[inline(always)]
    pub fn payload(&self) -> &[u8] { &self.data[..self.len as usize] }
}
