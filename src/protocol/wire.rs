// RAWLINK — WIRE PROTOCOL
// Canonical definitions for the SIG and URP on-wire formats.
// Header structs are #[repr(C, packed)] with every multi-byte field stored
// big-endian; conversion happens at the access boundary, never in memory.
// All constants here are the single source of truth.

use std::mem;

use bytemuck::{Pod, Zeroable};
use thiserror::Error;

// ============================================================================
// WIRE CONSTANTS
// ============================================================================

/// IEEE 802.1 Local Experimental EtherType for SIG signaling frames.
pub const ETH_TYPE_SIG: u16 = 0x88B5;
/// Local Experimental EtherType for URP datagram frames.
pub const ETH_TYPE_URP: u16 = 0x88B6;
/// Wire protocol version, shared by both variants.
pub const WIRE_VERSION: u16 = 1;

// SIG opcodes
pub const SIG_OPCODE_DATA: u16 = 0x10;
pub const SIG_OPCODE_ACK: u16 = 0x11;
// URP opcode (distinct range so a misdelivered frame never aliases)
pub const URP_OPCODE_DATA: u16 = 0x20;

/// Payload ceiling for SIG frames. Signaling stays small.
pub const SIG_MAX_PAYLOAD: usize = 48;
/// Payload ceiling for URP frames.
pub const URP_MAX_PAYLOAD: usize = 1024;

pub type MacAddr = [u8; 6];

pub const MAC_BROADCAST: MacAddr = [0xFF; 6];
pub const MAC_ZERO: MacAddr = [0x00; 6];

pub fn fmt_mac(mac: MacAddr) -> String {
    format!("{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5])
}

// ============================================================================
// WIRE HEADERS
// ============================================================================

/// IEEE 802.3 Ethernet header. 14 bytes on wire: dst(6) + src(6) + ethertype(2).
#[repr(C, packed)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct EthernetHeader {
    pub dst: MacAddr,
    pub src: MacAddr,
    /// Big-endian on the wire.
    pub ether_type: u16,
}

/// SIG protocol header. 12 bytes, carried after EthernetHeader.
/// All fields big-endian on the wire.
#[repr(C, packed)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct SigHeader {
    pub version: u16,
    pub channel_id: u16,
    pub seq: u32,
    pub opcode: u16,
    pub payload_len: u16,
}

/// URP protocol header. 10 bytes, carried after EthernetHeader.
/// All fields big-endian on the wire.
#[repr(C, packed)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct UrpHeader {
    pub seq: u32,
    pub version: u16,
    pub opcode: u16,
    pub payload_len: u16,
}

// ============================================================================
// DERIVED CONSTANTS
// ============================================================================

pub const ETH_HDR_SIZE: usize = mem::size_of::<EthernetHeader>();
pub const SIG_HDR_SIZE: usize = mem::size_of::<SigHeader>();
pub const URP_HDR_SIZE: usize = mem::size_of::<UrpHeader>();

const _: () = assert!(ETH_HDR_SIZE == 14);
const _: () = assert!(SIG_HDR_SIZE == 12);
const _: () = assert!(URP_HDR_SIZE == 10);

/// Minimum valid frame lengths. Anything shorter is dropped at the decoder.
pub const SIG_MIN_FRAME: usize = ETH_HDR_SIZE + SIG_HDR_SIZE;
pub const URP_MIN_FRAME: usize = ETH_HDR_SIZE + URP_HDR_SIZE;

/// Frame-buffer capacities: headers plus the full payload ceiling.
pub const SIG_FRAME_CAPACITY: usize = SIG_MIN_FRAME + SIG_MAX_PAYLOAD;
pub const URP_FRAME_CAPACITY: usize = URP_MIN_FRAME + URP_MAX_PAYLOAD;

// ============================================================================
// CODEC
// ============================================================================

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// Short frame, wrong ethertype, wrong version, or a payload_len that
    /// exceeds the protocol ceiling or the frame's actual bytes.
    #[error("malformed frame")]
    MalformedFrame,
    /// Encode-side: payload exceeds the protocol ceiling.
    #[error("payload exceeds protocol maximum")]
    FrameTooLarge,
}

/// Decoded SIG frame. Borrows the payload from the frame buffer.
#[derive(Debug, PartialEq, Eq)]
pub struct SigView<'a> {
    pub src_mac: MacAddr,
    pub channel_id: u16,
    pub seq: u32,
    pub opcode: u16,
    pub payload: &'a [u8],
}

/// Decoded URP frame. Borrows the payload from the frame buffer.
#[derive(Debug, PartialEq, Eq)]
pub struct UrpView<'a> {
    pub src_mac: MacAddr,
    pub seq: u32,
    pub opcode: u16,
    pub payload: &'a [u8],
}

/// Encode a SIG frame into `buf`. Returns the frame length.
/// `buf` must hold at least SIG_FRAME_CAPACITY bytes.
/// A zero-length payload writes headers only.
pub fn encode_sig(
    buf: &mut [u8],
    dst: MacAddr,
    src: MacAddr,
    channel_id: u16,
    seq: u32,
    opcode: u16,
    payload: &[u8],
) -> Result<usize, WireError> {
    if payload.len() > SIG_MAX_PAYLOAD {
        return Err(WireError::FrameTooLarge);
    }
    let frame_len = SIG_MIN_FRAME + payload.len();
    debug_assert!(buf.len() >= frame_len);

    let eth = EthernetHeader { dst, src, ether_type: ETH_TYPE_SIG.to_be() };
    buf[..ETH_HDR_SIZE].copy_from_slice(bytemuck::bytes_of(&eth));

    let hdr = SigHeader {
        version: WIRE_VERSION.to_be(),
        channel_id: channel_id.to_be(),
        seq: seq.to_be(),
        opcode: opcode.to_be(),
        payload_len: (payload.len() as u16).to_be(),
    };
    buf[ETH_HDR_SIZE..SIG_MIN_FRAME].copy_from_slice(bytemuck::bytes_of(&hdr));

    if !payload.is_empty() {
        buf[SIG_MIN_FRAME..frame_len].copy_from_slice(payload);
    }
    Ok(frame_len)
}

/// Encode a URP frame into `buf`. Returns the frame length.
pub fn encode_urp(
    buf: &mut [u8],
    dst: MacAddr,
    src: MacAddr,
    seq: u32,
    payload: &[u8],
) -> Result<usize, WireError> {
    if payload.len() > URP_MAX_PAYLOAD {
        return Err(WireError::FrameTooLarge);
    }
    let frame_len = URP_MIN_FRAME + payload.len();
    debug_assert!(buf.len() >= frame_len);

    let eth = EthernetHeader { dst, src, ether_type: ETH_TYPE_URP.to_be() };
    buf[..ETH_HDR_SIZE].copy_from_slice(bytemuck::bytes_of(&eth));

    let hdr = UrpHeader {
        seq: seq.to_be(),
        version: WIRE_VERSION.to_be(),
        opcode: URP_OPCODE_DATA.to_be(),
        payload_len: (payload.len() as u16).to_be(),
    };
    buf[ETH_HDR_SIZE..URP_MIN_FRAME].copy_from_slice(bytemuck::bytes_of(&hdr));

    if !payload.is_empty() {
        buf[URP_MIN_FRAME..frame_len].copy_from_slice(payload);
    }
    Ok(frame_len)
}

/// Decode a SIG frame. Validates length, ethertype and version before
/// reading further fields, then bounds-checks payload_len against both the
/// protocol ceiling and the frame's actual bytes.
pub fn decode_sig(frame: &[u8]) -> Result<SigView<'_>, WireError> {
    if frame.len() < SIG_MIN_FRAME {
        return Err(WireError::MalformedFrame);
    }
    let eth: EthernetHeader = bytemuck::pod_read_unaligned(&frame[..ETH_HDR_SIZE]);
    if u16::from_be(eth.ether_type) != ETH_TYPE_SIG {
        return Err(WireError::MalformedFrame);
    }
    let hdr: SigHeader = bytemuck::pod_read_unaligned(&frame[ETH_HDR_SIZE..SIG_MIN_FRAME]);
    if u16::from_be(hdr.version) != WIRE_VERSION {
        return Err(WireError::MalformedFrame);
    }
    let payload_len = u16::from_be(hdr.payload_len) as usize;
    if payload_len > SIG_MAX_PAYLOAD || SIG_MIN_FRAME + payload_len > frame.len() {
        return Err(WireError::MalformedFrame);
    }
    Ok(SigView {
        src_mac: eth.src,
        channel_id: u16::from_be(hdr.channel_id),
        seq: u32::from_be(hdr.seq),
        opcode: u16::from_be(hdr.opcode),
        payload: &frame[SIG_MIN_FRAME..SIG_MIN_FRAME + payload_len],
    })
}

/// Decode a URP frame. Same validation order as the SIG decoder.
pub fn decode_urp(frame: &[u8]) -> Result<UrpView<'_>, WireError> {
    if frame.len() < URP_MIN_FRAME {
        return Err(WireError::MalformedFrame);
    }
    let eth: EthernetHeader = bytemuck::pod_read_unaligned(&frame[..ETH_HDR_SIZE]);
    if u16::from_be(eth.ether_type) != ETH_TYPE_URP {
        return Err(WireError::MalformedFrame);
    }
    let hdr: UrpHeader = bytemuck::pod_read_unaligned(&frame[ETH_HDR_SIZE..URP_MIN_FRAME]);
    if u16::from_be(hdr.version) != WIRE_VERSION {
        return Err(WireError::MalformedFrame);
    }
    let payload_len = u16::from_be(hdr.payload_len) as usize;
    if payload_len > URP_MAX_PAYLOAD || URP_MIN_FRAME + payload_len > frame.len() {
        return Err(WireError::MalformedFrame);
    }
    Ok(UrpView {
        src_mac: eth.src,
        seq: u32::from_be(hdr.seq),
        opcode: u16::from_be(hdr.opcode),
        payload: &frame[URP_MIN_FRAME..URP_MIN_FRAME + payload_len],
    })
}
