// RAWLINK — NIC PORT SEAM
// The engine never touches a device directly; it drives this trait.
// Burst semantics follow the poll-mode-driver model: RX fills pool-backed
// buffers, TX accepts a prefix of the submitted frames and the caller
// handles the rest. Nothing here blocks.

pub mod af_packet;
pub mod pipe;

use crate::pool::{FrameBuf, FramePool};

pub use crate::protocol::wire::MacAddr;

pub trait NicPort: Send {
    /// Hardware address of the port; used as the source MAC of every frame
    /// this endpoint builds.
    fn mac(&self) -> MacAddr;

    /// Receive up to `max` frames into buffers allocated from `pool`,
    /// appending them to `out`. Returns the number received. Pool
    /// exhaustion ends the burst early.
    fn rx_burst(&mut self, pool: &mut FramePool, out: &mut Vec<FrameBuf>, max: usize) -> usize;

    /// Submit frames front-first. Accepted frames are consumed and their
    /// buffers recycled into `pool`; unaccepted frames remain in `frames`.
    /// Returns the accepted count. Zero means the TX queue is full.
    fn tx_burst(&mut self, pool: &mut FramePool, frames: &mut Vec<FrameBuf>) -> usize;

    /// Submit a single frame. None means accepted; on backpressure the
    /// frame comes back to the caller.
    fn tx_one(&mut self, pool: &mut FramePool, frame: FrameBuf) -> Option<FrameBuf>;
}
