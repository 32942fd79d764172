// RAWLINK — CRATE ROOT
// Userspace raw-Ethernet message endpoint. Two protocol variants share one
// engine architecture: SIG (reliable, channelized, stop-and-wait signaling)
// and URP (unreliable best-effort datagrams). A busy-polling engine moves
// fixed-capacity payloads between application SPSC rings and a NIC port's
// burst RX/TX queues.
//
// Module hierarchy:
//   protocol/ — wire format, payload containers
//   ring      — bounded lock-free SPSC ring (app <-> engine queues)
//   pool      — fixed-size frame-buffer pool
//   nic/      — port seam: AF_PACKET raw socket, in-memory pipe
//   engine/   — cycle clock, SIG and URP pollers
//   endpoint  — configuration and the per-port facades

pub mod endpoint;
pub mod engine;
mod error;
pub mod nic;
pub mod pool;
pub mod protocol;
pub mod ring;

pub use endpoint::{EndpointConfig, EngineHandle, SigEndpoint, SigHandles, StopHandle,
    UrpEndpoint, UrpHandles};
pub use error::{Error, Result};
pub use protocol::payload::{Datagram, SigRecv, SigSend};
