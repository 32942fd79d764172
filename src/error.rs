// RAWLINK — ERROR TAXONOMY
// Initialization errors surface synchronously and are fatal for the endpoint.
// Steady-state faults (malformed frames, NIC backpressure, pool exhaustion,
// ring full/empty) are absorbed inside the engines and show up only as delay
// and counter increments; the engine never aborts on a per-frame fault.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Pool, port, or ring could not be created. The endpoint cannot start.
    #[error("initialization failed at {stage}: {reason}")]
    Init { stage: &'static str, reason: String },

    /// Submitted payload exceeds the protocol maximum. Returned to the caller
    /// at submission time; never raised once a payload is queued.
    #[error("payload exceeds protocol maximum")]
    FrameTooLarge,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
