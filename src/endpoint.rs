// RAWLINK — ENDPOINT FACADE
// Where the pieces meet: a NIC port, a frame pool, the two application
// rings and an engine, wrapped behind progress()/run()/spawn(). The
// application keeps the producer half of the outbound ring and the consumer
// half of the inbound ring; the engine owns the other two halves.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{info, warn};

use crate::engine::clock::{self, CycleClock};
use crate::engine::sig::{SigEngine, SigStats};
use crate::engine::urp::{UrpEngine, UrpStats};
use crate::engine::pin_to_core;
use crate::error::Error;
use crate::nic::{MacAddr, NicPort};
use crate::pool::FramePool;
use crate::protocol::payload::{Datagram, SigRecv, SigSend};
use crate::protocol::wire::{self, fmt_mac, MAC_BROADCAST};
use crate::ring::{self, Consumer, Producer};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Clone, Debug)]
pub struct EndpointConfig {
    /// Port index; identification only, the port itself is injected.
    pub port_id: u16,
    /// Destination while no peer has been learned. Broadcast works for
    /// discovery; the first valid inbound frame replaces it.
    pub default_peer_mac: MacAddr,
    /// Capacity of each application ring. Power of two.
    pub ring_size: u32,
    /// SIG retransmit timeout. Zero means cycles_per_second / 10 at init.
    pub retransmit_timeout_cycles: u64,
    pub tx_burst_size: u32,
    pub rx_burst_size: u32,
    /// Frame buffers in the pool.
    pub pool_frames: u32,
    /// URP only: target frame size on the wire for throughput experiments.
    pub unit_size: usize,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        EndpointConfig {
            port_id: 0,
            default_peer_mac: MAC_BROADCAST,
            ring_size: 4096,
            retransmit_timeout_cycles: 0,
            tx_burst_size: 128,
            rx_burst_size: 128,
            pool_frames: 8192,
            unit_size: 64,
        }
    }
}

impl EndpointConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.ring_size == 0 || !self.ring_size.is_power_of_two() {
            return Err(Error::Init {
                stage: "ring",
                reason: format!("ring_size {} is not a nonzero power of two", self.ring_size),
            });
        }
        if self.tx_burst_size == 0 || self.rx_burst_size == 0 {
            return Err(Error::Init {
                stage: "config",
                reason: "burst sizes must be nonzero".into(),
            });
        }
        if self.pool_frames == 0 {
            return Err(Error::Init { stage: "pool", reason: "pool_frames must be nonzero".into() });
        }
        if self.unit_size < wire::URP_MIN_FRAME || self.unit_size > wire::URP_FRAME_CAPACITY {
            return Err(Error::Init {
                stage: "config",
                reason: format!(
                    "unit_size {} outside [{}, {}]",
                    self.unit_size, wire::URP_MIN_FRAME, wire::URP_FRAME_CAPACITY
                ),
            });
        }
        Ok(())
    }
}

// ============================================================================
// ENGINE LIFECYCLE
// ============================================================================

/// Best-effort shutdown: the engine polls the flag between ticks and
/// abandons in-flight frames when it stops.
#[derive(Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A spawned engine worker. Join returns the endpoint for post-run
/// inspection of its counters.
pub struct EngineHandle<E> {
    stop: StopHandle,
    join: JoinHandle<E>,
}

impl<E> EngineHandle<E> {
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn join(self) -> E {
        self.stop.stop();
        match self.join.join() {
            Ok(endpoint) => endpoint,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

fn spawn_worker<E, F>(name: &str, core: Option<usize>, body: F) -> std::io::Result<JoinHandle<E>>
where
    E: Send + 'static,
    F: FnOnce() -> E + Send + 'static,
{
    std::thread::Builder::new().name(name.to_string()).spawn(move || {
        if let Some(core_id) = core {
            match pin_to_core(core_id) {
                Ok(()) => info!(core_id, "engine worker pinned"),
                Err(e) => warn!(core_id, error = %e, "pinning failed, running unpinned"),
            }
        }
        body()
    })
}

// ============================================================================
// SIG ENDPOINT
// ============================================================================

/// Application-side ring handles. The producer half feeds the engine; the
/// consumer half drains deliveries. Both are single-owner.
pub struct SigHandles {
    pub outbound: Producer<Box<SigSend>>,
    pub inbound: Consumer<Box<SigRecv>>,
}

pub struct SigEndpoint<P: NicPort> {
    engine: SigEngine<P>,
    running: Arc<AtomicBool>,
}

impl<P: NicPort + 'static> SigEndpoint<P> {
    pub fn new(port: P, clock: CycleClock, cfg: &EndpointConfig) -> Result<(Self, SigHandles), Error> {
        cfg.validate()?;
        let ring_size = cfg.ring_size as usize;
        let (out_prod, out_cons) = ring::ring(ring_size)
            .map_err(|e| Error::Init { stage: "ring", reason: e.to_string() })?;
        let (in_prod, in_cons) = ring::ring(ring_size)
            .map_err(|e| Error::Init { stage: "ring", reason: e.to_string() })?;

        let pool = FramePool::new(wire::SIG_FRAME_CAPACITY, cfg.pool_frames as usize);
        let timeout_cycles = if cfg.retransmit_timeout_cycles == 0 {
            clock.hz() / 10
        } else {
            cfg.retransmit_timeout_cycles
        };

        info!(
            port_id = cfg.port_id,
            mac = %fmt_mac(port.mac()),
            ring_size,
            timeout_cycles,
            "sig endpoint up"
        );

        let engine = SigEngine::new(
            port,
            pool,
            cfg.default_peer_mac,
            out_cons,
            in_prod,
            clock,
            timeout_cycles,
            cfg.tx_burst_size as usize,
            cfg.rx_burst_size as usize,
        );
        let endpoint = SigEndpoint { engine, running: Arc::new(AtomicBool::new(true)) };
        Ok((endpoint, SigHandles { outbound: out_prod, inbound: in_cons }))
    }

    /// One RX+TX pass, for host-driven loops. Returns true if any frame
    /// moved.
    pub fn progress(&mut self) -> bool {
        self.engine.progress()
    }

    pub fn stats(&self) -> &SigStats {
        self.engine.stats()
    }

    pub fn in_flight(&self) -> usize {
        self.engine.in_flight()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.running.clone())
    }

    /// Busy loop until stopped. Idle ticks insert a spin hint and stay
    /// on-CPU.
    pub fn run(mut self) -> Self {
        info!("sig engine running");
        while self.running.load(Ordering::Acquire) {
            if !self.engine.progress() {
                clock::pause();
            }
        }
        info!("sig engine stopped");
        self
    }

    /// Launch the engine on its own worker, optionally pinned.
    pub fn spawn(self, core: Option<usize>) -> std::io::Result<EngineHandle<Self>> {
        let stop = self.stop_handle();
        let join = spawn_worker("rawlink-sig", core, move || self.run())?;
        Ok(EngineHandle { stop, join })
    }
}

// ============================================================================
// URP ENDPOINT
// ============================================================================

pub struct UrpHandles {
    pub outbound: Producer<Box<Datagram>>,
    pub inbound: Consumer<Box<Datagram>>,
}

pub struct UrpEndpoint<P: NicPort> {
    engine: UrpEngine<P>,
    running: Arc<AtomicBool>,
}

impl<P: NicPort + 'static> UrpEndpoint<P> {
    pub fn new(port: P, cfg: &EndpointConfig) -> Result<(Self, UrpHandles), Error> {
        cfg.validate()?;
        let ring_size = cfg.ring_size as usize;
        let (out_prod, out_cons) = ring::ring(ring_size)
            .map_err(|e| Error::Init { stage: "ring", reason: e.to_string() })?;
        let (in_prod, in_cons) = ring::ring(ring_size)
            .map_err(|e| Error::Init { stage: "ring", reason: e.to_string() })?;

        let pool = FramePool::new(wire::URP_FRAME_CAPACITY, cfg.pool_frames as usize);

        info!(
            port_id = cfg.port_id,
            mac = %fmt_mac(port.mac()),
            ring_size,
            "urp endpoint up"
        );

        let engine = UrpEngine::new(
            port,
            pool,
            cfg.default_peer_mac,
            out_cons,
            in_prod,
            cfg.tx_burst_size as usize,
            cfg.rx_burst_size as usize,
        );
        let endpoint = UrpEndpoint { engine, running: Arc::new(AtomicBool::new(true)) };
        Ok((endpoint, UrpHandles { outbound: out_prod, inbound: in_cons }))
    }

    pub fn progress(&mut self) -> bool {
        self.engine.progress()
    }

    pub fn stats(&self) -> &UrpStats {
        self.engine.stats()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.running.clone())
    }

    pub fn run(mut self) -> Self {
        info!("urp engine running");
        while self.running.load(Ordering::Acquire) {
            if !self.engine.progress() {
                clock::pause();
            }
        }
        info!("urp engine stopped");
        self
    }

    pub fn spawn(self, core: Option<usize>) -> std::io::Result<EngineHandle<Self>> {
        let stop = self.stop_handle();
        let join = spawn_worker("rawlink-urp", core, move || self.run())?;
        Ok(EngineHandle { stop, join })
    }
}
