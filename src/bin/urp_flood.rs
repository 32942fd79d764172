// RAWLINK — URP THROUGHPUT DEMO
// Best-effort datagram experiment in three roles:
//   flood  submit datagrams of --unit-size wire bytes with an embedded
//          cycle timestamp; report throughput and, when a peer echoes,
//          mean round-trip time
//   echo   bounce every delivered payload back to the sender
//   sink   count deliveries and report throughput
//
//   urp_flood -i veth0 --role flood --count 1000000 --unit-size 128

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use tracing::info;

use rawlink::engine::clock::{self, CycleClock};
use rawlink::nic::af_packet::AfPacketPort;
use rawlink::protocol::wire::URP_MIN_FRAME;
use rawlink::{Datagram, EndpointConfig, UrpEndpoint};

const REPORT_INTERVAL: u64 = 100_000;

static RUNNING: AtomicBool = AtomicBool::new(true);

extern "C" fn on_signal(_sig: libc::c_int) {
    RUNNING.store(false, Ordering::Release);
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    unsafe {
        libc::signal(libc::SIGINT, on_signal as *const () as libc::sighandler_t);
        libc::signal(libc::SIGTERM, on_signal as *const () as libc::sighandler_t);
    }

    let args: Vec<String> = std::env::args().collect();
    let mut iface = "veth0".to_string();
    let mut role = "sink".to_string();
    let mut core: Option<usize> = None;
    let mut count: u64 = 1_000_000;
    let mut unit_size: usize = 64;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-i" | "--iface" => {
                i += 1;
                iface = args.get(i).context("missing interface name")?.clone();
            }
            "--role" => {
                i += 1;
                role = args.get(i).context("missing role")?.clone();
            }
            "--core" => {
                i += 1;
                core = Some(args.get(i).context("missing core id")?.parse()?);
            }
            "--count" => {
                i += 1;
                count = args.get(i).context("missing count")?.parse()?;
            }
            "--unit-size" => {
                i += 1;
                unit_size = args.get(i).context("missing unit size")?.parse()?;
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
        i += 1;
    }

    let clock = CycleClock::calibrate();
    let port = AfPacketPort::open(&iface).with_context(|| format!("opening {iface}"))?;
    let cfg = EndpointConfig { unit_size, ..Default::default() };
    let (endpoint, handles) = UrpEndpoint::new(port, &cfg)?;
    let engine = endpoint.spawn(core)?;

    match role.as_str() {
        "flood" => flood(clock, cfg.unit_size, count, handles),
        "echo" => echo(handles),
        "sink" => sink(clock, handles),
        other => anyhow::bail!("unknown role: {other}"),
    }

    engine.stop();
    let endpoint = engine.join();
    let stats = endpoint.stats();
    info!(
        tx = stats.tx_datagrams,
        rx = stats.rx_delivered,
        ring_drops = stats.rx_ring_drops,
        malformed = stats.rx_malformed,
        "engine counters"
    );
    Ok(())
}

fn flood(clock: CycleClock, unit_size: usize, count: u64, handles: rawlink::UrpHandles) {
    let payload_len = unit_size - URP_MIN_FRAME;
    let mut outbound = handles.outbound;
    let mut inbound = handles.inbound;

    // Echo replies are drained opportunistically for the RTT estimate.
    let mut template = vec![0u8; payload_len];
    let mut submitted = 0u64;
    let mut echoed = 0u64;
    let mut rtt_sum_us = 0.0f64;
    let mut window_start = clock.now();

    while submitted < count && RUNNING.load(Ordering::Acquire) {
        if payload_len >= 8 {
            template[..8].copy_from_slice(&clock.now().to_le_bytes());
        }
        let mut dg = match Datagram::new(&template) {
            Ok(d) => Box::new(d),
            Err(_) => break,
        };
        loop {
            match outbound.enqueue(dg) {
                Ok(()) => break,
                Err(back) => {
                    dg = back;
                    clock::pause();
                }
            }
        }
        submitted += 1;

        while let Some(reply) = inbound.dequeue() {
            echoed += 1;
            let bytes = reply.payload();
            if bytes.len() >= 8 {
                let sent = u64::from_le_bytes([
                    bytes[0], bytes[1], bytes[2], bytes[3],
                    bytes[4], bytes[5], bytes[6], bytes[7],
                ]);
                let cycles = clock.now().wrapping_sub(sent);
                rtt_sum_us += cycles as f64 * 1e6 / clock.hz() as f64;
            }
        }

        if submitted % REPORT_INTERVAL == 0 {
            let now = clock.now();
            let secs = now.wrapping_sub(window_start) as f64 / clock.hz() as f64;
            let mean_rtt = if echoed > 0 { rtt_sum_us / echoed as f64 } else { 0.0 };
            info!(
                submitted,
                throughput = format!("{:.0}/s", REPORT_INTERVAL as f64 / secs),
                echoed,
                mean_rtt_us = format!("{mean_rtt:.2}"),
                "flood window"
            );
            window_start = now;
            echoed = 0;
            rtt_sum_us = 0.0;
        }
    }
    info!(submitted, "flood complete");
}

fn echo(handles: rawlink::UrpHandles) {
    let mut outbound = handles.outbound;
    let mut inbound = handles.inbound;
    while RUNNING.load(Ordering::Acquire) {
        match inbound.dequeue() {
            Some(msg) => {
                let mut back = msg;
                loop {
                    match outbound.enqueue(back) {
                        Ok(()) => break,
                        Err(again) => {
                            back = again;
                            clock::pause();
                        }
                    }
                }
            }
            None => clock::pause(),
        }
    }
}

fn sink(clock: CycleClock, handles: rawlink::UrpHandles) {
    let mut inbound = handles.inbound;
    let mut received = 0u64;
    let mut window_start = clock.now();
    while RUNNING.load(Ordering::Acquire) {
        match inbound.dequeue() {
            Some(_msg) => {
                received += 1;
                if received % REPORT_INTERVAL == 0 {
                    let now = clock.now();
                    let secs = now.wrapping_sub(window_start) as f64 / clock.hz() as f64;
                    info!(
                        received,
                        throughput = format!("{:.0}/s", REPORT_INTERVAL as f64 / secs),
                        "sink window"
                    );
                    window_start = now;
                }
            }
            None => clock::pause(),
        }
    }
    info!(received, "sink done");
}
