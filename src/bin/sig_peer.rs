// RAWLINK — SIG DEMO PEER
// Reliable channelized messaging over a raw interface. The engine runs on
// its own worker; a consumer thread drains deliveries; the main thread
// submits messages on two channels. Run one peer on each end of a link
// (veth pair or real NICs) and they discover each other via broadcast.
//
//   sig_peer -i veth0 --count 100 --core 2

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use rawlink::engine::clock::{self, CycleClock};
use rawlink::nic::af_packet::AfPacketPort;
use rawlink::{EndpointConfig, SigEndpoint, SigSend};

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
    let mut core: Option<usize> = None;
    let mut count: u64 = 0;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-i" | "--iface" => {
                i += 1;
                iface = args.get(i).context("missing interface name")?.clone();
            }
            "--core" => {
                i += 1;
                core = Some(args.get(i).context("missing core id")?.parse()?);
            }
            "--count" => {
                i += 1;
                count = args.get(i).context("missing message count")?.parse()?;
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
        i += 1;
    }

    let clock = CycleClock::calibrate();
    let port = AfPacketPort::open(&iface).with_context(|| format!("opening {iface}"))?;
    let cfg = EndpointConfig::default();
    let (endpoint, handles) = SigEndpoint::new(port, clock, &cfg)?;
    let engine = endpoint.spawn(core)?;

    let mut inbound = handles.inbound;
    let consumer = thread::spawn(move || {
        let mut received = 0u64;
        while RUNNING.load(Ordering::Acquire) {
            match inbound.dequeue() {
                Some(msg) => {
                    received += 1;
                    info!(
                        channel = msg.channel_id,
                        seq = msg.seq,
                        len = msg.payload().len(),
                        text = %String::from_utf8_lossy(msg.payload()),
                        "delivered"
                    );
                }
                None => clock::pause(),
            }
        }
        received
    });

    let mut outbound = handles.outbound;
    for n in 0..count {
        if !RUNNING.load(Ordering::Acquire) {
            break;
        }
        let channel = 1 + (n % 2) as u16;
        let text = format!("msg {n}");
        let mut rec = Box::new(SigSend::data(channel, text.as_bytes())?);
        loop {
            match outbound.enqueue(rec) {
                Ok(()) => break,
                Err(back) => {
                    rec = back;
                    clock::pause();
                }
            }
        }
    }
    info!(count, "submissions queued; waiting (ctrl-c to exit)");

    while RUNNING.load(Ordering::Acquire) {
        thread::sleep(Duration::from_millis(100));
    }

    engine.stop();
    let endpoint = engine.join();
    let received = match consumer.join() {
        Ok(n) => n,
        Err(panic) => std::panic::resume_unwind(panic),
    };

    let stats = endpoint.stats();
    info!(
        received,
        tx_data = stats.tx_data,
        tx_retransmits = stats.tx_retransmits,
        rx_delivered = stats.rx_delivered,
        rx_duplicates = stats.rx_duplicates,
        "peer done"
    );
    Ok(())
}
