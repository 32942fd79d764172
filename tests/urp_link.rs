// End-to-end URP scenarios over an in-memory link with a seeded loss
// model. Best-effort semantics: whatever survives the wire and fits the
// inbound ring is delivered, nothing is retransmitted, no control traffic
// exists.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rawlink::nic::pipe::PipePort;
use rawlink::{Datagram, EndpointConfig, UrpEndpoint, UrpHandles};

fn endpoint(port: PipePort) -> (UrpEndpoint<PipePort>, UrpHandles) {
    let cfg = EndpointConfig {
        ring_size: 4096,
        pool_frames: 1024,
        ..Default::default()
    };
    UrpEndpoint::new(port, &cfg).unwrap()
}

#[test]
fn lossy_link_delivers_the_survivors() {
    const TOTAL: u64 = 10_000;

    let (mut pa, pb) = PipePort::pair(8192);
    let mut rng = StdRng::seed_from_u64(13);
    pa.set_drop_fn(move |_| rng.gen_range(0..100u32) == 0); // 1% loss

    let (mut a, mut ah) = endpoint(pa);
    let (mut b, mut bh) = endpoint(pb);

    let mut delivered = 0u64;
    let mut submitted = 0u64;
    while submitted < TOTAL {
        let mut dg = Box::new(Datagram::new(&[submitted as u8; 64]).unwrap());
        loop {
            match ah.outbound.enqueue(dg) {
                Ok(()) => break,
                Err(back) => {
                    dg = back;
                    a.progress();
                    b.progress();
                    while bh.inbound.dequeue().is_some() {
                        delivered += 1;
                    }
                }
            }
        }
        submitted += 1;
    }
    // Drain the tail: run both engines until neither moves a frame.
    loop {
        let moved_a = a.progress();
        let moved_b = b.progress();
        while bh.inbound.dequeue().is_some() {
            delivered += 1;
        }
        if !moved_a && !moved_b {
            break;
        }
    }

    assert_eq!(a.stats().tx_datagrams, TOTAL);
    assert!(delivered <= TOTAL);
    assert!(delivered >= 9_700, "only {delivered} of {TOTAL} delivered");
    assert_eq!(b.stats().rx_delivered, delivered);

    // No retransmissions, no ACK traffic: the sender hears nothing back
    // and the receiver sees only DATA.
    assert_eq!(a.stats().rx_frames, 0);
    assert_eq!(b.stats().rx_non_data, 0);
    assert_eq!(b.stats().rx_malformed, 0);
}

#[test]
fn payload_bytes_are_copied_exactly() {
    let (pa, pb) = PipePort::pair(64);
    let (mut a, mut ah) = endpoint(pa);
    let (mut b, mut bh) = endpoint(pb);

    let pattern: Vec<u8> = (0..=255u8).cycle().take(777).collect();
    ah.outbound.enqueue(Box::new(Datagram::new(&pattern).unwrap())).ok().unwrap();
    a.progress();
    b.progress();

    let msg = bh.inbound.dequeue().unwrap();
    assert_eq!(msg.payload(), &pattern[..]);
}

#[test]
fn zero_length_datagram_survives_the_trip() {
    let (pa, pb) = PipePort::pair(64);
    let (mut a, mut ah) = endpoint(pa);
    let (mut b, mut bh) = endpoint(pb);

    ah.outbound.enqueue(Box::new(Datagram::new(&[]).unwrap())).ok().unwrap();
    a.progress();
    b.progress();

    let msg = bh.inbound.dequeue().unwrap();
    assert!(msg.payload().is_empty());
    assert!(bh.inbound.dequeue().is_none());
}
