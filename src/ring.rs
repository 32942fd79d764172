// RAWLINK — BOUNDED SPSC RING
// Fixed power-of-two capacity, one producer and one consumer on distinct
// threads, no locks, no allocation after construction. The producer owns
// `head`, the consumer owns `tail`; each side publishes its index with a
// release store and observes the other side with an acquire load, so a slot
// write always happens-before the matching read.
//
// Indices are free-running usize counters masked on slot access; occupancy
// is head - tail with wrapping arithmetic. The two indices live on separate
// cache lines.
//
// Operation families mirror the classic SP/SC queue split:
//   enqueue / dequeue          single item, fail on full/empty
//   enqueue_bulk / dequeue_bulk  all-or-nothing
//   enqueue_burst / dequeue_burst  partial success

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Ring construction rejects capacities that are zero or not a power of two.
#[derive(Debug, PartialEq, Eq)]
pub struct InvalidCapacity(pub usize);

impl fmt::Display for InvalidCapacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ring capacity {} is not a nonzero power of two", self.0)
    }
}

impl std::error::Error for InvalidCapacity {}

#[repr(align(64))]
struct PaddedIndex(AtomicUsize);

struct RingInner<T> {
    mask: usize,
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    /// Next write position. Stored by the producer, acquired by the consumer.
    head: PaddedIndex,
    /// Next read position. Stored by the consumer, acquired by the producer.
    tail: PaddedIndex,
}

unsafe impl<T: Send> Send for RingInner<T> {}
unsafe impl<T: Send> Sync for RingInner<T> {}

impl<T> Drop for RingInner<T> {
    fn drop(&mut self) {
        // Exclusive access at this point; plain loads are fine.
        let head = self.head.0.load(Ordering::Relaxed);
        let mut tail = self.tail.0.load(Ordering::Relaxed);
        while tail != head {
            unsafe { (*self.slots[tail & self.mask].get()).assume_init_drop() };
            tail = tail.wrapping_add(1);
        }
    }
}

/// Producer half. Not cloneable; single-producer is enforced by ownership.
pub struct Producer<T> {
    inner: Arc<RingInner<T>>,
}

/// Consumer half. Not cloneable; single-consumer is enforced by ownership.
pub struct Consumer<T> {
    inner: Arc<RingInner<T>>,
}

/// Create a ring of `capacity` slots and split it into its two halves.
pub fn ring<T: Send>(capacity: usize) -> Result<(Producer<T>, Consumer<T>), InvalidCapacity> {
    if capacity == 0 || !capacity.is_power_of_two() {
        return Err(InvalidCapacity(capacity));
    }
    let slots: Box<[UnsafeCell<MaybeUninit<T>>]> = (0..capacity)
        .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
        .collect();
    let inner = Arc::new(RingInner {
        mask: capacity - 1,
        slots,
        head: PaddedIndex(AtomicUsize::new(0)),
        tail: PaddedIndex(AtomicUsize::new(0)),
    });
    Ok((Producer { inner: inner.clone() }, Consumer { inner }))
}

impl<T: Send> Producer<T> {
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.inner.mask + 1
    }

    /// Slots currently free from the producer's point of view.
    #[inline]
    pub fn free_space(&self) -> usize {
        let head = self.inner.head.0.load(Ordering::Relaxed);
        let tail = self.inner.tail.0.load(Ordering::Acquire);
        self.capacity() - head.wrapping_sub(tail)
    }

    /// Enqueue one item. On a full ring the item is handed back unchanged
    /// and the caller decides whether to retry; this never blocks.
    #[inline]
    pub fn enqueue(&mut self, item: T) -> Result<(), T> {
        let head = self.inner.head.0.load(Ordering::Relaxed);
        let tail = self.inner.tail.0.load(Ordering::Acquire);
        if head.wrapping_sub(tail) == self.capacity() {
            return Err(item);
        }
        unsafe { (*self.inner.slots[head & self.inner.mask].get()).write(item) };
        self.inner.head.0.store(head.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// All-or-nothing: either every item in `items` is enqueued (and the vec
    /// drained) or none is and `items` is untouched.
    pub fn enqueue_bulk(&mut self, items: &mut Vec<T>) -> bool {
        let n = items.len();
        if n == 0 {
            return true;
        }
        if self.free_space() < n {
            return false;
        }
        let head = self.inner.head.0.load(Ordering::Relaxed);
        for (i, item) in items.drain(..).enumerate() {
            unsafe {
                (*self.inner.slots[head.wrapping_add(i) & self.inner.mask].get()).write(item)
            };
        }
        self.inner.head.0.store(head.wrapping_add(n), Ordering::Release);
        true
    }

    /// Enqueue as many leading items as fit; they are drained from `items`.
    /// Returns the accepted count.
    pub fn enqueue_burst(&mut self, items: &mut Vec<T>) -> usize {
        let n = self.free_space().min(items.len());
        if n == 0 {
            return 0;
        }
        let head = self.inner.head.0.load(Ordering::Relaxed);
        for (i, item) in items.drain(..n).enumerate() {
            unsafe {
                (*self.inner.slots[head.wrapping_add(i) & self.inner.mask].get()).write(item)
            };
        }
        self.inner.head.0.store(head.wrapping_add(n), Ordering::Release);
        n
    }
}

impl<T: Send> Consumer<T> {
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.inner.mask + 1
    }

    /// Items currently queued from the consumer's point of view.
    #[inline]
    pub fn len(&self) -> usize {
        let tail = self.inner.tail.0.load(Ordering::Relaxed);
        let head = self.inner.head.0.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dequeue one item, or None on an empty ring. Never blocks.
    #[inline]
    pub fn dequeue(&mut self) -> Option<T> {
        let tail = self.inner.tail.0.load(Ordering::Relaxed);
        let head = self.inner.head.0.load(Ordering::Acquire);
        if tail == head {
            return None;
        }
        let item = unsafe { (*self.inner.slots[tail & self.inner.mask].get()).assume_init_read() };
        self.inner.tail.0.store(tail.wrapping_add(1), Ordering::Release);
        Some(item)
    }

    /// All-or-nothing: exactly `n` items are appended to `out`, or none when
    /// fewer than `n` are queued.
    pub fn dequeue_bulk(&mut self, n: usize, out: &mut Vec<T>) -> bool {
        if n == 0 {
            return true;
        }
        if self.len() < n {
            return false;
        }
        self.take(n, out);
        true
    }

    /// Dequeue up to `max` items, appending them to `out`. Returns the count.
    pub fn dequeue_burst(&mut self, max: usize, out: &mut Vec<T>) -> usize {
        let n = self.len().min(max);
        if n > 0 {
            self.take(n, out);
        }
        n
    }

    fn take(&mut self, n: usize, out: &mut Vec<T>) {
        let tail = self.inner.tail.0.load(Ordering::Relaxed);
        out.reserve(n);
        for i in 0..n {
            let item = unsafe {
                (*self.inner.slots[tail.wrapping_add(i) & self.inner.mask].get()).assume_init_read()
            };
            out.push(item);
        }
        self.inner.tail.0.store(tail.wrapping_add(n), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_capacity() {
        assert!(ring::<u32>(0).is_err());
        assert!(ring::<u32>(3).is_err());
        assert!(ring::<u32>(4096).is_ok());
    }

    #[test]
    fn single_enqueue_dequeue() {
        let (mut p, mut c) = ring::<u32>(4).unwrap();
        assert!(c.dequeue().is_none());
        p.enqueue(7).unwrap();
        assert_eq!(c.dequeue(), Some(7));
        assert!(c.dequeue().is_none());
    }

    #[test]
    fn full_ring_returns_item() {
        let (mut p, _c) = ring::<u32>(2).unwrap();
        p.enqueue(1).unwrap();
        p.enqueue(2).unwrap();
        assert_eq!(p.enqueue(3), Err(3));
        assert_eq!(p.free_space(), 0);
    }

    #[test]
    fn bulk_is_all_or_nothing() {
        let (mut p, mut c) = ring::<u32>(4).unwrap();
        let mut items = vec![1, 2, 3];
        assert!(p.enqueue_bulk(&mut items));
        assert!(items.is_empty());

        let mut more = vec![4, 5];
        assert!(!p.enqueue_bulk(&mut more));
        assert_eq!(more, vec![4, 5]);

        let mut out = Vec::new();
        assert!(!c.dequeue_bulk(4, &mut out));
        assert!(out.is_empty());
        assert!(c.dequeue_bulk(3, &mut out));
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[test]
    fn burst_is_partial() {
        let (mut p, mut c) = ring::<u32>(4).unwrap();
        let mut items = vec![1, 2, 3, 4, 5, 6];
        assert_eq!(p.enqueue_burst(&mut items), 4);
        assert_eq!(items, vec![5, 6]);

        let mut out = Vec::new();
        assert_eq!(c.dequeue_burst(8, &mut out), 4);
        assert_eq!(out, vec![1, 2, 3, 4]);
    }

    #[test]
    fn wraparound_preserves_order() {
        let (mut p, mut c) = ring::<u32>(4).unwrap();
        for round in 0..100u32 {
            p.enqueue(round * 2).unwrap();
            p.enqueue(round * 2 + 1).unwrap();
            assert_eq!(c.dequeue(), Some(round * 2));
            assert_eq!(c.dequeue(), Some(round * 2 + 1));
        }
    }

    #[test]
    fn queued_items_dropped_with_ring() {
        use std::sync::atomic::AtomicUsize;

        static DROPS: AtomicUsize = AtomicUsize::new(0);
        struct Tracked;
        impl Drop for Tracked {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::Relaxed);
            }
        }

        let (mut p, c) = ring::<Tracked>(8).unwrap();
        for _ in 0..5 {
            assert!(p.enqueue(Tracked).is_ok());
        }
        drop(p);
        drop(c);
        assert_eq!(DROPS.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn spsc_across_threads() {
        const N: u64 = 100_000;
        let (mut p, mut c) = ring::<u64>(1024).unwrap();

        let producer = std::thread::spawn(move || {
            for i in 0..N {
                let mut item = i;
                loop {
                    match p.enqueue(item) {
                        Ok(()) => break,
                        Err(back) => {
                            item = back;
                            std::hint::spin_loop();
                        }
                    }
                }
            }
        });

        let mut expected = 0u64;
        while expected < N {
            if let Some(v) = c.dequeue() {
                assert_eq!(v, expected);
                expected += 1;
            } else {
                std::hint::spin_loop();
            }
        }
        producer.join().unwrap();
    }
}
