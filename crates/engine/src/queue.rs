use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use frame_io::SharedFrame;

/// What a full queue does to its producer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// `push` suspends the caller until space frees up. Nothing is lost.
    Blocking,
    /// `push` never suspends: a full queue evicts its oldest element
    /// (counted as a drop) and always accepts the new one.
    Leaky,
}

struct Inner {
    items: VecDeque<SharedFrame>,
    draining: bool,
    dropped: u64,
}

/// Named bounded FIFO of frame handles.
///
/// The invariant `len() <= capacity` holds at every observation point.
/// `flush()` is the single shutdown primitive: it sets the draining flag,
/// discards queued frames and wakes every suspended caller; after that,
/// `pop` yields the `None` end-of-stream sentinel and `push` discards.
/// Queue operations cannot fail in any other way.
pub struct FrameQueue {
    name: String,
    capacity: usize,
    policy: OverflowPolicy,
    inner: Mutex<Inner>,
    readable: Condvar,
    writable: Condvar,
}

impl FrameQueue {
    pub fn new(name: impl Into<String>, capacity: usize, policy: OverflowPolicy) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            capacity: capacity.max(1),
            policy,
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                draining: false,
                dropped: 0,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames evicted by the leaky policy since construction (or the last
    /// `reset`).
    pub fn dropped(&self) -> u64 {
        self.inner.lock().unwrap().dropped
    }

    /// Enqueue one frame. Under `Blocking` this suspends while the queue is
    /// full; under `Leaky` it evicts the oldest element instead. A draining
    /// queue silently discards the frame.
    pub fn push(&self, frame: SharedFrame) {
        let mut inner = self.inner.lock().unwrap();
        match self.policy {
            OverflowPolicy::Blocking => {
                while inner.items.len() >= self.capacity && !inner.draining {
                    inner = self.writable.wait(inner).unwrap();
                }
                if inner.draining {
                    return;
                }
                inner.items.push_back(frame);
            }
            OverflowPolicy::Leaky => {
                if inner.draining {
                    return;
                }
                if inner.items.len() >= self.capacity {
                    inner.items.pop_front();
                    inner.dropped += 1;
                }
                inner.items.push_back(frame);
            }
        }
        drop(inner);
        self.readable.notify_one();
    }

    /// Dequeue the front frame, suspending while the queue is empty.
    /// Returns `None` only when woken by draining with nothing queued:
    /// the end-of-stream sentinel.
    pub fn pop(&self) -> Option<SharedFrame> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(frame) = inner.items.pop_front() {
                drop(inner);
                self.writable.notify_one();
                return Some(frame);
            }
            if inner.draining {
                return None;
            }
            inner = self.readable.wait(inner).unwrap();
        }
    }

    /// Cooperative shutdown: set draining, discard queued frames, wake every
    /// suspended push and pop. Idempotent.
    pub fn flush(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.draining = true;
            inner.items.clear();
        }
        self.readable.notify_all();
        self.writable.notify_all();
    }

    pub fn is_draining(&self) -> bool {
        self.inner.lock().unwrap().draining
    }

    /// Re-arm a drained queue for another run. Called by `Stage::start`.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.draining = false;
        inner.items.clear();
        inner.dropped = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frame_io::{AllocError, FrameBuffer, HwAllocator, HwSurface};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::thread;
    use std::time::Duration;

    struct Bump(AtomicU64);

    impl HwAllocator for Bump {
        fn allocate(&self) -> Result<u64, AllocError> {
            Ok(self.0.fetch_add(1, Ordering::SeqCst))
        }
        fn retain(&self, _id: u64) {}
        fn release(&self, _id: u64) {}
    }

    fn frame(alloc: &Arc<dyn HwAllocator>) -> SharedFrame {
        FrameBuffer::new(HwSurface::acquire(alloc).unwrap()).into_shared()
    }

    fn alloc() -> Arc<dyn HwAllocator> {
        Arc::new(Bump(AtomicU64::new(0)))
    }

    #[test]
    fn capacity_invariant_holds_under_leaky_pressure() {
        let alloc = alloc();
        let q = FrameQueue::new("q", 3, OverflowPolicy::Leaky);
        for _ in 0..10 {
            q.push(frame(&alloc));
            assert!(q.len() <= 3);
        }
    }

    #[test]
    fn leaky_keeps_the_last_c_items_and_counts_drops() {
        let alloc = alloc();
        let q = FrameQueue::new("q", 3, OverflowPolicy::Leaky);
        let mut ids = Vec::new();
        for _ in 0..5 {
            let f = frame(&alloc);
            ids.push(f.lock().unwrap().surface().id());
            q.push(f);
        }
        assert_eq!(q.dropped(), 2);
        let mut survivors = Vec::new();
        while let Some(f) = {
            let popped = if q.is_empty() { None } else { q.pop() };
            popped
        } {
            survivors.push(f.lock().unwrap().surface().id());
        }
        assert_eq!(survivors, ids[2..].to_vec());
    }

    #[test]
    fn blocking_queue_loses_nothing_and_preserves_fifo() {
        let alloc = alloc();
        let q = FrameQueue::new("q", 2, OverflowPolicy::Blocking);
        let producer_q = Arc::clone(&q);
        let frames: Vec<SharedFrame> = (0..20).map(|_| frame(&alloc)).collect();
        let expected: Vec<u64> = frames
            .iter()
            .map(|f| f.lock().unwrap().surface().id())
            .collect();

        let producer = thread::spawn(move || {
            for f in frames {
                producer_q.push(f);
            }
        });

        let mut seen = Vec::new();
        for _ in 0..20 {
            seen.push(q.pop().unwrap().lock().unwrap().surface().id());
        }
        producer.join().unwrap();
        assert_eq!(seen, expected);
    }

    #[test]
    fn blocking_push_suspends_until_space() {
        let alloc = alloc();
        let q = FrameQueue::new("q", 1, OverflowPolicy::Blocking);
        q.push(frame(&alloc));

        let q2 = Arc::clone(&q);
        let f = frame(&alloc);
        let pusher = thread::spawn(move || {
            q2.push(f);
        });

        thread::sleep(Duration::from_millis(30));
        assert!(!pusher.is_finished(), "push returned while queue was full");
        q.pop().unwrap();
        pusher.join().unwrap();
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn flush_wakes_a_blocked_pop_with_the_sentinel() {
        let q = FrameQueue::new("q", 2, OverflowPolicy::Blocking);
        let q2 = Arc::clone(&q);
        let popper = thread::spawn(move || q2.pop());
        thread::sleep(Duration::from_millis(20));
        q.flush();
        assert!(popper.join().unwrap().is_none());
    }

    #[test]
    fn flush_is_idempotent_and_discards_queued_frames() {
        let alloc = alloc();
        let q = FrameQueue::new("q", 4, OverflowPolicy::Blocking);
        q.push(frame(&alloc));
        q.push(frame(&alloc));
        q.flush();
        q.flush();
        assert_eq!(q.len(), 0);
        assert!(q.pop().is_none());
    }

    #[test]
    fn reset_rearms_after_flush() {
        let alloc = alloc();
        let q = FrameQueue::new("q", 2, OverflowPolicy::Blocking);
        q.flush();
        q.reset();
        q.push(frame(&alloc));
        assert!(q.pop().is_some());
    }
}
