//! Sample handoff: lock-free SPSC queue between acquisition and the main loop
//!
//! The acquisition side (a sampling thread standing in for the ADC interrupt) deposits
//! readings into an rtrb ring buffer and raises a readiness flag. The main loop swaps the
//! flag back down and drains everything queued. Neither side ever blocks.
//!
//! Ordering:
//! - Producer pushes the sample, then stores `ready = true` with Release
//! - Consumer swaps `ready` to false with Acquire, then pops
//! A sample pushed after the swap simply raises the flag again for the next pass.

use crate::sampler::SampleSink;
use crate::{RawSample, WindEstimate};
use rtrb::{Consumer, Producer, RingBuffer};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Default queue depth; at a 500 us interval this covers 32 ms of main loop stall.
pub const DEFAULT_CAPACITY: usize = 64;

/// Create a connected producer/consumer pair.
pub fn channel(capacity: usize) -> (HandoffProducer, HandoffConsumer) {
    let (producer, consumer) = RingBuffer::new(capacity.max(1));
    let ready = Arc::new(AtomicBool::new(false));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        HandoffProducer {
            producer,
            ready: ready.clone(),
            dropped: dropped.clone(),
        },
        HandoffConsumer {
            consumer,
            ready,
            dropped,
        },
    )
}

/// Acquisition side. `Send`, owned by exactly one thread.
pub struct HandoffProducer {
    producer: Producer<RawSample>,
    ready: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
}

impl HandoffProducer {
    /// Queue one reading. A full queue drops it and returns false.
    pub fn deposit(&mut self, sample: RawSample) -> bool {
        match self.producer.push(sample) {
            Ok(()) => {
                self.ready.store(true, Ordering::Release);
                true
            }
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn is_abandoned(&self) -> bool {
        self.producer.is_abandoned()
    }
}

impl SampleSink for HandoffProducer {
    fn accept(&mut self, sample: RawSample) -> Option<WindEstimate> {
        self.deposit(sample);
        None
    }
}

/// Outcome of one [`HandoffConsumer::drain_into`] pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Drained {
    /// Samples popped from the queue
    pub samples: usize,
    /// Estimates the sink produced while consuming them
    pub estimates: usize,
    /// Last of those estimates
    pub latest: Option<WindEstimate>,
}

/// Main loop side.
pub struct HandoffConsumer {
    consumer: Consumer<RawSample>,
    ready: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
}

impl HandoffConsumer {
    /// Clear the readiness flag, returning whether it was set.
    pub fn take_ready(&mut self) -> bool {
        self.ready.swap(false, Ordering::Acquire)
    }

    /// Pop everything currently queued into `sink`.
    pub fn drain_into<K: SampleSink + ?Sized>(&mut self, sink: &mut K) -> Drained {
        let mut drained = Drained::default();
        while let Ok(sample) = self.consumer.pop() {
            drained.samples += 1;
            if let Some(estimate) = sink.accept(sample) {
                drained.estimates += 1;
                drained.latest = Some(estimate);
            }
        }
        drained
    }

    /// Samples lost because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_abandoned(&self) -> bool {
        self.consumer.is_abandoned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Channel;

    #[derive(Default)]
    struct Counting(Vec<u16>);

    impl SampleSink for Counting {
        fn accept(&mut self, sample: RawSample) -> Option<WindEstimate> {
            self.0.push(sample.value());
            Some(WindEstimate {
                speed: i32::from(sample.value()),
                direction: 0,
            })
        }
    }

    fn sample(value: u16) -> RawSample {
        RawSample::new(Channel::First, value, 0).unwrap()
    }

    #[test]
    fn test_flag_raised_and_cleared() {
        let (mut tx, mut rx) = channel(4);
        assert!(!rx.take_ready());

        tx.deposit(sample(1));
        assert!(rx.take_ready());
        assert!(!rx.take_ready());
    }

    #[test]
    fn test_drain_preserves_order_and_returns_last_estimate() {
        let (mut tx, mut rx) = channel(4);
        for v in [5, 6, 7] {
            tx.deposit(sample(v));
        }

        let mut sink = Counting::default();
        let drained = rx.drain_into(&mut sink);
        assert_eq!(sink.0, [5, 6, 7]);
        assert_eq!(drained.latest.map(|e| e.speed), Some(7));
        assert_eq!(rx.drain_into(&mut sink), Drained::default());
    }

    /// Sink that only produces an estimate for even readings.
    #[derive(Default)]
    struct EvenOnly;

    impl SampleSink for EvenOnly {
        fn accept(&mut self, sample: RawSample) -> Option<WindEstimate> {
            (sample.value() % 2 == 0).then(|| WindEstimate {
                speed: i32::from(sample.value()),
                direction: 0,
            })
        }
    }

    #[test]
    fn test_drain_counts_every_estimate() {
        let (mut tx, mut rx) = channel(8);
        for v in [1, 2, 3, 4, 6] {
            tx.deposit(sample(v));
        }

        let drained = rx.drain_into(&mut EvenOnly);
        assert_eq!(drained.samples, 5);
        assert_eq!(drained.estimates, 3, "one per estimate, not one per drain");
        assert_eq!(drained.latest.map(|e| e.speed), Some(6));
    }

    #[test]
    fn test_full_queue_drops_and_counts() {
        let (mut tx, rx) = channel(2);
        assert!(tx.deposit(sample(1)));
        assert!(tx.deposit(sample(2)));
        assert!(!tx.deposit(sample(3)));
        assert_eq!(rx.dropped(), 1);
    }

    #[test]
    fn test_cross_thread_handoff() {
        let (mut tx, mut rx) = channel(128);
        let producer = std::thread::spawn(move || {
            for v in 0..100 {
                while !tx.deposit(sample(v)) {
                    std::thread::yield_now();
                }
            }
        });
        producer.join().unwrap();

        assert!(rx.take_ready());
        let mut sink = Counting::default();
        let drained = rx.drain_into(&mut sink);
        assert_eq!(sink.0, (0..100).collect::<Vec<u16>>());
        assert_eq!(drained.estimates, 100);
    }
}
