//! Single-Slot Sample Queue
//!
//! Holds the one sound waiting to be played plus a read cursor. The control
//! thread replaces or mutes it; the feed thread drains it.
//!
//! The buffer and its cursor are published together as an immutable
//! snapshot behind an `Arc`. Replacing a sound swaps the `Arc` under a lock
//! held only for the pointer swap, so the feed thread sees either the old
//! pair or the new pair, never a mix. Inside a snapshot the cursor only
//! moves forward through compare-and-swap, so a mute racing a fill is never
//! lost.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// One queued sound and how much of it has been fed
struct Pending {
    samples: Vec<u8>,
    cursor: AtomicUsize,
}

impl Pending {
    fn new(samples: Vec<u8>) -> Self {
        Self {
            samples,
            cursor: AtomicUsize::new(0),
        }
    }

    fn remaining(&self) -> usize {
        self.samples.len() - self.cursor.load(Ordering::Acquire)
    }
}

/// Single pending buffer shared between control and feed threads
pub struct SampleQueue {
    current: Mutex<Arc<Pending>>,
}

impl SampleQueue {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(Arc::new(Pending::new(Vec::new()))),
        }
    }

    /// Replace whatever is queued with `samples`, starting from the top
    ///
    /// Samples must already be in the device's native format. The unplayed
    /// tail of the previous sound is discarded.
    pub fn queue_audio(&self, samples: impl Into<Vec<u8>>) {
        let next = Arc::new(Pending::new(samples.into()));
        let previous = std::mem::replace(&mut *self.current.lock(), next);
        // Free the old buffer outside the lock
        drop(previous);
    }

    /// Mute: move the cursor to the end without releasing the buffer
    pub fn clear_queued_audio(&self) {
        let current = self.current.lock();
        current.cursor.store(current.samples.len(), Ordering::Release);
    }

    /// Bytes not yet fed to the device
    pub fn remaining(&self) -> usize {
        self.snapshot().remaining()
    }

    /// Whether any queued bytes remain
    pub fn is_playing(&self) -> bool {
        self.remaining() > 0
    }

    /// Fill `dest` from the queue, zero-filling whatever the queue can't supply
    ///
    /// Returns the number of real (non-silence) bytes written.
    pub fn fill(&self, dest: &mut [u8]) -> usize {
        let pending = self.snapshot();
        let len = pending.samples.len();
        let wanted = dest.len();

        let start = pending
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cursor| {
                (cursor < len).then(|| (cursor + wanted).min(len))
            })
            .unwrap_or(len);

        let copied = (len - start).min(wanted);
        dest[..copied].copy_from_slice(&pending.samples[start..start + copied]);
        dest[copied..].fill(0);
        copied
    }

    fn snapshot(&self) -> Arc<Pending> {
        Arc::clone(&self.current.lock())
    }
}

impl Default for SampleQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_queue_emits_silence() {
        let queue = SampleQueue::new();
        let mut out = [0xAAu8; 8];
        assert_eq!(queue.fill(&mut out), 0);
        assert_eq!(out, [0; 8]);
        assert!(!queue.is_playing());
    }

    #[test]
    fn test_short_buffer_is_zero_padded() {
        let queue = SampleQueue::new();
        let samples: Vec<u8> = (1..=10).collect();
        queue.queue_audio(samples.clone());

        let mut first = [0xFFu8; 16];
        assert_eq!(queue.fill(&mut first), 10);
        assert_eq!(&first[..10], &samples[..]);
        assert_eq!(&first[10..], &[0u8; 6]);

        let mut second = [0xFFu8; 4];
        assert_eq!(queue.fill(&mut second), 0);
        assert_eq!(second, [0; 4]);
    }

    #[test]
    fn test_cursor_advances_across_fills() {
        let queue = SampleQueue::new();
        queue.queue_audio((0..12).collect::<Vec<u8>>());

        let mut out = [0u8; 5];
        queue.fill(&mut out);
        assert_eq!(out, [0, 1, 2, 3, 4]);
        assert_eq!(queue.remaining(), 7);

        queue.fill(&mut out);
        assert_eq!(out, [5, 6, 7, 8, 9]);

        queue.fill(&mut out);
        assert_eq!(out, [10, 11, 0, 0, 0]);
        assert_eq!(queue.remaining(), 0);
    }

    #[test]
    fn test_clear_mutes_until_next_queue() {
        let queue = SampleQueue::new();
        queue.queue_audio(vec![7u8; 64]);

        let mut out = [0u8; 8];
        queue.fill(&mut out);
        assert_eq!(out, [7; 8]);

        queue.clear_queued_audio();
        assert!(!queue.is_playing());
        for _ in 0..4 {
            let mut out = [0xFFu8; 8];
            assert_eq!(queue.fill(&mut out), 0);
            assert_eq!(out, [0; 8]);
        }

        queue.queue_audio(vec![3u8; 4]);
        let mut out = [0u8; 8];
        assert_eq!(queue.fill(&mut out), 4);
        assert_eq!(out, [3, 3, 3, 3, 0, 0, 0, 0]);
    }

    #[test]
    fn test_queue_replaces_unplayed_tail() {
        let queue = SampleQueue::new();
        queue.queue_audio(vec![1u8; 32]);

        let mut out = [0u8; 4];
        queue.fill(&mut out);

        queue.queue_audio(vec![2u8; 6]);
        let mut out = [0u8; 8];
        assert_eq!(queue.fill(&mut out), 6);
        assert_eq!(out, [2, 2, 2, 2, 2, 2, 0, 0]);
    }

    #[test]
    fn test_concurrent_fill_and_replace() {
        use std::thread;

        let queue = Arc::new(SampleQueue::new());
        let feeder = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut out = [0u8; 64];
                for _ in 0..10_000 {
                    let copied = queue.fill(&mut out);
                    // Every snapshot is uniform, so a region never mixes sounds
                    if copied > 0 {
                        let first = out[0];
                        assert!(out[..copied].iter().all(|&b| b == first));
                    }
                    assert!(out[copied..].iter().all(|&b| b == 0));
                }
            })
        };

        for round in 0..1_000u32 {
            let value = (round % 250 + 1) as u8;
            queue.queue_audio(vec![value; 256]);
            if round % 7 == 0 {
                queue.clear_queued_audio();
            }
        }

        feeder.join().unwrap();
    }
}
