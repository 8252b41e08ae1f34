//! Shared audio sample buffer.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use crate::types::AudioSample;

/// Default output rate for machine speakers.
pub const SAMPLE_RATE: u32 = 44_100;

/// Bounded sample queue between a machine's sound generator and the
/// frontend's audio output. The producer pushes one sample at a time from
/// the cycle hook; the consumer pops from its own thread. When the queue
/// overflows, the oldest samples are dropped so latency stays bounded.
#[derive(Clone)]
pub struct AudioBuffer {
    samples: Arc<Mutex<VecDeque<AudioSample>>>,
    sample_rate: u32,
    capacity: usize,
}

impl AudioBuffer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            samples: Arc::new(Mutex::new(VecDeque::new())),
            sample_rate,
            // A quarter second of backlog at most.
            capacity: sample_rate as usize / 4,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn push(&self, sample: AudioSample) {
        let mut samples = self
            .samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    /// Next queued sample; `None` means the consumer should output silence.
    pub fn pop(&self) -> Option<AudioSample> {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Drop all but the most recent `keep` samples. Called periodically by
    /// machines so output latency cannot creep up over a long session.
    pub fn resync(&self, keep: usize) {
        let mut samples = self
            .samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let len = samples.len();
        if len > keep {
            samples.drain(..len - keep);
        }
    }

    pub fn len(&self) -> usize {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let buffer = AudioBuffer::new(SAMPLE_RATE);
        buffer.push(1);
        buffer.push(2);
        buffer.push(3);
        assert_eq!(buffer.pop(), Some(1));
        assert_eq!(buffer.pop(), Some(2));
        assert_eq!(buffer.pop(), Some(3));
        assert_eq!(buffer.pop(), None);
    }

    #[test]
    fn resync_keeps_the_tail() {
        let buffer = AudioBuffer::new(SAMPLE_RATE);
        for sample in 0..10 {
            buffer.push(sample);
        }
        buffer.resync(2);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.pop(), Some(8));
        assert_eq!(buffer.pop(), Some(9));
    }

    #[test]
    fn overflow_drops_the_oldest() {
        let buffer = AudioBuffer::new(8);
        // Capacity is sample_rate / 4 = 2.
        buffer.push(1);
        buffer.push(2);
        buffer.push(3);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.pop(), Some(2));
    }
}
