//! VZ speaker.
//!
//! The speaker is driven by two bits of the video/sound control latch; the
//! output level only changes when one of those bits toggles. Samples are
//! produced from the cycle hook by a fixed-point accumulator, one sample
//! every `cpu_clock / sample_rate` T-states, and pushed into the shared
//! audio buffer. Every few dozen frames the machine resynchronises the
//! buffer so output latency stays put.

use retro8_core::audio::{AudioBuffer, SAMPLE_RATE};

/// Latch bits that drive the speaker cone.
pub const SPEAKER_BITS: u8 = 0x21;

/// Output levels indexed by (bit0 | bit5>>4) of the latch.
const SOUND_LEVELS: [i16; 4] = [i16::MAX, i16::MIN, 0, i16::MAX];

/// Fixed-point overflow test bit for the sample accumulator.
const CLOCK_TEST: u32 = 0x4000_0000;

pub struct Speaker {
    buffer: AudioBuffer,
    level: i16,
    accumulator: u32,
    increment: u32,
}

impl Speaker {
    pub fn new(cycles_per_second: u64) -> Self {
        Self {
            buffer: AudioBuffer::new(SAMPLE_RATE),
            level: SOUND_LEVELS[0],
            accumulator: 0,
            increment: (CLOCK_TEST as u64 * SAMPLE_RATE as u64 / cycles_per_second) as u32,
        }
    }

    pub fn buffer(&self) -> AudioBuffer {
        self.buffer.clone()
    }

    /// Latch write: the level moves only when a speaker bit toggles, so
    /// unrelated latch traffic (mode switches) costs nothing.
    pub fn latch_write(&mut self, previous: u8, value: u8) {
        if (previous ^ value) & SPEAKER_BITS != 0 {
            let index = (value & 0x01) | ((value >> 4) & 0x02);
            self.level = SOUND_LEVELS[index as usize];
        }
    }

    /// One T-state of speaker time; emits a sample on accumulator overflow.
    pub fn clock(&mut self) {
        self.accumulator += self.increment;
        if self.accumulator & CLOCK_TEST != 0 {
            self.accumulator -= CLOCK_TEST;
            self.buffer.push(self.level);
        }
    }

    /// Drop backlog beyond roughly one frame of samples.
    pub fn resync(&mut self) {
        self.buffer.resync(SAMPLE_RATE as usize / 50);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_changes_only_on_speaker_bit_toggles() {
        let mut speaker = Speaker::new(3_546_900);
        assert_eq!(speaker.level, i16::MAX);

        // Toggle bit 0: index becomes 1.
        speaker.latch_write(0x00, 0x01);
        assert_eq!(speaker.level, i16::MIN);

        // Write that changes no speaker bit leaves the level alone.
        speaker.latch_write(0x01, 0x09);
        assert_eq!(speaker.level, i16::MIN);

        // Toggle bit 5 with bit 0 clear: index 2.
        speaker.latch_write(0x09, 0x28);
        assert_eq!(speaker.level, 0);
    }

    #[test]
    fn clock_emits_samples_at_the_output_rate() {
        let cycles_per_second = 3_546_900u64;
        let mut speaker = Speaker::new(cycles_per_second);
        let buffer = speaker.buffer();

        // One emulated frame's worth of T-states.
        for _ in 0..70_680 {
            speaker.clock();
        }
        // 70680 cycles at 3.5469MHz is ~19.93ms, i.e. ~879 samples.
        let produced = buffer.len();
        assert!((870..=890).contains(&produced), "{produced} samples");
    }

    #[test]
    fn resync_bounds_the_backlog() {
        let mut speaker = Speaker::new(3_546_900);
        let buffer = speaker.buffer();
        // A full second of unconsumed output.
        for _ in 0..3_546_900 {
            speaker.clock();
        }
        assert!(buffer.len() > SAMPLE_RATE as usize / 50);

        speaker.resync();
        assert!(buffer.len() <= SAMPLE_RATE as usize / 50);
    }
}
