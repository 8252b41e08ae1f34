//! The VZ bus: address decode plus the per-T-state bridge.
//!
//! Memory map as the CPU sees it:
//!   0x0000–0x67FF  BASIC ROM (writes ignored)
//!   0x6800–0x6FFF  keyboard matrix read / video-sound control latch write
//!   0x7000–0x77FF  video RAM
//!   0x7800–0xFFFF  RAM
//!
//! The cycle hook counts T-states through each video frame: at the flyback
//! point it raises the CPU interrupt (and periodically resynchronises the
//! audio backlog); at the end of the frame it renders, unless frame-skip
//! is catching us up, and hands the elapsed cycles to the pacer.

use std::sync::Arc;

use retro8_core::processor::ProcessorState;
use retro8_core::types::FrameBuffer;
use retro8_core::{Bus, Pacer};

use crate::keyboard::VzKeyboard;
use crate::memory::VzMemory;
use crate::renderer::VzRenderer;
use crate::sound::Speaker;

/// T-states per video scan line.
pub const CYCLES_PER_SCAN: u32 = 228;

/// Frames between audio resynchronisations.
const AUDIO_RESYNC_FRAMES: u32 = 50;

/// Flyback status bit as read in the keyboard region: set outside the
/// blanking interval, clear during it.
const FLYBACK_IDLE: u8 = 0x80;

pub struct VzBus {
    pub memory: VzMemory,
    keyboard: Arc<VzKeyboard>,
    renderer: VzRenderer,
    speaker: Speaker,
    frame_out: FrameBuffer,
    pacer: Pacer,

    cycles_per_frame: u32,
    cycles_to_flyback: u32,
    frame_cycles: u32,
    flyback: u8,
    vdc_latch: u8,
    resync_countdown: u32,
}

impl VzBus {
    pub fn new(
        scans_per_frame: u32,
        flyback_scans: u32,
        cycles_per_second: u64,
        keyboard: Arc<VzKeyboard>,
        charset: Option<Vec<u8>>,
        frame_out: FrameBuffer,
    ) -> Self {
        let cycles_per_frame = CYCLES_PER_SCAN * scans_per_frame;
        Self {
            memory: VzMemory::new(),
            keyboard,
            renderer: VzRenderer::new(charset),
            speaker: Speaker::new(cycles_per_second),
            frame_out,
            pacer: Pacer::new(),
            cycles_per_frame,
            cycles_to_flyback: cycles_per_frame - CYCLES_PER_SCAN * flyback_scans,
            frame_cycles: 0,
            flyback: FLYBACK_IDLE,
            vdc_latch: 0,
            resync_countdown: AUDIO_RESYNC_FRAMES,
        }
    }

    pub fn speaker(&self) -> &Speaker {
        &self.speaker
    }

    /// Restart pacing from `cycles`; called when a scheduled action begins.
    pub fn begin_emulation(&mut self, cycles: u64) {
        self.pacer.rebase(cycles);
    }

    /// Power-on state for everything except memory contents.
    pub fn reset(&mut self) {
        self.frame_cycles = 0;
        self.flyback = FLYBACK_IDLE;
        self.vdc_latch = 0;
        self.renderer.set_latch(0);
        self.resync_countdown = AUDIO_RESYNC_FRAMES;
        self.keyboard.reset();
    }

    #[cfg(test)]
    pub fn cycles_to_flyback(&self) -> u32 {
        self.cycles_to_flyback
    }

    #[cfg(test)]
    pub fn cycles_per_frame(&self) -> u32 {
        self.cycles_per_frame
    }

    #[cfg(test)]
    pub fn flyback_active(&self) -> bool {
        self.flyback == 0
    }
}

impl Bus for VzBus {
    fn read_byte(&mut self, addr: u16) -> u8 {
        if !(0x6800..0x7000).contains(&addr) {
            self.memory.read_byte(addr)
        } else {
            self.flyback | (self.keyboard.read(addr) & 0x7F)
        }
    }

    fn write_byte(&mut self, addr: u16, value: u8) {
        if addr >= 0x7000 {
            self.memory.write_byte(addr, value);
        } else if addr >= 0x6800 {
            self.speaker.latch_write(self.vdc_latch, value);
            self.vdc_latch = value;
            self.renderer.set_latch(value);
        }
        // ROM below 0x6800: writes die on the bus.
    }

    fn wants_cycles(&self) -> bool {
        true
    }

    fn cycle(&mut self, state: &mut ProcessorState) {
        self.frame_cycles += 1;
        if self.frame_cycles == self.cycles_to_flyback {
            self.resync_countdown -= 1;
            if self.resync_countdown == 0 {
                self.speaker.resync();
                self.resync_countdown = AUDIO_RESYNC_FRAMES;
            }
            self.flyback = 0x00;
            state.set_interrupt(0x01);
        } else if self.frame_cycles == self.cycles_per_frame {
            self.frame_cycles = 0;
            self.flyback = FLYBACK_IDLE;
            if self.pacer.frame_skip() == 0 {
                self.renderer.render(self.memory.video_ram());
                self.frame_out.publish(self.renderer.frame());
            }
            self.pacer.sync(state.cycles(), state.cycles_per_second());
        }
        self.speaker.clock();
    }

    /// The flyback line auto-acknowledges: accepting the interrupt clears
    /// pending bit 0 and nothing else.
    fn interrupt_acknowledged(&mut self, state: &mut ProcessorState) {
        state.clear_interrupt(0x01);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retro8_core::HostKey;
    use retro8_core::InputSink;

    fn test_bus() -> (VzBus, ProcessorState) {
        let keyboard = Arc::new(VzKeyboard::new());
        let bus = VzBus::new(
            310,
            56,
            3_546_900,
            keyboard,
            None,
            FrameBuffer::new(256, 192),
        );
        (bus, ProcessorState::new(3_546_900))
    }

    #[test]
    fn ram_reads_and_writes_decode_to_memory() {
        let (mut bus, _) = test_bus();
        bus.write_byte(0x9000, 0x5A);
        assert_eq!(bus.read_byte(0x9000), 0x5A);

        bus.write_byte(0x7000, 0x41);
        assert_eq!(bus.read_byte(0x7000), 0x41);
        assert_eq!(bus.memory.video_ram()[0], 0x41);
    }

    #[test]
    fn rom_region_writes_are_ignored() {
        let (mut bus, _) = test_bus();
        bus.memory.set_block(0x1234, &[0xAA]);
        bus.write_byte(0x1234, 0x55);
        assert_eq!(bus.read_byte(0x1234), 0xAA);
    }

    #[test]
    fn keyboard_region_packs_flyback_and_rows() {
        let (mut bus, mut state) = test_bus();
        // Outside flyback the status bit is set; idle rows read 0x7F.
        assert_eq!(bus.read_byte(0x68FE), 0xFF);

        bus.keyboard.key_event(HostKey::R, true);
        assert_eq!(bus.read_byte(0x68FE), 0xFE);

        // Drive to the flyback point: the status bit drops.
        for _ in 0..bus.cycles_to_flyback() {
            state.cycle(&mut bus, 1);
        }
        assert!(bus.flyback_active());
        assert_eq!(bus.read_byte(0x68FE) & 0x80, 0x00);
    }

    #[test]
    fn flyback_raises_the_interrupt_exactly_once_per_frame() {
        let (mut bus, mut state) = test_bus();
        let to_flyback = bus.cycles_to_flyback();

        state.cycle(&mut bus, to_flyback - 1);
        assert_eq!(state.interrupt_pending(), 0);

        state.cycle(&mut bus, 1);
        assert_eq!(state.interrupt_pending(), 0x01);

        // Acknowledge like the CPU would; the rest of the frame stays quiet.
        bus.interrupt_acknowledged(&mut state);
        let remainder = bus.cycles_per_frame() - to_flyback;
        state.cycle(&mut bus, remainder - 1);
        assert_eq!(state.interrupt_pending(), 0);
    }

    #[test]
    fn frame_end_restores_flyback_and_wraps_the_counter() {
        let (mut bus, mut state) = test_bus();
        bus.begin_emulation(0);
        let cycles_per_frame = bus.cycles_per_frame();
        state.cycle(&mut bus, cycles_per_frame);

        assert!(!bus.flyback_active());
        assert_eq!(bus.frame_cycles, 0);
        // A second frame runs the same schedule.
        let cycles_to_flyback = bus.cycles_to_flyback();
        state.cycle(&mut bus, cycles_to_flyback);
        assert!(bus.flyback_active());
    }

    #[test]
    fn latch_write_updates_mode_and_speaker_only_on_toggles() {
        let (mut bus, _) = test_bus();
        bus.write_byte(0x6800, 0x08);
        assert_eq!(bus.vdc_latch, 0x08);
        // Latch writes never land in memory.
        assert_eq!(bus.memory.read_byte(0x6800), 0x00);
    }
}
