//! VZ-200 / VZ-300 home computer.
//!
//! A Z80 machine with the video, keyboard and speaker hardware bridged
//! through the bus cycle hook. The two models differ only in clock rate and
//! video timing.

mod bus;
mod file;
mod keyboard;
mod memory;
mod renderer;
mod sound;

use std::path::Path;
use std::sync::Arc;

use retro8_core::cpu_z80::Z80;
use retro8_core::types::FrameBuffer;
use retro8_core::{
    AudioBuffer, InputSink, LoadError, Machine, MachineConfig, MachineEntry, Processor,
};

use bus::VzBus;
use file::{VzFile, BASIC_END_PTR, BASIC_START_PTR, TYPE_BASIC, TYPE_BINARY};
use keyboard::VzKeyboard;
use renderer::{CHARSET_LEN, DISPLAY_HEIGHT, DISPLAY_WIDTH};

pub use file::HEADER_LEN;

/// Size of the BASIC ROM image.
const ROM_LEN: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VzModel {
    Vz200,
    Vz300,
}

impl VzModel {
    pub fn name(self) -> &'static str {
        match self {
            VzModel::Vz200 => "VZ-200",
            VzModel::Vz300 => "VZ-300",
        }
    }

    pub fn cycles_per_second(self) -> u64 {
        match self {
            VzModel::Vz200 => 3_579_500,
            VzModel::Vz300 => 3_546_900,
        }
    }

    fn scans_per_frame(self) -> u32 {
        match self {
            VzModel::Vz200 => 312,
            VzModel::Vz300 => 310,
        }
    }

    fn flyback_scans(self) -> u32 {
        match self {
            VzModel::Vz200 => 57,
            VzModel::Vz300 => 56,
        }
    }

    fn rom_name(self) -> &'static str {
        match self {
            VzModel::Vz200 => "vzbas12.rom",
            VzModel::Vz300 => "vzbas20.rom",
        }
    }
}

pub struct VzMachine {
    cpu: Z80<VzBus>,
    model: VzModel,
    keyboard: Arc<VzKeyboard>,
    frame: FrameBuffer,
    audio: AudioBuffer,
}

impl VzMachine {
    pub fn new(model: VzModel, config: &MachineConfig) -> Self {
        let cycles_per_second = config.clock_hz.unwrap_or_else(|| model.cycles_per_second());
        let keyboard = Arc::new(VzKeyboard::new());
        let frame = FrameBuffer::new(DISPLAY_WIDTH, DISPLAY_HEIGHT);

        let rom = read_asset(&config.rom_dir.join(model.rom_name()), ROM_LEN);
        let charset = read_optional_asset(&config.rom_dir.join("vz.chr"), CHARSET_LEN);

        let mut bus = VzBus::new(
            model.scans_per_frame(),
            model.flyback_scans(),
            cycles_per_second,
            Arc::clone(&keyboard),
            charset,
            frame.clone(),
        );
        bus.memory.set_block(0, &rom);
        let audio = bus.speaker().buffer();

        Self {
            cpu: Z80::new(bus, cycles_per_second),
            model,
            keyboard,
            frame,
            audio,
        }
    }
}

impl Machine for VzMachine {
    fn name(&self) -> &str {
        self.model.name()
    }

    fn processor(&self) -> &dyn Processor {
        &self.cpu
    }

    fn processor_mut(&mut self) -> &mut dyn Processor {
        &mut self.cpu
    }

    fn reset(&mut self) {
        Processor::reset(&mut self.cpu);
        self.cpu.bus.reset();
    }

    fn display_size(&self) -> (u32, u32) {
        (DISPLAY_WIDTH, DISPLAY_HEIGHT)
    }

    fn frame_buffer(&self) -> FrameBuffer {
        self.frame.clone()
    }

    fn audio_buffer(&self) -> Option<AudioBuffer> {
        Some(self.audio.clone())
    }

    fn input(&self) -> Arc<dyn InputSink> {
        self.keyboard.clone()
    }

    /// Load a `.VZ` image: payload into memory from the header's address,
    /// then the type byte decides between patching the BASIC pointers and
    /// auto-running from the load address.
    fn load_file(&mut self, image: &[u8]) -> Result<(), LoadError> {
        let file = VzFile::parse(image)?;
        self.cpu.bus.memory.set_block(file.start, file.payload);
        match file.file_type {
            TYPE_BASIC => {
                let memory = &mut self.cpu.bus.memory;
                let end = file.end();
                memory.set_block(BASIC_START_PTR, &file.start.to_le_bytes());
                memory.set_block(BASIC_END_PTR, &end.to_le_bytes());
            }
            TYPE_BINARY => {
                self.cpu.set_program_counter(file.start);
            }
            other => {
                log::warn!("unknown VZ image type {other:#04x}; loaded without auto-run");
            }
        }
        Ok(())
    }

    fn peek_byte(&self, addr: u16) -> u8 {
        use retro8_core::Memory;
        self.cpu.bus.memory.read_byte(addr)
    }

    fn begin_emulation(&mut self) {
        let cycles = self.cpu.cycles();
        self.cpu.bus.begin_emulation(cycles);
    }
}

/// System ROM read. Missing or short images come back zero-filled so the
/// machine still constructs; the gap is logged.
fn read_asset(path: &Path, len: usize) -> Vec<u8> {
    match std::fs::read(path) {
        Ok(mut data) => {
            if data.len() < len {
                log::warn!(
                    "{} is {} of {len} bytes; zero-filling the rest",
                    path.display(),
                    data.len()
                );
            }
            data.resize(len, 0);
            data
        }
        Err(err) => {
            log::warn!("cannot read {}: {err}; using a blank image", path.display());
            vec![0; len]
        }
    }
}

fn read_optional_asset(path: &Path, len: usize) -> Option<Vec<u8>> {
    match std::fs::read(path) {
        Ok(mut data) => {
            data.resize(len, 0);
            Some(data)
        }
        Err(_) => None,
    }
}

// Registry factories.

pub fn vz200(config: &MachineConfig) -> Result<Box<dyn Machine>, LoadError> {
    Ok(Box::new(VzMachine::new(VzModel::Vz200, config)))
}

pub fn vz300(config: &MachineConfig) -> Result<Box<dyn Machine>, LoadError> {
    Ok(Box::new(VzMachine::new(VzModel::Vz300, config)))
}

/// Registry rows for the machines this crate provides.
pub const MACHINES: &[MachineEntry] = &[
    MachineEntry {
        key: "vz200",
        name: "Dick Smith VZ-200",
        factory: vz200,
    },
    MachineEntry {
        key: "vz300",
        name: "Dick Smith VZ-300",
        factory: vz300,
    },
];
