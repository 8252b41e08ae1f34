//! The contract between a concrete machine and the scheduler.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::audio::AudioBuffer;
use crate::computer::Action;
use crate::input::InputSink;
use crate::processor::Processor;
use crate::types::FrameBuffer;

/// Failure to load a program image or machine asset.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("file format error: {0}")]
    Format(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A wired-up machine: one processor plus its peripheral graph.
///
/// The scheduler owns the machine for its lifetime and is the only mutator
/// while an action runs. Collaborator handles (frame, audio, input) are
/// cloned out once at construction so frontends never need the machine
/// itself.
pub trait Machine: Send {
    fn name(&self) -> &str;

    fn processor(&self) -> &dyn Processor;

    fn processor_mut(&mut self) -> &mut dyn Processor;

    /// Power-on reset of CPU and peripherals.
    fn reset(&mut self);

    /// Logical display size in pixels.
    fn display_size(&self) -> (u32, u32);

    /// Integer scale frontends should present at.
    fn display_scale(&self) -> u32 {
        2
    }

    fn frame_buffer(&self) -> FrameBuffer;

    fn audio_buffer(&self) -> Option<AudioBuffer> {
        None
    }

    fn input(&self) -> Arc<dyn InputSink>;

    /// Load a machine-specific program image. Nothing may be written to
    /// memory before the image validates.
    fn load_file(&mut self, image: &[u8]) -> Result<(), LoadError> {
        let _ = image;
        Err(LoadError::Format(
            "machine does not load program images".into(),
        ))
    }

    /// Debug view of a memory location, bypassing bus-side decode. Only
    /// meaningful while stopped.
    fn peek_byte(&self, addr: u16) -> u8 {
        let _ = addr;
        0xFF
    }

    /// Called by the worker after an action is captured, before dispatch.
    /// Machines restart their pacing reference and sound output here so
    /// idle time never counts as emulation lag.
    fn begin_emulation(&mut self) {}

    /// Called by the worker when the action's execution ends.
    fn end_emulation(&mut self) {}

    /// Dispatch one scheduled action on the processor.
    fn emulate(&mut self, mode: Action, run_to: Option<u16>) {
        match mode {
            Action::Stop => {}
            Action::Step => self.processor_mut().step(),
            Action::StepOver => self.processor_mut().step_over(),
            Action::Run => match run_to {
                Some(address) => self.processor_mut().run_to(address),
                None => self.processor_mut().run(),
            },
        }
    }
}

/// Resolved configuration handed to machine factories. Persistence and path
/// discovery live in the frontends.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    /// Directory holding system ROM and character-set images.
    pub rom_dir: PathBuf,
    /// Override for the machine's default clock rate.
    pub clock_hz: Option<u64>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            rom_dir: PathBuf::from("roms"),
            clock_hz: None,
        }
    }
}

pub type MachineFactory = fn(&MachineConfig) -> Result<Box<dyn Machine>, LoadError>;

/// One row of the closed machine registry: the supported-machine set is a
/// static table of constructors, enumerable at compile time.
pub struct MachineEntry {
    pub key: &'static str,
    pub name: &'static str,
    pub factory: MachineFactory,
}

/// Case-insensitive registry lookup.
pub fn find_machine<'a>(entries: &'a [MachineEntry], key: &str) -> Option<&'a MachineEntry> {
    entries.iter().find(|entry| entry.key.eq_ignore_ascii_case(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unbuildable(_config: &MachineConfig) -> Result<Box<dyn Machine>, LoadError> {
        Err(LoadError::Format("test entry".into()))
    }

    #[test]
    fn registry_lookup_ignores_case() {
        let entries = [MachineEntry {
            key: "vz300",
            name: "VZ-300",
            factory: unbuildable,
        }];
        assert!(find_machine(&entries, "VZ300").is_some());
        assert!(find_machine(&entries, "vz300").is_some());
        assert!(find_machine(&entries, "zx81").is_none());
    }
}
