//! Core emulator primitives and traits.

pub mod audio;
pub mod bus;
pub mod computer;
pub mod cpu_z80;
pub mod device;
pub mod input;
pub mod machine;
pub mod memory;
pub mod pacing;
pub mod processor;

pub mod types {
    use std::sync::{Arc, Mutex, PoisonError};

    use serde::{Deserialize, Serialize};

    /// Logical pixel buffer a machine renders into. Presentation (scaling,
    /// pixel format, windowing) is the frontend's concern.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Frame {
        pub width: u32,
        pub height: u32,
        pub pixels: Vec<u32>,
    }

    impl Frame {
        pub fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                pixels: vec![0; (width * height) as usize],
            }
        }
    }

    pub type AudioSample = i16;

    /// Shared hand-off point between the machine's renderer (writer, once
    /// per non-skipped frame) and the frontend (reader, at its own rate).
    #[derive(Clone)]
    pub struct FrameBuffer {
        inner: Arc<Mutex<Frame>>,
    }

    impl FrameBuffer {
        pub fn new(width: u32, height: u32) -> Self {
            Self {
                inner: Arc::new(Mutex::new(Frame::new(width, height))),
            }
        }

        /// Publish a completed frame.
        pub fn publish(&self, frame: &Frame) {
            let mut shared = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if shared.pixels.len() == frame.pixels.len() {
                shared.pixels.copy_from_slice(&frame.pixels);
                shared.width = frame.width;
                shared.height = frame.height;
            } else {
                *shared = frame.clone();
            }
        }

        pub fn snapshot(&self) -> Frame {
            self.inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Copy the current pixels into `out`; returns false on size
        /// mismatch.
        pub fn copy_into(&self, out: &mut [u32]) -> bool {
            let shared = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if shared.pixels.len() != out.len() {
                return false;
            }
            out.copy_from_slice(&shared.pixels);
            true
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn frame_initialization() {
            let frame = Frame::new(10, 10);
            assert_eq!(frame.pixels.len(), 100);
            assert_eq!(frame.width, 10);
            assert_eq!(frame.height, 10);
        }

        #[test]
        fn frame_buffer_round_trip() {
            let buffer = FrameBuffer::new(2, 2);
            let mut frame = Frame::new(2, 2);
            frame.pixels = vec![1, 2, 3, 4];
            buffer.publish(&frame);

            assert_eq!(buffer.snapshot().pixels, vec![1, 2, 3, 4]);

            let mut out = vec![0u32; 4];
            assert!(buffer.copy_into(&mut out));
            assert_eq!(out, vec![1, 2, 3, 4]);

            let mut wrong = vec![0u32; 3];
            assert!(!buffer.copy_into(&mut wrong));
        }
    }
}

pub use audio::AudioBuffer;
pub use bus::Bus;
pub use computer::{Action, Computer};
pub use device::{Device, DeviceId, DeviceMapping, IoBus};
pub use input::{HostKey, InputSink, NullInput};
pub use machine::{find_machine, LoadError, Machine, MachineConfig, MachineEntry, MachineFactory};
pub use memory::{Memory, Ram};
pub use pacing::{Pacer, TimeSource, WallClock, MAX_FRAME_SKIP};
pub use processor::{Processor, ProcessorState, Register, StopFlag};
pub use types::{Frame, FrameBuffer};
