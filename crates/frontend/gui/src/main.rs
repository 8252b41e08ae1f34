mod input;
mod settings;

use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use minifb::{Key, Scale, ScaleMode, Window, WindowOptions};
use rodio::{OutputStream, Source};

use retro8_core::{find_machine, AudioBuffer, Computer, MachineConfig};
use settings::Settings;

/// Streaming audio source backed by the machine's sample buffer. When the
/// buffer runs dry it outputs silence to avoid underruns.
struct StreamSource {
    buffer: AudioBuffer,
}

impl Iterator for StreamSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        let sample = self.buffer.pop().unwrap_or(0);
        Some(sample as f32 / 32768.0)
    }
}

impl Source for StreamSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.buffer.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

fn main() {
    env_logger::init();

    let mut settings = Settings::load();

    // Args: [machine-key] [image.vz]; either may be omitted.
    let mut machine_key: Option<String> = None;
    let mut image_path: Option<String> = None;
    for arg in env::args().skip(1) {
        if find_machine(retro8_vz::MACHINES, &arg).is_some() {
            machine_key = Some(arg);
        } else if image_path.is_none() {
            image_path = Some(arg);
        }
    }
    let machine_key = machine_key.unwrap_or_else(|| settings.machine.clone());
    if image_path.is_none() {
        image_path = settings.last_image_path.clone();
    }

    let entry = match find_machine(retro8_vz::MACHINES, &machine_key) {
        Some(entry) => entry,
        None => {
            eprintln!("Unknown machine '{machine_key}'. Supported machines:");
            for entry in retro8_vz::MACHINES {
                eprintln!("  {:8} {}", entry.key, entry.name);
            }
            return;
        }
    };

    let config = MachineConfig {
        rom_dir: PathBuf::from(&settings.rom_dir),
        clock_hz: None,
    };
    let machine = match (entry.factory)(&config) {
        Ok(machine) => machine,
        Err(e) => {
            eprintln!("Failed to build {}: {}", entry.name, e);
            return;
        }
    };

    let mut computer = Computer::new(machine);
    let (width, height) = computer.display_size();
    let (width, height) = (width as usize, height as usize);
    log::info!("{} ready at {}x{}", computer.name(), width, height);

    if let Some(path) = &image_path {
        match computer.load_file(Path::new(path)) {
            Ok(()) => {
                println!("Loaded image: {path}");
                settings.machine = machine_key.clone();
                settings.last_image_path = Some(path.clone());
                if let Err(e) = settings.save() {
                    eprintln!("Warning: Failed to save settings: {e}");
                }
            }
            Err(e) => eprintln!("Failed to load {path}: {e}"),
        }
    }

    let scale = match computer.display_scale() {
        1 => Scale::X1,
        4 => Scale::X4,
        _ => Scale::X2,
    };
    let mut window = match Window::new(
        &format!("retro8 - {}", computer.name()),
        width,
        height,
        WindowOptions {
            resize: true,
            scale,
            scale_mode: ScaleMode::AspectRatioStretch,
            ..WindowOptions::default()
        },
    ) {
        Ok(window) => window,
        Err(e) => {
            eprintln!("Failed to create window: {e}");
            return;
        }
    };

    // Audio output; the emulator keeps running without it.
    let mut _stream_keepalive = None;
    if let Some(audio) = computer.audio_buffer() {
        match OutputStream::try_default() {
            Ok((stream, handle)) => {
                if let Err(e) = handle.play_raw(StreamSource { buffer: audio }.convert_samples()) {
                    eprintln!("Warning: Failed to start audio playback: {e}");
                }
                _stream_keepalive = Some(stream);
            }
            Err(e) => {
                eprintln!("Warning: Failed to initialize audio: {e}. Audio disabled.");
            }
        }
    }

    let frame_buffer = computer.frame_buffer();
    let mut buffer = vec![0u32; width * height];
    let mut held: HashSet<Key> = HashSet::new();
    let mut paused = false;
    let mut last_frame = Instant::now();

    computer.start();

    while window.is_open() && !window.is_key_down(Key::Escape) {
        // Key transitions become machine matrix events.
        let down: HashSet<Key> = window.get_keys().into_iter().collect();
        for key in down.difference(&held) {
            if let Some(host) = input::translate(*key) {
                computer.key_event(host, true);
            }
        }
        for key in held.difference(&down) {
            if let Some(host) = input::translate(*key) {
                computer.key_event(host, false);
            }
        }
        held = down;

        // F12 resets; F5 toggles pause.
        if window.is_key_pressed(Key::F12, minifb::KeyRepeat::No) {
            computer.reset();
            println!("System reset");
        }
        if window.is_key_pressed(Key::F5, minifb::KeyRepeat::No) {
            if paused {
                computer.start();
                println!("Resumed");
            } else {
                computer.stop();
                println!("Paused");
            }
            paused = !paused;
        }

        // Present whatever the machine last published. The worker paces
        // emulation itself; this loop only mirrors frames at ~60Hz.
        frame_buffer.copy_into(&mut buffer);
        if let Err(e) = window.update_with_buffer(&buffer, width, height) {
            eprintln!("Window update error: {e}");
            break;
        }

        let frame_dt = last_frame.elapsed();
        if frame_dt < Duration::from_millis(16) {
            std::thread::sleep(Duration::from_millis(16) - frame_dt);
        }
        last_frame = Instant::now();
    }

    computer.dispose();
}
