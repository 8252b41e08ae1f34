//! Headless runner: boot a machine, optionally load a program image, run
//! for a stretch of wall-clock time, then dump processor and screen state.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use retro8_core::{find_machine, Computer, MachineConfig};

#[derive(Parser, Debug)]
#[command(name = "retro8-cli", about = "Headless retro8 machine runner")]
struct Args {
    /// Machine registry key (vz200, vz300)
    #[arg(long, default_value = "vz300")]
    machine: String,

    /// Directory holding system ROM images
    #[arg(long, default_value = "roms")]
    rom_dir: PathBuf,

    /// Program image to load before running
    image: Option<PathBuf>,

    /// Wall-clock milliseconds to let the machine run
    #[arg(long, default_value_t = 1000)]
    run_ms: u64,

    /// Stop once the program counter reaches this address (hex, e.g. 1d37)
    #[arg(long)]
    run_to: Option<String>,

    /// Dump the 32x16 text screen after the run
    #[arg(long)]
    screen: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let entry = find_machine(retro8_vz::MACHINES, &args.machine).ok_or_else(|| {
        let known: Vec<&str> = retro8_vz::MACHINES.iter().map(|e| e.key).collect();
        anyhow!(
            "unknown machine '{}'; supported: {}",
            args.machine,
            known.join(", ")
        )
    })?;

    let config = MachineConfig {
        rom_dir: args.rom_dir.clone(),
        clock_hz: None,
    };
    let machine = (entry.factory)(&config)
        .with_context(|| format!("building {}", entry.name))?;
    let mut computer = Computer::new(machine);

    if let Some(image) = &args.image {
        computer
            .load_file(image)
            .with_context(|| format!("loading {}", image.display()))?;
        println!("Loaded {}", image.display());
    }

    if let Some(target) = &args.run_to {
        let address = u16::from_str_radix(target.trim_start_matches("0x"), 16)
            .with_context(|| format!("parsing run-to address '{target}'"))?;
        computer.set_run_to(address);
    }

    log::info!("running {} for {}ms", entry.name, args.run_ms);
    computer.start();
    thread::sleep(Duration::from_millis(args.run_ms));
    computer.stop();

    let cycles = computer.with_machine(|machine| machine.processor().cycles());
    println!("{}: {} cycles executed", computer.name(), cycles);
    for register in computer.registers() {
        println!("  {:4} = {:0width$X}", register.name, register.value, width = (register.bits as usize).div_ceil(4));
    }

    if args.screen {
        dump_text_screen(&computer);
    }

    computer.dispose();
    Ok(())
}

/// Print the text-mode screen as ASCII. Inverse and semigraphics codes
/// collapse to their base glyph and '#'.
fn dump_text_screen(computer: &Computer) {
    println!("+{}+", "-".repeat(32));
    for row in 0..16u16 {
        let line: String = (0..32u16)
            .map(|column| {
                let code =
                    computer.with_machine(|machine| machine.peek_byte(0x7000 + row * 32 + column));
                screen_char(code)
            })
            .collect();
        println!("|{line}|");
    }
    println!("+{}+", "-".repeat(32));
}

fn screen_char(code: u8) -> char {
    if code & 0x80 != 0 {
        return '#';
    }
    let base = code & 0x3F;
    let ascii = if base < 0x20 { base + 0x40 } else { base };
    ascii as char
}
