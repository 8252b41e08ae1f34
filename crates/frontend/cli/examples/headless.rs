use std::env;

use retro8_core::{find_machine, Computer, MachineConfig};

fn main() {
    let args: Vec<String> = env::args().collect();
    let key = args.get(1).map(|s| s.as_str()).unwrap_or("vz300");

    let Some(entry) = find_machine(retro8_vz::MACHINES, key) else {
        eprintln!("Unknown machine: {key}");
        return;
    };
    let machine = (entry.factory)(&MachineConfig::default()).expect("machine builds");
    let computer = Computer::new(machine);

    // Single-step a handful of instructions and show where the CPU ended up.
    for _ in 0..10 {
        computer.step();
    }
    while computer.is_running() {
        std::thread::yield_now();
    }

    let frame = computer.frame_buffer().snapshot();
    println!("Headless {} frame: {}x{}", computer.name(), frame.width, frame.height);
    for register in computer.registers() {
        println!("  {:4} = {:04X}", register.name, register.value);
    }
}
