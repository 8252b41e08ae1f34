//! Scheduler protocol tests: action transitions, stop boundaries, worker
//! containment and disposal.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use retro8_core::input::NullInput;
use retro8_core::machine::Machine;
use retro8_core::processor::{Processor, Register, StopFlag};
use retro8_core::types::FrameBuffer;
use retro8_core::{Action, Computer, InputSink};

/// Processor stub: each "instruction" is a short sleep, so actions take
/// long enough to observe from the controller thread.
struct SpinProcessor {
    steps: Arc<AtomicU64>,
    run_to_target: Arc<AtomicU64>,
    stop: StopFlag,
    panic_on_step: Arc<AtomicBool>,
    pc: u16,
}

impl SpinProcessor {
    fn step_once(&mut self) {
        if self.panic_on_step.swap(false, Ordering::SeqCst) {
            panic!("injected fault");
        }
        self.steps.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(1));
        self.pc = self.pc.wrapping_add(1);
    }
}

impl Processor for SpinProcessor {
    fn step(&mut self) {
        self.step_once();
    }

    fn step_over(&mut self) {
        self.step_once();
    }

    fn run(&mut self) {
        self.stop.clear();
        loop {
            self.step_once();
            if self.stop.is_requested() {
                break;
            }
        }
    }

    fn run_to(&mut self, address: u16) {
        self.run_to_target.store(address as u64, Ordering::SeqCst);
        self.stop.clear();
        loop {
            self.step_once();
            if self.stop.is_requested() || self.pc == address {
                break;
            }
        }
    }

    fn reset(&mut self) {
        self.pc = 0;
    }

    fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    fn cycles(&self) -> u64 {
        self.steps.load(Ordering::SeqCst)
    }

    fn cycles_per_second(&self) -> u64 {
        1_000_000
    }

    fn set_cycles_per_second(&mut self, _value: u64) {}

    fn program_counter(&self) -> u16 {
        self.pc
    }

    fn set_program_counter(&mut self, value: u16) {
        self.pc = value;
    }

    fn set_interrupt(&mut self, _mask: u8) {}

    fn clear_interrupt(&mut self, _mask: u8) {}

    fn registers(&self) -> Vec<Register> {
        vec![Register {
            name: "PC",
            bits: 16,
            value: self.pc,
        }]
    }
}

struct SpinMachine {
    cpu: SpinProcessor,
    frame: FrameBuffer,
    input: Arc<NullInput>,
}

impl SpinMachine {
    fn new() -> (Self, Arc<AtomicU64>, Arc<AtomicBool>, Arc<AtomicU64>) {
        let steps = Arc::new(AtomicU64::new(0));
        let panic_on_step = Arc::new(AtomicBool::new(false));
        let run_to_target = Arc::new(AtomicU64::new(u64::MAX));
        let machine = Self {
            cpu: SpinProcessor {
                steps: Arc::clone(&steps),
                run_to_target: Arc::clone(&run_to_target),
                stop: StopFlag::new(),
                panic_on_step: Arc::clone(&panic_on_step),
                pc: 0,
            },
            frame: FrameBuffer::new(1, 1),
            input: Arc::new(NullInput),
        };
        (machine, steps, panic_on_step, run_to_target)
    }
}

impl Machine for SpinMachine {
    fn name(&self) -> &str {
        "spin"
    }

    fn processor(&self) -> &dyn Processor {
        &self.cpu
    }

    fn processor_mut(&mut self) -> &mut dyn Processor {
        &mut self.cpu
    }

    fn reset(&mut self) {
        self.cpu.reset();
    }

    fn display_size(&self) -> (u32, u32) {
        (1, 1)
    }

    fn frame_buffer(&self) -> FrameBuffer {
        self.frame.clone()
    }

    fn input(&self) -> Arc<dyn InputSink> {
        self.input.clone()
    }
}

fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        thread::sleep(Duration::from_millis(1));
    }
    panic!("condition not reached within a second");
}

#[test]
fn run_then_stop_waits_for_the_boundary() {
    let (machine, steps, _, _) = SpinMachine::new();
    let computer = Computer::new(Box::new(machine));

    computer.start();
    wait_until(|| computer.is_running());
    wait_until(|| steps.load(Ordering::SeqCst) > 3);

    computer.stop();
    // set_action(Stop) may only return once the worker has left the action.
    assert!(!computer.is_running());

    // No instruction may begin after the stop boundary.
    let after_stop = steps.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(25));
    assert_eq!(steps.load(Ordering::SeqCst), after_stop);
}

#[test]
fn stop_request_from_another_thread() {
    let (machine, steps, _, _) = SpinMachine::new();
    let computer = Arc::new(Computer::new(Box::new(machine)));

    computer.start();
    wait_until(|| steps.load(Ordering::SeqCst) > 0);

    let remote = Arc::clone(&computer);
    let stopper = thread::spawn(move || {
        remote.stop();
        assert!(!remote.is_running());
    });
    stopper.join().expect("stopper thread");
    assert!(!computer.is_running());
}

#[test]
fn step_executes_exactly_one_instruction() {
    let (machine, steps, _, _) = SpinMachine::new();
    let computer = Computer::new(Box::new(machine));

    computer.step();
    wait_until(|| steps.load(Ordering::SeqCst) == 1);
    wait_until(|| !computer.is_running());
    assert_eq!(computer.mode(), Action::Step);

    thread::sleep(Duration::from_millis(10));
    assert_eq!(steps.load(Ordering::SeqCst), 1);
}

#[test]
fn run_to_target_reaches_the_processor() {
    let (machine, _, _, run_to_target) = SpinMachine::new();
    let computer = Computer::new(Box::new(machine));

    computer.set_run_to(7);
    computer.start();
    wait_until(|| run_to_target.load(Ordering::SeqCst) == 7);
    wait_until(|| !computer.is_running());
    // The stub's run_to stops once PC reaches the target.
    assert_eq!(computer.program_counter(), 7);
}

#[test]
fn halt_listener_fires_when_an_action_completes() {
    let (machine, _, _, _) = SpinMachine::new();
    let computer = Computer::new(Box::new(machine));

    let fired = Arc::new(AtomicU64::new(0));
    let observer = Arc::clone(&fired);
    computer.add_halt_listener(move || {
        observer.fetch_add(1, Ordering::SeqCst);
    });

    computer.step();
    wait_until(|| fired.load(Ordering::SeqCst) == 1);
}

#[test]
fn worker_contains_a_panicking_action() {
    let (machine, steps, panic_on_step, _) = SpinMachine::new();
    let computer = Computer::new(Box::new(machine));

    panic_on_step.store(true, Ordering::SeqCst);
    computer.step();
    wait_until(|| !panic_on_step.load(Ordering::SeqCst));
    wait_until(|| !computer.is_running());

    // The scheduler must still be alive and able to run further actions.
    computer.step();
    wait_until(|| steps.load(Ordering::SeqCst) == 1);
}

#[test]
fn dispose_joins_the_worker() {
    let (machine, steps, _, _) = SpinMachine::new();
    let mut computer = Computer::new(Box::new(machine));

    computer.start();
    wait_until(|| steps.load(Ordering::SeqCst) > 0);

    computer.dispose();
    let after = steps.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(25));
    assert_eq!(steps.load(Ordering::SeqCst), after);
}

#[test]
fn reset_restarts_a_running_machine() {
    let (machine, steps, _, _) = SpinMachine::new();
    let computer = Computer::new(Box::new(machine));

    computer.start();
    wait_until(|| steps.load(Ordering::SeqCst) > 0);

    computer.reset();
    // Reset restarts the run action after resetting the processor.
    wait_until(|| computer.is_running());
    computer.stop();
}
