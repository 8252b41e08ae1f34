//! The abstract processor contract and its shared execution state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::bus::Bus;
use crate::device::IoBus;

/// Cooperative stop line shared between a CPU and its controller.
///
/// A request takes effect at the next instruction boundary; execution is
/// never interrupted mid-instruction.
#[derive(Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Execution state every CPU core embeds: the monotonic cycle counter, the
/// clock rate, the pending-interrupt mask, the stop line, and the I/O bus.
pub struct ProcessorState {
    cycles: u64,
    cycles_per_second: u64,
    interrupt_pending: u8,
    stop: StopFlag,
    pub io: IoBus,
}

impl ProcessorState {
    pub fn new(cycles_per_second: u64) -> Self {
        Self {
            cycles: 0,
            cycles_per_second,
            interrupt_pending: 0,
            stop: StopFlag::new(),
            io: IoBus::new(),
        }
    }

    /// Charge `count` T-states. Without an observing bus this is a single
    /// addition; with one, the counter advances one unit at a time and the
    /// bus callback fires after each unit, so every T-state is visible to
    /// the machine bridge.
    pub fn cycle<B: Bus + ?Sized>(&mut self, bus: &mut B, count: u32) {
        if bus.wants_cycles() {
            for _ in 0..count {
                self.cycles += 1;
                bus.cycle(self);
            }
        } else {
            self.cycles += u64::from(count);
        }
    }

    /// Zero the cycle counter. Register and interrupt state belong to the
    /// concrete CPU and are reset there.
    pub fn reset(&mut self) {
        self.cycles = 0;
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn cycles_per_second(&self) -> u64 {
        self.cycles_per_second
    }

    pub fn set_cycles_per_second(&mut self, value: u64) {
        self.cycles_per_second = value;
    }

    pub fn set_interrupt(&mut self, mask: u8) {
        self.interrupt_pending |= mask;
    }

    pub fn clear_interrupt(&mut self, mask: u8) {
        self.interrupt_pending &= !mask;
    }

    pub fn interrupt_pending(&self) -> u8 {
        self.interrupt_pending
    }

    pub fn stop(&self) -> StopFlag {
        self.stop.clone()
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.is_requested()
    }

    /// Open-collector port read: AND across the input mappings.
    pub fn input(&mut self, port: u16) -> u8 {
        self.io.input(port)
    }

    /// Unconditional broadcast to the output mappings.
    pub fn output(&mut self, port: u16, value: u8) {
        self.io.output(port, value);
    }
}

/// One row of a register snapshot, for debug views.
#[derive(Debug, Clone, Serialize)]
pub struct Register {
    pub name: &'static str,
    pub bits: u8,
    pub value: u16,
}

/// The externally observable CPU contract.
///
/// `run` and `run_to` are cooperative do-while loops: the stop line is
/// sampled only between instructions, and `run_to` checks the program
/// counter after an instruction retires, so at least one instruction always
/// executes even when the target is already current.
pub trait Processor: Send {
    /// Execute exactly one instruction, charging its true T-state cost and
    /// honouring pending unmasked interrupts at the boundary.
    fn step(&mut self);

    /// Like `step`, but a subroutine-call instruction runs to completion of
    /// the called routine before returning.
    fn step_over(&mut self);

    /// Step until a stop is requested.
    fn run(&mut self);

    /// Step until a stop is requested or the program counter equals
    /// `address` after an instruction retires.
    fn run_to(&mut self, address: u16);

    fn reset(&mut self);

    fn stop_flag(&self) -> StopFlag;

    fn cycles(&self) -> u64;

    fn cycles_per_second(&self) -> u64;

    fn set_cycles_per_second(&mut self, value: u64);

    fn program_counter(&self) -> u16;

    fn set_program_counter(&mut self, value: u16);

    fn set_interrupt(&mut self, mask: u8);

    fn clear_interrupt(&mut self, mask: u8);

    /// Snapshot of the register file for debuggers.
    fn registers(&self) -> Vec<Register>;
}
