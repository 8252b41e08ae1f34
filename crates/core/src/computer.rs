//! The computer scheduler: one worker thread per machine.
//!
//! Controller threads never execute CPU work themselves; they request
//! actions and the dedicated worker performs them. The transition protocol
//! guarantees at most one action is ever in flight: a new request first
//! stops the running one and waits it out, so two logical threads can never
//! mutate processor or memory state concurrently.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::AudioBuffer;
use crate::input::InputSink;
use crate::machine::{LoadError, Machine};
use crate::processor::{Register, StopFlag};
use crate::types::FrameBuffer;

/// Scheduling actions. `Stop` doubles as "no action pending".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Stop,
    Step,
    StepOver,
    Run,
}

/// Interval at which `set_action` re-checks `running` while waiting out an
/// in-flight action.
const STOP_POLL: Duration = Duration::from_millis(5);

struct Control {
    /// Most recently requested, not yet consumed action.
    action: Action,
    /// The action currently (or last) executed by the worker.
    mode: Action,
    run_to: Option<u16>,
    disposed: bool,
}

struct Shared {
    control: Mutex<Control>,
    wake: Condvar,
    running: AtomicBool,
    halt_listeners: Mutex<Vec<Box<dyn Fn() + Send>>>,
}

type MachineCell = Arc<Mutex<Box<dyn Machine>>>;

pub struct Computer {
    shared: Arc<Shared>,
    machine: MachineCell,
    stop: StopFlag,
    input: Arc<dyn InputSink>,
    frame: FrameBuffer,
    audio: Option<AudioBuffer>,
    name: String,
    display_size: (u32, u32),
    display_scale: u32,
    worker: Option<JoinHandle<()>>,
}

impl Computer {
    /// Take ownership of a machine and start its worker thread.
    pub fn new(machine: Box<dyn Machine>) -> Self {
        let name = machine.name().to_string();
        let stop = machine.processor().stop_flag();
        let input = machine.input();
        let frame = machine.frame_buffer();
        let audio = machine.audio_buffer();
        let display_size = machine.display_size();
        let display_scale = machine.display_scale();

        let shared = Arc::new(Shared {
            control: Mutex::new(Control {
                action: Action::Stop,
                mode: Action::Stop,
                run_to: None,
                disposed: false,
            }),
            wake: Condvar::new(),
            running: AtomicBool::new(false),
            halt_listeners: Mutex::new(Vec::new()),
        });
        let machine: MachineCell = Arc::new(Mutex::new(machine));

        let worker = {
            let shared = Arc::clone(&shared);
            let machine = Arc::clone(&machine);
            thread::Builder::new()
                .name(format!("{name}-worker"))
                .spawn(move || worker_loop(&shared, &machine))
                .expect("spawn computer worker thread")
        };

        Self {
            shared,
            machine,
            stop,
            input,
            frame,
            audio,
            name,
            display_size,
            display_scale,
            worker: Some(worker),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_size(&self) -> (u32, u32) {
        self.display_size
    }

    pub fn display_scale(&self) -> u32 {
        self.display_scale
    }

    pub fn frame_buffer(&self) -> FrameBuffer {
        self.frame.clone()
    }

    pub fn audio_buffer(&self) -> Option<AudioBuffer> {
        self.audio.clone()
    }

    /// Forward a host key transition to the machine's input hardware.
    /// Safe while an action is running.
    pub fn key_event(&self, key: crate::input::HostKey, pressed: bool) {
        self.input.key_event(key, pressed);
    }

    /// True exactly while the worker is inside an action's execution.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// The action the worker most recently executed.
    pub fn mode(&self) -> Action {
        self.lock_control().mode
    }

    /// Install a new action, first waiting out any in-flight one.
    ///
    /// Returns only after the previous action has actually stopped, so a
    /// caller that requests `Stop` knows no instruction past the boundary
    /// will execute.
    pub fn set_action(&self, action: Action) {
        if self.is_running() && action != Action::Run {
            self.stop.request();
            while self.is_running() {
                thread::sleep(STOP_POLL);
            }
        }
        let mut control = self.lock_control();
        control.action = action;
        self.shared.wake.notify_one();
    }

    pub fn start(&self) {
        self.set_action(Action::Run);
    }

    pub fn stop(&self) {
        self.set_action(Action::Stop);
    }

    pub fn step(&self) {
        self.set_action(Action::Step);
    }

    pub fn step_over(&self) {
        self.set_action(Action::StepOver);
    }

    /// One-shot breakpoint for the next `Run` action, checked after each
    /// instruction retires.
    pub fn set_run_to(&self, address: u16) {
        self.lock_control().run_to = Some(address);
    }

    pub fn clear_run_to(&self) {
        self.lock_control().run_to = None;
    }

    /// Called after every action completes, on the worker thread.
    pub fn add_halt_listener(&self, listener: impl Fn() + Send + 'static) {
        self.shared
            .halt_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(listener));
    }

    /// Run `f` with exclusive access to the machine. Blocks until any
    /// in-flight action completes; stop first for prompt access.
    pub fn with_machine<R>(&self, f: impl FnOnce(&mut dyn Machine) -> R) -> R {
        let mut machine = self
            .machine
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(machine.as_mut())
    }

    /// Register snapshot; meaningful only while stopped.
    pub fn registers(&self) -> Vec<Register> {
        self.with_machine(|machine| machine.processor().registers())
    }

    pub fn program_counter(&self) -> u16 {
        self.with_machine(|machine| machine.processor().program_counter())
    }

    /// Load a program image from disk into the machine.
    pub fn load_file(&self, path: &Path) -> Result<(), LoadError> {
        let image = std::fs::read(path)?;
        self.with_machine(|machine| machine.load_file(&image))
    }

    /// Stop, reset CPU and peripherals, and restart if we were running.
    pub fn reset(&self) {
        let was_running = self.is_running();
        self.stop();
        self.with_machine(|machine| machine.reset());
        if was_running {
            self.start();
        }
    }

    /// Terminal shutdown: no execution survives this call.
    pub fn dispose(&mut self) {
        {
            let mut control = self.lock_control();
            control.disposed = true;
        }
        self.stop.request();
        self.shared.wake.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    fn lock_control(&self) -> std::sync::MutexGuard<'_, Control> {
        self.shared
            .control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Computer {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn worker_loop(shared: &Shared, machine: &MachineCell) {
    loop {
        let (mode, run_to) = {
            let mut control = shared
                .control
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            loop {
                if control.disposed {
                    return;
                }
                if control.action != Action::Stop {
                    break;
                }
                control = match shared.wake.wait(control) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
            }
            let mode = control.action;
            control.action = Action::Stop;
            control.mode = mode;
            (mode, control.run_to)
        };

        shared.running.store(true, Ordering::Release);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut machine = machine.lock().unwrap_or_else(PoisonError::into_inner);
            machine.begin_emulation();
            machine.emulate(mode, run_to);
            machine.end_emulation();
        }));
        shared.running.store(false, Ordering::Release);

        if let Err(payload) = outcome {
            // Contained recovery: a fault in one action must not take the
            // scheduler thread down with it.
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            log::error!("emulation action {mode:?} aborted: {message}");
        }

        let listeners = shared
            .halt_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener();
        }
    }
}
