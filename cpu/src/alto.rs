//! The whole machine: processor, main memory, timer and devices.
//!
//! The host drives the machine in slices.  [`Alto::run_for`] is the
//! usual loop: fire every timer event which is due, then execute
//! microcode until the next event (or the end of the requested
//! time), and repeat.
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use tracing::{event, span, Level};

use base::prelude::*;

use super::config::{Configuration, ConfigurationError};
use super::control::{timing::round_up_to_cycle, ControlUnit, Cpu};
use super::device::{Device, DeviceId, DeviceManager};
use super::memory::{MainMemory, MEMORY_WORDS};
use super::microcode::{ControlStore, LoadError};
use super::snapshot::{RestoreError, Snapshot};
use super::timer::{Timer, TimerId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    Configuration(ConfigurationError),
    Load(LoadError),
}

impl Display for BuildError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            BuildError::Configuration(e) => write!(f, "bad machine configuration: {e}"),
            BuildError::Load(e) => write!(f, "cannot load control store: {e}"),
        }
    }
}

impl Error for BuildError {}

impl From<ConfigurationError> for BuildError {
    fn from(e: ConfigurationError) -> BuildError {
        BuildError::Configuration(e)
    }
}

impl From<LoadError> for BuildError {
    fn from(e: LoadError) -> BuildError {
        BuildError::Load(e)
    }
}

#[derive(Debug)]
pub struct Alto {
    control: ControlUnit,
    memory: MainMemory,
    timer: Timer,
    devices: DeviceManager,
}

impl Alto {
    /// Build a machine from a decoded microcode image (every page of
    /// the configured layout, ROM first) and the contents of the
    /// constant and dispatch PROMs.
    pub fn new(
        config: Configuration,
        microcode: &[u32],
        constants: &[u16],
        dispatch: &[u8],
    ) -> Result<Alto, BuildError> {
        config.validate()?;
        let store = ControlStore::new(config.layout, microcode, constants, dispatch)?;
        event!(
            Level::INFO,
            "Alto with {}, {} S bank(s)",
            config.layout,
            config.s_banks
        );
        Ok(Alto {
            control: ControlUnit::new(config, store),
            memory: MainMemory::new(),
            timer: Timer::new(),
            devices: DeviceManager::new(),
        })
    }

    /// Attach a device.  It becomes the owner of the tasks it names
    /// and implements the function slots it claims.  Claiming a task
    /// or slot which is already taken is fatal.
    pub fn attach(&mut self, device: Box<dyn Device>) -> DeviceId {
        let name = device.name();
        let slots = device.functions();
        let id = self.devices.attach(device);
        for slot in slots {
            self.control.claim(slot, id, name.clone());
        }
        event!(Level::DEBUG, "attached {name} as {id}");
        id
    }

    #[must_use]
    pub fn cpu(&self) -> &Cpu {
        self.control.cpu()
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu {
        self.control.cpu_mut()
    }

    #[must_use]
    pub fn control(&self) -> &ControlUnit {
        &self.control
    }

    #[must_use]
    pub fn memory(&self) -> &MainMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut MainMemory {
        &mut self.memory
    }

    #[must_use]
    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    #[must_use]
    pub fn devices(&self) -> &DeviceManager {
        &self.devices
    }

    /// The current simulated time.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.timer.now()
    }

    pub fn wake(&mut self, task: TaskNumber) {
        self.control.cpu_mut().wake(task);
    }

    /// Schedule a timer event on behalf of device `owner`.
    pub fn insert_timer(&mut self, owner: DeviceId, delay: Duration, arg: i32, name: &str) -> TimerId {
        self.timer.insert(owner, delay, arg, name)
    }

    pub fn remove_timer(&mut self, id: TimerId) -> bool {
        self.timer.remove(id)
    }

    #[must_use]
    pub fn time_until_next(&self) -> Option<Duration> {
        self.timer.time_until_next()
    }

    /// Execute microcode for at most `budget`.  Returns the time
    /// actually consumed, which is less than `budget` when a timer
    /// event falls due during the slice.
    pub fn execute(&mut self, budget: Duration) -> Duration {
        let span = span!(Level::DEBUG, "slice", t=?self.timer.now(), budget=?budget);
        let _enter = span.enter();
        let consumed =
            self.control
                .execute(budget, &mut self.memory, &mut self.timer, &mut self.devices);
        event!(Level::TRACE, "slice consumed {consumed:?}");
        consumed
    }

    /// Fire the earliest timer event if it is due.  The simulated
    /// clock reads the event's own time while its callback runs.
    pub fn fire_due(&mut self) -> Option<TimerId> {
        let ev = self.timer.pop_due()?;
        let resume = self.timer.now();
        self.timer.set_now(ev.when);
        match self.devices.get_mut(ev.owner) {
            Some(device) => {
                event!(
                    Level::TRACE,
                    "firing {} {} for {} at {:?}",
                    ev.name,
                    ev.id,
                    ev.owner,
                    ev.when
                );
                let mut dp = self
                    .control
                    .datapath(&mut self.memory, &mut self.timer, Some(ev.owner));
                device.timer_fired(ev.arg, &mut dp);
            }
            None => {
                event!(
                    Level::WARN,
                    "dropping timer event {} {}: {} is not attached",
                    ev.name,
                    ev.id,
                    ev.owner
                );
            }
        }
        self.timer.set_now(resume);
        Some(ev.id)
    }

    /// Run the machine for `duration` of simulated time, firing
    /// timer events as they fall due.  Returns the simulated time
    /// which passed; this may overshoot `duration` by part of a
    /// microcycle.
    pub fn run_for(&mut self, duration: Duration) -> Duration {
        let start = self.timer.now();
        let end = start + duration;
        while self.timer.now() < end {
            while self.fire_due().is_some() {}
            let left = end - self.timer.now();
            let budget = match self.timer.time_until_next() {
                Some(until_next) => left.min(until_next),
                None => left,
            };
            self.execute(round_up_to_cycle(budget));
        }
        self.timer.now() - start
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            layout: self.control.store().layout(),
            cpu: self.control.cpu().clone(),
            control_ram: self.control.store().ram().to_vec(),
            memory: self.memory.clone(),
            timer: self.timer.state(),
        }
    }

    /// Return the machine to the state recorded in `snapshot`.
    /// Attached devices are left as they are.
    pub fn restore(&mut self, snapshot: Snapshot) -> Result<(), RestoreError> {
        let layout = self.control.store().layout();
        if snapshot.layout != layout {
            return Err(RestoreError::LayoutMismatch {
                machine: layout,
                snapshot: snapshot.layout,
            });
        }
        let banks = self.control.cpu().s.len();
        if snapshot.cpu.s.len() != banks {
            return Err(RestoreError::SBankMismatch {
                machine: banks,
                snapshot: snapshot.cpu.s.len(),
            });
        }
        let store_words = layout.words();
        let current = [
            ("MPC".to_string(), snapshot.cpu.mpc),
            ("NEXT".to_string(), snapshot.cpu.next),
        ];
        let addresses = current.into_iter().chain(
            snapshot
                .cpu
                .tasks
                .iter()
                .zip(TaskNumber::all())
                .map(|(ctx, task)| (format!("NEXT of task {task}"), ctx.next)),
        );
        for (register, addr) in addresses {
            if addr.index() >= store_words {
                return Err(RestoreError::AddressOutOfRange {
                    register,
                    addr,
                    store_words,
                });
            }
        }
        if snapshot.memory.len() != MEMORY_WORDS {
            return Err(RestoreError::MemorySize {
                expected: MEMORY_WORDS,
                found: snapshot.memory.len(),
            });
        }
        self.control.store_mut().restore_ram(&snapshot.control_ram)?;
        self.control.replace_cpu(snapshot.cpu);
        self.memory = snapshot.memory;
        self.timer = Timer::from_state(snapshot.timer);
        event!(Level::DEBUG, "restored snapshot taken at {:?}", self.timer.now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    use base::prelude::*;

    use super::Alto;
    use crate::config::Configuration;
    use crate::control::CYCLE;
    use crate::device::{Datapath, Device, FunctionSlot};
    use crate::memory::MEMORY_WORDS;
    use crate::microcode::{StoreLayout, CONSTANT_PROM_WORDS, DISPATCH_PROM_BYTES};
    use crate::snapshot::{RestoreError, Snapshot};

    const F1_TASK: u32 = 0o2;
    const F1_BLOCK: u32 = 0o3;

    fn word(rsel: u32, aluf: u32, bs: u32, f1: u32, load_t: bool, load_l: bool, next: u32) -> u32 {
        (rsel << 27)
            | (aluf << 23)
            | (bs << 20)
            | (f1 << 16)
            | (u32::from(load_t) << 11)
            | (u32::from(load_l) << 10)
            | next
    }

    fn machine(program: &[(usize, u32)]) -> Alto {
        let config = Configuration::default();
        let mut image = vec![0_u32; config.layout.words()];
        for (addr, w) in program {
            image[*addr] = *w;
        }
        Alto::new(
            config,
            &image,
            &vec![0o177777; CONSTANT_PROM_WORDS],
            &vec![0; DISPATCH_PROM_BYTES],
        )
        .expect("test images should be valid")
    }

    /// Records what happens to it.
    #[derive(Default)]
    struct Log {
        fired: Vec<(Duration, i32)>,
        activations: Vec<TaskNumber>,
    }

    struct Probe {
        name: &'static str,
        tasks: Vec<TaskNumber>,
        functions: Vec<FunctionSlot>,
        period: Option<Duration>,
        // Scheduled with no delay from the next microcycle tick.
        kick: Option<i32>,
        log: Rc<RefCell<Log>>,
    }

    impl Probe {
        fn new(name: &'static str) -> (Probe, Rc<RefCell<Log>>) {
            let log = Rc::new(RefCell::new(Log::default()));
            (
                Probe {
                    name,
                    tasks: Vec::new(),
                    functions: Vec::new(),
                    period: None,
                    kick: None,
                    log: Rc::clone(&log),
                },
                log,
            )
        }
    }

    impl Device for Probe {
        fn name(&self) -> String {
            self.name.to_string()
        }

        fn tasks(&self) -> Vec<TaskNumber> {
            self.tasks.clone()
        }

        fn functions(&self) -> Vec<FunctionSlot> {
            self.functions.clone()
        }

        fn early(&mut self, _slot: FunctionSlot, dp: &mut Datapath<'_>) {
            dp.drive_bus(0o1234);
        }

        fn activate(&mut self, task: TaskNumber, _dp: &mut Datapath<'_>) {
            self.log.borrow_mut().activations.push(task);
        }

        fn wants_cycle(&self) -> bool {
            self.kick.is_some()
        }

        fn cycle(&mut self, dp: &mut Datapath<'_>) {
            if let Some(arg) = self.kick.take() {
                dp.schedule(Duration::ZERO, arg, "kick");
            }
        }

        fn timer_fired(&mut self, arg: i32, dp: &mut Datapath<'_>) {
            self.log.borrow_mut().fired.push((dp.now(), arg));
            if let Some(period) = self.period {
                dp.schedule(period, arg + 1, "tick");
            }
        }
    }

    #[test]
    fn test_zero_delay_event_ends_slice_immediately() {
        let mut alto = machine(&[]);
        let (probe, log) = Probe::new("probe");
        let id = alto.attach(Box::new(probe));
        let ev = alto.insert_timer(id, Duration::ZERO, 7, "now");
        assert_eq!(alto.execute(CYCLE * 10), Duration::ZERO);
        assert_eq!(alto.fire_due(), Some(ev));
        assert_eq!(log.borrow().fired, vec![(Duration::ZERO, 7)]);
        assert_eq!(alto.fire_due(), None);
        assert_eq!(alto.execute(CYCLE * 10), CYCLE * 10);
    }

    #[test]
    fn test_event_scheduled_mid_slice_ends_it_at_the_boundary() {
        let mut alto = machine(&[]);
        let (mut probe, log) = Probe::new("kicker");
        probe.kick = Some(3);
        alto.attach(Box::new(probe));
        assert_eq!(alto.execute(CYCLE * 10), CYCLE);
        assert_eq!(alto.execute(CYCLE * 10), Duration::ZERO);
        assert!(alto.fire_due().is_some());
        assert_eq!(log.borrow().fired, vec![(CYCLE, 3)]);
        assert_eq!(alto.execute(CYCLE * 10), CYCLE * 10);
        assert!(alto.timer().is_empty());
    }

    #[test]
    fn test_queued_event_cuts_slice_short() {
        let mut alto = machine(&[]);
        let (probe, log) = Probe::new("probe");
        let id = alto.attach(Box::new(probe));
        let ev = alto.insert_timer(id, Duration::from_nanos(500), 1, "mid");
        // The first boundary at or after 500ns is the third.
        assert_eq!(alto.execute(CYCLE * 10), CYCLE * 3);
        assert_eq!(alto.time_until_next(), Some(Duration::ZERO));
        assert_eq!(alto.fire_due(), Some(ev));
        assert_eq!(log.borrow().fired, vec![(Duration::from_nanos(500), 1)]);
        assert_eq!(alto.now(), CYCLE * 3);
    }

    #[test]
    fn test_run_for_fires_periodic_events_on_time() {
        let mut alto = machine(&[]);
        let (mut probe, log) = Probe::new("ticker");
        let period = Duration::from_micros(1);
        probe.period = Some(period);
        let id = alto.attach(Box::new(probe));
        alto.insert_timer(id, period, 0, "tick");
        let elapsed = alto.run_for(Duration::from_micros(10));
        assert!(elapsed >= Duration::from_micros(10));
        assert!(elapsed < Duration::from_micros(10) + CYCLE);
        let expected: Vec<(Duration, i32)> = (1..=9)
            .map(|n: i32| (period * n as u32, n - 1))
            .collect();
        assert_eq!(log.borrow().fired, expected);
        // The tenth tick is still pending.
        assert_eq!(alto.timer().len(), 1);
    }

    #[test]
    fn test_task_owner_is_activated_on_switch() {
        let dwt = TaskNumber::DISPLAY_WORD;
        let mut alto = machine(&[
            (0, word(0, 0, 0, F1_TASK, false, false, 0)),
            (4, word(0, 0, 0, F1_BLOCK, false, false, 5)),
            (5, word(0, 0, 0, F1_TASK, false, false, 4)),
        ]);
        let (mut probe, log) = Probe::new("display");
        probe.tasks = vec![dwt];
        let id = alto.attach(Box::new(probe));
        assert_eq!(alto.devices().owner_of(dwt), Some(id));
        alto.wake(dwt);
        alto.execute(CYCLE * 10);
        assert_eq!(log.borrow().activations, vec![dwt]);
        assert_eq!(alto.cpu().task, TaskNumber::EMULATOR);
        assert_eq!(alto.cpu().wakeups, TaskNumber::EMULATOR.mask());
    }

    #[test]
    fn test_device_drives_bus_for_claimed_function() {
        let dwt = TaskNumber::DISPLAY_WORD;
        let mut alto = machine(&[
            (0, word(0, 0, 0, F1_TASK, false, false, 0)),
            (4, word(0, 0, 3, 0, true, false, 4)),
        ]);
        let (mut probe, _log) = Probe::new("display");
        probe.tasks = vec![dwt];
        probe.functions = vec![FunctionSlot::new(dwt, Field::Bs, 0o3)];
        alto.attach(Box::new(probe));
        alto.wake(dwt);
        alto.execute(CYCLE * 3);
        assert_eq!(alto.cpu().task, dwt);
        assert_eq!(alto.cpu().t, 0o1234);
    }

    #[test]
    #[should_panic(expected = "claimed BS function 00 of task 00, but it is already implemented")]
    fn test_claiming_a_core_function_is_fatal() {
        let mut alto = machine(&[]);
        let (mut probe, _log) = Probe::new("greedy");
        probe.functions = vec![FunctionSlot::new(TaskNumber::EMULATOR, Field::Bs, 0)];
        alto.attach(Box::new(probe));
    }

    #[test]
    #[should_panic(expected = "claimed task 05, which already belongs to cursor")]
    fn test_task_has_one_owner() {
        let mut alto = machine(&[]);
        for name in ["cursor", "imposter"] {
            let (mut probe, _log) = Probe::new(name);
            probe.tasks = vec![TaskNumber::CURSOR];
            alto.attach(Box::new(probe));
        }
    }

    #[test]
    fn test_snapshot_resumes_identically() {
        // R1 counts up by one every two cycles.
        let program = [
            (0, word(1, 0o5, 0, 0, false, true, 1)),
            (1, word(1, 0, 1, 0, false, false, 0)),
        ];
        let mut alto = machine(&program);
        let (mut probe, _log) = Probe::new("ticker");
        probe.period = Some(Duration::from_micros(3));
        let id = alto.attach(Box::new(probe));
        alto.insert_timer(id, Duration::from_micros(3), 0, "tick");
        alto.run_for(Duration::from_micros(5));
        assert!(alto.cpu().r[1] > 0);

        let snapshot = alto.snapshot();
        let json = serde_json::to_string(&snapshot).expect("snapshot should serialize");
        let decoded: Snapshot = serde_json::from_str(&json).expect("snapshot should deserialize");
        assert_eq!(snapshot, decoded);

        let mut copy = machine(&program);
        let (mut probe, _log) = Probe::new("ticker");
        probe.period = Some(Duration::from_micros(3));
        copy.attach(Box::new(probe));
        copy.restore(decoded).expect("snapshot should match the machine");

        alto.run_for(Duration::from_micros(7));
        copy.run_for(Duration::from_micros(7));
        assert_eq!(alto.snapshot(), copy.snapshot());
    }

    #[test]
    fn test_restore_checks_layout() {
        let mut alto = machine(&[]);
        let mut snapshot = alto.snapshot();
        snapshot.layout = StoreLayout::Rom1kRam3k;
        assert!(alto.restore(snapshot).is_err());
    }

    #[test]
    fn test_restore_rejects_out_of_range_state() {
        let mut alto = machine(&[]);
        let words = alto.control().store().layout().words();
        let beyond = MicroAddress::new(words / PAGE_SIZE, 0);

        let mut snapshot = alto.snapshot();
        snapshot.cpu.tasks[TaskNumber::CURSOR.index()].next = beyond;
        assert!(matches!(
            alto.restore(snapshot),
            Err(RestoreError::AddressOutOfRange { store_words, .. }) if store_words == words
        ));

        let mut snapshot = alto.snapshot();
        snapshot.cpu.next = beyond;
        assert!(matches!(
            alto.restore(snapshot),
            Err(RestoreError::AddressOutOfRange { .. })
        ));

        let json = serde_json::to_string(&alto.snapshot()).expect("snapshot should serialize");
        let mut value: serde_json::Value =
            serde_json::from_str(&json).expect("snapshot should parse");
        value["memory"]["words"]
            .as_array_mut()
            .expect("memory words should be an array")
            .truncate(10);
        let damaged: Snapshot = serde_json::from_value(value).expect("snapshot should deserialize");
        assert_eq!(
            alto.restore(damaged),
            Err(RestoreError::MemorySize {
                expected: MEMORY_WORDS,
                found: 10
            })
        );

        // The machine is untouched and still runs.
        assert_eq!(alto.execute(CYCLE * 4), CYCLE * 4);
    }
}
