//! The interface between the processor and peripheral logic.
//!
//! On the Alto most of each I/O controller is microcode running in
//! the controller's own task.  The hardware a controller adds is
//! small: it asserts its task's wakeup line, and it implements some
//! task-specific BS, F1 and F2 functions (for example the disk
//! controller's `←KSTAT` bus source).  A [`Device`] models that
//! hardware.  It claims dispatch slots when it is attached, and is
//! called back when its functions execute, when one of its tasks is
//! switched in, on every microcycle (if it asks for that) and when
//! its timer events fire.
use std::fmt::{self, Debug, Display, Formatter};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use base::prelude::*;

use super::config::Configuration;
use super::control::Cpu;
use super::fault::{fatal, Fault};
use super::memory::MainMemory;
use super::microcode::ControlStore;
use super::timer::{Timer, TimerId};

/// Identifies an attached device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(usize);

impl DeviceId {
    #[must_use]
    pub const fn new(n: usize) -> DeviceId {
        DeviceId(n)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl Display for DeviceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "device {}", self.0)
    }
}

/// The two halves of a microcycle.  In the early phase functions
/// drive the bus (combinational logic, before the ALU); in the late
/// phase they latch results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Early,
    Late,
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(match self {
            Phase::Early => "early",
            Phase::Late => "late",
        })
    }
}

/// Names one entry in the function dispatch tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionSlot {
    pub task: TaskNumber,
    pub field: Field,
    pub code: u8,
}

impl FunctionSlot {
    #[must_use]
    pub const fn new(task: TaskNumber, field: Field, code: u8) -> FunctionSlot {
        FunctionSlot { task, field, code }
    }
}

impl Display for FunctionSlot {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{} {:02o} of task {}", self.field, self.code, self.task)
    }
}

/// The access a function implementation has to the machine.
pub struct Datapath<'a> {
    pub cpu: &'a mut Cpu,
    pub memory: &'a mut MainMemory,
    pub timer: &'a mut Timer,
    pub store: &'a ControlStore,
    pub config: &'a Configuration,
    /// The device being called, if any.
    pub owner: Option<DeviceId>,
}

impl Datapath<'_> {
    /// AND `value` onto the bus.  The bus is wired-AND: anything
    /// driving it can only pull bits low.
    pub fn drive_bus(&mut self, value: u16) {
        self.cpu.bus &= value;
    }

    /// OR branch bits into the address of the next microinstruction.
    pub fn branch(&mut self, bits: u16) {
        self.cpu.next2 |= bits & PAGE_OFFSET_MASK;
    }

    #[must_use]
    pub fn now(&self) -> Duration {
        self.timer.now()
    }

    /// Schedule a timer event for the calling device.
    pub fn schedule(&mut self, delay: Duration, arg: i32, name: &str) -> TimerId {
        match self.owner {
            Some(owner) => self.timer.insert(owner, delay, arg, name),
            None => fatal(Fault::TimerWithoutOwner {
                name: name.to_owned(),
            }),
        }
    }
}

/// Peripheral hardware attached to the processor.  Every method has
/// a default which does nothing, so a device only implements what
/// it needs.
pub trait Device {
    fn name(&self) -> String;

    /// The tasks this device owns.  Their activate callbacks come
    /// here.
    fn tasks(&self) -> Vec<TaskNumber> {
        Vec::new()
    }

    /// The function slots this device implements.
    fn functions(&self) -> Vec<FunctionSlot> {
        Vec::new()
    }

    fn early(&mut self, _slot: FunctionSlot, _dp: &mut Datapath<'_>) {}

    fn late(&mut self, _slot: FunctionSlot, _dp: &mut Datapath<'_>) {}

    /// Called when one of this device's tasks becomes the running
    /// task.
    fn activate(&mut self, _task: TaskNumber, _dp: &mut Datapath<'_>) {}

    /// When true, `cycle` is called at the start of every
    /// microcycle.
    fn wants_cycle(&self) -> bool {
        false
    }

    fn cycle(&mut self, _dp: &mut Datapath<'_>) {}

    fn timer_fired(&mut self, _arg: i32, _dp: &mut Datapath<'_>) {}
}

struct AttachedDevice {
    inner: Box<dyn Device>,
    wants_cycle: bool,
}

impl Debug for AttachedDevice {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("AttachedDevice")
            .field("inner", &format_args!("<device: {}>", self.inner.name()))
            .field("wants_cycle", &self.wants_cycle)
            .finish()
    }
}

/// Manages the attached devices.  Does not correspond to any
/// physical component of the Alto.
#[derive(Debug, Default)]
pub struct DeviceManager {
    devices: Vec<AttachedDevice>,
    task_owners: [Option<DeviceId>; TASK_COUNT],
}

impl DeviceManager {
    #[must_use]
    pub fn new() -> DeviceManager {
        DeviceManager::default()
    }

    /// Add a device, giving it ownership of the tasks it names.
    pub(crate) fn attach(&mut self, device: Box<dyn Device>) -> DeviceId {
        let id = DeviceId(self.devices.len());
        for task in device.tasks() {
            if let Some(owner) = self.task_owners[task.index()] {
                fatal(Fault::TaskAlreadyOwned {
                    task,
                    owner: self.name(owner),
                    claimant: device.name(),
                });
            }
            self.task_owners[task.index()] = Some(id);
        }
        let wants_cycle = device.wants_cycle();
        self.devices.push(AttachedDevice {
            inner: device,
            wants_cycle,
        });
        id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    #[must_use]
    pub fn name(&self, id: DeviceId) -> String {
        self.devices
            .get(id.0)
            .map_or_else(|| format!("<unattached {id}>"), |d| d.inner.name())
    }

    #[must_use]
    pub fn owner_of(&self, task: TaskNumber) -> Option<DeviceId> {
        self.task_owners[task.index()]
    }

    pub(crate) fn get_mut(&mut self, id: DeviceId) -> Option<&mut (dyn Device + 'static)> {
        self.devices.get_mut(id.0).map(|d| d.inner.as_mut())
    }

    /// Call `f` for each device which wants a call on every
    /// microcycle.
    pub(crate) fn for_each_cycling<F>(&mut self, mut f: F)
    where
        F: FnMut(DeviceId, &mut dyn Device),
    {
        for (i, d) in self.devices.iter_mut().enumerate() {
            if d.wants_cycle {
                f(DeviceId(i), d.inner.as_mut());
            }
        }
    }
}
