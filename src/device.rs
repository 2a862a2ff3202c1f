//! Device capability model (`SPEC_FULL.md` §4.5 / §9 design note).
//!
//! The original register-handler tables are populated by linker-section constructors at process
//! startup; a device is whatever file-scope macro invocations said it was. Here a device is an
//! explicit capability table instead: a name plus up to three optional trait objects. A device
//! that has no executable behavior (a ROM) simply leaves `execute` empty.

use crate::memory::AddressMap;
use crate::scheduler::Scheduler;

/// A device that advances when the scheduler gives it a time slice.
pub trait Execute {
    /// Advance by `slice_ns` nanoseconds of emulated time. Must not block on host I/O.
    fn run(&mut self, slice_ns: i64, scheduler: &mut Scheduler);
}

/// A device that contributes regions to the unified address space.
pub trait MemoryMapped {
    /// Returns this device's address map entries, to be flattened at machine init.
    fn address_map(&self) -> AddressMap;
}

/// Optional debug/inspection surface (register dump, disassembly, etc.).
pub trait DebugInspect {
    fn debug_name(&self) -> &str;
    fn debug_dump(&self) -> String {
        String::new()
    }
}

/// A device's capability table. Concrete devices implement only the traits that apply to them
/// and wrap themselves in the matching `Some(Box::new(..))` slots.
pub struct DeviceSlot {
    pub name: &'static str,
    pub execute: Option<Box<dyn Execute>>,
    pub memory: Option<Box<dyn MemoryMapped>>,
    pub debug: Option<Box<dyn DebugInspect>>,
    /// Whether this device's `run` should currently be called by the scheduler tick loop.
    pub running: bool,
}

impl DeviceSlot {
    pub fn new(name: &'static str) -> Self {
        DeviceSlot {
            name,
            execute: None,
            memory: None,
            debug: None,
            running: true,
        }
    }

    pub fn with_execute(mut self, exec: Box<dyn Execute>) -> Self {
        self.execute = Some(exec);
        self
    }

    pub fn with_memory(mut self, mem: Box<dyn MemoryMapped>) -> Self {
        self.memory = Some(mem);
        self
    }

    pub fn with_debug(mut self, dbg: Box<dyn DebugInspect>) -> Self {
        self.debug = Some(dbg);
        self
    }
}
