//! The device aggregate (`SPEC_FULL.md` §4.5).
//!
//! Grounded on `examples/other_examples/9a694243_emudev-org-nullDC__crates-dreamcast-src-lib.rs.rs`'s
//! `Dreamcast`/`init_dreamcast`: canonical guest addresses and mirror ranges for system RAM,
//! video RAM, and audio RAM are wired once at construction, generalized here into explicit
//! `AddressMap` entries instead of per-call `sh4_register_mem_buffer` invocations.

use crate::config::MachineConfig;
use crate::device::DeviceSlot;
use crate::error::Result;
use crate::host::HostCallbacks;
use crate::interrupt::InterruptController;
use crate::memory::{self, AddressMap, MemorySystem};
use crate::scheduler::Scheduler;
use crate::ta::{PvrRegisterSnapshot, TaProcessor};
use log::info;
use std::cell::RefCell;
use std::rc::Rc;

pub struct Machine {
    pub memory: MemorySystem,
    pub scheduler: Scheduler,
    pub devices: Vec<DeviceSlot>,
    pub ta: TaProcessor,
    /// Shared so the render-complete timer's callback — which outlives the `start_render` call
    /// that schedules it — can still record interrupts without borrowing `Machine` itself.
    pub interrupts: Rc<RefCell<InterruptController>>,
    pub host: Box<dyn HostCallbacks>,
    system_ram_region: memory::RegionHandle,
    video_ram_region: memory::RegionHandle,
    running: bool,
}

impl Machine {
    pub fn new(config: &MachineConfig, host: Box<dyn HostCallbacks>) -> Result<Self> {
        let mut memory = MemorySystem::new();
        let system_ram = memory.create_physical_region("system-ram", config.system_ram_size)?;
        let video_ram = memory.create_physical_region("video-ram", config.video_ram_size)?;
        let audio_ram = memory.create_physical_region("audio-ram", config.audio_ram_size)?;
        let boot_rom = memory.create_physical_region("boot-rom", config.boot_rom_size)?;

        // SH-4 (address space 0) view of the bus: system RAM mirrors across the upper-cache
        // alias bit the way the original's `0x0c`/`0x8c`/`0xac` prefixes alias the same bytes.
        let sh4_map = AddressMap::new()
            .mount_region(0x0000_0000, 0xffff_ffff, config.boot_rom_size as u32, boot_rom, 0)
            .mount_region(0x0c00_0000, 0x1fff_ffff, config.system_ram_size as u32, system_ram, 0)
            .mount_region(0x0500_0000, 0x1fff_ffff, config.video_ram_size as u32, video_ram, 0);

        // ARM7 (address space 1) sees only audio RAM and a 2 MiB mirror of system RAM's first
        // window, matching the dual-view requirement in `SPEC_FULL.md` §4.1.1.
        let arm7_map = AddressMap::new().mount_region(0x0000_0000, 0x001f_ffff, config.audio_ram_size as u32, audio_ram, 0);

        memory.init(&[sh4_map, arm7_map])?;

        info!(
            "machine initialized: system_ram={:#x} video_ram={:#x} audio_ram={:#x}",
            config.system_ram_size, config.video_ram_size, config.audio_ram_size
        );

        Ok(Machine {
            memory,
            scheduler: Scheduler::new(config.timer_pool_capacity),
            devices: Vec::new(),
            ta: TaProcessor::new(config.texture_cache_capacity, config.render_deadline_ns),
            interrupts: Rc::new(RefCell::new(InterruptController::new())),
            host,
            system_ram_region: system_ram,
            video_ram_region: video_ram,
            running: true,
        })
    }

    pub fn register_device(&mut self, slot: DeviceSlot) {
        self.devices.push(slot);
    }

    /// Single entry point a host calls once per scheduling quantum.
    pub fn tick(&mut self, delta_ns: i64) {
        if !self.running {
            return;
        }
        self.scheduler.tick(delta_ns, &mut self.devices);
    }

    pub fn shutdown(&mut self) {
        self.running = false;
        self.scheduler.running = false;
    }

    pub fn ta_list_init(&mut self, base_address: u32) {
        self.ta.list_init(base_address);
    }

    pub fn ta_list_cont(&mut self) {
        self.ta.list_cont();
    }

    pub fn ta_fifo_write_poly(&mut self, data: &[u8]) -> Result<()> {
        let interrupts = self.interrupts.clone();
        self.ta
            .fifo_write_poly(data, move |line| interrupts.borrow_mut().raise(crate::ta::InterruptLine::List(line)))
    }

    pub fn ta_start_render(&mut self, param_base: u32, regs: &PvrRegisterSnapshot, video_ram: &[u8]) -> Result<()> {
        let interrupts = self.interrupts.clone();
        self.ta.start_render(
            param_base,
            regs,
            video_ram,
            &mut self.scheduler,
            self.host.as_mut(),
            move |line| interrupts.borrow_mut().raise(line),
        )
    }

    pub fn ta_finish_render(&mut self) {
        self.ta.finish_render(self.host.as_mut());
    }

    pub fn system_ram_region(&self) -> memory::RegionHandle {
        self.system_ram_region
    }

    pub fn video_ram_region(&self) -> memory::RegionHandle {
        self.video_ram_region
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NullHost;

    #[test]
    fn machine_constructs_and_ticks() {
        let config = MachineConfig {
            system_ram_size: 4096,
            video_ram_size: 4096,
            audio_ram_size: 4096,
            boot_rom_size: 4096,
            boot_flash_size: 4096,
            ..MachineConfig::default()
        };
        let mut machine = Machine::new(&config, Box::new(NullHost::default())).unwrap();
        machine.tick(1000);
        assert_eq!(machine.scheduler.base_time(), 1000);
    }
}
