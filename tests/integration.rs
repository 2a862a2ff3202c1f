//! Cross-module scenarios exercising the public surface the way a host embedding this crate
//! would: constructing a `Machine`, driving it through the scheduler, and feeding the TA a
//! display list end to end.

use dc_core::host::NullHost;
use dc_core::jit::ir::{IrFunction, Opcode, Ty};
use dc_core::jit::regalloc::{allocate_block, MachineReg, PermissiveConstraints, RegClass};
use dc_core::ta::PvrRegisterSnapshot;
use dc_core::{Machine, MachineConfig};

fn small_config() -> MachineConfig {
    MachineConfig {
        system_ram_size: 4096,
        video_ram_size: 4096,
        audio_ram_size: 4096,
        boot_rom_size: 4096,
        boot_flash_size: 4096,
        render_deadline_ns: 1_000_000,
        texture_cache_capacity: 16,
        timer_pool_capacity: 16,
        ..MachineConfig::default()
    }
}

#[test]
fn machine_boots_and_advances_emulated_time_without_devices() {
    let mut machine = Machine::new(&small_config(), Box::new(NullHost::default())).unwrap();
    machine.tick(16_666_667);
    machine.tick(16_666_667);
    assert_eq!(machine.scheduler.base_time(), 2 * 16_666_667);
}

#[test]
fn poly_list_end_to_end_raises_list_interrupt_and_render_completes() {
    let mut machine = Machine::new(&small_config(), Box::new(NullHost::default())).unwrap();

    machine.ta_list_init(0x1000_0000);

    // One untextured opaque-list polygon header followed by an end-of-list command, each
    // padded to the 32-byte command boundary the parser re-evaluates on.
    let mut poly = vec![0u8; 32];
    let pcw: u32 = 4u32 << 29; // PolyOrVolume, Opaque list (list type bits default to 0)
    poly[0..4].copy_from_slice(&pcw.to_le_bytes());
    machine.ta_fifo_write_poly(&poly).unwrap();

    let mut end = vec![0u8; 32];
    let end_pcw: u32 = 0u32 << 29; // EndOfList
    end[0..4].copy_from_slice(&end_pcw.to_le_bytes());
    machine.ta_fifo_write_poly(&end).unwrap();

    assert_eq!(machine.interrupts.borrow().count(dc_core::ta::InterruptLine::List(
        dc_core::ta::context::ListInterrupt::Opaque
    )), 1);

    let regs = PvrRegisterSnapshot::default();
    let video_ram = vec![0u8; 4096];
    machine.ta_start_render(0x1000_0000, &regs, &video_ram).unwrap();

    // Advance past the render deadline; the TA's internal timer should fire and raise all
    // three render-done interrupt lines.
    machine.tick(1_000_000);
    assert_eq!(machine.interrupts.borrow().count(dc_core::ta::InterruptLine::RenderDoneVideo), 1);
    assert_eq!(machine.interrupts.borrow().count(dc_core::ta::InterruptLine::RenderDoneImage), 1);
    assert_eq!(machine.interrupts.borrow().count(dc_core::ta::InterruptLine::RenderDoneTransfer), 1);

    machine.ta_finish_render();
}

#[test]
fn ta_list_cont_preserves_partial_command_across_restart() {
    let mut machine = Machine::new(&small_config(), Box::new(NullHost::default())).unwrap();
    machine.ta_list_init(0x1000_0000);

    let mut poly = vec![0u8; 32];
    let pcw: u32 = 4u32 << 29;
    poly[0..4].copy_from_slice(&pcw.to_le_bytes());
    machine.ta_fifo_write_poly(&poly).unwrap();

    // TA_LIST_CONT must not rewind the parameter buffer: a subsequent end-of-list still closes
    // out the same list rather than finding an empty one.
    machine.ta_list_cont();

    let mut end = vec![0u8; 32];
    end[0..4].copy_from_slice(&0u32.to_le_bytes());
    machine.ta_fifo_write_poly(&end).unwrap();

    assert_eq!(machine.interrupts.borrow().count(dc_core::ta::InterruptLine::List(
        dc_core::ta::context::ListInterrupt::Opaque
    )), 1);
}

#[test]
fn register_allocator_spills_under_pressure_and_frees_when_chain_is_short() {
    // Short dependency chain on a generous register file: no spills.
    let mut f = IrFunction::new();
    let c1 = f.alloc_i32(10);
    let c2 = f.alloc_i32(20);
    let add = f.append_instr(Opcode::Add, [Some(c1), Some(c2), None, None], Some(Ty::I32));
    let add_result = f.instrs[add.0 as usize].result.unwrap();
    let c3 = f.alloc_i32(30);
    f.append_instr(Opcode::Sub, [Some(add_result), Some(c3), None, None], Some(Ty::I32));

    let wide_bank: Vec<MachineReg> = (0..8).map(|_| MachineReg { class: RegClass::Gpr, caller_saved: false }).collect();
    let wide = allocate_block(&mut f, dc_core::jit::ir::BlockId(0), &wide_bank, &PermissiveConstraints);
    assert_eq!(wide.spill_bytes, 0);

    // Same shape of workload, starved register file: some spilling is unavoidable.
    let mut g = IrFunction::new();
    let mut results = Vec::new();
    for i in 0..6 {
        let c = g.alloc_i32(i);
        let add = g.append_instr(Opcode::Add, [Some(c), Some(c), None, None], Some(Ty::I32));
        results.push(g.instrs[add.0 as usize].result.unwrap());
    }
    for chunk in results.chunks(2) {
        if let [a, b] = chunk {
            g.append_instr(Opcode::Add, [Some(*a), Some(*b), None, None], Some(Ty::I32));
        }
    }
    let narrow_bank: Vec<MachineReg> = (0..2).map(|_| MachineReg { class: RegClass::Gpr, caller_saved: false }).collect();
    let narrow = allocate_block(&mut g, dc_core::jit::ir::BlockId(0), &narrow_bank, &PermissiveConstraints);
    assert!(narrow.spill_bytes > 0);
}

#[test]
fn mmio_and_physical_regions_share_one_guest_address_space() {
    let mut machine = Machine::new(&small_config(), Box::new(NullHost::default())).unwrap();
    // System RAM is mounted as a physical region at 0x0c000000 in the SH-4 map (space index 0).
    machine.memory.write32(0, 0x0c00_0010, 0xdead_beef);
    assert_eq!(machine.memory.read32(0, 0x0c00_0010), 0xdead_beef);
}
