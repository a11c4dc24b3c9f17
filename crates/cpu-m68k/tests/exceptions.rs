//! Exception entry, group 0 frames, stack discipline, interrupts.

mod common;

use common::{TestBus, setup, step};
use cpu_m68k::Cpu68000;
use emu_core::FaultKind;

fn install_vector(bus: &mut TestBus, vector: u32, handler: u32) {
    bus.load(vector * 4, &handler.to_be_bytes());
}

#[test]
fn odd_word_write_latches_address_error_then_vectors() {
    // MOVE.W D0,(A0) with A0 odd
    let (mut cpu, mut bus) = setup(0x0400, &[0x30, 0x80]);
    install_vector(&mut bus, 3, 0x0500);
    bus.load(0x0500, &[0x4E, 0x71]);
    cpu.regs.set_a(0, 0x1001);
    let ram_before = bus.ram[0x1001];

    // The write faults; the exception is not taken yet
    step(&mut cpu, &mut bus);
    assert_eq!(bus.faults.len(), 1, "address-error hook fired exactly once");
    assert_eq!(bus.faults[0].kind, FaultKind::Address);
    assert_eq!(bus.faults[0].address, 0x1001);
    assert!(bus.faults[0].write);
    assert_eq!(bus.ram[0x1001], ram_before, "no RAM mutation on the fault");

    // Next iteration takes vector 3 with the 14-byte frame
    let ssp_before = cpu.state().ssp;
    step(&mut cpu, &mut bus);
    let state = cpu.state();
    assert_eq!(state.pc, 0x0500);
    assert_eq!(ssp_before - state.ssp, 14);
}

#[test]
fn bus_error_frame_layout_for_a_faulted_write() {
    // MOVE.L D0,$F00000.L: the target is beyond RAM, so the write faults
    let (mut cpu, mut bus) = setup(0x0400, &[0x23, 0xC0, 0x00, 0xF0, 0x00, 0x00]);
    install_vector(&mut bus, 2, 0x0600);
    bus.load(0x0600, &[0x4E, 0x71]);
    cpu.regs.d[0] = 0x1234_5678;

    step(&mut cpu, &mut bus); // fault latched
    step(&mut cpu, &mut bus); // vector 2 taken
    let state = cpu.state();
    assert_eq!(state.pc, 0x0600);

    let sp = state.ssp;
    // Lowest address up: SSW, fault address, IR, SR, PC
    let ssw = bus.read_word_raw(sp);
    assert_eq!(ssw & 0x10, 0, "R/W bit is write");
    assert_eq!(ssw & 0x07, 5, "supervisor data function code");
    assert_eq!(bus.read_long_raw(sp + 2), 0x00F0_0000);
    assert_eq!(bus.read_word_raw(sp + 6), 0x23C0, "instruction register");
    let pushed_pc = bus.read_long_raw(sp + 10);
    assert_eq!(pushed_pc, 0x0406, "PC past the faulted instruction");
}

#[test]
fn trap_from_user_mode_swaps_to_ssp_and_rte_swaps_back() {
    // TRAP #0 in user mode; handler is a single RTE
    let (mut cpu, mut bus) = setup(0x0400, &[0x4E, 0x40, 0x4E, 0x71]);
    install_vector(&mut bus, 32, 0x0500);
    bus.load(0x0500, &[0x4E, 0x73]);
    cpu.regs.set_sr(0x0000);
    cpu.regs.usp = 0x4000;

    step(&mut cpu, &mut bus);
    let state = cpu.state();
    assert_ne!(state.sr & 0x2000, 0, "handler runs in supervisor mode");
    assert_eq!(state.usp, 0x4000, "USP preserved across the switch");
    assert_eq!(state.ssp, 0x8000 - 6, "SR word plus PC long on SSP");
    assert_eq!(state.pc, 0x0500);

    step(&mut cpu, &mut bus); // RTE
    let state = cpu.state();
    assert_eq!(state.sr & 0x2000, 0, "back in user mode");
    assert_eq!(state.active_sp(), 0x4000, "A7 is the user pointer again");
    assert_eq!(state.ssp, 0x8000, "SSP fully unwound");
    assert_eq!(state.pc, 0x0402);
}

#[test]
fn illegal_instruction_pushes_its_own_address() {
    let (mut cpu, mut bus) = setup(0x0400, &[0x4A, 0xFC]);
    install_vector(&mut bus, 4, 0x0700);
    bus.load(0x0700, &[0x4E, 0x71]);
    step(&mut cpu, &mut bus);
    let state = cpu.state();
    assert_eq!(state.pc, 0x0700);
    assert_eq!(bus.read_long_raw(state.ssp + 2), 0x0400);
}

#[test]
fn privilege_violation_in_user_mode() {
    // MOVE #$2700,SR from user mode
    let (mut cpu, mut bus) = setup(0x0400, &[0x46, 0xFC, 0x27, 0x00]);
    install_vector(&mut bus, 8, 0x0700);
    bus.load(0x0700, &[0x4E, 0x71]);
    cpu.regs.set_sr(0x0000);
    cpu.regs.usp = 0x4000;
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.state().pc, 0x0700);
}

#[test]
fn zero_divide_raises_vector_5() {
    let (mut cpu, mut bus) = setup(0x0400, &[0x80, 0xC1]);
    install_vector(&mut bus, 5, 0x0700);
    bus.load(0x0700, &[0x4E, 0x71]);
    cpu.regs.d[0] = 10;
    cpu.regs.d[1] = 0;
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.state().pc, 0x0700);
}

#[test]
fn trace_fires_after_each_instruction() {
    let (mut cpu, mut bus) = setup(0x0400, &[0x4E, 0x71, 0x4E, 0x71]);
    install_vector(&mut bus, 9, 0x0700);
    bus.load(0x0700, &[0x4E, 0x71]);
    cpu.regs.sr |= 0x8000;
    step(&mut cpu, &mut bus);
    let state = cpu.state();
    assert_eq!(state.pc, 0x0700);
    assert_eq!(state.sr & 0x8000, 0, "trace cleared in the handler");
    assert_eq!(
        bus.read_long_raw(state.ssp + 2),
        0x0402,
        "trace resumes after the traced instruction"
    );
}

#[test]
fn autovectored_interrupt_sets_mask_to_accepted_level() {
    let (mut cpu, mut bus) = setup(0x0400, &[0x4E, 0x71, 0x4E, 0x71]);
    install_vector(&mut bus, 27, 0x0700); // level 3 autovector
    bus.load(0x0700, &[0x4E, 0x71]);
    cpu.regs.set_sr(0x2000); // supervisor, mask 0
    cpu.set_irq(3);
    let cycles = cpu.execute(&mut bus, 1);
    let state = cpu.state();
    assert_eq!(state.pc, 0x0700);
    assert_eq!((state.sr >> 8) & 7, 3, "mask raised to the accepted level");
    assert_eq!(cycles, 44);
}

#[test]
fn masked_interrupt_stays_pending() {
    let (mut cpu, mut bus) = setup(0x0400, &[0x4E, 0x71]);
    cpu.regs.set_sr(0x2700);
    cpu.set_irq(3);
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.state().pc, 0x0402, "NOP ran, no exception");
}

#[test]
fn level_6_takes_the_device_vector() {
    let (mut cpu, mut bus) = setup(0x0400, &[0x4E, 0x71]);
    bus.level6_vector = Some(0x46);
    install_vector(&mut bus, 0x46, 0x0900);
    bus.load(0x0900, &[0x4E, 0x71]);
    cpu.regs.set_sr(0x2000);
    cpu.set_irq(6);
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.state().pc, 0x0900);
}

#[test]
fn nmi_is_edge_triggered() {
    let (mut cpu, mut bus) = setup(0x0400, &[0x4E, 0x71, 0x4E, 0x71, 0x4E, 0x71]);
    install_vector(&mut bus, 31, 0x0700);
    // Handler: NOP (so execution continues past the exception)
    bus.load(0x0700, &[0x4E, 0x71, 0x4E, 0x71, 0x4E, 0x71]);
    cpu.set_irq(7);
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.state().pc, 0x0700, "NMI accepted despite mask 7");
    // Line still held at 7: no second exception, handler keeps running
    step(&mut cpu, &mut bus);
    assert_eq!(cpu.state().pc, 0x0702);
}

#[test]
fn stop_waits_for_an_unmasked_interrupt() {
    // STOP #$2300: supervisor, mask 3
    let (mut cpu, mut bus) = setup(0x0400, &[0x4E, 0x72, 0x23, 0x00]);
    install_vector(&mut bus, 29, 0x0700); // level 5 autovector
    bus.load(0x0700, &[0x4E, 0x71]);
    cpu.execute(&mut bus, 50);
    assert!(cpu.is_stopped());

    cpu.set_irq(2);
    cpu.execute(&mut bus, 50);
    assert!(cpu.is_stopped(), "level 2 is under the mask");

    cpu.set_irq(5);
    cpu.execute(&mut bus, 45);
    assert!(!cpu.is_stopped());
    assert_eq!(cpu.state().pc, 0x0702, "woke into the handler and ran its NOP");
}

#[test]
fn external_stop_halts_until_reset() {
    let (mut cpu, mut bus) = setup(0x0400, &[0x4E, 0x71]);
    Cpu68000::stop(&mut cpu);
    assert!(cpu.is_halted());
    assert_eq!(cpu.execute(&mut bus, 120), 120, "halted burns the budget");
    cpu.reset(&mut bus);
    assert!(!cpu.is_halted());
}
