//! End-to-end programs running against a flat bus.

mod common;

use common::setup;

#[test]
fn moveq_and_stop() {
    // MOVEQ #42,D0; MOVEQ #-1,D1; NOP; STOP #$2700
    let (mut cpu, mut bus) = setup(
        0x0400,
        &[0x70, 0x2A, 0x72, 0xFF, 0x4E, 0x71, 0x4E, 0x72, 0x27, 0x00],
    );
    cpu.execute(&mut bus, 100);
    let state = cpu.state();
    assert_eq!(state.d[0], 42);
    assert_eq!(state.d[1], 0xFFFF_FFFF);
    assert!(state.stopped);
}

#[test]
fn jsr_and_rts() {
    // LEA $410.L,A0; JSR (A0); STOP #$2700
    let (mut cpu, mut bus) = setup(
        0x0400,
        &[0x41, 0xF9, 0x00, 0x00, 0x04, 0x10, 0x4E, 0x90, 0x4E, 0x72, 0x27, 0x00],
    );
    // Subroutine: MOVEQ #77,D0; RTS
    bus.load(0x0410, &[0x70, 0x4D, 0x4E, 0x75]);
    cpu.execute(&mut bus, 300);
    let state = cpu.state();
    assert_eq!(state.d[0], 77);
    assert!(state.stopped);
}

#[test]
fn dbra_loop() {
    // MOVEQ #4,D0; MOVEQ #0,D1; ADDQ.L #1,D1; DBRA D0,-4; STOP #$2700
    let (mut cpu, mut bus) = setup(
        0x0400,
        &[
            0x70, 0x04, 0x72, 0x00, 0x52, 0x81, 0x51, 0xC8, 0xFF, 0xFC, 0x4E, 0x72, 0x27, 0x00,
        ],
    );
    cpu.execute(&mut bus, 500);
    let state = cpu.state();
    assert_eq!(state.d[1], 5);
    assert_eq!(state.d[0] & 0xFFFF, 0xFFFF);
    assert!(state.stopped);
}

#[test]
fn memory_round_trip() {
    // MOVE.L #$DEADBEEF,D0; LEA $1000.L,A0; MOVE.L D0,(A0);
    // CLR.L D0; MOVE.L (A0),D1; STOP #$2700
    let (mut cpu, mut bus) = setup(
        0x0400,
        &[
            0x20, 0x3C, 0xDE, 0xAD, 0xBE, 0xEF, 0x41, 0xF9, 0x00, 0x00, 0x10, 0x00, 0x20, 0x80,
            0x42, 0x80, 0x22, 0x10, 0x4E, 0x72, 0x27, 0x00,
        ],
    );
    cpu.execute(&mut bus, 400);
    let state = cpu.state();
    assert_eq!(bus.read_long_raw(0x1000), 0xDEAD_BEEF);
    assert_eq!(state.d[0], 0);
    assert_eq!(state.d[1], 0xDEAD_BEEF);
    assert!(state.stopped);
}

#[test]
fn shift_semantics() {
    // MOVEQ #1,D0; LSL.L #4,D0; MOVEQ #-128,D1; ASR.L #2,D1; STOP #$2700
    let (mut cpu, mut bus) = setup(
        0x0400,
        &[0x70, 0x01, 0xE9, 0x88, 0x72, 0x80, 0xE4, 0x81, 0x4E, 0x72, 0x27, 0x00],
    );
    cpu.execute(&mut bus, 200);
    let state = cpu.state();
    assert_eq!(state.d[0], 0x10);
    assert_eq!(state.d[1], 0xFFFF_FFE0, "ASR preserves the sign");
    assert!(state.stopped);
}

#[test]
fn big_endian_byte_order_in_ram() {
    // MOVE.L #$11223344,D0; LEA $2000.L,A0; MOVE.L D0,(A0); STOP
    let (mut cpu, mut bus) = setup(
        0x0400,
        &[
            0x20, 0x3C, 0x11, 0x22, 0x33, 0x44, 0x41, 0xF9, 0x00, 0x00, 0x20, 0x00, 0x20, 0x80,
            0x4E, 0x72, 0x27, 0x00,
        ],
    );
    cpu.execute(&mut bus, 300);
    assert_eq!(
        &bus.ram[0x2000..0x2004],
        &[0x11, 0x22, 0x33, 0x44],
        "long writes land MSB first"
    );
    assert_eq!(bus.read_word_raw(0x2000), 0x1122);
}

#[test]
fn reset_loads_vectors_from_address_zero() {
    let (cpu, _bus) = setup(0x0400, &[0x4E, 0x71]);
    let state = cpu.state();
    assert_eq!(state.ssp, 0x8000);
    assert_eq!(state.pc, 0x0400);
    assert_eq!(state.sr & 0x2700, 0x2700);
    assert_eq!(state.cycles, 0);
}
