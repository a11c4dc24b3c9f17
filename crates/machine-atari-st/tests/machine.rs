//! Whole-machine behaviour: reset, bus semantics, interrupts, frames.

use emu_core::BusPort;
use machine_atari_st::{Command, Machine, Profile, Scheduler};
use tempfile::TempDir;

const PROFILE: &str = r#"{
    "machine": "atari-st",
    "display_name": "Atari 520ST",
    "year": 1985,
    "memory": { "ram_kb": 512, "tos_file": "tos.img" },
    "components": {
        "cpu": { "file": "cpu68000.ebin", "clock_hz": 8000000 },
        "mmu": { "file": "mmu.ebin" },
        "video": { "file": "shifter.ebin" },
        "audio": [ { "file": "ym2149.ebin", "role": "psg" } ],
        "io": [
            { "file": "mfp68901.ebin", "role": "mfp" },
            { "file": "acia.ebin" },
            { "file": "dma-fdc.ebin", "role": "dma" }
        ]
    }
}"#;

/// A tiny stand-in TOS: SSP $8000, entry at the ROM's 8th byte, then
/// NOP and STOP #$2700.
fn test_rom() -> Vec<u8> {
    let mut rom = Vec::new();
    rom.extend_from_slice(&0x0000_8000u32.to_be_bytes());
    rom.extend_from_slice(&0x00FC_0008u32.to_be_bytes());
    rom.extend_from_slice(&[0x4E, 0x71]); // NOP
    rom.extend_from_slice(&[0x4E, 0x72, 0x27, 0x00]); // STOP #$2700
    rom
}

fn boot(rom: &[u8]) -> (Machine, TempDir) {
    let dir = TempDir::new().expect("tempdir");
    std::fs::write(dir.path().join("tos.img"), rom).expect("write rom");
    let profile = Profile::from_str(PROFILE).expect("profile");
    let machine =
        Machine::load(profile, dir.path(), dir.path(), 48_000).expect("machine loads");
    (machine, dir)
}

#[test]
fn reset_reads_vectors_through_the_rom_overlay() {
    let (machine, _dir) = boot(&test_rom());
    let state = machine.cpu_state();
    assert_eq!(state.ssp, 0x8000, "SSP from ROM offset 0");
    assert_eq!(state.pc, 0x00FC_0008, "PC from ROM offset 4");
    assert_eq!(state.sr & 0x2700, 0x2700);
    assert_eq!(state.cycles, 0);
    assert!(machine.is_running());
}

#[test]
fn reset_is_deterministic() {
    let (mut machine, _dir) = boot(&test_rom());
    machine.run_frame();
    machine.reset();
    let first = machine.cpu_state();
    machine.reset();
    assert_eq!(machine.cpu_state(), first);
}

#[test]
fn bus_endianness_round_trip() {
    let (mut machine, _dir) = boot(&test_rom());
    let bus = machine.bus();
    bus.write_long(0x2000, 0xCAFE_BABE).expect("long write");
    assert_eq!(bus.read_byte(0x2000), Ok(0xCA));
    assert_eq!(bus.read_byte(0x2001), Ok(0xFE));
    assert_eq!(bus.read_byte(0x2002), Ok(0xBA));
    assert_eq!(bus.read_byte(0x2003), Ok(0xBE));
    assert_eq!(bus.read_word(0x2000), Ok(0xCAFE));
}

#[test]
fn frame_runs_to_the_cycle_budget() {
    let (mut machine, _dir) = boot(&test_rom());
    let output = machine.run_frame();
    assert!(output.cycles >= machine.cycles_per_frame());
    assert_eq!(machine.frame_count(), 1);
    assert_eq!((output.width, output.height), (320, 200));
    assert_eq!(machine.framebuffer().len(), 320 * 200);
    let state = machine.cpu_state();
    assert!(state.stopped, "the stand-in TOS parks in STOP");
}

#[test]
fn vbl_interrupt_wakes_a_stopped_cpu() {
    let (mut machine, _dir) = boot(&test_rom());
    {
        let bus = machine.bus();
        // VBL autovector (28) -> handler at $500: NOP, STOP #$2300
        bus.write_long(28 * 4, 0x500).expect("vector");
        bus.write_word(0x500, 0x4E71).expect("handler");
        bus.write_long(0x502, 0x4E72_2300).expect("handler stop");
        // Program at $400: STOP #$2300 (mask 3, VBL level 4 passes)
        bus.write_long(0x400, 0x4E72_2300).expect("program");
    }
    let mut state = machine.cpu_state();
    state.pc = 0x400;
    state.sr = 0x2300;
    machine.set_cpu_state(&state);

    // VBL asserts at the frame edge; the wake lands early next frame
    machine.run_frame();
    machine.run_frame();
    let state = machine.cpu_state();
    assert!(
        (0x500..0x520).contains(&state.pc),
        "pc {:#x} should sit in the VBL handler",
        state.pc
    );
}

#[test]
fn mfp_timer_interrupt_arrives_through_the_device_vector() {
    let (mut machine, _dir) = boot(&test_rom());
    {
        let bus = machine.bus();
        // MFP: vector base $40, Timer A enabled+unmasked, reload 1, /4
        bus.write_byte(0xFF_FA17, 0x40).expect("VR");
        bus.write_byte(0xFF_FA07, 0x20).expect("IERA");
        bus.write_byte(0xFF_FA13, 0x20).expect("IMRA");
        bus.write_byte(0xFF_FA1F, 0x01).expect("TADR");
        bus.write_byte(0xFF_FA19, 0x01).expect("TACR");
        // Vector (0x40 | 13) -> handler at $600: STOP #$2700
        bus.write_long((0x40 | 13) * 4, 0x600).expect("vector");
        bus.write_long(0x600, 0x4E72_2700).expect("handler");
        // Program: STOP #$2000, everything unmasked
        bus.write_long(0x400, 0x4E72_2000).expect("program");
    }
    let mut state = machine.cpu_state();
    state.pc = 0x400;
    state.sr = 0x2000;
    machine.set_cpu_state(&state);

    machine.run_frame();
    let state = machine.cpu_state();
    assert!(state.stopped, "handler ran to its own STOP");
    assert_eq!(state.pc, 0x604, "woken through the MFP vector");
}

#[test]
fn keyboard_bytes_arrive_via_the_acia() {
    let (mut machine, _dir) = boot(&test_rom());
    machine.key_event(0x39, true); // space make code
    let bus = machine.bus();
    assert_eq!(bus.read_byte(0xFF_FC00).map(|s| s & 1), Ok(1), "RDRF up");
    assert_eq!(bus.read_byte(0xFF_FC02), Ok(0x39));
}

#[test]
fn missing_tos_fails_the_load_completely() {
    let dir = TempDir::new().expect("tempdir");
    let profile = Profile::from_str(PROFILE).expect("profile");
    let err = Machine::load(profile, dir.path(), dir.path(), 48_000)
        .expect_err("no TOS on disk");
    assert!(matches!(
        err,
        machine_atari_st::MachineError::TosNotFound(_)
    ));
}

#[test]
fn scheduler_runs_pauses_and_stops() {
    let (machine, _dir) = boot(&test_rom());
    let (mut scheduler, mut handle) = Scheduler::new(machine);

    assert!(scheduler.run_frame());
    assert_eq!(scheduler.stats().frames_run, 1);
    assert!(handle.take_frame().is_some());

    handle.send(Command::Pause);
    assert!(scheduler.run_frame());
    assert_eq!(scheduler.stats().frames_run, 1, "paused frames do not run");

    handle.send(Command::Resume);
    assert!(scheduler.run_frame());
    assert_eq!(scheduler.stats().frames_run, 2);

    handle.send(Command::Stop);
    assert!(!scheduler.run_frame(), "stop honoured at the frame edge");
}

#[test]
fn lagging_frame_consumer_drops_instead_of_blocking() {
    let (machine, _dir) = boot(&test_rom());
    let (mut scheduler, _handle) = Scheduler::new(machine);
    for _ in 0..4 {
        scheduler.run_frame();
    }
    assert!(
        scheduler.stats().frames_dropped >= 2,
        "ring holds two frames, the rest drop"
    );
}

#[test]
fn hot_swap_is_refused_unless_paused() {
    let (machine, _dir) = boot(&test_rom());
    let (mut scheduler, mut handle) = Scheduler::new(machine);
    let slot = machine_atari_st::SlotEntry {
        file: "ym2149.ebin".into(),
        clock_hz: None,
        role: Some("psg".into()),
        optional: false,
    };

    let err = scheduler
        .swap_io(&slot, format_ebin::ComponentType::Audio)
        .expect_err("swap while running");
    assert!(matches!(
        err,
        machine_atari_st::MachineError::InvalidState { .. }
    ));

    handle.send(Command::Pause);
    scheduler.run_frame();
    scheduler
        .swap_io(&slot, format_ebin::ComponentType::Audio)
        .expect("swap while paused falls back to the built-in PSG");
}

#[test]
fn audio_chunks_are_one_frame_long() {
    let (machine, _dir) = boot(&test_rom());
    let expected = machine.samples_per_frame();
    // PAL frame at 48 kHz: 160256 cycles / 8 MHz * 48000 = 961 samples
    assert_eq!(expected, 961);
    let (mut scheduler, mut handle) = Scheduler::new(machine);
    scheduler.run_frame();
    let pcm = handle.take_samples().expect("one chunk per frame");
    assert_eq!(pcm.len(), expected);
}
