//! Headless Atari ST runner.
//!
//! Loads a machine profile, runs a number of frames, and reports what
//! the machine did. The rendered frames and generated PCM go through
//! the scheduler's hand-off rings exactly as they would toward the
//! streaming surface; here the consumer just counts them.

use std::path::PathBuf;
use std::process;

use log::error;
use machine_atari_st::{Machine, Scheduler, find_profile};

struct CliArgs {
    machine_id: String,
    profile_dir: PathBuf,
    module_dir: PathBuf,
    rom_dir: PathBuf,
    frames: u64,
    sample_rate: u32,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        machine_id: "atari-st".into(),
        profile_dir: PathBuf::from("profiles"),
        module_dir: PathBuf::from("modules"),
        rom_dir: PathBuf::from("roms"),
        frames: 500,
        sample_rate: 48_000,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--machine" => {
                i += 1;
                if let Some(id) = args.get(i) {
                    cli.machine_id.clone_from(id);
                }
            }
            "--profiles" => {
                i += 1;
                cli.profile_dir = args.get(i).map(PathBuf::from).unwrap_or(cli.profile_dir);
            }
            "--modules" => {
                i += 1;
                cli.module_dir = args.get(i).map(PathBuf::from).unwrap_or(cli.module_dir);
            }
            "--roms" => {
                i += 1;
                cli.rom_dir = args.get(i).map(PathBuf::from).unwrap_or(cli.rom_dir);
            }
            "--frames" => {
                i += 1;
                cli.frames = args
                    .get(i)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(cli.frames);
            }
            "--sample-rate" => {
                i += 1;
                cli.sample_rate = args
                    .get(i)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(cli.sample_rate);
            }
            "--help" | "-h" => {
                println!(
                    "usage: st-runner [--machine ID] [--profiles DIR] [--modules DIR] \
                     [--roms DIR] [--frames N] [--sample-rate HZ]"
                );
                process::exit(0);
            }
            other => {
                eprintln!("unknown argument: {other}");
                process::exit(2);
            }
        }
        i += 1;
    }
    cli
}

fn main() {
    env_logger::init();
    let cli = parse_args();

    let profile = match find_profile(&cli.profile_dir, &cli.machine_id) {
        Ok(profile) => profile,
        Err(e) => {
            error!("profile {}: {e}", cli.machine_id);
            process::exit(1);
        }
    };
    println!("{} ({})", profile.display_name, profile.machine);

    let machine = match Machine::load(profile, &cli.module_dir, &cli.rom_dir, cli.sample_rate) {
        Ok(machine) => machine,
        Err(e) => {
            error!("machine load failed: {e}");
            process::exit(1);
        }
    };

    let (mut scheduler, mut handle) = Scheduler::new(machine);
    let mut frames_taken = 0u64;
    let mut samples_taken = 0u64;
    for _ in 0..cli.frames {
        if !scheduler.run_frame() {
            break;
        }
        // Stand-in emitters: drain the rings so nothing is dropped
        while handle.take_frame().is_some() {
            frames_taken += 1;
        }
        while let Some(pcm) = handle.take_samples() {
            samples_taken += pcm.len() as u64;
        }
    }

    let stats = scheduler.stats();
    let machine = scheduler.machine();
    let state = machine.cpu_state();
    println!(
        "ran {} frames ({} emitted, {} dropped), {} samples",
        stats.frames_run, frames_taken, stats.frames_dropped, samples_taken
    );
    println!(
        "cpu: pc={:06X} sr={:04X} cycles={} stopped={} halted={}",
        state.pc, state.sr, state.cycles, state.stopped, state.halted
    );
    println!(
        "video: frame {} scanline {} {}x{}",
        machine.frame_count(),
        machine.scanline(),
        machine.frame_size().0,
        machine.frame_size().1
    );
}
