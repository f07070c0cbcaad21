//! famicore - a cycle-accurate NES emulator core
//!
//! Headless harness around the console: loads a ROM, runs a requested
//! number of frames, and writes the final frame as a PPM screenshot.

use std::cell::RefCell;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use famicore::{FrameBufferSink, Nes};

/// Command line arguments for famicore
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Path to the NES ROM file
    #[clap(name = "ROM")]
    rom_path: PathBuf,

    /// Number of frames to emulate
    #[clap(short, long, default_value = "60")]
    frames: u64,

    /// Where to write the final frame as a PPM image
    #[clap(short, long, default_value = "screenshot.ppm")]
    output: PathBuf,

    /// Enable debug logging
    #[clap(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    info!("Loading ROM: {}", args.rom_path.display());
    let rom = std::fs::read(&args.rom_path)
        .with_context(|| format!("Failed to read ROM file: {}", args.rom_path.display()))?;

    let sink = Rc::new(RefCell::new(FrameBufferSink::new()));
    let mut nes = Nes::new(&rom, Box::new(Rc::clone(&sink)))
        .with_context(|| format!("Failed to load ROM: {}", args.rom_path.display()))?;

    nes.start();
    while sink.borrow().frames_received() < args.frames {
        nes.step();
    }
    nes.stop();

    info!("Emulated {} frames, writing {}", args.frames, args.output.display());
    let file = File::create(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    let mut writer = BufWriter::new(file);
    sink.borrow().write_ppm(&mut writer)?;

    Ok(())
}
