//! NES console
//!
//! Ties the CPU, PPU, and cartridge together. The console owns all three
//! (the PPU lives inside the memory bus); the PPU holds only a thin NMI
//! line back to the CPU, drained at instruction boundaries.
//!
//! The run loop is deterministic and cooperative: one CPU instruction
//! retires per iteration, then the PPU advances exactly three dots per CPU
//! cycle. `Stop` may be called from another logical context; the run-state
//! flag is the only state shared across that boundary.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::info;

use crate::cartridge::{Cartridge, RomError};
use crate::cpu::Cpu;
use crate::memory::MemoryBus;
use crate::ppu::{NmiLine, Ppu};
use crate::video::VideoSink;

/// Represents the NES hardware system
pub struct Nes {
    cpu: Cpu,
    bus: MemoryBus,
    nmi_line: NmiLine,
    running: Arc<AtomicBool>,
}

/// Cloneable handle for stopping a running console from elsewhere.
#[derive(Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

impl Nes {
    /// Assemble a console around an iNES image and a video sink.
    pub fn new(rom: &[u8], video: Box<dyn VideoSink>) -> Result<Self, RomError> {
        let cartridge = Rc::new(RefCell::new(Cartridge::from_bytes(rom)?));

        let nmi_line = NmiLine::new();
        let ppu = Ppu::new(Rc::clone(&cartridge), nmi_line.clone(), video);
        let bus = MemoryBus::new(cartridge, ppu);

        Ok(Nes {
            cpu: Cpu::new(),
            bus,
            nmi_line,
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Power on: CPU loads the reset vector, PPU returns to its power-on
    /// state, and the run flag rises.
    pub fn start(&mut self) {
        self.cpu.init(&mut self.bus);
        self.bus.ppu.init();
        self.running.store(true, Ordering::Release);
        info!("Console started, PC=${:04X}", self.cpu.pc);
    }

    /// Return both units to their post-reset state without reallocating.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.bus.ppu.reset();
        info!("Console reset");
    }

    /// Drop the run flag; a loop inside `run` observes it between
    /// instructions.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
    }

    /// A handle that can stop the console from another logical context.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle { running: Arc::clone(&self.running) }
    }

    /// Run until stopped.
    pub fn run(&mut self) {
        while self.running.load(Ordering::Acquire) {
            self.step();
        }
    }

    /// Execute one CPU instruction and the matching PPU dots. Returns the
    /// CPU cycles consumed.
    pub fn step(&mut self) -> u32 {
        if self.nmi_line.take() {
            self.cpu.nmi();
        }

        let cpu_cycles = self.cpu.execute_op(&mut self.bus);
        self.bus.ppu.execute_cycles(cpu_cycles * 3);

        cpu_cycles
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    pub fn bus(&self) -> &MemoryBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut MemoryBus {
        &mut self.bus
    }
}
