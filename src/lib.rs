//! famicore - a cycle-accurate NES (Famicom) core emulator
//!
//! The crate simulates the 6502-family CPU, the PPU, and the cartridge
//! memory map at the dot level: one CPU instruction retires, then the PPU
//! advances three dots per CPU cycle. Completed 256x240 RGB frames are
//! handed to a caller-supplied video sink once per VBlank.
//!
//! APU and controllers are stubbed (reads return zero); only the fixed-bank
//! mapper is implemented.

pub mod cartridge;
pub mod cpu;
pub mod memory;
pub mod nes;
pub mod ppu;
pub mod video;

pub use cartridge::{Cartridge, Mirroring, RomError};
pub use cpu::{Cpu, CpuBus};
pub use memory::MemoryBus;
pub use nes::{Nes, StopHandle};
pub use ppu::{NmiLine, Ppu, SCREEN_HEIGHT, SCREEN_WIDTH};
pub use video::{FrameBufferSink, VideoSink};
