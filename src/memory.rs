//! Memory bus implementation for the NES
//!
//! The NES has a 16-bit address space (0x0000 - 0xFFFF) with various
//! memory-mapped components:
//!
//! - 0x0000 - 0x1FFF: 2KB internal RAM, mirrored every 0x800 bytes
//! - 0x2000 - 0x3FFF: the eight PPU registers, mirrored every 8 bytes
//! - 0x4000 - 0x401F: APU and I/O registers (stubbed: reads return 0)
//! - 0x4020 - 0xFFFF: cartridge space (PRG RAM and PRG ROM)
//!
//! The OAM DMA port at 0x4014 copies a 256-byte page into sprite memory and
//! bills the 513 transfer cycles back to the CPU through the write path.

use std::cell::RefCell;
use std::rc::Rc;

use log::trace;

use crate::cartridge::Cartridge;
use crate::cpu::CpuBus;
use crate::ppu::{reg, Ppu};

/// Size of the internal RAM (2KB)
const RAM_SIZE: usize = 0x800;

/// CPU cycles consumed by an OAM DMA transfer
const OAM_DMA_CYCLES: u32 = 513;

/// Represents the memory bus connecting all NES components
pub struct MemoryBus {
    /// Internal RAM (2KB)
    ram: [u8; RAM_SIZE],

    /// PPU, addressed through its register window
    pub ppu: Ppu,

    /// Cartridge, shared with the PPU's pattern/nametable fetches
    cartridge: Rc<RefCell<Cartridge>>,
}

impl MemoryBus {
    pub fn new(cartridge: Rc<RefCell<Cartridge>>, ppu: Ppu) -> Self {
        MemoryBus { ram: [0; RAM_SIZE], ppu, cartridge }
    }

    /// Copy the 256-byte page at `page << 8` into sprite memory through the
    /// OAM data register. Returns the cycles billed to the writing CPU.
    fn oam_dma(&mut self, page: u8) -> u32 {
        trace!("OAM DMA from page ${:02X}00", page);

        let mut address = u16::from(page) << 8;
        for _ in 0..=0xFF {
            let value = self.read(address);
            self.ppu.write_register(reg::OAM_DATA, value);
            address = address.wrapping_add(1);
        }

        OAM_DMA_CYCLES
    }
}

impl CpuBus for MemoryBus {
    fn read(&mut self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x1FFF => self.ram[(addr & 0x07FF) as usize],

            0x2000..=0x3FFF => self.ppu.read_register((addr & 0x7) as usize),

            // APU and controllers are stubbed out
            0x4000..=0x401F => 0,

            0x4020..=0xFFFF => self.cartridge.borrow().read_prg(addr),
        }
    }

    fn write(&mut self, addr: u16, value: u8) -> u32 {
        match addr {
            0x0000..=0x1FFF => {
                self.ram[(addr & 0x07FF) as usize] = value;
                0
            }

            0x2000..=0x3FFF => {
                self.ppu.write_register((addr & 0x7) as usize, value);
                0
            }

            0x4014 => self.oam_dma(value),

            // APU and controller writes are ignored
            0x4000..=0x401F => 0,

            0x4020..=0xFFFF => {
                self.cartridge.borrow_mut().write_prg(addr, value);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ppu::NmiLine;
    use crate::video::FrameBufferSink;

    fn build_bus() -> MemoryBus {
        let mut rom = vec![0u8; 16];
        rom[0..4].copy_from_slice(b"NES\x1A");
        rom[4] = 1;
        rom.extend(std::iter::repeat(0u8).take(16 * 1024));

        let cartridge = Rc::new(RefCell::new(Cartridge::from_bytes(&rom).unwrap()));
        let ppu = Ppu::new(Rc::clone(&cartridge), NmiLine::new(), Box::new(FrameBufferSink::new()));
        MemoryBus::new(cartridge, ppu)
    }

    #[test]
    fn ram_mirrors_every_2kb() {
        let mut bus = build_bus();

        bus.write(0x0000, 0x12);
        assert_eq!(bus.read(0x0800), 0x12);
        assert_eq!(bus.read(0x1000), 0x12);
        assert_eq!(bus.read(0x1800), 0x12);

        bus.write(0x1FFF, 0x34);
        assert_eq!(bus.read(0x07FF), 0x34);
    }

    #[test]
    fn io_stubs_read_zero() {
        let mut bus = build_bus();
        for addr in [0x4000u16, 0x4015, 0x4016, 0x4017] {
            assert_eq!(bus.read(addr), 0);
            assert_eq!(bus.write(addr, 0xFF), 0);
        }
    }

    #[test]
    fn oam_dma_copies_a_page_and_bills_cycles() {
        let mut bus = build_bus();
        for i in 0..256u16 {
            bus.write(0x0200 + i, i as u8);
        }

        let extra = bus.write(0x4014, 0x02);
        assert_eq!(extra, 513);

        // OAM address post-incremented through the whole page
        bus.write(0x2003, 0x07);
        assert_eq!(bus.read(0x2004), 0x07);
    }

    #[test]
    fn ppu_registers_mirror_through_0x3fff() {
        let mut bus = build_bus();

        bus.write(0x2003, 0x05);
        bus.write(0x2004, 0xAB); // OAM[5]
        bus.write(0x3FF3, 0x05); // Mirror of 0x2003
        assert_eq!(bus.read(0x3FF4), 0xAB);
    }
}
