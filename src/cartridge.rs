//! NES cartridge implementation
//!
//! This module handles the NES cartridge format (iNES), including ROM/RAM banking.
//! The NES uses a cartridge system with separate PRG ROM (program code) and
//! CHR ROM/RAM (character/graphics data), plus a mirroring policy that decides
//! how the PPU's nametable address space maps onto the console's nametable RAM.
//!
//! PRG ROM and CHR memory are kept as 1KB banks behind per-slot bank maps so
//! that bank-switching mappers can be layered on later by rewriting the maps.

use log::{info, warn};
use thiserror::Error;

/// Size of the iNES header
const INES_HEADER_SIZE: usize = 16;

/// Size of a single PRG ROM / CHR bank slot (1KB)
const BANK_SIZE: usize = 1024;

/// Errors that can occur when parsing ROM files
#[derive(Error, Debug)]
pub enum RomError {
    #[error("ROM image shorter than the 16-byte iNES header")]
    HeaderTooShort,
}

/// Nametable mirroring modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirroring {
    /// Two horizontal arrangements share a nametable each (A A / B B)
    Horizontal,

    /// Two vertical arrangements share a nametable each (A B / A B)
    Vertical,

    /// All four slots point to nametable A
    OneScreenA,

    /// All four slots point to nametable B
    OneScreenB,

    /// Every slot has its own nametable (cartridge-supplied VRAM)
    FourScreen,
}

/// Which physical nametable page a PPU address resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NameTablePage {
    A,
    B,
    C,
    D,
}

/// Nametable RAM owned by the PPU and routed through the cartridge's
/// mirroring policy on every access. Two 1KB pages.
pub type NameTableRam = [[u8; BANK_SIZE]; 2];

/// Represents an NES cartridge
pub struct Cartridge {
    /// PRG ROM data in 1KB banks
    prg_rom: Vec<[u8; BANK_SIZE]>,

    /// PRG RAM data (flat, 8KB granularity)
    prg_ram: Vec<u8>,

    /// CHR ROM/RAM data in 1KB banks
    chr_mem: Vec<[u8; BANK_SIZE]>,

    /// Whether CHR is RAM (writable) or ROM (read-only)
    chr_is_ram: bool,

    /// Mapper number from the header
    mapper: u8,

    /// Mirroring mode
    mirroring: Mirroring,

    /// Bank index for each 1KB slot of the 0x8000-0xFFFF window
    prg_rom_map: [usize; 32],

    /// Bank index for each 1KB slot of the 0x0000-0x1FFF window
    chr_mem_map: [usize; 8],
}

impl Cartridge {
    /// Create a cartridge from ROM data in iNES format.
    ///
    /// Malformed images are tolerated: missing bank data reads as zero and
    /// unknown mappers fall back to the fixed-bank behavior.
    pub fn from_bytes(data: &[u8]) -> Result<Self, RomError> {
        if data.len() < INES_HEADER_SIZE {
            return Err(RomError::HeaderTooShort);
        }

        let prg_bank_count = data[4] as usize * 16; // 16KB units -> 1KB banks
        let chr_bank_count = data[5] as usize * 8; // 8KB units -> 1KB banks

        let flags6 = data[6];
        let flags7 = data[7];

        let mirroring = if (flags6 & 0x08) != 0 {
            Mirroring::FourScreen
        } else if (flags6 & 0x01) != 0 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        };

        let has_trainer = (flags6 & 0x04) != 0;

        // The upper mapper nibble is only trustworthy when bytes 11..15 are
        // zero (archaic dumps abuse them for other data).
        let mut mapper = (flags6 >> 4) & 0x0F;
        if data[11..16].iter().all(|&b| b == 0) {
            mapper |= flags7 & 0xF0;
        }

        let mut offset = INES_HEADER_SIZE;
        if has_trainer {
            offset += 512; // Skip the trainer
        }

        let read_bank = |offset: &mut usize| {
            let mut bank = [0u8; BANK_SIZE];
            if *offset < data.len() {
                let available = (data.len() - *offset).min(BANK_SIZE);
                bank[..available].copy_from_slice(&data[*offset..*offset + available]);
            }
            *offset += BANK_SIZE;
            bank
        };

        let prg_rom: Vec<[u8; BANK_SIZE]> =
            (0..prg_bank_count).map(|_| read_bank(&mut offset)).collect();

        let chr_is_ram = chr_bank_count == 0;
        let chr_mem: Vec<[u8; BANK_SIZE]> = if chr_is_ram {
            vec![[0u8; BANK_SIZE]; 8]
        } else {
            (0..chr_bank_count).map(|_| read_bank(&mut offset)).collect()
        };

        // PRG RAM size in 8KB units, zero meaning one unit
        let prg_ram_units = if data[8] == 0 { 1 } else { data[8] as usize };
        let prg_ram = vec![0u8; prg_ram_units * 8 * 1024];

        if mapper != 0 {
            warn!("Mapper {} is not implemented, treating as fixed-bank", mapper);
        }

        info!(
            "Loaded cartridge - Mapper: {}, PRG ROM: {}KB, CHR {}: {}KB, PRG RAM: {}KB, Mirroring: {:?}",
            mapper,
            prg_rom.len(),
            if chr_is_ram { "RAM" } else { "ROM" },
            chr_mem.len(),
            prg_ram.len() / 1024,
            mirroring
        );

        Ok(Self::assemble(prg_rom, prg_ram, chr_mem, chr_is_ram, mapper, mirroring))
    }

    fn assemble(
        prg_rom: Vec<[u8; BANK_SIZE]>,
        prg_ram: Vec<u8>,
        chr_mem: Vec<[u8; BANK_SIZE]>,
        chr_is_ram: bool,
        mapper: u8,
        mirroring: Mirroring,
    ) -> Self {
        // Identity maps, wrapped so that smaller carts mirror into every slot.
        let mut prg_rom_map = [0usize; 32];
        for (i, slot) in prg_rom_map.iter_mut().enumerate() {
            *slot = if prg_rom.is_empty() { 0 } else { i % prg_rom.len() };
        }

        let mut chr_mem_map = [0usize; 8];
        for (i, slot) in chr_mem_map.iter_mut().enumerate() {
            *slot = if chr_mem.is_empty() { 0 } else { i % chr_mem.len() };
        }

        Cartridge {
            prg_rom,
            prg_ram,
            chr_mem,
            chr_is_ram,
            mapper,
            mirroring,
            prg_rom_map,
            chr_mem_map,
        }
    }

    /// Read a byte from the cartridge's CPU-visible address space.
    pub fn read_prg(&self, addr: u16) -> u8 {
        match addr {
            // Expansion ROM, not populated
            0x4000..=0x5FFF => 0,

            // PRG RAM (8KB window)
            0x6000..=0x7FFF => self.prg_ram[(addr & 0x1FFF) as usize],

            // PRG ROM through the bank map
            0x8000..=0xFFFF => {
                if self.prg_rom.is_empty() {
                    return 0;
                }
                let bank = self.prg_rom_map[((addr & 0x7FFF) >> 10) as usize];
                self.prg_rom[bank][(addr & 0x03FF) as usize]
            }

            _ => 0,
        }
    }

    /// Write a byte to the cartridge's CPU-visible address space.
    /// ROM writes are ignored (a mapper would decode them here).
    pub fn write_prg(&mut self, addr: u16, value: u8) {
        if let 0x6000..=0x7FFF = addr {
            self.prg_ram[(addr & 0x1FFF) as usize] = value;
        }
    }

    /// Read a byte from CHR memory (PPU pattern table space).
    pub fn read_chr(&self, addr: u16) -> u8 {
        if addr > 0x1FFF || self.chr_mem.is_empty() {
            return 0;
        }
        let bank = self.chr_mem_map[((addr & 0x1FFF) >> 10) as usize];
        self.chr_mem[bank][(addr & 0x03FF) as usize]
    }

    /// Write a byte to CHR memory. A no-op unless the cartridge carries CHR RAM.
    pub fn write_chr(&mut self, addr: u16, value: u8) {
        if addr > 0x1FFF || !self.chr_is_ram || self.chr_mem.is_empty() {
            return;
        }
        let bank = self.chr_mem_map[((addr & 0x1FFF) >> 10) as usize];
        self.chr_mem[bank][(addr & 0x03FF) as usize] = value;
    }

    /// Read a nametable byte, routing the PPU address through the mirroring
    /// policy into the caller-supplied nametable RAM.
    pub fn read_name_table(&self, addr: u16, nt_ram: &NameTableRam) -> u8 {
        let offset = (addr & 0x03FF) as usize;
        match self.name_table_page(addr) {
            NameTablePage::A => nt_ram[0][offset],
            NameTablePage::B => nt_ram[1][offset],
            // Four-screen carts would supply their own VRAM for these pages.
            NameTablePage::C | NameTablePage::D => 0,
        }
    }

    /// Write a nametable byte through the mirroring policy.
    pub fn write_name_table(&self, addr: u16, value: u8, nt_ram: &mut NameTableRam) {
        let offset = (addr & 0x03FF) as usize;
        match self.name_table_page(addr) {
            NameTablePage::A => nt_ram[0][offset] = value,
            NameTablePage::B => nt_ram[1][offset] = value,
            NameTablePage::C | NameTablePage::D => {}
        }
    }

    /// Get the current mirroring mode
    pub fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    /// Get the mapper number declared by the header
    pub fn mapper(&self) -> u8 {
        self.mapper
    }

    fn name_table_page(&self, addr: u16) -> NameTablePage {
        match self.mirroring {
            // A A
            // B B
            Mirroring::Horizontal => {
                if (addr & 0x0800) == 0 {
                    NameTablePage::A
                } else {
                    NameTablePage::B
                }
            }

            // A B
            // A B
            Mirroring::Vertical => {
                if (addr & 0x0400) == 0 {
                    NameTablePage::A
                } else {
                    NameTablePage::B
                }
            }

            Mirroring::OneScreenA => NameTablePage::A,

            Mirroring::OneScreenB => NameTablePage::B,

            Mirroring::FourScreen => match addr & 0x0C00 {
                0x0000 => NameTablePage::A,
                0x0400 => NameTablePage::B,
                0x0800 => NameTablePage::C,
                _ => NameTablePage::D,
            },
        }
    }
}
