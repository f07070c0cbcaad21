//! CPU implementation for the Ricoh 2A03 (modified MOS 6502)
//!
//! The 2A03 is a MOS 6502 modified for the NES: decimal mode is disabled,
//! so ADC/SBC always run in binary mode regardless of the D flag.
//!
//! The interpreter dispatches through a 256-entry table of
//! (mnemonic, addressing mode, base cycles). Base cycles come straight from
//! the opcode grid; the only extra cycles are page-crossing penalties on
//! read-type indexed modes, branch-taken penalties, and whatever the memory
//! bus bills for a write (OAM DMA).

use log::{debug, trace};

/// Status register flag bits
pub mod flags {
    pub const CARRY: u8 = 0x01;
    pub const ZERO: u8 = 0x02;
    pub const INTERRUPT_DISABLE: u8 = 0x04;
    pub const DECIMAL: u8 = 0x08; // Settable but ignored on the 2A03
    pub const BREAK: u8 = 0x10;
    pub const UNUSED: u8 = 0x20; // Always reads as 1
    pub const OVERFLOW: u8 = 0x40;
    pub const NEGATIVE: u8 = 0x80;
}

/// Memory as seen from the CPU. Writes may bill extra cycles to the
/// executing instruction (this is how OAM DMA charges the CPU).
pub trait CpuBus {
    fn read(&mut self, addr: u16) -> u8;
    fn write(&mut self, addr: u16, value: u8) -> u32;
}

/// Interrupt kinds, in ascending priority
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Interrupt {
    Irq,
    Nmi,
    Reset,
}

/// Addressing modes for CPU instructions
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AddressingMode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Relative,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    IndexedIndirect, // (Indirect,X)
    IndirectIndexed, // (Indirect),Y
}

/// Instruction mnemonics, documented and unofficial
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[rustfmt::skip]
pub enum Mnemonic {
    Adc, And, Asl, Bcc, Bcs, Beq, Bit, Bmi, Bne, Bpl, Brk, Bvc, Bvs,
    Clc, Cld, Cli, Clv, Cmp, Cpx, Cpy, Dec, Dex, Dey, Eor, Inc, Inx,
    Iny, Jmp, Jsr, Lda, Ldx, Ldy, Lsr, Nop, Ora, Pha, Php, Pla, Plp,
    Rol, Ror, Rti, Rts, Sbc, Sec, Sed, Sei, Sta, Stx, Sty, Tax, Tay,
    Tsx, Txa, Txs, Tya,
    // Unofficial
    Dop, Top, Lax, Sax, Dcp, Isc, Slo, Rla, Sre, Rra,
}

/// One entry in the dispatch table
#[derive(Debug, Copy, Clone)]
pub struct OpInfo {
    pub mnemonic: Mnemonic,
    pub mode: AddressingMode,
    pub cycles: u32,
    /// Extra cycle when the indexed address crosses a page
    pub page_cycle: bool,
}

const fn op(mnemonic: Mnemonic, mode: AddressingMode, cycles: u32) -> OpInfo {
    OpInfo { mnemonic, mode, cycles, page_cycle: false }
}

const fn opx(mnemonic: Mnemonic, mode: AddressingMode, cycles: u32) -> OpInfo {
    OpInfo { mnemonic, mode, cycles, page_cycle: true }
}

use AddressingMode::*;
use Mnemonic::*;

/// The full opcode grid. Opcodes with no assigned behavior dispatch as
/// implied NOPs at their documented cycle cost.
#[rustfmt::skip]
pub static OPCODE_TABLE: [OpInfo; 256] = [
    // 0x00
    op(Brk, Implied, 7),  op(Ora, IndexedIndirect, 6), op(Nop, Implied, 2),  op(Slo, IndexedIndirect, 8),
    op(Dop, ZeroPage, 3), op(Ora, ZeroPage, 3),        op(Asl, ZeroPage, 5), op(Slo, ZeroPage, 5),
    op(Php, Implied, 3),  op(Ora, Immediate, 2),       op(Asl, Accumulator, 2), op(Nop, Implied, 2),
    op(Top, Absolute, 4), op(Ora, Absolute, 4),        op(Asl, Absolute, 6), op(Slo, Absolute, 6),
    // 0x10
    op(Bpl, Relative, 2),  opx(Ora, IndirectIndexed, 5), op(Nop, Implied, 2),  op(Slo, IndirectIndexed, 8),
    op(Dop, ZeroPageX, 4), op(Ora, ZeroPageX, 4),        op(Asl, ZeroPageX, 6), op(Slo, ZeroPageX, 6),
    op(Clc, Implied, 2),   opx(Ora, AbsoluteY, 4),       op(Nop, Implied, 2),  op(Slo, AbsoluteY, 7),
    opx(Top, AbsoluteX, 4), opx(Ora, AbsoluteX, 4),      op(Asl, AbsoluteX, 7), op(Slo, AbsoluteX, 7),
    // 0x20
    op(Jsr, Absolute, 6), op(And, IndexedIndirect, 6), op(Nop, Implied, 2),  op(Rla, IndexedIndirect, 8),
    op(Bit, ZeroPage, 3), op(And, ZeroPage, 3),        op(Rol, ZeroPage, 5), op(Rla, ZeroPage, 5),
    op(Plp, Implied, 4),  op(And, Immediate, 2),       op(Rol, Accumulator, 2), op(Nop, Implied, 2),
    op(Bit, Absolute, 4), op(And, Absolute, 4),        op(Rol, Absolute, 6), op(Rla, Absolute, 6),
    // 0x30
    op(Bmi, Relative, 2),  opx(And, IndirectIndexed, 5), op(Nop, Implied, 2),  op(Rla, IndirectIndexed, 8),
    op(Dop, ZeroPageX, 4), op(And, ZeroPageX, 4),        op(Rol, ZeroPageX, 6), op(Rla, ZeroPageX, 6),
    op(Sec, Implied, 2),   opx(And, AbsoluteY, 4),       op(Nop, Implied, 2),  op(Rla, AbsoluteY, 7),
    opx(Top, AbsoluteX, 4), opx(And, AbsoluteX, 4),      op(Rol, AbsoluteX, 7), op(Rla, AbsoluteX, 7),
    // 0x40
    op(Rti, Implied, 6),  op(Eor, IndexedIndirect, 6), op(Nop, Implied, 2),  op(Sre, IndexedIndirect, 8),
    op(Dop, ZeroPage, 3), op(Eor, ZeroPage, 3),        op(Lsr, ZeroPage, 5), op(Sre, ZeroPage, 5),
    op(Pha, Implied, 3),  op(Eor, Immediate, 2),       op(Lsr, Accumulator, 2), op(Nop, Implied, 2),
    op(Jmp, Absolute, 3), op(Eor, Absolute, 4),        op(Lsr, Absolute, 6), op(Sre, Absolute, 6),
    // 0x50
    op(Bvc, Relative, 2),  opx(Eor, IndirectIndexed, 5), op(Nop, Implied, 2),  op(Sre, IndirectIndexed, 8),
    op(Dop, ZeroPageX, 4), op(Eor, ZeroPageX, 4),        op(Lsr, ZeroPageX, 6), op(Sre, ZeroPageX, 6),
    op(Cli, Implied, 2),   opx(Eor, AbsoluteY, 4),       op(Nop, Implied, 2),  op(Sre, AbsoluteY, 7),
    opx(Top, AbsoluteX, 4), opx(Eor, AbsoluteX, 4),      op(Lsr, AbsoluteX, 7), op(Sre, AbsoluteX, 7),
    // 0x60
    op(Rts, Implied, 6),  op(Adc, IndexedIndirect, 6), op(Nop, Implied, 2),  op(Rra, IndexedIndirect, 8),
    op(Dop, ZeroPage, 3), op(Adc, ZeroPage, 3),        op(Ror, ZeroPage, 5), op(Rra, ZeroPage, 5),
    op(Pla, Implied, 4),  op(Adc, Immediate, 2),       op(Ror, Accumulator, 2), op(Nop, Implied, 2),
    op(Jmp, Indirect, 5), op(Adc, Absolute, 4),        op(Ror, Absolute, 6), op(Rra, Absolute, 6),
    // 0x70
    op(Bvs, Relative, 2),  opx(Adc, IndirectIndexed, 5), op(Nop, Implied, 2),  op(Rra, IndirectIndexed, 8),
    op(Dop, ZeroPageX, 4), op(Adc, ZeroPageX, 4),        op(Ror, ZeroPageX, 6), op(Rra, ZeroPageX, 6),
    op(Sei, Implied, 2),   opx(Adc, AbsoluteY, 4),       op(Nop, Implied, 2),  op(Rra, AbsoluteY, 7),
    opx(Top, AbsoluteX, 4), opx(Adc, AbsoluteX, 4),      op(Ror, AbsoluteX, 7), op(Rra, AbsoluteX, 7),
    // 0x80
    op(Dop, Immediate, 2), op(Sta, IndexedIndirect, 6), op(Dop, Immediate, 2), op(Sax, IndexedIndirect, 6),
    op(Sty, ZeroPage, 3),  op(Sta, ZeroPage, 3),        op(Stx, ZeroPage, 3),  op(Sax, ZeroPage, 3),
    op(Dey, Implied, 2),   op(Dop, Immediate, 2),       op(Txa, Implied, 2),   op(Nop, Implied, 2),
    op(Sty, Absolute, 4),  op(Sta, Absolute, 4),        op(Stx, Absolute, 4),  op(Sax, Absolute, 4),
    // 0x90
    op(Bcc, Relative, 2),  op(Sta, IndirectIndexed, 6), op(Nop, Implied, 2),  op(Nop, Implied, 6),
    op(Sty, ZeroPageX, 4), op(Sta, ZeroPageX, 4),       op(Stx, ZeroPageY, 4), op(Sax, ZeroPageY, 4),
    op(Tya, Implied, 2),   op(Sta, AbsoluteY, 5),       op(Txs, Implied, 2),  op(Nop, Implied, 5),
    op(Nop, Implied, 5),   op(Sta, AbsoluteX, 5),       op(Nop, Implied, 5),  op(Nop, Implied, 5),
    // 0xA0
    op(Ldy, Immediate, 2), op(Lda, IndexedIndirect, 6), op(Ldx, Immediate, 2), op(Lax, IndexedIndirect, 6),
    op(Ldy, ZeroPage, 3),  op(Lda, ZeroPage, 3),        op(Ldx, ZeroPage, 3),  op(Lax, ZeroPage, 3),
    op(Tay, Implied, 2),   op(Lda, Immediate, 2),       op(Tax, Implied, 2),   op(Nop, Implied, 2),
    op(Ldy, Absolute, 4),  op(Lda, Absolute, 4),        op(Ldx, Absolute, 4),  op(Lax, Absolute, 4),
    // 0xB0
    op(Bcs, Relative, 2),  opx(Lda, IndirectIndexed, 5), op(Nop, Implied, 2),  opx(Lax, IndirectIndexed, 5),
    op(Ldy, ZeroPageX, 4), op(Lda, ZeroPageX, 4),        op(Ldx, ZeroPageY, 4), op(Lax, ZeroPageY, 4),
    op(Clv, Implied, 2),   opx(Lda, AbsoluteY, 4),       op(Tsx, Implied, 2),  op(Nop, Implied, 4),
    opx(Ldy, AbsoluteX, 4), opx(Lda, AbsoluteX, 4),      opx(Ldx, AbsoluteY, 4), op(Lax, AbsoluteY, 4),
    // 0xC0
    op(Cpy, Immediate, 2), op(Cmp, IndexedIndirect, 6), op(Dop, Immediate, 2), op(Dcp, IndexedIndirect, 8),
    op(Cpy, ZeroPage, 3),  op(Cmp, ZeroPage, 3),        op(Dec, ZeroPage, 5),  op(Dcp, ZeroPage, 5),
    op(Iny, Implied, 2),   op(Cmp, Immediate, 2),       op(Dex, Implied, 2),   op(Nop, Implied, 2),
    op(Cpy, Absolute, 4),  op(Cmp, Absolute, 4),        op(Dec, Absolute, 6),  op(Dcp, Absolute, 6),
    // 0xD0
    op(Bne, Relative, 2),  opx(Cmp, IndirectIndexed, 5), op(Nop, Implied, 2),  op(Dcp, IndirectIndexed, 8),
    op(Dop, ZeroPageX, 4), op(Cmp, ZeroPageX, 4),        op(Dec, ZeroPageX, 6), op(Dcp, ZeroPageX, 6),
    op(Cld, Implied, 2),   opx(Cmp, AbsoluteY, 4),       op(Nop, Implied, 2),  op(Dcp, AbsoluteY, 7),
    opx(Top, AbsoluteX, 4), opx(Cmp, AbsoluteX, 4),      op(Dec, AbsoluteX, 7), op(Dcp, AbsoluteX, 7),
    // 0xE0
    op(Cpx, Immediate, 2), op(Sbc, IndexedIndirect, 6), op(Dop, Immediate, 3), op(Isc, IndexedIndirect, 8),
    op(Cpx, ZeroPage, 3),  op(Sbc, ZeroPage, 3),        op(Inc, ZeroPage, 5),  op(Isc, ZeroPage, 5),
    op(Inx, Implied, 2),   op(Sbc, Immediate, 2),       op(Nop, Implied, 2),   op(Sbc, Immediate, 2),
    op(Cpx, Absolute, 4),  op(Sbc, Absolute, 4),        op(Inc, Absolute, 6),  op(Isc, Absolute, 6),
    // 0xF0
    op(Beq, Relative, 2),  opx(Sbc, IndirectIndexed, 5), op(Nop, Implied, 2),  op(Isc, IndirectIndexed, 8),
    op(Dop, ZeroPageX, 4), op(Sbc, ZeroPageX, 4),        op(Inc, ZeroPageX, 6), op(Isc, ZeroPageX, 6),
    op(Sed, Implied, 2),   opx(Sbc, AbsoluteY, 4),       op(Nop, Implied, 2),  op(Isc, AbsoluteY, 7),
    opx(Top, AbsoluteX, 4), opx(Sbc, AbsoluteX, 4),      op(Inc, AbsoluteX, 7), op(Isc, AbsoluteX, 7),
];

/// Represents the Ricoh 2A03 CPU
pub struct Cpu {
    /// Accumulator register
    pub a: u8,
    /// X index register
    pub x: u8,
    /// Y index register
    pub y: u8,
    /// Stack pointer (0x0100 - 0x01FF)
    pub s: u8,
    /// Status register
    pub p: u8,
    /// Program counter
    pub pc: u16,
    /// Cycle count attributed to the last executed op
    pub op_cycles: u32,
    /// Pending interrupt, serviced before the next opcode fetch
    pending_interrupt: Option<Interrupt>,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    pub fn new() -> Self {
        Cpu {
            a: 0,
            x: 0,
            y: 0,
            s: 0xFF,
            p: flags::BREAK | flags::UNUSED | flags::INTERRUPT_DISABLE,
            pc: 0,
            op_cycles: 0,
            pending_interrupt: None,
        }
    }

    /// Power-on initialization. Loads PC from the reset vector and charges
    /// the 7 startup cycles.
    pub fn init(&mut self, bus: &mut impl CpuBus) -> u32 {
        self.a = 0x00;
        self.x = 0x00;
        self.y = 0x00;
        self.s = 0xFF;
        self.p = flags::BREAK | flags::UNUSED | flags::INTERRUPT_DISABLE;
        self.op_cycles = 7;
        self.pending_interrupt = None;

        self.pc = u16::from_le_bytes([bus.read(0xFFFC), bus.read(0xFFFD)]);
        debug!("CPU power-on, PC=${:04X}", self.pc);

        self.op_cycles
    }

    /// Schedule a RESET, serviced before the next opcode fetch
    pub fn reset(&mut self) {
        self.request_interrupt(Interrupt::Reset);
    }

    /// Raise a non-maskable interrupt
    pub fn nmi(&mut self) {
        debug!("CPU NMI requested");
        self.request_interrupt(Interrupt::Nmi);
    }

    /// Raise a maskable interrupt request
    pub fn irq(&mut self) {
        self.request_interrupt(Interrupt::Irq);
    }

    /// Execute one instruction (or service a pending interrupt) and return
    /// the number of cycles consumed.
    pub fn execute_op(&mut self, bus: &mut impl CpuBus) -> u32 {
        if self.pending_interrupt.is_some() {
            self.service_pending_interrupt(bus);
        } else {
            let opcode = bus.read(self.pc);
            trace!(
                "${:04X}: ${:02X} A:{:02X} X:{:02X} Y:{:02X} P:{:02X} SP:{:02X}",
                self.pc, opcode, self.a, self.x, self.y, self.p, self.s
            );
            self.pc = self.pc.wrapping_add(1);

            let info = OPCODE_TABLE[opcode as usize];
            self.op_cycles = info.cycles;
            self.execute(bus, info);
        }

        self.op_cycles
    }

    //
    // Interrupt handling
    //

    /// Priority rules: RESET overrides anything, NMI overrides IRQ, IRQ
    /// never displaces a pending NMI or RESET.
    fn request_interrupt(&mut self, kind: Interrupt) {
        match self.pending_interrupt {
            None | Some(Interrupt::Irq) => self.pending_interrupt = Some(kind),
            Some(Interrupt::Nmi) => {
                if kind == Interrupt::Reset {
                    self.pending_interrupt = Some(kind);
                }
            }
            Some(Interrupt::Reset) => {}
        }
    }

    fn service_pending_interrupt(&mut self, bus: &mut impl CpuBus) {
        self.op_cycles = 0;

        match self.pending_interrupt {
            Some(Interrupt::Reset) => {
                self.op_cycles = 7;
                self.a = 0x00;
                self.x = 0x00;
                self.y = 0x00;
                self.s = 0xFF;
                self.p = flags::ZERO | flags::UNUSED;
                self.pc = u16::from_le_bytes([bus.read(0xFFFC), bus.read(0xFFFD)]);
                debug!("RESET serviced, PC=${:04X}", self.pc);
            }

            Some(Interrupt::Nmi) => {
                self.op_cycles = 7;
                self.push(bus, (self.pc >> 8) as u8);
                // The low PC byte is pushed with its bits cleared; the handler
                // is expected to never return through this frame.
                self.push(bus, (self.pc & 0xFF00) as u8);
                self.push(bus, self.p & !flags::BREAK);
                self.p &= !flags::DECIMAL;
                self.pc = u16::from_le_bytes([bus.read(0xFFFA), bus.read(0xFFFB)]);
                debug!("NMI serviced, PC=${:04X}", self.pc);
            }

            Some(Interrupt::Irq) => {
                if (self.p & flags::INTERRUPT_DISABLE) == 0 {
                    self.op_cycles = 7;
                    self.push(bus, (self.pc >> 8) as u8);
                    self.push(bus, (self.pc & 0xFF) as u8);
                    self.push(bus, self.p & !flags::BREAK);
                    self.p &= !flags::DECIMAL;
                    self.p |= flags::INTERRUPT_DISABLE;
                    self.pc = u16::from_le_bytes([bus.read(0xFFFE), bus.read(0xFFFF)]);
                    debug!("IRQ serviced, PC=${:04X}", self.pc);
                }
            }

            None => {}
        }

        self.pending_interrupt = None;
    }

    //
    // Memory and stack helpers
    //

    fn write(&mut self, bus: &mut impl CpuBus, addr: u16, value: u8) {
        let extra_cycles = bus.write(addr, value);
        self.op_cycles += extra_cycles;
    }

    fn push(&mut self, bus: &mut impl CpuBus, value: u8) {
        self.write(bus, 0x0100 | u16::from(self.s), value);
        self.s = self.s.wrapping_sub(1);
    }

    fn pop(&mut self, bus: &mut impl CpuBus) -> u8 {
        self.s = self.s.wrapping_add(1);
        bus.read(0x0100 | u16::from(self.s))
    }

    //
    // Addressing modes
    //

    /// Decode the operand address for the given mode, advancing PC past the
    /// operand bytes. Read-type indexed modes add the page-crossing cycle
    /// when `page_cycle` is set.
    fn operand_address(&mut self, bus: &mut impl CpuBus, info: OpInfo) -> u16 {
        match info.mode {
            Implied | Accumulator => 0,

            Immediate => {
                let addr = self.pc;
                self.pc = self.pc.wrapping_add(1);
                addr
            }

            ZeroPage => {
                let low = bus.read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                u16::from(low)
            }

            ZeroPageX => {
                let low = bus.read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                u16::from(low.wrapping_add(self.x))
            }

            ZeroPageY => {
                let low = bus.read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                u16::from(low.wrapping_add(self.y))
            }

            Absolute => self.read_operand_word(bus),

            AbsoluteX => {
                let base = self.read_operand_word(bus);
                let addr = base.wrapping_add(u16::from(self.x));
                if info.page_cycle && page_crossed(base, addr) {
                    self.op_cycles += 1;
                }
                addr
            }

            AbsoluteY => {
                let base = self.read_operand_word(bus);
                let addr = base.wrapping_add(u16::from(self.y));
                if info.page_cycle && page_crossed(base, addr) {
                    self.op_cycles += 1;
                }
                addr
            }

            Relative => {
                let offset = bus.read(self.pc) as i8;
                self.pc = self.pc.wrapping_add(1);
                self.pc.wrapping_add(offset as u16)
            }

            IndexedIndirect => {
                let operand = bus.read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                let ptr = operand.wrapping_add(self.x);
                let low = bus.read(u16::from(ptr));
                let high = bus.read(u16::from(ptr.wrapping_add(1)));
                u16::from_le_bytes([low, high])
            }

            IndirectIndexed => {
                let operand = bus.read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                let low = bus.read(u16::from(operand));
                let high = bus.read(u16::from(operand.wrapping_add(1)));
                let base = u16::from_le_bytes([low, high]);
                let addr = base.wrapping_add(u16::from(self.y));
                if info.page_cycle && page_crossed(base, addr) {
                    self.op_cycles += 1;
                }
                addr
            }

            Indirect => {
                let ptr = self.read_operand_word(bus);
                let low = bus.read(ptr);
                // 6502 quirk: the high byte is fetched from the same page
                // when the pointer sits at a page boundary.
                let high = if (ptr & 0x00FF) == 0x00FF {
                    bus.read(ptr & 0xFF00)
                } else {
                    bus.read(ptr.wrapping_add(1))
                };
                u16::from_le_bytes([low, high])
            }
        }
    }

    fn read_operand_word(&mut self, bus: &mut impl CpuBus) -> u16 {
        let low = bus.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        let high = bus.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        u16::from_le_bytes([low, high])
    }

    //
    // Instruction execution
    //

    fn execute(&mut self, bus: &mut impl CpuBus, info: OpInfo) {
        match info.mnemonic {
            Adc => self.op_adc(bus, info),
            And => self.op_and(bus, info),
            Asl => self.op_asl(bus, info),
            Bcc => self.op_branch(bus, info, (self.p & flags::CARRY) == 0),
            Bcs => self.op_branch(bus, info, (self.p & flags::CARRY) != 0),
            Beq => self.op_branch(bus, info, (self.p & flags::ZERO) != 0),
            Bit => self.op_bit(bus, info),
            Bmi => self.op_branch(bus, info, (self.p & flags::NEGATIVE) != 0),
            Bne => self.op_branch(bus, info, (self.p & flags::ZERO) == 0),
            Bpl => self.op_branch(bus, info, (self.p & flags::NEGATIVE) == 0),
            Brk => self.op_brk(bus),
            Bvc => self.op_branch(bus, info, (self.p & flags::OVERFLOW) == 0),
            Bvs => self.op_branch(bus, info, (self.p & flags::OVERFLOW) != 0),
            Clc => self.p &= !flags::CARRY,
            Cld => self.p &= !flags::DECIMAL,
            Cli => self.p &= !flags::INTERRUPT_DISABLE,
            Clv => self.p &= !flags::OVERFLOW,
            Cmp => {
                let addr = self.operand_address(bus, info);
                let value = bus.read(addr);
                self.op_compare(self.a, value);
            }
            Cpx => {
                let addr = self.operand_address(bus, info);
                let value = bus.read(addr);
                self.op_compare(self.x, value);
            }
            Cpy => {
                let addr = self.operand_address(bus, info);
                let value = bus.read(addr);
                self.op_compare(self.y, value);
            }
            Dec => {
                let addr = self.operand_address(bus, info);
                let value = bus.read(addr);
                let result = self.op_decrease(value);
                self.write(bus, addr, result);
            }
            Dex => self.x = self.op_decrease(self.x),
            Dey => self.y = self.op_decrease(self.y),
            Eor => {
                let addr = self.operand_address(bus, info);
                let value = bus.read(addr);
                self.op_eor_value(value);
            }
            Inc => {
                let addr = self.operand_address(bus, info);
                let value = bus.read(addr);
                let result = self.op_increase(value);
                self.write(bus, addr, result);
            }
            Inx => self.x = self.op_increase(self.x),
            Iny => self.y = self.op_increase(self.y),
            Jmp => self.pc = self.operand_address(bus, info),
            Jsr => self.op_jsr(bus, info),
            Lda => {
                let addr = self.operand_address(bus, info);
                let value = bus.read(addr);
                self.a = self.op_load(value);
            }
            Ldx => {
                let addr = self.operand_address(bus, info);
                let value = bus.read(addr);
                self.x = self.op_load(value);
            }
            Ldy => {
                let addr = self.operand_address(bus, info);
                let value = bus.read(addr);
                self.y = self.op_load(value);
            }
            Lsr => self.op_lsr(bus, info),
            Nop => {}
            Ora => {
                let addr = self.operand_address(bus, info);
                let value = bus.read(addr);
                self.op_ora_value(value);
            }
            Pha => self.push(bus, self.a),
            Php => self.push(bus, self.p | flags::BREAK),
            Pla => self.op_pla(bus),
            Plp => self.p = (self.pop(bus) & !flags::BREAK) | flags::UNUSED,
            Rol => self.op_rol(bus, info),
            Ror => self.op_ror(bus, info),
            Rti => self.op_rti(bus),
            Rts => self.op_rts(bus),
            Sbc => self.op_sbc(bus, info),
            Sec => self.p |= flags::CARRY,
            Sed => self.p |= flags::DECIMAL,
            Sei => self.p |= flags::INTERRUPT_DISABLE,
            Sta => {
                let addr = self.operand_address(bus, info);
                let a = self.a;
                self.write(bus, addr, a);
            }
            Stx => {
                let addr = self.operand_address(bus, info);
                let x = self.x;
                self.write(bus, addr, x);
            }
            Sty => {
                let addr = self.operand_address(bus, info);
                let y = self.y;
                self.write(bus, addr, y);
            }
            Tax => {
                self.x = self.a;
                self.op_transfer_flags(self.x);
            }
            Tay => {
                self.y = self.a;
                self.op_transfer_flags(self.y);
            }
            Tsx => {
                self.x = self.s;
                self.op_transfer_flags(self.x);
            }
            Txa => {
                self.a = self.x;
                self.op_transfer_flags(self.a);
            }
            Txs => self.s = self.x,
            Tya => {
                self.a = self.y;
                self.op_transfer_flags(self.a);
            }

            // Unofficial opcodes
            Dop | Top => {
                // Multi-byte NOPs still perform the operand read
                let addr = self.operand_address(bus, info);
                bus.read(addr);
            }
            Lax => {
                let addr = self.operand_address(bus, info);
                let value = bus.read(addr);
                self.a = self.op_load(value);
                self.x = self.a;
            }
            Sax => {
                let addr = self.operand_address(bus, info);
                let result = self.a & self.x;
                self.write(bus, addr, result);
            }
            Dcp => self.op_dcp(bus, info),
            Isc => self.op_isc(bus, info),
            Slo => self.op_slo(bus, info),
            Rla => self.op_rla(bus, info),
            Sre => self.op_sre(bus, info),
            Rra => self.op_rra(bus, info),
        }
    }

    fn op_adc(&mut self, bus: &mut impl CpuBus, info: OpInfo) {
        let addr = self.operand_address(bus, info);
        let value = bus.read(addr);
        self.op_add_value(value, (self.p & flags::CARRY) != 0);
    }

    /// Binary-mode add shared by ADC and RRA. The 2A03 ignores the D flag.
    fn op_add_value(&mut self, value: u8, carry_in: bool) {
        let mut res = u32::from(self.a) + u32::from(value);
        if carry_in {
            res += 1;
        }

        self.p &= !(flags::NEGATIVE | flags::OVERFLOW | flags::ZERO | flags::CARRY);
        self.p |= (res as u8) & flags::NEGATIVE;
        if ((self.a ^ res as u8) & !(self.a ^ value) & 0x80) != 0 {
            self.p |= flags::OVERFLOW;
        }
        if res as u8 == 0 {
            self.p |= flags::ZERO;
        }
        if res > 0xFF {
            self.p |= flags::CARRY;
        }

        self.a = res as u8;
    }

    fn op_and(&mut self, bus: &mut impl CpuBus, info: OpInfo) {
        let addr = self.operand_address(bus, info);
        let value = bus.read(addr);

        self.a &= value;
        self.p &= !(flags::NEGATIVE | flags::ZERO);
        self.p |= self.a & flags::NEGATIVE;
        if self.a == 0 {
            self.p |= flags::ZERO;
        }
    }

    fn op_asl(&mut self, bus: &mut impl CpuBus, info: OpInfo) {
        if info.mode == Accumulator {
            self.a = self.op_asl_value(self.a);
        } else {
            let addr = self.operand_address(bus, info);
            let value = bus.read(addr);
            let result = self.op_asl_value(value);
            self.write(bus, addr, result);
        }
    }

    fn op_asl_value(&mut self, value: u8) -> u8 {
        let res = value.wrapping_shl(1);
        self.p &= !(flags::NEGATIVE | flags::ZERO | flags::CARRY);
        self.p |= res & flags::NEGATIVE;
        if res == 0 {
            self.p |= flags::ZERO;
        }
        if (value & 0x80) != 0 {
            self.p |= flags::CARRY;
        }
        res
    }

    /// Taken branches cost one extra cycle, two when the target sits on a
    /// different page than the updated PC.
    fn op_branch(&mut self, bus: &mut impl CpuBus, info: OpInfo, condition: bool) {
        let target = self.operand_address(bus, info);
        if condition {
            if page_crossed(self.pc, target) {
                self.op_cycles += 2;
            } else {
                self.op_cycles += 1;
            }
            self.pc = target;
        }
    }

    fn op_bit(&mut self, bus: &mut impl CpuBus, info: OpInfo) {
        let addr = self.operand_address(bus, info);
        let value = bus.read(addr);

        self.p &= !(flags::NEGATIVE | flags::OVERFLOW | flags::ZERO);
        self.p |= value & (flags::NEGATIVE | flags::OVERFLOW);
        if (self.a & value) == 0 {
            self.p |= flags::ZERO;
        }
    }

    fn op_brk(&mut self, bus: &mut impl CpuBus) {
        // The byte after the opcode is skipped (a padding byte by convention)
        self.pc = self.pc.wrapping_add(1);
        self.push(bus, (self.pc >> 8) as u8);
        self.push(bus, (self.pc & 0xFF) as u8);
        self.p |= flags::BREAK;
        let p = self.p;
        self.push(bus, p);
        self.pc = u16::from_le_bytes([bus.read(0xFFFE), bus.read(0xFFFF)]);
    }

    fn op_compare(&mut self, register: u8, value: u8) {
        let res = register.wrapping_sub(value);
        self.p &= !(flags::NEGATIVE | flags::ZERO | flags::CARRY);
        self.p |= res & flags::NEGATIVE;
        if res == 0 {
            self.p |= flags::ZERO;
        }
        if register >= value {
            self.p |= flags::CARRY;
        }
    }

    fn op_decrease(&mut self, value: u8) -> u8 {
        let res = value.wrapping_sub(1);
        self.p &= !(flags::NEGATIVE | flags::ZERO);
        self.p |= res & flags::NEGATIVE;
        if res == 0 {
            self.p |= flags::ZERO;
        }
        res
    }

    fn op_increase(&mut self, value: u8) -> u8 {
        let res = value.wrapping_add(1);
        self.p &= !(flags::NEGATIVE | flags::ZERO);
        self.p |= res & flags::NEGATIVE;
        if res == 0 {
            self.p |= flags::ZERO;
        }
        res
    }

    fn op_eor_value(&mut self, value: u8) {
        self.a ^= value;
        self.p &= !(flags::NEGATIVE | flags::ZERO);
        self.p |= self.a & flags::NEGATIVE;
        if self.a == 0 {
            self.p |= flags::ZERO;
        }
    }

    fn op_ora_value(&mut self, value: u8) {
        self.a |= value;
        self.p &= !(flags::NEGATIVE | flags::ZERO);
        self.p |= self.a & flags::NEGATIVE;
        if self.a == 0 {
            self.p |= flags::ZERO;
        }
    }

    fn op_jsr(&mut self, bus: &mut impl CpuBus, info: OpInfo) {
        let target = self.operand_address(bus, info);
        self.pc = self.pc.wrapping_sub(1);
        self.push(bus, (self.pc >> 8) as u8);
        self.push(bus, (self.pc & 0xFF) as u8);
        self.pc = target;
    }

    fn op_load(&mut self, value: u8) -> u8 {
        self.p &= !(flags::NEGATIVE | flags::ZERO);
        self.p |= value & flags::NEGATIVE;
        if value == 0 {
            self.p |= flags::ZERO;
        }
        value
    }

    fn op_lsr(&mut self, bus: &mut impl CpuBus, info: OpInfo) {
        if info.mode == Accumulator {
            self.a = self.op_lsr_value(self.a);
        } else {
            let addr = self.operand_address(bus, info);
            let value = bus.read(addr);
            let result = self.op_lsr_value(value);
            self.write(bus, addr, result);
        }
    }

    fn op_lsr_value(&mut self, value: u8) -> u8 {
        let res = value >> 1;
        self.p &= !(flags::NEGATIVE | flags::ZERO | flags::CARRY);
        if res == 0 {
            self.p |= flags::ZERO;
        }
        if (value & 0x01) != 0 {
            self.p |= flags::CARRY;
        }
        res
    }

    fn op_pla(&mut self, bus: &mut impl CpuBus) {
        self.a = self.pop(bus);
        self.p &= !(flags::NEGATIVE | flags::ZERO);
        self.p |= self.a & flags::NEGATIVE;
        if self.a == 0 {
            self.p |= flags::ZERO;
        }
    }

    fn op_rol(&mut self, bus: &mut impl CpuBus, info: OpInfo) {
        if info.mode == Accumulator {
            self.a = self.op_rol_value(self.a);
        } else {
            let addr = self.operand_address(bus, info);
            let value = bus.read(addr);
            let result = self.op_rol_value(value);
            self.write(bus, addr, result);
        }
    }

    fn op_rol_value(&mut self, value: u8) -> u8 {
        let mut res = value.wrapping_shl(1);
        if (self.p & flags::CARRY) != 0 {
            res |= 0x01;
        }
        self.p &= !(flags::NEGATIVE | flags::ZERO | flags::CARRY);
        self.p |= res & flags::NEGATIVE;
        if res == 0 {
            self.p |= flags::ZERO;
        }
        if (value & 0x80) != 0 {
            self.p |= flags::CARRY;
        }
        res
    }

    fn op_ror(&mut self, bus: &mut impl CpuBus, info: OpInfo) {
        if info.mode == Accumulator {
            self.a = self.op_ror_value(self.a);
        } else {
            let addr = self.operand_address(bus, info);
            let value = bus.read(addr);
            let result = self.op_ror_value(value);
            self.write(bus, addr, result);
        }
    }

    fn op_ror_value(&mut self, value: u8) -> u8 {
        let mut res = value >> 1;
        if (self.p & flags::CARRY) != 0 {
            res |= 0x80;
        }
        self.p &= !(flags::NEGATIVE | flags::ZERO | flags::CARRY);
        self.p |= res & flags::NEGATIVE;
        if res == 0 {
            self.p |= flags::ZERO;
        }
        if (value & 0x01) != 0 {
            self.p |= flags::CARRY;
        }
        res
    }

    fn op_rti(&mut self, bus: &mut impl CpuBus) {
        self.p = (self.pop(bus) & !flags::BREAK) | flags::UNUSED;
        let pcl = self.pop(bus);
        let pch = self.pop(bus);
        self.pc = u16::from_le_bytes([pcl, pch]);
    }

    fn op_rts(&mut self, bus: &mut impl CpuBus) {
        let pcl = self.pop(bus);
        let pch = self.pop(bus);
        self.pc = u16::from_le_bytes([pcl, pch]).wrapping_add(1);
    }

    fn op_sbc(&mut self, bus: &mut impl CpuBus, info: OpInfo) {
        let addr = self.operand_address(bus, info);
        let value = bus.read(addr);
        self.op_subtract_value(value);
    }

    /// Binary-mode subtract. Carry acts as the inverted borrow.
    fn op_subtract_value(&mut self, value: u8) {
        let a = i32::from(self.a);
        let m = i32::from(value);
        let mut res = a - m;
        if (self.p & flags::CARRY) == 0 {
            res -= 1;
        }

        self.p &= !(flags::NEGATIVE | flags::OVERFLOW | flags::ZERO | flags::CARRY);
        self.p |= (res as u8) & flags::NEGATIVE;
        if ((a ^ m) & (a ^ (res & 0xFF)) & 0x80) != 0 {
            self.p |= flags::OVERFLOW;
        }
        if (res & 0xFF) == 0 {
            self.p |= flags::ZERO;
        }
        if (res & 0x100) == 0 {
            self.p |= flags::CARRY;
        }

        self.a = res as u8;
    }

    fn op_dcp(&mut self, bus: &mut impl CpuBus, info: OpInfo) {
        let addr = self.operand_address(bus, info);
        let value = bus.read(addr).wrapping_sub(1);

        // Compare against the decremented value; the 9th bit carries the borrow.
        let diff = i32::from(self.a) - i32::from(value);
        self.p &= !(flags::NEGATIVE | flags::ZERO | flags::CARRY);
        if (diff & 0x80) != 0 {
            self.p |= flags::NEGATIVE;
        }
        if diff == 0 {
            self.p |= flags::ZERO;
        }
        if (diff & 0x100) == 0 {
            self.p |= flags::CARRY;
        }

        self.write(bus, addr, value);
    }

    fn op_isc(&mut self, bus: &mut impl CpuBus, info: OpInfo) {
        let addr = self.operand_address(bus, info);
        let value = bus.read(addr).wrapping_add(1);

        let a = i32::from(self.a);
        let m = i32::from(value);
        let mut result = a - m;
        if (self.p & flags::CARRY) == 0 {
            result -= 1;
        }

        self.p &= !(flags::NEGATIVE | flags::OVERFLOW | flags::ZERO | flags::CARRY);
        if ((a ^ m) & (a ^ (result & 0xFF)) & 0x80) != 0 {
            self.p |= flags::OVERFLOW;
        }
        if (result & 0x100) == 0 {
            self.p |= flags::CARRY;
        }

        self.a = result as u8;
        if self.a == 0 {
            self.p |= flags::ZERO;
        }
        self.p |= self.a & flags::NEGATIVE;

        self.write(bus, addr, value);
    }

    fn op_slo(&mut self, bus: &mut impl CpuBus, info: OpInfo) {
        let addr = self.operand_address(bus, info);
        let value = bus.read(addr);
        let result = value.wrapping_shl(1);

        self.a |= result;
        self.p &= !(flags::NEGATIVE | flags::ZERO | flags::CARRY);
        self.p |= self.a & flags::NEGATIVE;
        if self.a == 0 {
            self.p |= flags::ZERO;
        }
        if (value & 0x80) != 0 {
            self.p |= flags::CARRY;
        }

        self.write(bus, addr, result);
    }

    fn op_rla(&mut self, bus: &mut impl CpuBus, info: OpInfo) {
        let addr = self.operand_address(bus, info);
        let value = bus.read(addr);

        let mut result = value.wrapping_shl(1);
        if (self.p & flags::CARRY) != 0 {
            result |= 0x01;
        }

        self.a &= result;
        self.p &= !(flags::NEGATIVE | flags::ZERO | flags::CARRY);
        self.p |= self.a & flags::NEGATIVE;
        if self.a == 0 {
            self.p |= flags::ZERO;
        }
        if (value & 0x80) != 0 {
            self.p |= flags::CARRY;
        }

        self.write(bus, addr, result);
    }

    fn op_sre(&mut self, bus: &mut impl CpuBus, info: OpInfo) {
        let addr = self.operand_address(bus, info);
        let value = bus.read(addr);
        let result = value >> 1;

        self.a ^= result;
        self.p &= !(flags::NEGATIVE | flags::ZERO | flags::CARRY);
        self.p |= self.a & flags::NEGATIVE;
        // Z tracks the shifted memory value here, not the accumulator
        if result == 0 {
            self.p |= flags::ZERO;
        }
        if (value & 0x01) != 0 {
            self.p |= flags::CARRY;
        }

        self.write(bus, addr, result);
    }

    fn op_rra(&mut self, bus: &mut impl CpuBus, info: OpInfo) {
        let addr = self.operand_address(bus, info);
        let original = bus.read(addr);

        let mut rotated = original >> 1;
        if (self.p & flags::CARRY) != 0 {
            rotated |= 0x80;
        }

        // The rotate's carry-out (bit 0 of the original) feeds the add.
        self.op_add_value(rotated, (original & 0x01) != 0);

        self.write(bus, addr, rotated);
    }

    fn op_transfer_flags(&mut self, register: u8) {
        self.p &= !(flags::NEGATIVE | flags::ZERO);
        self.p |= register & flags::NEGATIVE;
        if register == 0 {
            self.p |= flags::ZERO;
        }
    }
}

fn page_crossed(addr1: u16, addr2: u16) -> bool {
    (addr1 >> 8) != (addr2 >> 8)
}
