//! Register and flag file for the 8086 core.
//!
//! Byte views of the general registers (AL/AH etc.) are computed by
//! shift/mask accessors over the word storage, so writes through either
//! view are always visible through the other.

use serde::{Deserialize, Serialize};

// Flag bit positions in the packed FLAGS word
pub const FLAG_CF: u16 = 0x0001; // Carry Flag
pub const FLAG_PF: u16 = 0x0004; // Parity Flag
pub const FLAG_AF: u16 = 0x0010; // Auxiliary Carry Flag
pub const FLAG_ZF: u16 = 0x0040; // Zero Flag
pub const FLAG_SF: u16 = 0x0080; // Sign Flag
pub const FLAG_TF: u16 = 0x0100; // Trap Flag
pub const FLAG_IF: u16 = 0x0200; // Interrupt Enable Flag
pub const FLAG_DF: u16 = 0x0400; // Direction Flag
pub const FLAG_OF: u16 = 0x0800; // Overflow Flag

/// Reserved bit 1 always reads as set on real hardware.
pub const FLAG_RESERVED: u16 = 0x0002;

/// Segment register selector, in hardware encoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    ES,
    CS,
    SS,
    DS,
}

impl Segment {
    /// Decode the two-bit segment field used by PUSH/POP seg and the
    /// override prefixes.
    pub fn from_index(index: u8) -> Self {
        match index & 3 {
            0 => Segment::ES,
            1 => Segment::CS,
            2 => Segment::SS,
            _ => Segment::DS,
        }
    }
}

/// General, segment and pointer registers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    /// AX register (accumulator) - byte halves AH:AL
    pub ax: u16,
    /// CX register (count) - byte halves CH:CL
    pub cx: u16,
    /// DX register (data) - byte halves DH:DL
    pub dx: u16,
    /// BX register (base) - byte halves BH:BL
    pub bx: u16,
    /// SP register (stack pointer)
    pub sp: u16,
    /// BP register (base pointer)
    pub bp: u16,
    /// SI register (source index)
    pub si: u16,
    /// DI register (destination index)
    pub di: u16,

    /// ES register (extra segment)
    pub es: u16,
    /// CS register (code segment)
    pub cs: u16,
    /// SS register (stack segment)
    pub ss: u16,
    /// DS register (data segment)
    pub ds: u16,

    /// IP register (instruction pointer)
    pub ip: u16,
}

impl Registers {
    /// Get a 16-bit register by hardware index (AX CX DX BX SP BP SI DI)
    #[inline]
    pub fn reg16(&self, reg: u8) -> u16 {
        debug_assert!(reg < 8, "invalid 16-bit register index: {}", reg);
        match reg {
            0 => self.ax,
            1 => self.cx,
            2 => self.dx,
            3 => self.bx,
            4 => self.sp,
            5 => self.bp,
            6 => self.si,
            7 => self.di,
            _ => unreachable!(),
        }
    }

    /// Set a 16-bit register by hardware index
    #[inline]
    pub fn set_reg16(&mut self, reg: u8, val: u16) {
        debug_assert!(reg < 8, "invalid 16-bit register index: {}", reg);
        match reg {
            0 => self.ax = val,
            1 => self.cx = val,
            2 => self.dx = val,
            3 => self.bx = val,
            4 => self.sp = val,
            5 => self.bp = val,
            6 => self.si = val,
            7 => self.di = val,
            _ => unreachable!(),
        }
    }

    /// Get an 8-bit register by hardware index (AL CL DL BL AH CH DH BH)
    #[inline]
    pub fn reg8(&self, reg: u8) -> u8 {
        debug_assert!(reg < 8, "invalid 8-bit register index: {}", reg);
        let word = self.reg16(reg & 3);
        if reg < 4 {
            (word & 0xFF) as u8
        } else {
            (word >> 8) as u8
        }
    }

    /// Set an 8-bit register by hardware index
    #[inline]
    pub fn set_reg8(&mut self, reg: u8, val: u8) {
        debug_assert!(reg < 8, "invalid 8-bit register index: {}", reg);
        let word = self.reg16(reg & 3);
        let word = if reg < 4 {
            (word & 0xFF00) | val as u16
        } else {
            (word & 0x00FF) | ((val as u16) << 8)
        };
        self.set_reg16(reg & 3, word);
    }

    /// Get a segment register
    #[inline]
    pub fn seg(&self, seg: Segment) -> u16 {
        match seg {
            Segment::ES => self.es,
            Segment::CS => self.cs,
            Segment::SS => self.ss,
            Segment::DS => self.ds,
        }
    }

    /// Set a segment register
    #[inline]
    pub fn set_seg(&mut self, seg: Segment, val: u16) {
        match seg {
            Segment::ES => self.es = val,
            Segment::CS => self.cs = val,
            Segment::SS => self.ss = val,
            Segment::DS => self.ds = val,
        }
    }

    #[inline]
    pub fn al(&self) -> u8 {
        (self.ax & 0xFF) as u8
    }

    #[inline]
    pub fn set_al(&mut self, val: u8) {
        self.ax = (self.ax & 0xFF00) | val as u16;
    }

    #[inline]
    pub fn ah(&self) -> u8 {
        (self.ax >> 8) as u8
    }

    #[inline]
    pub fn set_ah(&mut self, val: u8) {
        self.ax = (self.ax & 0x00FF) | ((val as u16) << 8);
    }

    #[inline]
    pub fn cl(&self) -> u8 {
        (self.cx & 0xFF) as u8
    }
}

/// The nine discrete status flags.
///
/// Arithmetic handlers touch only the flags documented for their opcode
/// family; everything else keeps its previous value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flags {
    pub cf: bool,
    pub pf: bool,
    pub af: bool,
    pub zf: bool,
    pub sf: bool,
    pub tf: bool,
    pub ifl: bool,
    pub df: bool,
    pub of: bool,
}

impl Flags {
    /// Pack the flags into the 16-bit hardware encoding.
    ///
    /// Undefined bits read as 0 except reserved bit 1, which reads as 1.
    pub fn word(&self) -> u16 {
        FLAG_RESERVED
            | if self.cf { FLAG_CF } else { 0 }
            | if self.pf { FLAG_PF } else { 0 }
            | if self.af { FLAG_AF } else { 0 }
            | if self.zf { FLAG_ZF } else { 0 }
            | if self.sf { FLAG_SF } else { 0 }
            | if self.tf { FLAG_TF } else { 0 }
            | if self.ifl { FLAG_IF } else { 0 }
            | if self.df { FLAG_DF } else { 0 }
            | if self.of { FLAG_OF } else { 0 }
    }

    /// Unpack a 16-bit flags word into the nine flags.
    pub fn set_word(&mut self, word: u16) {
        self.cf = word & FLAG_CF != 0;
        self.pf = word & FLAG_PF != 0;
        self.af = word & FLAG_AF != 0;
        self.zf = word & FLAG_ZF != 0;
        self.sf = word & FLAG_SF != 0;
        self.tf = word & FLAG_TF != 0;
        self.ifl = word & FLAG_IF != 0;
        self.df = word & FLAG_DF != 0;
        self.of = word & FLAG_OF != 0;
    }

    /// Write only the flag bits selected by `mask`, keeping the rest.
    pub fn merge(&mut self, word: u16, mask: u16) {
        let merged = (word & mask) | (self.word() & !mask);
        self.set_word(merged);
    }

    /// Set ZF/SF/PF from an 8-bit result.
    #[inline]
    pub fn set_zsp_8(&mut self, val: u8) {
        self.zf = val == 0;
        self.sf = val & 0x80 != 0;
        self.pf = val.count_ones() % 2 == 0;
    }

    /// Set ZF/SF/PF from a 16-bit result.
    ///
    /// PF only ever reflects the low 8 bits, matching hardware.
    #[inline]
    pub fn set_zsp_16(&mut self, val: u16) {
        self.zf = val == 0;
        self.sf = val & 0x8000 != 0;
        self.pf = (val as u8).count_ones() % 2 == 0;
    }
}
