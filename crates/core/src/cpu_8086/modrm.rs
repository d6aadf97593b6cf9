//! ModRM operand/addressing decoder.
//!
//! Decodes the ModRM byte and any displacement bytes that follow it into
//! an operand descriptor. Descriptors are built fresh for each instruction
//! and never outlive it. Decoding is total over the 8086 encoding space;
//! there are no error paths here.

use super::linear;
use crate::bus::Bus;
use crate::cpu_8086::regs::{Registers, Segment};

/// Register-or-memory operand selected by the mod/rm fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RmOperand {
    /// Register index; width is decided by the opcode's byte/word context.
    Reg(u8),
    /// Linear address of the memory operand, override already applied.
    Mem(u32),
}

/// Decoded ModRM byte plus displacement.
#[derive(Debug, Clone, Copy)]
pub struct ModRm {
    /// The reg field (register index or sub-opcode, per instruction).
    pub reg: u8,
    /// The r/m operand.
    pub rm: RmOperand,
    /// Encoding bytes consumed, including the ModRM byte itself (1-3).
    pub len: u8,
}

/// Decode the ModRM byte at CS:`modrm_ip` and compute the effective
/// address of a memory operand.
///
/// `override_seg` replaces the addressing form's default segment (SS for
/// BP-based forms, DS otherwise) when a segment-override prefix is active.
pub fn decode<B: Bus>(
    bus: &B,
    regs: &Registers,
    override_seg: Option<Segment>,
    modrm_ip: u16,
) -> ModRm {
    let modrm = bus.mem_read_8(linear(regs.cs, modrm_ip));
    let mode = modrm >> 6;
    let reg = (modrm >> 3) & 7;
    let rm = modrm & 7;

    // mod == 11: operand is a register, no displacement follows
    if mode == 3 {
        return ModRm {
            reg,
            rm: RmOperand::Reg(rm),
            len: 1,
        };
    }

    let (base, default_seg) = match rm {
        0 => (regs.bx.wrapping_add(regs.si), Segment::DS),
        1 => (regs.bx.wrapping_add(regs.di), Segment::DS),
        2 => (regs.bp.wrapping_add(regs.si), Segment::SS),
        3 => (regs.bp.wrapping_add(regs.di), Segment::SS),
        4 => (regs.si, Segment::DS),
        5 => (regs.di, Segment::DS),
        // rm == 110: direct address with mod == 00, [BP] otherwise
        6 if mode == 0 => (0, Segment::DS),
        6 => (regs.bp, Segment::SS),
        _ => (regs.bx, Segment::DS),
    };

    let (disp, disp_len) = match mode {
        0 if rm == 6 => (bus.mem_read_16(linear(regs.cs, modrm_ip.wrapping_add(1))), 2),
        0 => (0, 0),
        1 => {
            let d = bus.mem_read_8(linear(regs.cs, modrm_ip.wrapping_add(1))) as i8;
            (d as u16, 1) // sign-extended
        }
        _ => (bus.mem_read_16(linear(regs.cs, modrm_ip.wrapping_add(1))), 2),
    };

    let segment = regs.seg(override_seg.unwrap_or(default_seg));
    let offset = base.wrapping_add(disp);

    ModRm {
        reg,
        rm: RmOperand::Mem(linear(segment, offset)),
        len: 1 + disp_len,
    }
}
