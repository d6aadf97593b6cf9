//! Intel 8086 CPU core.
//!
//! A per-instruction interpreter: each call to [`Cpu8086::step`] fetches
//! one opcode at CS:IP, dispatches it through a fixed 256-entry table and
//! runs the handler to completion. Handlers advance IP themselves, which
//! lets variable-length encodings and control transfers set IP to an
//! arbitrary target instead of a fixed increment.
//!
//! The core owns no devices; memory, ports and interrupt service are
//! reached through the [`Bus`] trait injected at construction.

pub mod modrm;
pub mod regs;

mod ops;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bus::{Bus, ADDR_MASK};
use crate::logging::{log, LogCategory, LogLevel};
use modrm::{ModRm, RmOperand};
use regs::{Flags, Registers, Segment};

/// Compute the 20-bit linear address for segment:offset.
#[inline]
pub fn linear(segment: u16, offset: u16) -> u32 {
    (((segment as u32) << 4) + offset as u32) & ADDR_MASK
}

/// Why a step failed.
///
/// The two kinds are reported identically (the step fails, CPU state is
/// untouched) but stay distinct for diagnostics: `UnimplementedOpcode` is
/// a real 8086 encoding the core has no handler for, `InvalidOpcode` is a
/// byte the 8086 never assigned.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepError {
    #[error("unimplemented opcode {opcode:#04X} at {cs:04X}:{ip:04X}")]
    UnimplementedOpcode { opcode: u8, cs: u16, ip: u16 },
    #[error("invalid opcode {opcode:#04X} at {cs:04X}:{ip:04X}")]
    InvalidOpcode { opcode: u8, cs: u16, ip: u16 },
}

pub(crate) type OpResult = Result<(), StepError>;
pub(crate) type OpFn<B> = fn(&mut Cpu8086<B>) -> OpResult;

/// One slot of the 256-entry dispatch table.
pub(crate) enum OpSlot<B: Bus> {
    Handler(OpFn<B>),
    /// Valid 8086 opcode without a handler yet
    Unimplemented,
    /// Byte with no 8086 encoding
    Invalid,
}

// Derived Clone/Copy would demand B: Clone/Copy; the slot itself is
// always a plain function pointer or a tag.
impl<B: Bus> Clone for OpSlot<B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: Bus> Copy for OpSlot<B> {}

/// Coarse per-instruction cost credited to the cycle counter. Peripheral
/// collaborators only need approximate totals, not per-opcode timing.
const CYCLES_PER_STEP: u64 = 4;

/// Intel 8086 CPU state and execution engine.
pub struct Cpu8086<B: Bus> {
    /// General, segment and pointer registers
    pub regs: Registers,
    /// The nine status flags
    pub flags: Flags,
    /// Injected memory/port bus
    pub bus: B,
    /// Total cycles executed (coarse estimate)
    pub cycles: u64,

    /// Segment override for the next instruction, set by a prefix opcode
    /// and cleared once that opcode has executed
    segment_override: Option<Segment>,

    /// Shift register delaying the effect of STI by one instruction
    sti_delay: u8,

    /// Set when a step failed on an unimplemented/invalid opcode. While
    /// set, further steps return the same error; the embedding monitor
    /// decides whether to clear it, skip the opcode, or abort.
    fault: Option<StepError>,

    /// Opcode dispatch table
    ops: [OpSlot<B>; 256],
}

#[derive(Serialize, Deserialize)]
struct CpuState {
    regs: Registers,
    flags: Flags,
    sti_delay: u8,
    cycles: u64,
    fault: Option<StepError>,
}

impl<B: Bus> Cpu8086<B> {
    /// Create a new CPU in power-on state over the given bus.
    pub fn new(bus: B) -> Self {
        let mut cpu = Self {
            regs: Registers::default(),
            flags: Flags::default(),
            bus,
            cycles: 0,
            segment_override: None,
            sti_delay: 0,
            fault: None,
            ops: Self::build_op_table(),
        };
        cpu.reset();
        cpu
    }

    /// Reset to power-on state (preserves the bus contents).
    pub fn reset(&mut self) {
        self.regs = Registers::default();
        self.regs.cs = 0xFFFF;
        self.flags = Flags::default();
        self.cycles = 0;
        self.segment_override = None;
        self.sti_delay = 0;
        self.fault = None;
    }

    /// The fault that halted execution, if any.
    pub fn fault(&self) -> Option<StepError> {
        self.fault
    }

    /// Clear a fault so stepping can resume. The caller is responsible
    /// for fixing up IP first (the faulting opcode is still next).
    pub fn clear_fault(&mut self) {
        self.fault = None;
    }

    /// Execute one instruction.
    ///
    /// On failure the CPU is left exactly as it was before the fetch and
    /// stays halted until [`Cpu8086::clear_fault`] is called.
    pub fn step(&mut self) -> Result<(), StepError> {
        if let Some(fault) = self.fault {
            return Err(fault);
        }

        // IFL becomes visible one instruction after STI
        self.sti_delay >>= 1;
        if self.sti_delay & 1 != 0 {
            self.flags.ifl = true;
        }

        let saved_ip = self.regs.ip;
        let opcode = self.code_u8(0);

        log(LogCategory::Cpu, LogLevel::Trace, || {
            format!(
                "exec {:02X} at {:04X}:{:04X}",
                opcode, self.regs.cs, self.regs.ip
            )
        });

        match self.dispatch(opcode) {
            Ok(()) => {
                self.cycles += CYCLES_PER_STEP;
                Ok(())
            }
            Err(err) => {
                // A prefix chain may already have moved IP; roll it back
                // so the failed step mutates nothing.
                self.regs.ip = saved_ip;
                self.fault = Some(err);
                log(LogCategory::Stubs, LogLevel::Warn, || err.to_string());
                Err(err)
            }
        }
    }

    /// Look up and run the handler for an opcode byte at CS:IP.
    fn dispatch(&mut self, opcode: u8) -> OpResult {
        match self.ops[opcode as usize] {
            OpSlot::Handler(f) => f(self),
            OpSlot::Unimplemented => Err(StepError::UnimplementedOpcode {
                opcode,
                cs: self.regs.cs,
                ip: self.regs.ip,
            }),
            OpSlot::Invalid => Err(StepError::InvalidOpcode {
                opcode,
                cs: self.regs.cs,
                ip: self.regs.ip,
            }),
        }
    }

    /// Serialize registers, flags and timing state for save-states.
    pub fn save_state(&self) -> serde_json::Value {
        serde_json::to_value(CpuState {
            regs: self.regs,
            flags: self.flags,
            sti_delay: self.sti_delay,
            cycles: self.cycles,
            fault: self.fault,
        })
        .unwrap_or(serde_json::Value::Null)
    }

    /// Restore state produced by [`Cpu8086::save_state`], including the
    /// fault latch. Any transient segment override is discarded.
    pub fn load_state(&mut self, value: &serde_json::Value) -> Result<(), serde_json::Error> {
        let state: CpuState = serde_json::from_value(value.clone())?;
        self.regs = state.regs;
        self.flags = state.flags;
        self.sti_delay = state.sti_delay;
        self.cycles = state.cycles;
        self.fault = state.fault;
        self.segment_override = None;
        Ok(())
    }

    // ---- instruction stream access -------------------------------------

    /// Read a code byte at CS:(IP + offset) without advancing IP.
    #[inline]
    fn code_u8(&self, offset: u16) -> u8 {
        self.bus
            .mem_read_8(linear(self.regs.cs, self.regs.ip.wrapping_add(offset)))
    }

    /// Read a code word at CS:(IP + offset) without advancing IP.
    #[inline]
    fn code_u16(&self, offset: u16) -> u16 {
        self.bus
            .mem_read_16(linear(self.regs.cs, self.regs.ip.wrapping_add(offset)))
    }

    /// Read a signed code byte at CS:(IP + offset).
    #[inline]
    fn code_i8(&self, offset: u16) -> i8 {
        self.code_u8(offset) as i8
    }

    /// Advance IP, wrapping within the 16-bit segment.
    #[inline]
    fn step_ip(&mut self, bytes: u16) {
        self.regs.ip = self.regs.ip.wrapping_add(bytes);
    }

    // ---- stack ----------------------------------------------------------

    /// Push a word at SS:SP, decrementing SP first.
    #[inline]
    fn push16(&mut self, val: u16) {
        self.regs.sp = self.regs.sp.wrapping_sub(2);
        self.bus
            .mem_write_16(linear(self.regs.ss, self.regs.sp), val);
    }

    /// Pop a word from SS:SP, incrementing SP after the read.
    #[inline]
    fn pop16(&mut self) -> u16 {
        let val = self.bus.mem_read_16(linear(self.regs.ss, self.regs.sp));
        self.regs.sp = self.regs.sp.wrapping_add(2);
        val
    }

    // ---- operands ---------------------------------------------------------

    /// Decode the ModRM byte that follows the current opcode.
    #[inline]
    fn decode_modrm(&self) -> ModRm {
        modrm::decode(
            &self.bus,
            &self.regs,
            self.segment_override,
            self.regs.ip.wrapping_add(1),
        )
    }

    #[inline]
    fn read_rm8(&self, m: &ModRm) -> u8 {
        match m.rm {
            RmOperand::Reg(r) => self.regs.reg8(r),
            RmOperand::Mem(addr) => self.bus.mem_read_8(addr),
        }
    }

    #[inline]
    fn write_rm8(&mut self, m: &ModRm, val: u8) {
        match m.rm {
            RmOperand::Reg(r) => self.regs.set_reg8(r, val),
            RmOperand::Mem(addr) => self.bus.mem_write_8(addr, val),
        }
    }

    #[inline]
    fn read_rm16(&self, m: &ModRm) -> u16 {
        match m.rm {
            RmOperand::Reg(r) => self.regs.reg16(r),
            RmOperand::Mem(addr) => self.bus.mem_read_16(addr),
        }
    }

    #[inline]
    fn write_rm16(&mut self, m: &ModRm, val: u16) {
        match m.rm {
            RmOperand::Reg(r) => self.regs.set_reg16(r, val),
            RmOperand::Mem(addr) => self.bus.mem_write_16(addr, val),
        }
    }

    /// Segment used for a non-ModRM data access (moffs MOV forms, XLAT):
    /// the active override, or the instruction's default segment.
    #[inline]
    fn data_segment(&self, default: Segment) -> u16 {
        match self.segment_override {
            Some(seg) => self.regs.seg(seg),
            None => self.regs.seg(default),
        }
    }
}
