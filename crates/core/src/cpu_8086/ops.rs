//! Instruction handlers and the 256-entry opcode dispatch table.
//!
//! Handlers read their operands from the instruction stream and the
//! register file, compute the result, update exactly the flags their
//! opcode family defines, write back, and advance IP. Arithmetic runs in
//! a wider intermediate type so carry and overflow fall out of ordinary
//! comparisons instead of wraparound tricks.

use super::*;

/// Generates the six encodings shared by the ModRM ALU families:
/// r/m,reg and reg,r/m in both widths plus the AL/AX immediate forms.
/// `writeback = false` produces the compare/test behavior where the
/// result only feeds the flags.
macro_rules! alu_family {
    ($f8:ident, $f16:ident, writeback = $wb:literal,
     $rm8_r8:ident, $rm16_r16:ident, $r8_rm8:ident, $r16_rm16:ident,
     $al_imm8:ident, $ax_imm16:ident) => {
        fn $rm8_r8(cpu: &mut Self) -> OpResult {
            let m = cpu.decode_modrm();
            let lhs = cpu.read_rm8(&m);
            let rhs = cpu.regs.reg8(m.reg);
            let res = cpu.$f8(lhs, rhs);
            if $wb {
                cpu.write_rm8(&m, res);
            }
            cpu.step_ip(1 + m.len as u16);
            Ok(())
        }

        fn $rm16_r16(cpu: &mut Self) -> OpResult {
            let m = cpu.decode_modrm();
            let lhs = cpu.read_rm16(&m);
            let rhs = cpu.regs.reg16(m.reg);
            let res = cpu.$f16(lhs, rhs);
            if $wb {
                cpu.write_rm16(&m, res);
            }
            cpu.step_ip(1 + m.len as u16);
            Ok(())
        }

        fn $r8_rm8(cpu: &mut Self) -> OpResult {
            let m = cpu.decode_modrm();
            let lhs = cpu.regs.reg8(m.reg);
            let rhs = cpu.read_rm8(&m);
            let res = cpu.$f8(lhs, rhs);
            if $wb {
                cpu.regs.set_reg8(m.reg, res);
            }
            cpu.step_ip(1 + m.len as u16);
            Ok(())
        }

        fn $r16_rm16(cpu: &mut Self) -> OpResult {
            let m = cpu.decode_modrm();
            let lhs = cpu.regs.reg16(m.reg);
            let rhs = cpu.read_rm16(&m);
            let res = cpu.$f16(lhs, rhs);
            if $wb {
                cpu.regs.set_reg16(m.reg, res);
            }
            cpu.step_ip(1 + m.len as u16);
            Ok(())
        }

        fn $al_imm8(cpu: &mut Self) -> OpResult {
            let lhs = cpu.regs.al();
            let rhs = cpu.code_u8(1);
            let res = cpu.$f8(lhs, rhs);
            if $wb {
                cpu.regs.set_al(res);
            }
            cpu.step_ip(2);
            Ok(())
        }

        fn $ax_imm16(cpu: &mut Self) -> OpResult {
            let lhs = cpu.regs.ax;
            let rhs = cpu.code_u16(1);
            let res = cpu.$f16(lhs, rhs);
            if $wb {
                cpu.regs.ax = res;
            }
            cpu.step_ip(3);
            Ok(())
        }
    };
}

impl<B: Bus> Cpu8086<B> {
    // ---- ALU flag/result helpers -----------------------------------------

    /// lhs + rhs (+ carry), addition-style flags.
    fn add8(&mut self, lhs: u8, rhs: u8, carry: bool) -> u8 {
        let wide = lhs as u16 + rhs as u16 + carry as u16;
        let res = wide as u8;
        self.flags.set_zsp_8(res);
        self.flags.cf = wide > 0xFF;
        self.flags.af = (res ^ lhs ^ rhs) & 0x10 != 0;
        self.flags.of = (res ^ lhs) & (res ^ rhs) & 0x80 != 0;
        res
    }

    fn add16(&mut self, lhs: u16, rhs: u16, carry: bool) -> u16 {
        let wide = lhs as u32 + rhs as u32 + carry as u32;
        let res = wide as u16;
        self.flags.set_zsp_16(res);
        self.flags.cf = wide > 0xFFFF;
        self.flags.af = (res ^ lhs ^ rhs) & 0x10 != 0;
        self.flags.of = (res ^ lhs) & (res ^ rhs) & 0x8000 != 0;
        res
    }

    /// lhs - rhs (- borrow), subtraction-style flags.
    fn sub8(&mut self, lhs: u8, rhs: u8, borrow: bool) -> u8 {
        let taken = rhs as u16 + borrow as u16;
        let res = (lhs as u16).wrapping_sub(taken) as u8;
        self.flags.set_zsp_8(res);
        self.flags.cf = (lhs as u16) < taken;
        self.flags.af = (res ^ lhs ^ rhs) & 0x10 != 0;
        self.flags.of = (res ^ lhs) & (lhs ^ rhs) & 0x80 != 0;
        res
    }

    fn sub16(&mut self, lhs: u16, rhs: u16, borrow: bool) -> u16 {
        let taken = rhs as u32 + borrow as u32;
        let res = (lhs as u32).wrapping_sub(taken) as u16;
        self.flags.set_zsp_16(res);
        self.flags.cf = (lhs as u32) < taken;
        self.flags.af = (res ^ lhs ^ rhs) & 0x10 != 0;
        self.flags.of = (res ^ lhs) & (lhs ^ rhs) & 0x8000 != 0;
        res
    }

    /// Logical ops always clear CF and OF; AF keeps its prior value.
    fn logic8(&mut self, res: u8) -> u8 {
        self.flags.set_zsp_8(res);
        self.flags.cf = false;
        self.flags.of = false;
        res
    }

    fn logic16(&mut self, res: u16) -> u16 {
        self.flags.set_zsp_16(res);
        self.flags.cf = false;
        self.flags.of = false;
        res
    }

    // Uniform (lhs, rhs) entry points for the family macro.

    #[inline]
    fn alu_add8(&mut self, l: u8, r: u8) -> u8 {
        self.add8(l, r, false)
    }

    #[inline]
    fn alu_add16(&mut self, l: u16, r: u16) -> u16 {
        self.add16(l, r, false)
    }

    #[inline]
    fn alu_adc8(&mut self, l: u8, r: u8) -> u8 {
        let carry = self.flags.cf;
        self.add8(l, r, carry)
    }

    #[inline]
    fn alu_adc16(&mut self, l: u16, r: u16) -> u16 {
        let carry = self.flags.cf;
        self.add16(l, r, carry)
    }

    #[inline]
    fn alu_sub8(&mut self, l: u8, r: u8) -> u8 {
        self.sub8(l, r, false)
    }

    #[inline]
    fn alu_sub16(&mut self, l: u16, r: u16) -> u16 {
        self.sub16(l, r, false)
    }

    #[inline]
    fn alu_sbb8(&mut self, l: u8, r: u8) -> u8 {
        let borrow = self.flags.cf;
        self.sub8(l, r, borrow)
    }

    #[inline]
    fn alu_sbb16(&mut self, l: u16, r: u16) -> u16 {
        let borrow = self.flags.cf;
        self.sub16(l, r, borrow)
    }

    #[inline]
    fn alu_or8(&mut self, l: u8, r: u8) -> u8 {
        self.logic8(l | r)
    }

    #[inline]
    fn alu_or16(&mut self, l: u16, r: u16) -> u16 {
        self.logic16(l | r)
    }

    #[inline]
    fn alu_and8(&mut self, l: u8, r: u8) -> u8 {
        self.logic8(l & r)
    }

    #[inline]
    fn alu_and16(&mut self, l: u16, r: u16) -> u16 {
        self.logic16(l & r)
    }

    #[inline]
    fn alu_xor8(&mut self, l: u8, r: u8) -> u8 {
        self.logic8(l ^ r)
    }

    #[inline]
    fn alu_xor16(&mut self, l: u16, r: u16) -> u16 {
        self.logic16(l ^ r)
    }

    // ---- ALU families ------------------------------------------------------

    alu_family!(alu_add8, alu_add16, writeback = true,
        add_rm8_r8, add_rm16_r16, add_r8_rm8, add_r16_rm16, add_al_imm8, add_ax_imm16);

    alu_family!(alu_or8, alu_or16, writeback = true,
        or_rm8_r8, or_rm16_r16, or_r8_rm8, or_r16_rm16, or_al_imm8, or_ax_imm16);

    alu_family!(alu_adc8, alu_adc16, writeback = true,
        adc_rm8_r8, adc_rm16_r16, adc_r8_rm8, adc_r16_rm16, adc_al_imm8, adc_ax_imm16);

    alu_family!(alu_sbb8, alu_sbb16, writeback = true,
        sbb_rm8_r8, sbb_rm16_r16, sbb_r8_rm8, sbb_r16_rm16, sbb_al_imm8, sbb_ax_imm16);

    alu_family!(alu_and8, alu_and16, writeback = true,
        and_rm8_r8, and_rm16_r16, and_r8_rm8, and_r16_rm16, and_al_imm8, and_ax_imm16);

    alu_family!(alu_sub8, alu_sub16, writeback = true,
        sub_rm8_r8, sub_rm16_r16, sub_r8_rm8, sub_r16_rm16, sub_al_imm8, sub_ax_imm16);

    alu_family!(alu_xor8, alu_xor16, writeback = true,
        xor_rm8_r8, xor_rm16_r16, xor_r8_rm8, xor_r16_rm16, xor_al_imm8, xor_ax_imm16);

    // CMP computes the difference for flags only.
    alu_family!(alu_sub8, alu_sub16, writeback = false,
        cmp_rm8_r8, cmp_rm16_r16, cmp_r8_rm8, cmp_r16_rm16, cmp_al_imm8, cmp_ax_imm16);

    // ---- TEST ---------------------------------------------------------------

    fn test_rm8_r8(cpu: &mut Self) -> OpResult {
        let m = cpu.decode_modrm();
        let lhs = cpu.read_rm8(&m);
        let rhs = cpu.regs.reg8(m.reg);
        cpu.logic8(lhs & rhs);
        cpu.step_ip(1 + m.len as u16);
        Ok(())
    }

    fn test_rm16_r16(cpu: &mut Self) -> OpResult {
        let m = cpu.decode_modrm();
        let lhs = cpu.read_rm16(&m);
        let rhs = cpu.regs.reg16(m.reg);
        cpu.logic16(lhs & rhs);
        cpu.step_ip(1 + m.len as u16);
        Ok(())
    }

    fn test_al_imm8(cpu: &mut Self) -> OpResult {
        let imm = cpu.code_u8(1);
        let al = cpu.regs.al();
        cpu.logic8(al & imm);
        cpu.step_ip(2);
        Ok(())
    }

    fn test_ax_imm16(cpu: &mut Self) -> OpResult {
        let imm = cpu.code_u16(1);
        let ax = cpu.regs.ax;
        cpu.logic16(ax & imm);
        cpu.step_ip(3);
        Ok(())
    }

    // ---- INC/DEC r16 ----------------------------------------------------------

    /// INC does not touch CF; OF fires only on the 0x7FFF boundary.
    fn inc_r16(cpu: &mut Self) -> OpResult {
        let r = cpu.code_u8(0) & 7;
        let val = cpu.regs.reg16(r);
        cpu.flags.of = val == 0x7FFF;
        cpu.flags.af = val & 0x0F == 0x0F;
        let res = val.wrapping_add(1);
        cpu.flags.set_zsp_16(res);
        cpu.regs.set_reg16(r, res);
        cpu.step_ip(1);
        Ok(())
    }

    /// DEC does not touch CF; OF fires only on the 0x8000 boundary.
    fn dec_r16(cpu: &mut Self) -> OpResult {
        let r = cpu.code_u8(0) & 7;
        let val = cpu.regs.reg16(r);
        cpu.flags.of = val == 0x8000;
        cpu.flags.af = val & 0x0F == 0;
        let res = val.wrapping_sub(1);
        cpu.flags.set_zsp_16(res);
        cpu.regs.set_reg16(r, res);
        cpu.step_ip(1);
        Ok(())
    }

    // ---- stack transfer -----------------------------------------------------

    fn push_r16(cpu: &mut Self) -> OpResult {
        let val = cpu.regs.reg16(cpu.code_u8(0) & 7);
        cpu.push16(val);
        cpu.step_ip(1);
        Ok(())
    }

    fn pop_r16(cpu: &mut Self) -> OpResult {
        let r = cpu.code_u8(0) & 7;
        let val = cpu.pop16();
        cpu.regs.set_reg16(r, val);
        cpu.step_ip(1);
        Ok(())
    }

    fn push_seg(cpu: &mut Self) -> OpResult {
        let seg = Segment::from_index(cpu.code_u8(0) >> 3);
        let val = cpu.regs.seg(seg);
        cpu.push16(val);
        cpu.step_ip(1);
        Ok(())
    }

    fn pop_seg(cpu: &mut Self) -> OpResult {
        let seg = Segment::from_index(cpu.code_u8(0) >> 3);
        let val = cpu.pop16();
        cpu.regs.set_seg(seg, val);
        cpu.step_ip(1);
        Ok(())
    }

    // ---- data movement -----------------------------------------------------

    fn mov_rm8_r8(cpu: &mut Self) -> OpResult {
        let m = cpu.decode_modrm();
        let val = cpu.regs.reg8(m.reg);
        cpu.write_rm8(&m, val);
        cpu.step_ip(1 + m.len as u16);
        Ok(())
    }

    fn mov_rm16_r16(cpu: &mut Self) -> OpResult {
        let m = cpu.decode_modrm();
        let val = cpu.regs.reg16(m.reg);
        cpu.write_rm16(&m, val);
        cpu.step_ip(1 + m.len as u16);
        Ok(())
    }

    fn mov_r8_imm8(cpu: &mut Self) -> OpResult {
        let r = cpu.code_u8(0) & 7;
        let imm = cpu.code_u8(1);
        cpu.regs.set_reg8(r, imm);
        cpu.step_ip(2);
        Ok(())
    }

    fn mov_r16_imm16(cpu: &mut Self) -> OpResult {
        let r = cpu.code_u8(0) & 7;
        let imm = cpu.code_u16(1);
        cpu.regs.set_reg16(r, imm);
        cpu.step_ip(3);
        Ok(())
    }

    // Accumulator <-> direct-address moves. The offset comes straight
    // from the instruction; the segment honors an active override.

    fn mov_al_moffs(cpu: &mut Self) -> OpResult {
        let addr = linear(cpu.data_segment(Segment::DS), cpu.code_u16(1));
        let val = cpu.bus.mem_read_8(addr);
        cpu.regs.set_al(val);
        cpu.step_ip(3);
        Ok(())
    }

    fn mov_ax_moffs(cpu: &mut Self) -> OpResult {
        let addr = linear(cpu.data_segment(Segment::DS), cpu.code_u16(1));
        cpu.regs.ax = cpu.bus.mem_read_16(addr);
        cpu.step_ip(3);
        Ok(())
    }

    fn mov_moffs_al(cpu: &mut Self) -> OpResult {
        let addr = linear(cpu.data_segment(Segment::DS), cpu.code_u16(1));
        let val = cpu.regs.al();
        cpu.bus.mem_write_8(addr, val);
        cpu.step_ip(3);
        Ok(())
    }

    fn mov_moffs_ax(cpu: &mut Self) -> OpResult {
        let addr = linear(cpu.data_segment(Segment::DS), cpu.code_u16(1));
        let val = cpu.regs.ax;
        cpu.bus.mem_write_16(addr, val);
        cpu.step_ip(3);
        Ok(())
    }

    fn xchg_ax_r16(cpu: &mut Self) -> OpResult {
        let r = cpu.code_u8(0) & 7;
        let tmp = cpu.regs.reg16(r);
        let ax = cpu.regs.ax;
        cpu.regs.set_reg16(r, ax);
        cpu.regs.ax = tmp;
        cpu.step_ip(1);
        Ok(())
    }

    /// NOP is the XCHG AX,AX encoding.
    fn nop(cpu: &mut Self) -> OpResult {
        cpu.step_ip(1);
        Ok(())
    }

    fn cbw(cpu: &mut Self) -> OpResult {
        let ah = if cpu.regs.al() & 0x80 != 0 { 0xFF } else { 0x00 };
        cpu.regs.set_ah(ah);
        cpu.step_ip(1);
        Ok(())
    }

    fn cwd(cpu: &mut Self) -> OpResult {
        cpu.regs.dx = if cpu.regs.ax & 0x8000 != 0 { 0xFFFF } else { 0 };
        cpu.step_ip(1);
        Ok(())
    }

    /// AL = [seg:BX + AL], table lookup.
    fn xlat(cpu: &mut Self) -> OpResult {
        let offset = cpu.regs.bx.wrapping_add(cpu.regs.al() as u16);
        let addr = linear(cpu.data_segment(Segment::DS), offset);
        let val = cpu.bus.mem_read_8(addr);
        cpu.regs.set_al(val);
        cpu.step_ip(1);
        Ok(())
    }

    // ---- control transfer ----------------------------------------------------

    #[inline]
    fn jump_short(&mut self, disp: i8) {
        self.regs.ip = self.regs.ip.wrapping_add(disp as i16 as u16);
    }

    /// Condition codes in low-nibble order: O NO B NB Z NZ BE NBE
    /// S NS P NP L NL LE NLE.
    fn check_condition(&self, condition: u8) -> bool {
        match condition {
            0x0 => self.flags.of,
            0x1 => !self.flags.of,
            0x2 => self.flags.cf,
            0x3 => !self.flags.cf,
            0x4 => self.flags.zf,
            0x5 => !self.flags.zf,
            0x6 => self.flags.cf || self.flags.zf,
            0x7 => !(self.flags.cf || self.flags.zf),
            0x8 => self.flags.sf,
            0x9 => !self.flags.sf,
            0xA => self.flags.pf,
            0xB => !self.flags.pf,
            0xC => self.flags.sf != self.flags.of,
            0xD => self.flags.sf == self.flags.of,
            0xE => self.flags.zf || (self.flags.sf != self.flags.of),
            _ => !(self.flags.zf || (self.flags.sf != self.flags.of)),
        }
    }

    /// Jcc rel8; the condition is the low nibble of the opcode.
    fn jcc_short(cpu: &mut Self) -> OpResult {
        let cond = cpu.code_u8(0) & 0x0F;
        let disp = cpu.code_i8(1);
        cpu.step_ip(2);
        if cpu.check_condition(cond) {
            cpu.jump_short(disp);
        }
        Ok(())
    }

    /// CALL rel16 pushes the address of the following instruction.
    fn call_near(cpu: &mut Self) -> OpResult {
        let disp = cpu.code_u16(1);
        cpu.step_ip(3);
        let ret = cpu.regs.ip;
        cpu.push16(ret);
        cpu.regs.ip = cpu.regs.ip.wrapping_add(disp);
        Ok(())
    }

    fn jmp_near(cpu: &mut Self) -> OpResult {
        let disp = cpu.code_u16(1);
        cpu.regs.ip = cpu.regs.ip.wrapping_add(3).wrapping_add(disp);
        Ok(())
    }

    fn jmp_far(cpu: &mut Self) -> OpResult {
        let offset = cpu.code_u16(1);
        let segment = cpu.code_u16(3);
        cpu.regs.ip = offset;
        cpu.regs.cs = segment;
        Ok(())
    }

    fn jmp_short_disp8(cpu: &mut Self) -> OpResult {
        let disp = cpu.code_i8(1);
        cpu.step_ip(2);
        cpu.jump_short(disp);
        Ok(())
    }

    fn ret_near(cpu: &mut Self) -> OpResult {
        cpu.regs.ip = cpu.pop16();
        Ok(())
    }

    /// RET imm16 releases caller-pushed arguments after the return.
    fn ret_near_imm(cpu: &mut Self) -> OpResult {
        let adjust = cpu.code_u16(1);
        cpu.regs.ip = cpu.pop16();
        cpu.regs.sp = cpu.regs.sp.wrapping_add(adjust);
        Ok(())
    }

    fn ret_far(cpu: &mut Self) -> OpResult {
        cpu.regs.ip = cpu.pop16();
        cpu.regs.cs = cpu.pop16();
        Ok(())
    }

    fn ret_far_imm(cpu: &mut Self) -> OpResult {
        let adjust = cpu.code_u16(1);
        cpu.regs.ip = cpu.pop16();
        cpu.regs.cs = cpu.pop16();
        cpu.regs.sp = cpu.regs.sp.wrapping_add(adjust);
        Ok(())
    }

    // LOOP family decrements CX first, then tests.

    fn loopnz(cpu: &mut Self) -> OpResult {
        let disp = cpu.code_i8(1);
        cpu.step_ip(2);
        cpu.regs.cx = cpu.regs.cx.wrapping_sub(1);
        if cpu.regs.cx != 0 && !cpu.flags.zf {
            cpu.jump_short(disp);
        }
        Ok(())
    }

    fn loopz(cpu: &mut Self) -> OpResult {
        let disp = cpu.code_i8(1);
        cpu.step_ip(2);
        cpu.regs.cx = cpu.regs.cx.wrapping_sub(1);
        if cpu.regs.cx != 0 && cpu.flags.zf {
            cpu.jump_short(disp);
        }
        Ok(())
    }

    fn loop_cx(cpu: &mut Self) -> OpResult {
        let disp = cpu.code_i8(1);
        cpu.step_ip(2);
        cpu.regs.cx = cpu.regs.cx.wrapping_sub(1);
        if cpu.regs.cx != 0 {
            cpu.jump_short(disp);
        }
        Ok(())
    }

    /// JCXZ tests CX without decrementing it.
    fn jcxz(cpu: &mut Self) -> OpResult {
        let disp = cpu.code_i8(1);
        cpu.step_ip(2);
        if cpu.regs.cx == 0 {
            cpu.jump_short(disp);
        }
        Ok(())
    }

    // ---- I/O -------------------------------------------------------------------

    fn in_al_imm8(cpu: &mut Self) -> OpResult {
        let port = cpu.code_u8(1) as u16;
        let val = cpu.bus.port_read_8(port);
        cpu.regs.set_al(val);
        cpu.step_ip(2);
        Ok(())
    }

    fn in_ax_imm8(cpu: &mut Self) -> OpResult {
        let port = cpu.code_u8(1) as u16;
        cpu.regs.ax = cpu.bus.port_read_16(port);
        cpu.step_ip(2);
        Ok(())
    }

    fn out_imm8_al(cpu: &mut Self) -> OpResult {
        let port = cpu.code_u8(1) as u16;
        let val = cpu.regs.al();
        cpu.bus.port_write_8(port, val);
        cpu.step_ip(2);
        Ok(())
    }

    fn out_imm8_ax(cpu: &mut Self) -> OpResult {
        let port = cpu.code_u8(1) as u16;
        let val = cpu.regs.ax;
        cpu.bus.port_write_16(port, val);
        cpu.step_ip(2);
        Ok(())
    }

    fn in_al_dx(cpu: &mut Self) -> OpResult {
        let val = cpu.bus.port_read_8(cpu.regs.dx);
        cpu.regs.set_al(val);
        cpu.step_ip(1);
        Ok(())
    }

    fn in_ax_dx(cpu: &mut Self) -> OpResult {
        cpu.regs.ax = cpu.bus.port_read_16(cpu.regs.dx);
        cpu.step_ip(1);
        Ok(())
    }

    fn out_dx_al(cpu: &mut Self) -> OpResult {
        let val = cpu.regs.al();
        cpu.bus.port_write_8(cpu.regs.dx, val);
        cpu.step_ip(1);
        Ok(())
    }

    fn out_dx_ax(cpu: &mut Self) -> OpResult {
        let val = cpu.regs.ax;
        cpu.bus.port_write_16(cpu.regs.dx, val);
        cpu.step_ip(1);
        Ok(())
    }

    // ---- interrupt and flag control ----------------------------------------------

    /// Software interrupts advance IP past the instruction, then hand the
    /// vector to the host. Stack frames and vector lookup are host-side.
    fn raise_int(&mut self, vector: u8) {
        log(LogCategory::Interrupts, LogLevel::Debug, || {
            format!(
                "int {:02X} raised at {:04X}:{:04X}",
                vector, self.regs.cs, self.regs.ip
            )
        });
        self.bus.int_call(vector);
    }

    fn int3(cpu: &mut Self) -> OpResult {
        cpu.step_ip(1);
        cpu.raise_int(3);
        Ok(())
    }

    fn int_imm8(cpu: &mut Self) -> OpResult {
        let vector = cpu.code_u8(1);
        cpu.step_ip(2);
        cpu.raise_int(vector);
        Ok(())
    }

    fn cmc(cpu: &mut Self) -> OpResult {
        cpu.flags.cf = !cpu.flags.cf;
        cpu.step_ip(1);
        Ok(())
    }

    fn clc(cpu: &mut Self) -> OpResult {
        cpu.flags.cf = false;
        cpu.step_ip(1);
        Ok(())
    }

    fn stc(cpu: &mut Self) -> OpResult {
        cpu.flags.cf = true;
        cpu.step_ip(1);
        Ok(())
    }

    /// CLI also discards a pending delayed STI.
    fn cli(cpu: &mut Self) -> OpResult {
        cpu.flags.ifl = false;
        cpu.sti_delay = 0;
        cpu.step_ip(1);
        Ok(())
    }

    /// STI loads the delay register instead of IFL; the flag becomes
    /// visible only after the following instruction completes.
    fn sti(cpu: &mut Self) -> OpResult {
        cpu.sti_delay = 0b11;
        cpu.step_ip(1);
        Ok(())
    }

    fn cld(cpu: &mut Self) -> OpResult {
        cpu.flags.df = false;
        cpu.step_ip(1);
        Ok(())
    }

    fn std(cpu: &mut Self) -> OpResult {
        cpu.flags.df = true;
        cpu.step_ip(1);
        Ok(())
    }

    // ---- prefixes ------------------------------------------------------------------

    /// Segment override: set the transient override, run the following
    /// opcode through the table, then clear it. A chain of prefixes
    /// reduces to the last one seen; a missing nested handler propagates
    /// as the step's failure.
    fn seg_override_prefix(cpu: &mut Self) -> OpResult {
        let opcode = cpu.code_u8(0);
        cpu.segment_override = Some(Segment::from_index(opcode >> 3));

        let next = cpu.code_u8(1);
        let result = match cpu.ops[next as usize] {
            OpSlot::Handler(f) => {
                cpu.step_ip(1);
                f(cpu)
            }
            OpSlot::Unimplemented => Err(StepError::UnimplementedOpcode {
                opcode: next,
                cs: cpu.regs.cs,
                ip: cpu.regs.ip.wrapping_add(1),
            }),
            OpSlot::Invalid => Err(StepError::InvalidOpcode {
                opcode: next,
                cs: cpu.regs.cs,
                ip: cpu.regs.ip.wrapping_add(1),
            }),
        };

        cpu.segment_override = None;
        result
    }

    /// LOCK asserts a bus signal no single-CPU system observes.
    fn lock_prefix(cpu: &mut Self) -> OpResult {
        cpu.step_ip(1);
        Ok(())
    }

    /// WAIT spins on the coprocessor TEST pin; without an FPU it is a no-op.
    fn wait_pin(cpu: &mut Self) -> OpResult {
        cpu.step_ip(1);
        Ok(())
    }

    // ---- shift/rotate group -------------------------------------------------------

    /// D0-D3: shift kind comes from the ModRM reg field, count is 1 or CL.
    /// Bits are moved one at a time so CF always holds the last bit out;
    /// OF follows the single-shift definitions. Shifts refresh ZF/SF/PF,
    /// rotates leave them alone. A zero count changes nothing.
    fn shift8(&mut self, m: &ModRm, count: u8) {
        if count == 0 {
            return;
        }
        let mut val = self.read_rm8(m);
        match m.reg {
            // ROL
            0 => {
                for _ in 0..count {
                    let msb = val & 0x80 != 0;
                    val = (val << 1) | msb as u8;
                    self.flags.cf = msb;
                }
                if count == 1 {
                    self.flags.of = (val & 0x80 != 0) ^ self.flags.cf;
                }
            }
            // ROR
            1 => {
                for _ in 0..count {
                    let lsb = val & 1 != 0;
                    val = (val >> 1) | ((lsb as u8) << 7);
                    self.flags.cf = lsb;
                }
                if count == 1 {
                    self.flags.of = ((val >> 7) ^ (val >> 6)) & 1 != 0;
                }
            }
            // RCL
            2 => {
                for _ in 0..count {
                    let out = val & 0x80 != 0;
                    val = (val << 1) | self.flags.cf as u8;
                    self.flags.cf = out;
                }
                if count == 1 {
                    self.flags.of = (val & 0x80 != 0) ^ self.flags.cf;
                }
            }
            // RCR: OF is defined from the pre-rotate msb and carry
            3 => {
                if count == 1 {
                    self.flags.of = (val & 0x80 != 0) ^ self.flags.cf;
                }
                for _ in 0..count {
                    let out = val & 1 != 0;
                    val = (val >> 1) | ((self.flags.cf as u8) << 7);
                    self.flags.cf = out;
                }
            }
            // SHL/SAL; 6 is the undocumented SHL alias
            4 | 6 => {
                for _ in 0..count {
                    self.flags.cf = val & 0x80 != 0;
                    val <<= 1;
                }
                if count == 1 {
                    self.flags.of = (val & 0x80 != 0) != self.flags.cf;
                }
                self.flags.set_zsp_8(val);
            }
            // SHR
            5 => {
                if count == 1 {
                    self.flags.of = val & 0x80 != 0;
                }
                for _ in 0..count {
                    self.flags.cf = val & 1 != 0;
                    val >>= 1;
                }
                self.flags.set_zsp_8(val);
            }
            // SAR
            7 => {
                for _ in 0..count {
                    self.flags.cf = val & 1 != 0;
                    val = (val >> 1) | (val & 0x80);
                }
                self.flags.of = false;
                self.flags.set_zsp_8(val);
            }
            _ => unreachable!(),
        }
        self.write_rm8(m, val);
    }

    fn shift16(&mut self, m: &ModRm, count: u8) {
        if count == 0 {
            return;
        }
        let mut val = self.read_rm16(m);
        match m.reg {
            // ROL
            0 => {
                for _ in 0..count {
                    let msb = val & 0x8000 != 0;
                    val = (val << 1) | msb as u16;
                    self.flags.cf = msb;
                }
                if count == 1 {
                    self.flags.of = (val & 0x8000 != 0) ^ self.flags.cf;
                }
            }
            // ROR
            1 => {
                for _ in 0..count {
                    let lsb = val & 1 != 0;
                    val = (val >> 1) | ((lsb as u16) << 15);
                    self.flags.cf = lsb;
                }
                if count == 1 {
                    self.flags.of = ((val >> 15) ^ (val >> 14)) & 1 != 0;
                }
            }
            // RCL
            2 => {
                for _ in 0..count {
                    let out = val & 0x8000 != 0;
                    val = (val << 1) | self.flags.cf as u16;
                    self.flags.cf = out;
                }
                if count == 1 {
                    self.flags.of = (val & 0x8000 != 0) ^ self.flags.cf;
                }
            }
            // RCR
            3 => {
                if count == 1 {
                    self.flags.of = (val & 0x8000 != 0) ^ self.flags.cf;
                }
                for _ in 0..count {
                    let out = val & 1 != 0;
                    val = (val >> 1) | ((self.flags.cf as u16) << 15);
                    self.flags.cf = out;
                }
            }
            // SHL/SAL
            4 | 6 => {
                for _ in 0..count {
                    self.flags.cf = val & 0x8000 != 0;
                    val <<= 1;
                }
                if count == 1 {
                    self.flags.of = (val & 0x8000 != 0) != self.flags.cf;
                }
                self.flags.set_zsp_16(val);
            }
            // SHR
            5 => {
                if count == 1 {
                    self.flags.of = val & 0x8000 != 0;
                }
                for _ in 0..count {
                    self.flags.cf = val & 1 != 0;
                    val >>= 1;
                }
                self.flags.set_zsp_16(val);
            }
            // SAR
            7 => {
                for _ in 0..count {
                    self.flags.cf = val & 1 != 0;
                    val = (val >> 1) | (val & 0x8000);
                }
                self.flags.of = false;
                self.flags.set_zsp_16(val);
            }
            _ => unreachable!(),
        }
        self.write_rm16(m, val);
    }

    fn shift_rm8_1(cpu: &mut Self) -> OpResult {
        let m = cpu.decode_modrm();
        cpu.shift8(&m, 1);
        cpu.step_ip(1 + m.len as u16);
        Ok(())
    }

    fn shift_rm16_1(cpu: &mut Self) -> OpResult {
        let m = cpu.decode_modrm();
        cpu.shift16(&m, 1);
        cpu.step_ip(1 + m.len as u16);
        Ok(())
    }

    fn shift_rm8_cl(cpu: &mut Self) -> OpResult {
        let m = cpu.decode_modrm();
        let count = cpu.regs.cl();
        cpu.shift8(&m, count);
        cpu.step_ip(1 + m.len as u16);
        Ok(())
    }

    fn shift_rm16_cl(cpu: &mut Self) -> OpResult {
        let m = cpu.decode_modrm();
        let count = cpu.regs.cl();
        cpu.shift16(&m, count);
        cpu.step_ip(1 + m.len as u16);
        Ok(())
    }

    // ---- dispatch table -------------------------------------------------------------

    pub(super) fn build_op_table() -> [OpSlot<B>; 256] {
        use OpSlot::Handler as H;

        let mut t: [OpSlot<B>; 256] = [OpSlot::Invalid; 256];

        // Real 8086 encodings the core has no handler for. Everything not
        // listed here or given a handler below has no 8086 encoding at all
        // (0x0F, 0x60-0x6F, 0xC0/0xC1, 0xC8/0xC9, 0xD6, the 0xD8-0xDF ESC
        // row, 0xF1) and stays Invalid.
        #[rustfmt::skip]
        const UNIMPLEMENTED: &[usize] = &[
            0x27, 0x2F, 0x37, 0x3F,                   // DAA DAS AAA AAS
            0x80, 0x81, 0x82, 0x83,                   // ALU group, immediate
            0x86, 0x87,                               // XCHG r/m
            0x8A, 0x8B, 0x8C, 0x8D, 0x8E, 0x8F,       // MOV r/m group, LEA, POP r/m
            0x9A,                                     // CALL far
            0x9C, 0x9D, 0x9E, 0x9F,                   // PUSHF POPF SAHF LAHF
            0xA4, 0xA5, 0xA6, 0xA7,                   // MOVS CMPS
            0xAA, 0xAB, 0xAC, 0xAD, 0xAE, 0xAF,       // STOS LODS SCAS
            0xC4, 0xC5, 0xC6, 0xC7,                   // LES LDS, MOV r/m imm
            0xCE, 0xCF,                               // INTO IRET
            0xD4, 0xD5,                               // AAM AAD
            0xF2, 0xF3, 0xF4,                         // REPNE REP HLT
            0xF6, 0xF7,                               // TEST/NOT/NEG/MUL/DIV group
            0xFE, 0xFF,                               // INC/DEC/CALL/JMP/PUSH group
        ];
        for &op in UNIMPLEMENTED {
            t[op] = OpSlot::Unimplemented;
        }

        t[0x00] = H(Self::add_rm8_r8);
        t[0x01] = H(Self::add_rm16_r16);
        t[0x02] = H(Self::add_r8_rm8);
        t[0x03] = H(Self::add_r16_rm16);
        t[0x04] = H(Self::add_al_imm8);
        t[0x05] = H(Self::add_ax_imm16);
        t[0x06] = H(Self::push_seg);
        t[0x07] = H(Self::pop_seg);

        t[0x08] = H(Self::or_rm8_r8);
        t[0x09] = H(Self::or_rm16_r16);
        t[0x0A] = H(Self::or_r8_rm8);
        t[0x0B] = H(Self::or_r16_rm16);
        t[0x0C] = H(Self::or_al_imm8);
        t[0x0D] = H(Self::or_ax_imm16);
        t[0x0E] = H(Self::push_seg);

        t[0x10] = H(Self::adc_rm8_r8);
        t[0x11] = H(Self::adc_rm16_r16);
        t[0x12] = H(Self::adc_r8_rm8);
        t[0x13] = H(Self::adc_r16_rm16);
        t[0x14] = H(Self::adc_al_imm8);
        t[0x15] = H(Self::adc_ax_imm16);
        t[0x16] = H(Self::push_seg);
        t[0x17] = H(Self::pop_seg);

        t[0x18] = H(Self::sbb_rm8_r8);
        t[0x19] = H(Self::sbb_rm16_r16);
        t[0x1A] = H(Self::sbb_r8_rm8);
        t[0x1B] = H(Self::sbb_r16_rm16);
        t[0x1C] = H(Self::sbb_al_imm8);
        t[0x1D] = H(Self::sbb_ax_imm16);
        t[0x1E] = H(Self::push_seg);
        t[0x1F] = H(Self::pop_seg);

        t[0x20] = H(Self::and_rm8_r8);
        t[0x21] = H(Self::and_rm16_r16);
        t[0x22] = H(Self::and_r8_rm8);
        t[0x23] = H(Self::and_r16_rm16);
        t[0x24] = H(Self::and_al_imm8);
        t[0x25] = H(Self::and_ax_imm16);
        t[0x26] = H(Self::seg_override_prefix);

        t[0x28] = H(Self::sub_rm8_r8);
        t[0x29] = H(Self::sub_rm16_r16);
        t[0x2A] = H(Self::sub_r8_rm8);
        t[0x2B] = H(Self::sub_r16_rm16);
        t[0x2C] = H(Self::sub_al_imm8);
        t[0x2D] = H(Self::sub_ax_imm16);
        t[0x2E] = H(Self::seg_override_prefix);

        t[0x30] = H(Self::xor_rm8_r8);
        t[0x31] = H(Self::xor_rm16_r16);
        t[0x32] = H(Self::xor_r8_rm8);
        t[0x33] = H(Self::xor_r16_rm16);
        t[0x34] = H(Self::xor_al_imm8);
        t[0x35] = H(Self::xor_ax_imm16);
        t[0x36] = H(Self::seg_override_prefix);

        t[0x38] = H(Self::cmp_rm8_r8);
        t[0x39] = H(Self::cmp_rm16_r16);
        t[0x3A] = H(Self::cmp_r8_rm8);
        t[0x3B] = H(Self::cmp_r16_rm16);
        t[0x3C] = H(Self::cmp_al_imm8);
        t[0x3D] = H(Self::cmp_ax_imm16);
        t[0x3E] = H(Self::seg_override_prefix);

        for op in 0x40..=0x47 {
            t[op] = H(Self::inc_r16);
        }
        for op in 0x48..=0x4F {
            t[op] = H(Self::dec_r16);
        }
        for op in 0x50..=0x57 {
            t[op] = H(Self::push_r16);
        }
        for op in 0x58..=0x5F {
            t[op] = H(Self::pop_r16);
        }

        for op in 0x70..=0x7F {
            t[op] = H(Self::jcc_short);
        }

        t[0x84] = H(Self::test_rm8_r8);
        t[0x85] = H(Self::test_rm16_r16);
        t[0x88] = H(Self::mov_rm8_r8);
        t[0x89] = H(Self::mov_rm16_r16);

        t[0x90] = H(Self::nop);
        for op in 0x91..=0x97 {
            t[op] = H(Self::xchg_ax_r16);
        }
        t[0x98] = H(Self::cbw);
        t[0x99] = H(Self::cwd);
        t[0x9B] = H(Self::wait_pin);

        t[0xA0] = H(Self::mov_al_moffs);
        t[0xA1] = H(Self::mov_ax_moffs);
        t[0xA2] = H(Self::mov_moffs_al);
        t[0xA3] = H(Self::mov_moffs_ax);
        t[0xA8] = H(Self::test_al_imm8);
        t[0xA9] = H(Self::test_ax_imm16);

        for op in 0xB0..=0xB7 {
            t[op] = H(Self::mov_r8_imm8);
        }
        for op in 0xB8..=0xBF {
            t[op] = H(Self::mov_r16_imm16);
        }

        t[0xC2] = H(Self::ret_near_imm);
        t[0xC3] = H(Self::ret_near);
        t[0xCA] = H(Self::ret_far_imm);
        t[0xCB] = H(Self::ret_far);
        t[0xCC] = H(Self::int3);
        t[0xCD] = H(Self::int_imm8);

        t[0xD0] = H(Self::shift_rm8_1);
        t[0xD1] = H(Self::shift_rm16_1);
        t[0xD2] = H(Self::shift_rm8_cl);
        t[0xD3] = H(Self::shift_rm16_cl);
        t[0xD7] = H(Self::xlat);

        t[0xE0] = H(Self::loopnz);
        t[0xE1] = H(Self::loopz);
        t[0xE2] = H(Self::loop_cx);
        t[0xE3] = H(Self::jcxz);
        t[0xE4] = H(Self::in_al_imm8);
        t[0xE5] = H(Self::in_ax_imm8);
        t[0xE6] = H(Self::out_imm8_al);
        t[0xE7] = H(Self::out_imm8_ax);
        t[0xE8] = H(Self::call_near);
        t[0xE9] = H(Self::jmp_near);
        t[0xEA] = H(Self::jmp_far);
        t[0xEB] = H(Self::jmp_short_disp8);
        t[0xEC] = H(Self::in_al_dx);
        t[0xED] = H(Self::in_ax_dx);
        t[0xEE] = H(Self::out_dx_al);
        t[0xEF] = H(Self::out_dx_ax);

        t[0xF0] = H(Self::lock_prefix);
        t[0xF5] = H(Self::cmc);
        t[0xF8] = H(Self::clc);
        t[0xF9] = H(Self::stc);
        t[0xFA] = H(Self::cli);
        t[0xFB] = H(Self::sti);
        t[0xFC] = H(Self::cld);
        t[0xFD] = H(Self::std);

        t
    }
}
