//! ModRM addressing forms, default segments and the data-movement group.

use super::{boot, step_n, CODE_SEG, DATA_SEG, STACK_SEG};
use crate::bus::Bus;
use crate::cpu_8086::linear;

#[test]
fn bx_si_indexing_uses_ds() {
    // mov [bx+si], al
    let mut cpu = boot(&[0x88, 0x00]);
    cpu.regs.bx = 0x0010;
    cpu.regs.si = 0x0020;
    cpu.regs.set_al(0x5A);
    step_n(&mut cpu, 1);

    assert_eq!(cpu.bus.mem_read_8(linear(DATA_SEG, 0x0030)), 0x5A);
}

#[test]
fn bp_si_indexing_defaults_to_ss() {
    // mov [bp+si], al
    let mut cpu = boot(&[0x88, 0x02]);
    cpu.regs.bp = 0x0040;
    cpu.regs.si = 0x0002;
    cpu.regs.set_al(0x77);
    step_n(&mut cpu, 1);

    assert_eq!(cpu.bus.mem_read_8(linear(STACK_SEG, 0x0042)), 0x77);
    assert_eq!(cpu.bus.mem_read_8(linear(DATA_SEG, 0x0042)), 0x00);
}

#[test]
fn bp_disp8_defaults_to_ss() {
    // mov [bp+0x10], ax
    let mut cpu = boot(&[0x89, 0x46, 0x10]);
    cpu.regs.bp = 0x0200;
    cpu.regs.ax = 0xBEEF;
    step_n(&mut cpu, 1);

    assert_eq!(cpu.bus.mem_read_16(linear(STACK_SEG, 0x0210)), 0xBEEF);
    assert_eq!(cpu.regs.ip, 3);
}

#[test]
fn mod0_rm6_is_direct_address() {
    // mov [0x1234], ax; no BP involved
    let mut cpu = boot(&[0x89, 0x06, 0x34, 0x12]);
    cpu.regs.bp = 0x5555;
    cpu.regs.ax = 0xCAFE;
    step_n(&mut cpu, 1);

    assert_eq!(cpu.bus.mem_read_16(linear(DATA_SEG, 0x1234)), 0xCAFE);
    assert_eq!(cpu.regs.ip, 4);
}

#[test]
fn disp8_is_sign_extended() {
    // mov [bx-2], al
    let mut cpu = boot(&[0x88, 0x47, 0xFE]);
    cpu.regs.bx = 0x0050;
    cpu.regs.set_al(0x11);
    step_n(&mut cpu, 1);

    assert_eq!(cpu.bus.mem_read_8(linear(DATA_SEG, 0x004E)), 0x11);
}

#[test]
fn disp16_form() {
    // mov [bx+0x0100], al
    let mut cpu = boot(&[0x88, 0x87, 0x00, 0x01]);
    cpu.regs.bx = 0x0008;
    cpu.regs.set_al(0x22);
    step_n(&mut cpu, 1);

    assert_eq!(cpu.bus.mem_read_8(linear(DATA_SEG, 0x0108)), 0x22);
    assert_eq!(cpu.regs.ip, 4);
}

#[test]
fn mod3_selects_register_operand() {
    // mov ax, cx
    let mut cpu = boot(&[0x89, 0xC8]);
    cpu.regs.cx = 0xABCD;
    step_n(&mut cpu, 1);

    assert_eq!(cpu.regs.ax, 0xABCD);
}

#[test]
fn effective_address_wraps_within_segment() {
    // mov [bx+si], al with bx+si overflowing 16 bits
    let mut cpu = boot(&[0x88, 0x00]);
    cpu.regs.bx = 0xFFFF;
    cpu.regs.si = 0x0002;
    cpu.regs.set_al(0x33);
    step_n(&mut cpu, 1);

    assert_eq!(cpu.bus.mem_read_8(linear(DATA_SEG, 0x0001)), 0x33);
}

#[test]
fn linear_address_wraps_at_one_megabyte() {
    // mov [bx], al near the top of the address space
    let mut cpu = boot(&[0x88, 0x07]);
    cpu.regs.ds = 0xFFFF;
    cpu.regs.bx = 0x0010;
    cpu.regs.set_al(0x44);
    step_n(&mut cpu, 1);

    // 0xFFFF0 + 0x10 wraps to linear 0
    assert_eq!(cpu.bus.mem_read_8(0), 0x44);
}

#[test]
fn moffs_accumulator_forms() {
    // mov ax, [0x20]; mov [0x22], ax; mov al, [0x24]; mov [0x25], al
    let mut cpu = boot(&[
        0xA1, 0x20, 0x00, 0xA3, 0x22, 0x00, 0xA0, 0x24, 0x00, 0xA2, 0x25, 0x00,
    ]);
    cpu.bus.mem_write_16(linear(DATA_SEG, 0x0020), 0x5678);
    cpu.bus.mem_write_8(linear(DATA_SEG, 0x0024), 0x9A);
    step_n(&mut cpu, 4);

    assert_eq!(cpu.bus.mem_read_16(linear(DATA_SEG, 0x0022)), 0x5678);
    assert_eq!(cpu.bus.mem_read_8(linear(DATA_SEG, 0x0025)), 0x9A);
    assert_eq!(cpu.regs.al(), 0x9A);
    assert_eq!(cpu.regs.ip, 12);
}

#[test]
fn xlat_translates_through_bx_table() {
    let mut cpu = boot(&[0xD7]);
    cpu.regs.bx = 0x0100;
    cpu.regs.set_al(0x05);
    cpu.bus.mem_write_8(linear(DATA_SEG, 0x0105), 0x77);
    step_n(&mut cpu, 1);

    assert_eq!(cpu.regs.al(), 0x77);
    assert_eq!(cpu.regs.ip, 1);
}

#[test]
fn mov_immediate_high_byte_register() {
    // mov bh, 0x12
    let mut cpu = boot(&[0xB7, 0x12]);
    cpu.regs.bx = 0x0034;
    step_n(&mut cpu, 1);

    assert_eq!(cpu.regs.bx, 0x1234);
}

#[test]
fn xchg_ax_with_register() {
    // xchg ax, cx
    let mut cpu = boot(&[0x91]);
    cpu.regs.ax = 0x1111;
    cpu.regs.cx = 0x2222;
    step_n(&mut cpu, 1);

    assert_eq!(cpu.regs.ax, 0x2222);
    assert_eq!(cpu.regs.cx, 0x1111);
}

#[test]
fn cbw_and_cwd_sign_extend() {
    // mov al, 0x80; cbw; cwd
    let mut cpu = boot(&[0xB0, 0x80, 0x98, 0x99]);
    step_n(&mut cpu, 3);

    assert_eq!(cpu.regs.ax, 0xFF80);
    assert_eq!(cpu.regs.dx, 0xFFFF);
}

#[test]
fn code_fetch_reads_from_cs() {
    // program bytes only exist at CS; a fetch from DS would read zeros
    let mut cpu = boot(&[0xB8, 0x99, 0x88]);
    assert_ne!(cpu.regs.ds, CODE_SEG);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.regs.ax, 0x8899);
}
