//! Stack operations at SS:SP.

use super::{boot, step_n, EXTRA_SEG, STACK_SEG};
use crate::bus::Bus;
use crate::cpu_8086::linear;

#[test]
fn push_pop_round_trip() {
    // mov ax, 0x1234; push ax; pop bx
    let mut cpu = boot(&[0xB8, 0x34, 0x12, 0x50, 0x5B]);
    step_n(&mut cpu, 3);

    assert_eq!(cpu.regs.bx, 0x1234);
    assert_eq!(cpu.regs.sp, 0x0100);
}

#[test]
fn push_writes_below_old_sp() {
    // push ax
    let mut cpu = boot(&[0x50]);
    cpu.regs.ax = 0xCAFE;
    step_n(&mut cpu, 1);

    assert_eq!(cpu.regs.sp, 0x00FE);
    assert_eq!(cpu.bus.mem_read_16(linear(STACK_SEG, 0x00FE)), 0xCAFE);
}

#[test]
fn push_sp_pushes_the_old_value() {
    // push sp
    let mut cpu = boot(&[0x54]);
    step_n(&mut cpu, 1);

    assert_eq!(cpu.regs.sp, 0x00FE);
    assert_eq!(cpu.bus.mem_read_16(linear(STACK_SEG, 0x00FE)), 0x0100);
}

#[test]
fn push_pop_segment_registers() {
    // push es; pop ds
    let mut cpu = boot(&[0x06, 0x1F]);
    step_n(&mut cpu, 2);

    assert_eq!(cpu.regs.ds, EXTRA_SEG);
    assert_eq!(cpu.regs.sp, 0x0100);
}

#[test]
fn sp_wraps_within_the_stack_segment() {
    // push ax with sp = 0
    let mut cpu = boot(&[0x50]);
    cpu.regs.sp = 0x0000;
    cpu.regs.ax = 0xABCD;
    step_n(&mut cpu, 1);

    assert_eq!(cpu.regs.sp, 0xFFFE);
    assert_eq!(cpu.bus.mem_read_16(linear(STACK_SEG, 0xFFFE)), 0xABCD);
}
