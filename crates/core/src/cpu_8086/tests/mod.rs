//! Execution tests for the 8086 core.
//!
//! Each test assembles a small program by hand, loads it at CODE_SEG:0000
//! over a [`FlatBus`], steps the CPU and asserts on registers, flags and
//! bus traffic. Data, stack and extra segments are given distinct bases so
//! a wrong default segment shows up as a wrong address.

use crate::bus::FlatBus;
use crate::cpu_8086::Cpu8086;

mod addressing;
mod stack;
mod system;

const CODE_SEG: u16 = 0x1000;
const CODE_BASE: u32 = 0x1_0000;

const DATA_SEG: u16 = 0x3000;
const EXTRA_SEG: u16 = 0x4000;
const STACK_SEG: u16 = 0x2000;

/// CPU with `program` at CODE_SEG:0000 and segments spread apart.
fn boot(program: &[u8]) -> Cpu8086<FlatBus> {
    let mut bus = FlatBus::new();
    bus.load(CODE_BASE, program);

    let mut cpu = Cpu8086::new(bus);
    cpu.regs.cs = CODE_SEG;
    cpu.regs.ip = 0;
    cpu.regs.ds = DATA_SEG;
    cpu.regs.es = EXTRA_SEG;
    cpu.regs.ss = STACK_SEG;
    cpu.regs.sp = 0x0100;
    cpu
}

fn step_n(cpu: &mut Cpu8086<FlatBus>, n: usize) {
    for _ in 0..n {
        cpu.step().unwrap();
    }
}
