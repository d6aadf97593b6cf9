use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use emu8086_core::{Cpu8086, FlatBus};

/// Endless register/memory workout loop at 1000:0000:
///
/// ```text
/// mov ax, 0
/// top: inc ax
///      add bx, ax
///      mov [bx], al
///      jmp top
/// ```
const PROGRAM: [u8; 10] = [
    0xB8, 0x00, 0x00, // mov ax, 0
    0x40, // inc ax
    0x01, 0xC3, // add bx, ax
    0x88, 0x07, // mov [bx], al
    0xEB, 0xF9, // jmp -7
];

fn bench_cpu() -> Cpu8086<FlatBus> {
    let mut bus = FlatBus::new();
    bus.load(0x1_0000, &PROGRAM);
    let mut cpu = Cpu8086::new(bus);
    prime(&mut cpu);
    cpu
}

/// Point the CPU back at the start of the workout loop.
fn prime(cpu: &mut Cpu8086<FlatBus>) {
    cpu.reset();
    cpu.regs.cs = 0x1000;
    cpu.regs.ip = 0;
    cpu.regs.ds = 0x3000;
    cpu.regs.ss = 0x2000;
    cpu.regs.sp = 0x0100;
}

fn bench_cpu_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_8086_step");

    group.bench_function("single_instruction", |b| {
        let mut cpu = bench_cpu();
        b.iter(|| {
            prime(&mut cpu);
            cpu.step().unwrap();
            black_box(cpu.regs.ax);
        });
    });

    group.finish();
}

fn bench_cpu_multiple_steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_8086_multiple_steps");

    for step_count in [10, 100, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(step_count),
            step_count,
            |b, &count| {
                let mut cpu = bench_cpu();
                b.iter(|| {
                    prime(&mut cpu);
                    for _ in 0..count {
                        cpu.step().unwrap();
                    }
                    black_box(cpu.cycles);
                });
            },
        );
    }

    group.finish();
}

fn bench_cpu_reset(c: &mut Criterion) {
    c.bench_function("cpu_8086_reset", |b| {
        let mut cpu = bench_cpu();
        b.iter(|| {
            cpu.reset();
            black_box(cpu.regs.ip);
        });
    });
}

criterion_group!(
    benches,
    bench_cpu_step,
    bench_cpu_multiple_steps,
    bench_cpu_reset
);
criterion_main!(benches);
