//! Fault reporting, save-states, I/O ports and interrupt delegation.

use super::{boot, step_n, CODE_BASE, CODE_SEG};
use crate::cpu_8086::StepError;

#[test]
fn unimplemented_opcode_reports_and_preserves_state() {
    // 0x80 is a real encoding without a handler
    let mut cpu = boot(&[0x80, 0xC0, 0x01]);
    let regs_before = cpu.regs;
    let flags_before = cpu.flags;

    let err = cpu.step().unwrap_err();
    assert_eq!(
        err,
        StepError::UnimplementedOpcode {
            opcode: 0x80,
            cs: CODE_SEG,
            ip: 0,
        }
    );
    assert_eq!(cpu.regs, regs_before);
    assert_eq!(cpu.flags, flags_before);
    assert_eq!(cpu.cycles, 0);
}

#[test]
fn invalid_opcode_is_reported_distinctly() {
    // 0x0F has no 8086 encoding at all
    let mut cpu = boot(&[0x0F]);
    let err = cpu.step().unwrap_err();
    assert_eq!(
        err,
        StepError::InvalidOpcode {
            opcode: 0x0F,
            cs: CODE_SEG,
            ip: 0,
        }
    );
}

#[test]
fn fault_is_sticky_until_cleared() {
    let mut cpu = boot(&[0x80, 0xC0, 0x01]);
    let first = cpu.step().unwrap_err();
    assert_eq!(cpu.fault(), Some(first));

    // patching the program does not help while the fault is latched
    cpu.bus.load(CODE_BASE, &[0x90]);
    assert_eq!(cpu.step().unwrap_err(), first);

    cpu.clear_fault();
    assert_eq!(cpu.fault(), None);
    cpu.step().unwrap();
    assert_eq!(cpu.regs.ip, 1);
}

#[test]
fn int_delegates_the_vector_to_the_host() {
    // int 0x21; int3
    let mut cpu = boot(&[0xCD, 0x21, 0xCC]);
    step_n(&mut cpu, 1);
    assert_eq!(cpu.bus.raised, vec![0x21]);
    assert_eq!(cpu.regs.ip, 2); // advanced past the instruction first

    step_n(&mut cpu, 1);
    assert_eq!(cpu.bus.raised, vec![0x21, 0x03]);
    assert_eq!(cpu.regs.ip, 3);
}

#[test]
fn out_then_in_round_trips_through_the_port_latch() {
    // mov al, 0x5A; out 0x10, al; mov al, 0; in al, 0x10
    let mut cpu = boot(&[0xB0, 0x5A, 0xE6, 0x10, 0xB0, 0x00, 0xE4, 0x10]);
    step_n(&mut cpu, 4);

    assert_eq!(cpu.regs.al(), 0x5A);
}

#[test]
fn word_io_through_dx() {
    // mov ax, 0xABCD; mov dx, 0x3000; out dx, ax; mov ax, 0; in ax, dx
    let mut cpu = boot(&[
        0xB8, 0xCD, 0xAB, 0xBA, 0x00, 0x30, 0xEF, 0xB8, 0x00, 0x00, 0xED,
    ]);
    step_n(&mut cpu, 5);

    assert_eq!(cpu.regs.ax, 0xABCD);
}

#[test]
fn save_and_load_state_round_trip() {
    // mov ax, 0x1234; stc; nop; <invalid>
    let mut cpu = boot(&[0xB8, 0x34, 0x12, 0xF9, 0x90, 0x0F]);
    step_n(&mut cpu, 2);
    let snapshot = cpu.save_state();

    step_n(&mut cpu, 1);
    assert!(cpu.step().is_err());
    assert!(cpu.fault().is_some());
    cpu.regs.ax = 0;
    cpu.flags.cf = false;

    cpu.load_state(&snapshot).unwrap();
    assert_eq!(cpu.regs.ax, 0x1234);
    assert!(cpu.flags.cf);
    assert_eq!(cpu.regs.ip, 4);
    assert_eq!(cpu.fault(), None);

    // execution resumes from the restored IP
    cpu.step().unwrap();
    assert_eq!(cpu.regs.ip, 5);
}

#[test]
fn save_state_includes_the_sti_delay() {
    // sti; nop
    let mut cpu = boot(&[0xFB, 0x90]);
    step_n(&mut cpu, 1);
    assert!(!cpu.flags.ifl);
    let snapshot = cpu.save_state();

    let mut other = boot(&[0xFB, 0x90]);
    other.load_state(&snapshot).unwrap();
    other.step().unwrap();
    assert!(other.flags.ifl); // the pending enable survived the round trip
}

#[test]
fn reset_restores_power_on_state() {
    let mut cpu = boot(&[0xB8, 0x34, 0x12, 0xF9]);
    step_n(&mut cpu, 2);
    cpu.reset();

    assert_eq!(cpu.regs.cs, 0xFFFF);
    assert_eq!(cpu.regs.ip, 0);
    assert_eq!(cpu.regs.ax, 0);
    assert!(!cpu.flags.cf);
    assert_eq!(cpu.cycles, 0);
    assert_eq!(cpu.fault(), None);
}

#[test]
fn load_state_rejects_malformed_input() {
    let mut cpu = boot(&[0x90]);
    let bogus = serde_json::json!({ "regs": 5 });
    assert!(cpu.load_state(&bogus).is_err());
}
