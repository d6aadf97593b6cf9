//! Real-mode 8086 interpreter core.
//!
//! The crate provides a generic, instruction-per-instruction 8086 CPU that
//! runs against any memory/port bus implementing the [`bus::Bus`] trait.
//! Peripheral models, interrupt service routines and presentation layers
//! live outside this crate and talk to the core only through that trait
//! and the register accessors on [`cpu_8086::Cpu8086`].

pub mod bus;
pub mod cpu_8086;
pub mod logging;

pub use bus::{Bus, FlatBus};
pub use cpu_8086::{Cpu8086, StepError};
