//! Tape virtual machine library.
//!
//! Provides the assembler and execution engine for a small integer machine
//! with bounded tape memory, plus logging and trace-file utilities.

pub mod utils;
pub mod virtual_machine;
