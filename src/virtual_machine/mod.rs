//! Tape virtual machine for small integer programs.
//!
//! Assembly source is turned into a [`program::Program`] by the assembler and
//! executed by [`vm::VM`], one instruction per cycle.
//!
//! # Architecture
//!
//! - **Instruction tape**: the loaded program, read-only once loaded
//! - **Value tape**: fixed number of optional `i64` cells, unset until written
//! - **Addressing**: operands name a cell directly, or through `&n` indirection
//!   where cell `n` holds the effective address
//! - **Control flow**: jumps to assembler-resolved positions, and a call stack
//!   for `CALL`/`RET`
//! - **Console**: `IN`/`OUT` and the `TIME` clock go through a [`vm::Host`]
//!
//! # Modules
//!
//! - [`assembler`]: Assembly parsing, label resolution and diagnostics
//! - [`errors`]: Assembly and execution error types
//! - [`isa`]: Instruction set definition and operand roles
//! - [`operand`]: Instruction operands and token decoding
//! - [`program`]: Validated instructions and the assembled program
//! - [`tape`]: Bounds-checked fixed-capacity memory
//! - [`vm`]: Execution engine, host, tracing and cycle profiling

pub mod assembler;
pub mod errors;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod operand;
pub mod program;
pub mod tape;
pub mod vm;
