//! Instruction Set Architecture (ISA) definitions.
//!
//! Defines the machine's instruction set. The [`for_each_instruction!`](crate::for_each_instruction)
//! macro holds the canonical instruction definitions and invokes a callback macro
//! for code generation. This keeps the mnemonic table, the operand grammar used by
//! the assembler and the profiling categories in one place.
//!
//! This module generates:
//! - The [`Opcode`] enum with numeric opcode mappings
//! - Mnemonic lookup (case-insensitive) and operand roles per opcode
//!
//! # Operand roles
//!
//! - `Value`: literal integer, never a reference
//! - `Addr`: value-tape address, direct or `&` indirect
//! - `Label`: instruction position resolved by the assembler

use crate::virtual_machine::vm::CycleCategory;

/// Invokes a callback macro with the complete instruction definition list.
///
/// This macro enables code generation for instructions in multiple modules
/// without duplicating the instruction definitions.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Memory
            // =========================
            /// SET value, addr ; cell[addr] = value
            Set = 1, "SET" => [value: Value, dst: Addr], Memory,
            /// MOV src, dst ; cell[dst] = cell[src]
            Mov = 14, "MOV" => [src: Addr, dst: Addr], Memory,
            /// TIME addr ; cell[addr] = wall clock in nanoseconds
            Time = 18, "TIME" => [dst: Addr], Memory,
            // =========================
            // Console
            // =========================
            /// IN addr ; cell[addr] = integer read from one input line
            In = 2, "IN" => [dst: Addr], Io,
            /// OUT addr ; print cell[addr]
            Out = 3, "OUT" => [src: Addr], Io,
            // =========================
            // Integer arithmetic
            // =========================
            /// ADD a, b, dst ; cell[dst] = cell[a] + cell[b]
            Add = 4, "ADD" => [a: Addr, b: Addr, dst: Addr], Arithmetic,
            /// SUB a, b, dst ; cell[dst] = cell[a] - cell[b]
            Sub = 5, "SUB" => [a: Addr, b: Addr, dst: Addr], Arithmetic,
            /// MUL a, b, dst ; cell[dst] = cell[a] * cell[b]
            Mul = 6, "MUL" => [a: Addr, b: Addr, dst: Addr], Arithmetic,
            /// DIV a, b, dst ; cell[dst] = cell[a] / cell[b] (trap on division by zero)
            Div = 7, "DIV" => [a: Addr, b: Addr, dst: Addr], Arithmetic,
            /// MOD a, b, dst ; cell[dst] = cell[a] % cell[b] (trap on division by zero)
            Mod = 8, "MOD" => [a: Addr, b: Addr, dst: Addr], Arithmetic,
            // =========================
            // Control Flow
            // =========================
            /// JMP label ; PC = label
            Jmp = 10, "JMP" => [target: Label], Branch,
            /// JGT a, b, label ; if cell[a] > cell[b] then PC = label
            Jgt = 11, "JGT" => [a: Addr, b: Addr, target: Label], Branch,
            /// JEQ a, b, label ; if cell[a] == cell[b] then PC = label
            Jeq = 12, "JEQ" => [a: Addr, b: Addr, target: Label], Branch,
            /// JLT a, b, label ; if cell[a] < cell[b] then PC = label
            Jlt = 13, "JLT" => [a: Addr, b: Addr, target: Label], Branch,
            /// CALL label ; push PC, PC = label
            Call = 16, "CALL" => [target: Label], Call,
            /// RET ; PC = pop() + 1, no-op on an empty call stack
            Ret = 17, "RET" => [], Call,
            /// TERM ; halt normally
            Term = 15, "TERM" => [], Control,
        }
    };
}

/// How an operand slot is interpreted.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Role {
    /// Literal integer; the reference flag is forbidden.
    Value,
    /// Value-tape address, resolved through one optional level of indirection.
    Addr,
    /// Instruction position resolved from a label at assembly time.
    Label,
}

#[macro_export]
macro_rules! define_instructions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:expr, $mnemonic:literal => [
                $( $field:ident : $role:ident ),* $(,)?
            ], $category:ident
        ),* $(,)?
    ) => {
        // =========================
        // Opcode enum
        // =========================
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl Opcode {
            /// Every opcode, in table order.
            pub const ALL: &'static [Opcode] = &[ $( Opcode::$name, )* ];

            /// Returns the assembly mnemonic for this instruction.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            /// Returns the role of each operand, in source order.
            pub const fn operands(&self) -> &'static [Role] {
                match self {
                    $( Opcode::$name => &[ $( define_instructions!(@role $role) ),* ], )*
                }
            }

            /// Returns the profiling category for this instruction.
            pub const fn category(&self) -> CycleCategory {
                match self {
                    $( Opcode::$name => CycleCategory::$category, )*
                }
            }

            /// Looks up a mnemonic, ignoring ASCII case.
            pub fn from_mnemonic(name: &str) -> Option<Opcode> {
                $(
                    if name.eq_ignore_ascii_case($mnemonic) {
                        return Some(Opcode::$name);
                    }
                )*
                None
            }
        }
    };

    // ---------- roles ----------
    (@role Value) => { Role::Value };
    (@role Addr)  => { Role::Addr };
    (@role Label) => { Role::Label };
}

for_each_instruction!(define_instructions);

impl Opcode {
    /// Number of operands the instruction takes.
    pub const fn arity(&self) -> usize {
        self.operands().len()
    }
}
