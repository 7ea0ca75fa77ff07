//! Assembled program representation.
//!
//! A [`Program`] is the ordered, immutable list of [`Instruction`]s produced by
//! the assembler. Positions are the only control-flow targets: label operands
//! have already been replaced by the index of the instruction they name.

use crate::virtual_machine::errors::AssemblyErrorKind;
use crate::virtual_machine::isa::{Opcode, Role};
use crate::virtual_machine::operand::Parameter;
use std::collections::BTreeMap;
use std::fmt;

pub(crate) const LITERAL_REFERENCE: &str = "is a literal and must not be a reference";
pub(crate) const LABEL_REFERENCE: &str = "is a label and must not be a reference";
const NEGATIVE_POSITION: &str = "is not a valid instruction position";

/// Returns why `param` may not fill an operand slot of the given role.
pub(crate) fn operand_violation(role: Role, param: &Parameter) -> Option<&'static str> {
    match role {
        Role::Value if param.is_reference => Some(LITERAL_REFERENCE),
        Role::Label if param.is_reference => Some(LABEL_REFERENCE),
        Role::Label if param.data < 0 => Some(NEGATIVE_POSITION),
        _ => None,
    }
}

/// An opcode with its operands.
///
/// Construction goes through [`Instruction::new`], which enforces the opcode's
/// arity and operand roles, so the engine can index operands without checks.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Instruction {
    opcode: Opcode,
    params: Vec<Parameter>,
}

impl Instruction {
    /// Builds an instruction, validating it against the opcode table.
    ///
    /// Literal and label operands must not be references, and label operands
    /// must be non-negative positions.
    pub fn new(opcode: Opcode, params: Vec<Parameter>) -> Result<Self, AssemblyErrorKind> {
        if params.len() != opcode.arity() {
            return Err(AssemblyErrorKind::ArityMismatch {
                instruction: opcode.mnemonic(),
                expected: opcode.arity(),
                actual: params.len(),
            });
        }

        for (position, (param, role)) in params.iter().zip(opcode.operands()).enumerate() {
            if let Some(reason) = operand_violation(*role, param) {
                return Err(AssemblyErrorKind::InvalidOperand {
                    instruction: opcode.mnemonic(),
                    position: position + 1,
                    token: param.to_string(),
                    reason,
                });
            }
        }

        Ok(Self { opcode, params })
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode.mnemonic())?;
        for param in &self.params {
            write!(f, " {param}")?;
        }
        Ok(())
    }
}

/// Ordered instruction sequence plus the label table it was assembled with.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Program {
    instructions: Vec<Instruction>,
    /// Label names mapped to the position of the instruction that follows them.
    labels: BTreeMap<String, usize>,
}

impl Program {
    /// Creates a program that remembers its label table for listings.
    pub fn with_labels(instructions: Vec<Instruction>, labels: BTreeMap<String, usize>) -> Self {
        Self {
            instructions,
            labels,
        }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn get(&self, position: usize) -> Option<&Instruction> {
        self.instructions.get(position)
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn labels(&self) -> &BTreeMap<String, usize> {
        &self.labels
    }

    /// Returns the position a label resolved to.
    pub fn label(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }

    pub fn into_instructions(self) -> Vec<Instruction> {
        self.instructions
    }
}

/// Canonical listing: one `NNNN  MNEMONIC operands` line per instruction,
/// preceded by the labels that point at it.
impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut by_position: BTreeMap<usize, Vec<&str>> = BTreeMap::new();
        for (name, position) in &self.labels {
            by_position.entry(*position).or_default().push(name);
        }

        for (position, instruction) in self.instructions.iter().enumerate() {
            for name in by_position.remove(&position).unwrap_or_default() {
                writeln!(f, "{name}:")?;
            }
            writeln!(f, "{position:04}  {instruction}")?;
        }
        // labels placed after the last instruction
        for name in by_position.into_values().flatten() {
            writeln!(f, "{name}:")?;
        }
        Ok(())
    }
}
