//! Assembly language parser.
//!
//! Converts line-oriented assembly source into a [`Program`]. The operand
//! grammar comes from the opcode table generated by
//! [`for_each_instruction!`](crate::for_each_instruction): each operand slot is
//! a literal, an address, or a label.
//!
//! # Syntax
//!
//! ```text
//! // whole-line comment
//! start:                 // label definition
//!     SET 4 0            // literal, direct address
//!     SET 6 &0           // indirect address: the cell named by cell 0
//! loop: ADD 0 1 0        // label followed by an instruction
//!     JLT 0 2 loop
//!     TERM
//! ```
//!
//! - Mnemonics are case-insensitive, label names are not
//! - Operands are whitespace-separated; repeated whitespace is ignored
//! - `&` marks an indirect address; a literal may be wrapped in single quotes
//! - Any token starting with `//` ends the line
//! - Labels may be used before they are defined

use crate::debug;
use crate::virtual_machine::errors::{AssemblyError, AssemblyErrorKind, VMError};
use crate::virtual_machine::isa::{Opcode, Role};
use crate::virtual_machine::operand::{Parameter, decode_operand, parse_i64};
use crate::virtual_machine::program::{Instruction, LABEL_REFERENCE, Program, operand_violation};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt::Write;
use std::fs;
use std::path::Path;

const COMMENT_MARKER: &str = "//";
const LABEL_SUFFIX: char = ':';

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    text: &'a str,
    /// 1-based column offset in the line.
    offset: usize,
}

/// Tokenize a single line of assembly.
///
/// Tokens are separated by whitespace. The first token starting with `//`
/// and everything after it is dropped.
fn tokenize(line: &str) -> Vec<Token<'_>> {
    let mut out = Vec::with_capacity(4);
    let mut start: Option<usize> = None;

    let end = std::iter::once((line.len(), ' '));
    for (i, c) in line.char_indices().chain(end) {
        if !c.is_whitespace() {
            start.get_or_insert(i);
            continue;
        }
        let Some(s) = start.take() else {
            continue;
        };
        let text = &line[s..i];
        if text.starts_with(COMMENT_MARKER) {
            break;
        }
        out.push(Token {
            text,
            offset: line[..s].chars().count() + 1,
        });
    }

    out
}

/// Returns the label name if the token is a label definition (`name:`).
fn label_definition(tok: &str) -> Option<&str> {
    tok.strip_suffix(LABEL_SUFFIX)
        .filter(|name| !name.is_empty() && !name.contains(LABEL_SUFFIX))
}

/// A source line that produces an instruction.
struct SourceLine<'a> {
    /// 1-based line number.
    number: usize,
    text: &'a str,
    /// Mnemonic followed by its operands; never empty.
    tokens: Vec<Token<'a>>,
}

impl SourceLine<'_> {
    fn error(&self, column: usize, kind: AssemblyErrorKind) -> AssemblyError {
        AssemblyError {
            line: self.number,
            column,
            text: self.text.to_string(),
            kind,
        }
    }
}

/// Resolves one operand token against its slot role.
fn parse_operand(
    opcode: Opcode,
    position: usize,
    role: Role,
    raw: &str,
    labels: &BTreeMap<String, usize>,
) -> Result<Parameter, AssemblyErrorKind> {
    let operand = decode_operand(raw);
    let invalid = |reason: &'static str| AssemblyErrorKind::InvalidOperand {
        instruction: opcode.mnemonic(),
        position,
        token: raw.to_string(),
        reason,
    };

    if role == Role::Label {
        if operand.is_reference {
            return Err(invalid(LABEL_REFERENCE));
        }
        let target = labels
            .get(operand.body)
            .ok_or_else(|| AssemblyErrorKind::UnknownLabel {
                label: operand.body.to_string(),
            })?;
        return Ok(Parameter::direct(*target as i64));
    }

    let data = parse_i64(operand.body).ok_or_else(|| AssemblyErrorKind::NonNumericOperand {
        instruction: opcode.mnemonic(),
        position,
        token: raw.to_string(),
    })?;
    let param = Parameter {
        data,
        is_reference: operand.is_reference,
    };
    match operand_violation(role, &param) {
        Some(reason) => Err(invalid(reason)),
        None => Ok(param),
    }
}

/// Parses one instruction line once every label is known.
fn parse_instruction(
    line: &SourceLine<'_>,
    labels: &BTreeMap<String, usize>,
) -> Result<Instruction, AssemblyError> {
    let mnemonic = line.tokens[0];
    let opcode = Opcode::from_mnemonic(mnemonic.text).ok_or_else(|| {
        line.error(
            mnemonic.offset,
            AssemblyErrorKind::UnknownInstruction {
                name: mnemonic.text.to_string(),
            },
        )
    })?;

    let operands = &line.tokens[1..];
    let arity = opcode.arity();
    if operands.len() != arity {
        // point at the first surplus operand, or at the mnemonic when short
        let column = operands.get(arity).map_or(mnemonic.offset, |tok| tok.offset);
        return Err(line.error(
            column,
            AssemblyErrorKind::ArityMismatch {
                instruction: opcode.mnemonic(),
                expected: arity,
                actual: operands.len(),
            },
        ));
    }

    let mut params = Vec::with_capacity(arity);
    for (index, (tok, role)) in operands.iter().zip(opcode.operands()).enumerate() {
        let param = parse_operand(opcode, index + 1, *role, tok.text, labels)
            .map_err(|kind| line.error(tok.offset, kind))?;
        params.push(param);
    }

    Instruction::new(opcode, params).map_err(|kind| line.error(mnemonic.offset, kind))
}

/// Assemble a full source string into a [`Program`].
///
/// Uses two-pass assembly:
/// 1. First pass: tokenize lines, drop comments and blank lines, record each
///    label at the position of the next instruction
/// 2. Second pass: parse instructions with label resolution
///
/// Assembly stops at the first error in source order, which carries the
/// source location. A redefined label is reported when its line is reached.
pub fn assemble_source(source: &str) -> Result<Program, AssemblyError> {
    let mut labels = BTreeMap::new();
    let mut lines = Vec::new();
    let mut duplicate: Option<AssemblyError> = None;

    for (index, text) in source.lines().enumerate() {
        let mut tokens = tokenize(text);
        let Some(&first) = tokens.first() else {
            continue;
        };
        let line = SourceLine {
            number: index + 1,
            text,
            tokens: Vec::new(),
        };

        if let Some(name) = label_definition(first.text) {
            match labels.entry(name.to_string()) {
                Entry::Occupied(_) => {
                    duplicate.get_or_insert_with(|| {
                        line.error(
                            first.offset,
                            AssemblyErrorKind::DuplicateLabel {
                                label: name.to_string(),
                            },
                        )
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(lines.len());
                }
            }
            tokens.remove(0);
            if tokens.is_empty() {
                continue;
            }
        }

        lines.push(SourceLine { tokens, ..line });
    }

    let mut instructions = Vec::with_capacity(lines.len());
    for line in &lines {
        if duplicate.as_ref().is_some_and(|dup| line.number >= dup.line) {
            break;
        }
        instructions.push(parse_instruction(line, &labels)?);
    }
    if let Some(err) = duplicate {
        return Err(err);
    }

    Ok(Program::with_labels(instructions, labels))
}

/// Reads an assembly source file.
pub fn read_source<P: AsRef<Path>>(path: P) -> Result<String, VMError> {
    let path_ref = path.as_ref();
    let source = fs::read_to_string(path_ref).map_err(|error| VMError::Io {
        path: path_ref.display().to_string(),
        error,
    })?;
    debug!("read {} bytes from {}", source.len(), path_ref.display());
    Ok(source)
}

/// Formats a compiler-style diagnostic for an assembly failure.
pub fn render_assembly_diagnostic(file: &str, err: &AssemblyError) -> String {
    let line_no = err.line.to_string();
    let gutter = " ".repeat(line_no.len());
    let underline = " ".repeat(err.column.saturating_sub(1));

    let mut diag = String::new();
    let _ = writeln!(diag, "error: {}", err.kind);
    let _ = writeln!(diag, "{gutter}--> {file}:{}:{}", err.line, err.column);
    let _ = writeln!(diag, "{gutter} |");
    let _ = writeln!(diag, "{line_no} | {}", err.text.trim_end_matches('\r'));
    let _ = writeln!(diag, "{gutter} | {underline}^");
    diag
}
