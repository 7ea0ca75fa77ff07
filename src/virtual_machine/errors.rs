use tapevm_derive::Error;

/// Reason an assembly line was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssemblyErrorKind {
    /// Unrecognized instruction mnemonic.
    #[error("unknown instruction '{name}'")]
    UnknownInstruction { name: String },
    /// Reference to a label that is never defined.
    #[error("unknown label '{label}'")]
    UnknownLabel { label: String },
    /// An address or value operand that does not parse as a signed integer.
    #[error("instruction {instruction} got non-numeric parameter[#{position}] '{token}'")]
    NonNumericOperand {
        instruction: &'static str,
        position: usize,
        token: String,
    },
    /// An operand written in a form its role forbids, such as `&` on a literal.
    #[error("instruction {instruction} parameter[#{position}] '{token}' {reason}")]
    InvalidOperand {
        instruction: &'static str,
        position: usize,
        token: String,
        reason: &'static str,
    },
    /// Wrong number of operands for an instruction.
    #[error("instruction {instruction} expects {expected} operand(s) but got {actual}")]
    ArityMismatch {
        instruction: &'static str,
        expected: usize,
        actual: usize,
    },
    /// Label defined more than once.
    #[error("duplicate label '{label}'")]
    DuplicateLabel { label: String },
}

/// Assembly failure located in the source text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("line {line}:{column}: {kind}")]
pub struct AssemblyError {
    /// 1-based source line.
    pub line: usize,
    /// 1-based column of the offending token.
    pub column: usize,
    /// The raw source line.
    pub text: String,
    #[source]
    pub kind: AssemblyErrorKind,
}

/// Failures raised by a [`Tape`](super::tape::Tape) access.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TapeError {
    /// Address is negative or not below the tape capacity.
    #[error("address {address} is outside memory, allowed addresses are [0, {capacity})")]
    OutOfBounds { address: i64, capacity: usize },
    /// Cell has never been written.
    #[error("cell #{address} was read before it was written")]
    Uninitialized { address: usize },
}

/// Reason the machine stopped abnormally.
#[derive(Debug, Error)]
pub enum RuntimeErrorKind {
    /// Address outside the value tape.
    #[error("address {address} is outside memory, allowed addresses are [0, {capacity})")]
    OutOfBounds { address: i64, capacity: usize },
    /// Read of a value cell that was never written.
    #[error("cell #{address} was read before it was written")]
    UninitializedRead { address: usize },
    /// Division or modulo by zero.
    #[error("division by zero")]
    DivisionByZero,
    /// `IN` received text that is not a signed integer.
    #[error("input '{input}' is not an integer")]
    InputParseFailure { input: String },
    /// Execution budget exhausted.
    #[error("cycle limit of {limit} instructions exceeded")]
    CycleLimitExceeded { limit: u64 },
    /// Program does not fit the instruction tape.
    #[error("program has {length} instructions but the instruction tape holds {capacity}")]
    ProgramTooLarge { length: usize, capacity: usize },
    /// Console read or write failed.
    #[error("console failure: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TapeError> for RuntimeErrorKind {
    fn from(err: TapeError) -> Self {
        match err {
            TapeError::OutOfBounds { address, capacity } => {
                RuntimeErrorKind::OutOfBounds { address, capacity }
            }
            TapeError::Uninitialized { address } => RuntimeErrorKind::UninitializedRead { address },
        }
    }
}

/// Runtime failure located at the instruction that raised it.
#[derive(Debug, Error)]
#[error("instruction {pc} ({mnemonic}): {kind}")]
pub struct RuntimeError {
    /// Index of the failing instruction.
    pub pc: usize,
    /// Mnemonic of the failing instruction.
    pub mnemonic: &'static str,
    #[source]
    pub kind: RuntimeErrorKind,
}

/// Top-level error for the assembler and machine front ends.
#[derive(Debug, Error)]
pub enum VMError {
    /// The source could not be assembled.
    #[error("assembly failed at {0}")]
    Assembly(#[from] AssemblyError),
    /// The program halted with a fault.
    #[error("execution failed at {0}")]
    Runtime(#[from] RuntimeError),
    /// A file could not be read or written.
    #[error("io error on {path}: {error}")]
    Io {
        path: String,
        #[source]
        error: std::io::Error,
    },
}
