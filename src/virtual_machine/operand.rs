//! Instruction operands and their source-token forms.
//!
//! A [`Parameter`] is a signed payload plus a reference flag. Direct operands use
//! the payload as-is; reference operands (`&n`) name a value cell whose content is
//! the effective address. The flag is only meaningful for address operands.

use std::fmt;

/// Prefix marking an indirect (reference) operand.
pub const REFERENCE_PREFIX: char = '&';
/// Cosmetic quote that may wrap a literal operand.
pub const LITERAL_QUOTE: char = '\'';

/// One operand of an [`Instruction`](super::program::Instruction).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Parameter {
    /// Literal value, address, or resolved instruction position.
    pub data: i64,
    /// Whether `data` names a cell holding the effective address.
    pub is_reference: bool,
}

impl Parameter {
    /// Creates a direct operand.
    pub const fn direct(data: i64) -> Self {
        Self {
            data,
            is_reference: false,
        }
    }

    /// Creates an indirect operand.
    pub const fn reference(data: i64) -> Self {
        Self {
            data,
            is_reference: true,
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_reference {
            write!(f, "{REFERENCE_PREFIX}{}", self.data)
        } else {
            write!(f, "{}", self.data)
        }
    }
}

/// An operand token after prefix and quote stripping.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct OperandToken<'a> {
    /// The payload text.
    pub(crate) body: &'a str,
    /// Whether the token carried the `&` prefix.
    pub(crate) is_reference: bool,
}

/// Splits a raw operand token into its payload and reference flag.
///
/// `&12` is a reference to cell 12. Otherwise a single pair of surrounding
/// quotes is removed (`'5'` reads as `5`); quotes carry no meaning.
pub(crate) fn decode_operand(token: &str) -> OperandToken<'_> {
    if let Some(body) = token.strip_prefix(REFERENCE_PREFIX) {
        return OperandToken {
            body,
            is_reference: true,
        };
    }

    OperandToken {
        body: strip_quotes(token),
        is_reference: false,
    }
}

/// Removes one pair of surrounding single quotes, if present.
pub(crate) fn strip_quotes(token: &str) -> &str {
    token
        .strip_prefix(LITERAL_QUOTE)
        .and_then(|t| t.strip_suffix(LITERAL_QUOTE))
        .unwrap_or(token)
}

/// Parses an integer operand payload; a leading `+` or `-` is accepted.
pub(crate) fn parse_i64(body: &str) -> Option<i64> {
    body.parse::<i64>().ok()
}
