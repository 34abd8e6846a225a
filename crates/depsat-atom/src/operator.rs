//! Version comparison operators used in atoms

use std::fmt;
use std::str::FromStr;

use crate::error::AtomError;

/// Comparison operator prefixing a versioned atom
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operator {
    /// Less than (<)
    LessThan,
    /// Less than or equal (<=)
    LessThanOrEqual,
    /// Exactly this version (=), or a version prefix when followed by `*`
    Equal,
    /// Same version, any revision (~)
    Revision,
    /// Greater than or equal (>=)
    GreaterThanOrEqual,
    /// Greater than (>)
    GreaterThan,
}

impl Operator {
    /// Get the string representation of the operator
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::LessThan => "<",
            Operator::LessThanOrEqual => "<=",
            Operator::Equal => "=",
            Operator::Revision => "~",
            Operator::GreaterThanOrEqual => ">=",
            Operator::GreaterThan => ">",
        }
    }

    /// Split a leading operator off an atom string.
    ///
    /// Two-character operators are tried first so that `>=` is not read as `>`.
    pub fn split_prefix(s: &str) -> (Option<Operator>, &str) {
        for op in ["<=", ">="] {
            if let Some(rest) = s.strip_prefix(op) {
                return (op.parse().ok(), rest);
            }
        }
        for op in ["<", ">", "=", "~"] {
            if let Some(rest) = s.strip_prefix(op) {
                return (op.parse().ok(), rest);
            }
        }
        (None, s)
    }

    /// Get all supported operators
    pub fn supported_operators() -> &'static [&'static str] {
        &["<", "<=", "=", "~", ">=", ">"]
    }
}

impl FromStr for Operator {
    type Err = AtomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "<" => Ok(Operator::LessThan),
            "<=" => Ok(Operator::LessThanOrEqual),
            "=" => Ok(Operator::Equal),
            "~" => Ok(Operator::Revision),
            ">=" => Ok(Operator::GreaterThanOrEqual),
            ">" => Ok(Operator::GreaterThan),
            _ => Err(AtomError::InvalidOperator(s.to_string())),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
