use thiserror::Error;

/// Error type for atom, version and expression parsing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AtomError {
    #[error("Invalid version string \"{0}\"")]
    InvalidVersion(String),
    #[error("Invalid operator \"{0}\"")]
    InvalidOperator(String),
    #[error("Invalid atom \"{atom}\": {reason}")]
    InvalidAtom { atom: String, reason: String },
    #[error("Invalid use dependency \"{0}\"")]
    InvalidUseDep(String),
    #[error("Unbalanced parentheses in \"{0}\"")]
    UnbalancedParens(String),
    #[error("Operator \"{operator}\" must be followed by a parenthesised group in \"{expr}\"")]
    DanglingOperator { operator: String, expr: String },
    #[error("Operator \"{operator}\" is not allowed in \"{expr}\"")]
    OperatorNotAllowed { operator: String, expr: String },
    #[error("Empty group in \"{0}\"")]
    EmptyGroup(String),
    #[error("Invalid flag name \"{0}\"")]
    InvalidFlag(String),
}

impl AtomError {
    pub(crate) fn invalid_atom(atom: &str, reason: impl Into<String>) -> Self {
        AtomError::InvalidAtom {
            atom: atom.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AtomError>;
