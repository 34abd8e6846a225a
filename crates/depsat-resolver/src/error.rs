use thiserror::Error;

use depsat_atom::AtomError;

use crate::solver::ConflictReport;

#[derive(Error, Debug)]
pub enum ResolveError {
    // Lookup errors
    #[error("No package matches {atom}{}", required_by.as_ref().map(|s| format!(", required by {}", s)).unwrap_or_default())]
    PackageDoesNotExist { atom: String, required_by: Option<String> },

    #[error("The world file contains {atom}, but no package matches it")]
    WorldPackageDoesNotExist { atom: String },

    #[error("Atom {atom} is ambiguous and could refer to any of:\n  {}", candidates.join("\n  "))]
    AmbiguousAtom { atom: String, candidates: Vec<String> },

    // Parse errors
    #[error("Invalid dependency string in {package}: {source}")]
    InvalidDependency {
        package: String,
        #[source]
        source: AtomError,
    },

    #[error(transparent)]
    Atom(#[from] AtomError),

    // Solver errors
    #[error("Unable to satisfy dependencies:\n{0}")]
    Unsatisfiable(Box<ConflictReport>),

    #[error("Dependency calculation was cancelled before an optimal solution was found")]
    Inconclusive,

    #[error("SAT solver error: {0}")]
    Solver(String),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A broken invariant inside the resolver, never a user error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResolveError {
    pub fn package_does_not_exist(atom: impl ToString) -> Self {
        ResolveError::PackageDoesNotExist {
            atom: atom.to_string(),
            required_by: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ResolveError::Internal(message.into())
    }
}

pub type Result<T> = std::result::Result<T, ResolveError>;
