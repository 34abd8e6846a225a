//! Package atoms, versions and dependency expressions
//!
//! This crate provides version parsing and comparison, package atoms at their
//! three granularities (qualified name, partial atom, fully-qualified atom) and
//! the expression trees used by dependency strings and flag constraints.

mod atom;
mod error;
pub mod expr;
mod operator;
mod stability;
mod version;

pub use atom::{Atom, FQAtom, QualifiedAtom, UseDep, UseDepKind};
pub use error::{AtomError, Result};
pub use expr::{parse_dependencies, parse_required_use, DepAtom, DepExpr, Expr, FlagLiteral, UseExpr};
pub use operator::Operator;
pub use stability::Stability;
pub use version::Version;
