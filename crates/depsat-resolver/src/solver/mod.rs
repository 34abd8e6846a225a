//! SAT-based dependency resolution.
//!
//! A request is lowered into a formula of hard clauses (builder), soft
//! preferences are layered on top (weigh), and the weighted formula is
//! handed to a MAX-SAT engine. A model is decoded into a resolution; an
//! unsatisfiable formula is diagnosed into a conflict report instead.

mod builder;
mod clause;
mod context;
mod decode;
mod diagnose;
mod engine;
mod formula;
mod literal;
mod request;
mod resolver;
mod sat;
mod transaction;
mod weigh;

#[cfg(test)]
mod tests;

pub use builder::{BuildOutput, FormulaBuilder};
pub use clause::{Bound, Clause, ClauseKind, Source, Tier};
pub use context::ResolutionContext;
pub use decode::{decode, FlagChange, Resolution};
pub use diagnose::{diagnose, ConflictReport, Explanation};
pub use engine::{CancelToken, MaxSatEngine, Outcome, StratifiedSearch, WeightedCnf};
pub use formula::{at_most_one, Formula};
pub use literal::{Literal, LiteralTable, Model, Var};
pub use request::Request;
pub use resolver::Resolver;
pub use sat::IncrementalSat;
pub use transaction::{Operation, Transaction};
pub use weigh::Weigher;
