pub mod config;
pub mod error;
pub mod memory;
pub mod solver;
pub mod universe;

pub use config::{ResolveOptions, ResolverConfig, Weights};
pub use error::{ResolveError, Result};
pub use memory::MemoryEnvironment;
pub use solver::{
    CancelToken, ConflictReport, Explanation, FlagChange, MaxSatEngine, Operation, Outcome, Request,
    Resolution, Resolver, StratifiedSearch, Transaction, WeightedCnf,
};
pub use universe::{Environment, FlagConfig, PackageRecord, PackageUniverse, SelectionSet, INSTALLED_REPO};
