use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use depsat_atom::{FQAtom, QualifiedAtom};

use crate::config::ResolveOptions;
use crate::error::{ResolveError, Result};
use crate::universe::{Environment, PackageRecord};

use super::decode::{FlagChange, Resolution};

/// A single change to the installed state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    New(Arc<PackageRecord>),
    Update {
        from: Arc<PackageRecord>,
        to: Arc<PackageRecord>,
    },
    Downgrade {
        from: Arc<PackageRecord>,
        to: Arc<PackageRecord>,
    },
    /// Rebuild the same version, usually with different flags
    Reinstall(Arc<PackageRecord>),
    Remove(Arc<PackageRecord>),
}

impl Operation {
    /// The record that ends up installed, or is removed
    pub fn record(&self) -> &Arc<PackageRecord> {
        match self {
            Operation::New(record) | Operation::Reinstall(record) | Operation::Remove(record) => record,
            Operation::Update { to, .. } | Operation::Downgrade { to, .. } => to,
        }
    }

    pub fn op_type(&self) -> &'static str {
        match self {
            Operation::New(_) => "new",
            Operation::Update { .. } => "update",
            Operation::Downgrade { .. } => "downgrade",
            Operation::Reinstall(_) => "reinstall",
            Operation::Remove(_) => "remove",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Update { from, to } | Operation::Downgrade { from, to } => write!(
                f,
                "{} {} ({} -> {})",
                self.op_type(),
                to.atom.qualified(),
                from.atom.version,
                to.atom.version
            ),
            _ => write!(f, "{} {}", self.op_type(), self.record().atom),
        }
    }
}

/// The changes needed to move from the installed state to a resolution
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    pub operations: Vec<Operation>,
    /// Flags each installed or rebuilt package is built with
    pub build_flags: BTreeMap<FQAtom, BTreeSet<String>>,
    /// Flag states that differ from the current configuration
    pub flag_changes: Vec<FlagChange>,
    pub new_selected: BTreeSet<QualifiedAtom>,
}

impl Transaction {
    pub fn from_resolution(
        resolution: &Resolution,
        env: &Environment<'_>,
        options: &ResolveOptions,
    ) -> Result<Self> {
        let mut transaction = Transaction {
            new_selected: resolution.new_selected.clone(),
            ..Default::default()
        };

        for atom in &resolution.enabled {
            let record = env
                .universe
                .record(atom)
                .ok_or_else(|| ResolveError::internal(format!("no package record for {}", atom)))?;

            let mut flags = env.enabled_flags(&record);
            for change in resolution.flags_of(atom) {
                if change.enabled {
                    flags.insert(change.flag.clone());
                } else {
                    flags.remove(&change.flag);
                }
            }
            let (configured, _) = env.flags.effective_flags(&record);
            for change in resolution.flags_of(atom) {
                if configured.contains(&change.flag) != change.enabled {
                    transaction.flag_changes.push(change.clone());
                }
            }

            let name = atom.qualified();
            let operation = match env.universe.installed(&name) {
                None => Some(Operation::New(record)),
                Some(_) if options.emptytree => Some(Operation::Reinstall(record)),
                Some(installed) => match record.atom.version.cmp(&installed.atom.version) {
                    Ordering::Greater => Some(Operation::Update { from: installed, to: record }),
                    Ordering::Less => Some(Operation::Downgrade { from: installed, to: record }),
                    Ordering::Equal => {
                        let rebuilt = installed.installed_use.as_ref() != Some(&flags);
                        let reselected = resolution.new_selected.contains(&name) && !options.noreplace;
                        (rebuilt || reselected).then(|| Operation::Reinstall(record))
                    }
                },
            };

            if let Some(operation) = operation {
                transaction.build_flags.insert(atom.clone(), flags);
                transaction.operations.push(operation);
            }
        }

        for atom in &resolution.disabled {
            if let Some(installed) = env.universe.installed(&atom.qualified()) {
                if installed.atom == *atom {
                    transaction.operations.push(Operation::Remove(installed));
                }
            }
        }

        Ok(transaction)
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty() && self.new_selected.is_empty()
    }

    /// Flags to build `atom` with, if this transaction builds it
    pub fn flags_for(&self, atom: &FQAtom) -> Option<&BTreeSet<String>> {
        self.build_flags.get(atom)
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for operation in &self.operations {
            writeln!(f, "{}", operation)?;
        }
        for change in &self.flag_changes {
            writeln!(f, "flag {}", change)?;
        }
        Ok(())
    }
}
