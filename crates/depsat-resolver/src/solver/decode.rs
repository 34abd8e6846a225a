use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use depsat_atom::{FQAtom, QualifiedAtom};

use crate::error::{ResolveError, Result};

use super::literal::{Model, Var};

/// The state a flag of a selected package ends up in
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FlagChange {
    pub atom: FQAtom,
    pub flag: String,
    pub enabled: bool,
}

impl fmt::Display for FlagChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.enabled { "" } else { "-" };
        write!(f, "{}[{}{}]", self.atom, sign, self.flag)
    }
}

/// The outcome of a successful resolution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// At most one version per package group, sorted
    pub enabled: Vec<FQAtom>,
    /// Versions that must not be installed, sorted. Versions of groups with
    /// an enabled member are left out.
    pub disabled: Vec<FQAtom>,
    /// Groups to add to the world set
    pub new_selected: BTreeSet<QualifiedAtom>,
    /// Flag states of enabled packages, sorted
    pub flag_changes: Vec<FlagChange>,
}

impl Resolution {
    pub fn is_enabled(&self, atom: &FQAtom) -> bool {
        self.enabled.binary_search(atom).is_ok()
    }

    /// The enabled version of a package group
    pub fn enabled_in(&self, name: &QualifiedAtom) -> Option<&FQAtom> {
        self.enabled.iter().find(|atom| atom.qualified() == *name)
    }

    pub fn flags_of<'a>(&'a self, atom: &'a FQAtom) -> impl Iterator<Item = &'a FlagChange> + 'a {
        self.flag_changes.iter().filter(move |change| change.atom == *atom)
    }
}

/// Turn a model into a resolution. Indicator variables are dropped.
pub fn decode(model: &Model, new_selected: BTreeSet<QualifiedAtom>) -> Result<Resolution> {
    let mut enabled: BTreeMap<QualifiedAtom, FQAtom> = BTreeMap::new();
    let mut disabled = BTreeSet::new();
    let mut flags = Vec::new();

    for literal in model.iter() {
        match literal.var() {
            Var::Anon(_) => {}
            Var::Package(atom) if literal.is_positive() => {
                if let Some(other) = enabled.insert(atom.qualified(), atom.clone()) {
                    return Err(ResolveError::internal(format!(
                        "both {} and {} are enabled",
                        other, atom
                    )));
                }
            }
            Var::Package(atom) => {
                disabled.insert(atom.clone());
            }
            Var::Flag(atom, flag) => flags.push(FlagChange {
                atom: atom.clone(),
                flag: flag.clone(),
                enabled: literal.is_positive(),
            }),
        }
    }

    let disabled = disabled
        .into_iter()
        .filter(|atom| !enabled.contains_key(&atom.qualified()))
        .collect();
    // keyed by group, so already in atom order
    let enabled: Vec<FQAtom> = enabled.into_values().collect();

    flags.retain(|change| enabled.binary_search(&change.atom).is_ok());
    flags.sort();

    Ok(Resolution {
        enabled,
        disabled,
        new_selected,
        flag_changes: flags,
    })
}
