//! An environment held entirely in memory
//!
//! Useful for tests and for front-ends that load package data themselves and
//! hand it over as JSON.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use depsat_atom::{Atom, FQAtom, QualifiedAtom, Stability};

use crate::error::Result;
use crate::solver::{Operation, Transaction};
use crate::universe::{
    parse_flag_setting, Environment, FlagConfig, PackageRecord, PackageUniverse, SelectionSet,
    INSTALLED_REPO,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct MemoryEnvironment {
    /// Records available from repositories
    pub packages: Vec<PackageRecord>,
    /// Records of the installed packages, in the installed repository
    pub installed: Vec<PackageRecord>,
    pub world: Vec<Atom>,
    /// Repositories missing here have priority 0
    pub repo_priorities: IndexMap<String, i32>,
    /// Keywords treated as stable
    pub accept_keywords: BTreeSet<String>,
    pub global_flags: BTreeSet<String>,
    /// Per-package flag settings; later entries override earlier ones
    pub package_flags: IndexMap<Atom, BTreeSet<String>>,
    pub forced_flags: IndexMap<Atom, BTreeSet<String>>,
    /// Names of `sys-bin` packages whose binary is present on the system
    pub system_binaries: BTreeSet<String>,
}

impl MemoryEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn environment(&self) -> Environment<'_> {
        Environment::new(self, self, self)
    }

    /// Add a repository record for `atom` (`cat/name-version::repo`)
    pub fn add_package(
        &mut self,
        atom: &str,
        configure: impl FnOnce(&mut PackageRecord),
    ) -> Result<&mut Self> {
        let mut record = PackageRecord::new(FQAtom::parse(atom)?);
        configure(&mut record);
        self.packages.push(record);
        Ok(self)
    }

    /// Add an installed record for `cpv` (`cat/name-version`) built with `flags`
    pub fn add_installed(
        &mut self,
        cpv: &str,
        flags: &[&str],
        configure: impl FnOnce(&mut PackageRecord),
    ) -> Result<&mut Self> {
        let atom = FQAtom::parse(&format!("{}::{}", cpv, INSTALLED_REPO))?;
        let mut record = PackageRecord::new(atom);
        record.installed_use = Some(flags.iter().map(|f| f.to_string()).collect());
        configure(&mut record);
        self.installed.push(record);
        Ok(self)
    }

    pub fn add_world(&mut self, atom: &str) -> Result<&mut Self> {
        self.world.push(Atom::parse(atom)?);
        Ok(self)
    }

    pub fn set_user_flags(&mut self, atom: &str, flags: &[&str]) -> Result<&mut Self> {
        self.package_flags
            .insert(Atom::parse(atom)?, flags.iter().map(|f| f.to_string()).collect());
        Ok(self)
    }

    pub fn force_flags(&mut self, atom: &str, flags: &[&str]) -> Result<&mut Self> {
        self.forced_flags
            .insert(Atom::parse(atom)?, flags.iter().map(|f| f.to_string()).collect());
        Ok(self)
    }

    pub fn set_global_flags(&mut self, flags: &[&str]) -> &mut Self {
        self.global_flags = flags.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn accept_keyword(&mut self, keyword: impl Into<String>) -> &mut Self {
        self.accept_keywords.insert(keyword.into());
        self
    }

    pub fn set_repo_priority(&mut self, repo: impl Into<String>, priority: i32) -> &mut Self {
        self.repo_priorities.insert(repo.into(), priority);
        self
    }

    pub fn add_system_binary(&mut self, name: impl Into<String>) -> &mut Self {
        self.system_binaries.insert(name.into());
        self
    }

    /// Carry out a transaction on the installed state and the world set
    pub fn apply(&mut self, transaction: &Transaction) {
        for operation in &transaction.operations {
            match operation {
                Operation::Remove(record) => {
                    self.installed.retain(|r| r.atom != record.atom);
                }
                Operation::New(record)
                | Operation::Reinstall(record)
                | Operation::Update { to: record, .. }
                | Operation::Downgrade { to: record, .. } => {
                    let flags = transaction
                        .flags_for(&record.atom)
                        .cloned()
                        .unwrap_or_default();
                    self.install(record, flags);
                }
            }
        }

        for name in &transaction.new_selected {
            if !self.world.iter().any(|atom| atom.qualified().as_ref() == Some(name)) {
                self.world.push(name.to_atom());
            }
        }
    }

    fn install(&mut self, record: &PackageRecord, flags: BTreeSet<String>) {
        let name = record.atom.qualified();
        self.installed.retain(|r| r.atom.qualified() != name);

        let mut installed = record.clone();
        installed.atom = record.atom.with_repo(INSTALLED_REPO);
        installed.installed_use = Some(flags);
        self.installed.push(installed);
    }

    fn all_records(&self) -> impl Iterator<Item = &PackageRecord> {
        self.packages.iter().chain(self.installed.iter())
    }
}

/// Settings of every entry matching `atom`, later entries winning
fn settings_for(entries: &IndexMap<Atom, BTreeSet<String>>, atom: &FQAtom) -> BTreeSet<String> {
    let mut settings = BTreeSet::new();
    for (pattern, flags) in entries {
        if !pattern.matches(atom) {
            continue;
        }
        for setting in flags {
            let (name, enabled) = parse_flag_setting(setting);
            settings.remove(name);
            settings.remove(&format!("-{}", name));
            settings.insert(if enabled { name.to_string() } else { format!("-{}", name) });
        }
    }
    settings
}

fn apply_settings(enabled: &mut BTreeSet<String>, declared: &BTreeSet<String>, settings: &BTreeSet<String>) {
    for setting in settings {
        let (name, on) = parse_flag_setting(setting);
        if !declared.contains(name) {
            continue;
        }
        if on {
            enabled.insert(name.to_string());
        } else {
            enabled.remove(name);
        }
    }
}

impl PackageUniverse for MemoryEnvironment {
    fn candidates(&self, atom: &Atom) -> Vec<Arc<PackageRecord>> {
        self.all_records()
            .filter(|record| atom.matches(&record.atom))
            .map(|record| Arc::new(record.clone()))
            .collect()
    }

    fn record(&self, atom: &FQAtom) -> Option<Arc<PackageRecord>> {
        self.all_records()
            .find(|record| record.atom == *atom)
            .map(|record| Arc::new(record.clone()))
    }

    fn installed(&self, name: &QualifiedAtom) -> Option<Arc<PackageRecord>> {
        self.installed
            .iter()
            .find(|record| record.atom.qualified() == *name)
            .map(|record| Arc::new(record.clone()))
    }

    fn all_installed(&self) -> Vec<Arc<PackageRecord>> {
        self.installed.iter().cloned().map(Arc::new).collect()
    }

    fn repo_priority(&self, repo: &str) -> i32 {
        self.repo_priorities.get(repo).copied().unwrap_or(0)
    }

    fn stability(&self, record: &PackageRecord) -> Stability {
        match &record.keyword {
            Some(keyword) if self.accept_keywords.contains(keyword) => Stability::Stable,
            keyword => Stability::from_keyword(keyword.as_deref()),
        }
    }

    fn has_system_binary(&self, record: &PackageRecord) -> bool {
        self.system_binaries.contains(&record.atom.name)
    }
}

impl SelectionSet for MemoryEnvironment {
    fn world(&self) -> Vec<Atom> {
        self.world.clone()
    }

    fn is_selected(&self, atom: &FQAtom) -> bool {
        self.world.iter().any(|selected| selected.matches(atom))
    }
}

impl FlagConfig for MemoryEnvironment {
    fn effective_flags(&self, record: &PackageRecord) -> (BTreeSet<String>, BTreeSet<String>) {
        let declared = record.flag_names();
        let mut enabled = record.default_flags();
        apply_settings(&mut enabled, &declared, &self.global_flags);
        apply_settings(&mut enabled, &declared, &self.user_flags(&record.atom));
        apply_settings(&mut enabled, &declared, &self.forced_flags(&record.atom));

        let disabled = declared.difference(&enabled).cloned().collect();
        (enabled, disabled)
    }

    fn user_flags(&self, atom: &FQAtom) -> BTreeSet<String> {
        settings_for(&self.package_flags, atom)
    }

    fn global_user_flags(&self) -> BTreeSet<String> {
        self.global_flags.clone()
    }

    fn forced_flags(&self, atom: &FQAtom) -> BTreeSet<String> {
        settings_for(&self.forced_flags, atom)
    }
}
