//! Interfaces to the collaborators that own package data and configuration
//!
//! The resolver never loads descriptors, reads the world file or parses flag
//! configuration itself. It asks these traits, and only reads what they return.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use depsat_atom::{Atom, FQAtom, QualifiedAtom, Stability};

/// Repository name carried by records describing the installed state
pub const INSTALLED_REPO: &str = "installed";

/// Everything the resolver needs to know about one package version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PackageRecord {
    pub atom: FQAtom,
    /// Build-time dependencies
    #[serde(default)]
    pub depend: String,
    /// Runtime dependencies
    #[serde(default)]
    pub rdepend: String,
    /// Flag constraints
    #[serde(default)]
    pub required_use: String,
    /// Declared flags, `+flag` when enabled by default
    #[serde(default)]
    pub iuse: BTreeSet<String>,
    /// Keyword marker used for stability classification
    #[serde(default)]
    pub keyword: Option<String>,
    /// Flags the installed copy was built with. Only set on installed records.
    #[serde(default)]
    pub installed_use: Option<BTreeSet<String>>,
}

impl PackageRecord {
    pub fn new(atom: FQAtom) -> Self {
        Self {
            atom,
            depend: String::new(),
            rdepend: String::new(),
            required_use: String::new(),
            iuse: BTreeSet::new(),
            keyword: None,
            installed_use: None,
        }
    }

    pub fn is_installed(&self) -> bool {
        self.atom.repo == INSTALLED_REPO
    }

    /// Declared flag names without their default markers
    pub fn flag_names(&self) -> BTreeSet<String> {
        self.iuse
            .iter()
            .map(|f| f.trim_start_matches(['+', '-']).to_string())
            .collect()
    }

    /// Flags enabled by default in the package itself
    pub fn default_flags(&self) -> BTreeSet<String> {
        self.iuse
            .iter()
            .filter_map(|f| f.strip_prefix('+'))
            .map(str::to_string)
            .collect()
    }

    /// Both dependency strings, joined for a single parse
    pub fn dependency_string(&self) -> String {
        format!("{} {}", self.depend, self.rdepend)
    }
}

/// Lookup of candidate package records
pub trait PackageUniverse {
    /// Every record matching `atom`, including installed records
    fn candidates(&self, atom: &Atom) -> Vec<Arc<PackageRecord>>;

    /// The record for exactly this atom
    fn record(&self, atom: &FQAtom) -> Option<Arc<PackageRecord>>;

    /// The installed record of a package group, if any
    fn installed(&self, name: &QualifiedAtom) -> Option<Arc<PackageRecord>>;

    fn all_installed(&self) -> Vec<Arc<PackageRecord>>;

    /// Higher is preferred. The installed pseudo-repository is always ranked
    /// below every real repository by the resolver.
    fn repo_priority(&self, repo: &str) -> i32;

    fn stability(&self, record: &PackageRecord) -> Stability {
        Stability::from_keyword(record.keyword.as_deref())
    }

    /// Whether the binary a `sys-bin` package stands for is already present
    fn has_system_binary(&self, _record: &PackageRecord) -> bool {
        false
    }
}

/// The persisted selection ("world") set
pub trait SelectionSet {
    fn world(&self) -> Vec<Atom>;

    fn is_selected(&self, atom: &FQAtom) -> bool;
}

/// Flag configuration sources. Flag sets use `flag` / `-flag` notation.
pub trait FlagConfig {
    /// `(enabled, disabled)` flags of a record under the current configuration
    fn effective_flags(&self, record: &PackageRecord) -> (BTreeSet<String>, BTreeSet<String>);

    /// Flags the user set for this specific package
    fn user_flags(&self, atom: &FQAtom) -> BTreeSet<String>;

    fn global_user_flags(&self) -> BTreeSet<String>;

    /// Flags the profile forces on or off for this package
    fn forced_flags(&self, atom: &FQAtom) -> BTreeSet<String>;
}

/// The read-only inputs of one resolution
#[derive(Clone, Copy)]
pub struct Environment<'a> {
    pub universe: &'a dyn PackageUniverse,
    pub selection: &'a dyn SelectionSet,
    pub flags: &'a dyn FlagConfig,
}

impl<'a> Environment<'a> {
    pub fn new(
        universe: &'a dyn PackageUniverse,
        selection: &'a dyn SelectionSet,
        flags: &'a dyn FlagConfig,
    ) -> Self {
        Self { universe, selection, flags }
    }

    /// Flags the record is, or would be, built with
    pub fn enabled_flags(&self, record: &PackageRecord) -> BTreeSet<String> {
        match &record.installed_use {
            Some(flags) => flags.clone(),
            None => self.flags.effective_flags(record).0,
        }
    }
}

/// Split a `flag` / `-flag` entry into its name and state
pub fn parse_flag_setting(setting: &str) -> (&str, bool) {
    match setting.strip_prefix('-') {
        Some(name) => (name, false),
        None => (setting.trim_start_matches('+'), true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_flags() {
        let mut record = PackageRecord::new(FQAtom::parse("cat/a-1.0::main").unwrap());
        record.iuse = ["+ssl", "doc", "-X"].iter().map(|s| s.to_string()).collect();
        assert_eq!(record.default_flags(), BTreeSet::from(["ssl".to_string()]));
        assert_eq!(
            record.flag_names(),
            BTreeSet::from(["ssl".to_string(), "doc".to_string(), "X".to_string()])
        );
        assert!(!record.is_installed());
    }

    #[test]
    fn test_parse_flag_setting() {
        assert_eq!(parse_flag_setting("ssl"), ("ssl", true));
        assert_eq!(parse_flag_setting("-ssl"), ("ssl", false));
        assert_eq!(parse_flag_setting("+ssl"), ("ssl", true));
    }

    #[test]
    fn test_record_from_json() {
        let record: PackageRecord = serde_json::from_str(
            r#"{"atom": "cat/a-1.0::main", "rdepend": "cat/b", "keyword": "~amd64"}"#,
        )
        .unwrap();
        assert_eq!(record.atom.name, "a");
        assert_eq!(record.dependency_string().trim(), "cat/b");
        assert_eq!(record.keyword.as_deref(), Some("~amd64"));
    }
}
