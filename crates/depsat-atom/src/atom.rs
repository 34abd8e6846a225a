//! Package atoms
//!
//! Three granularities are modelled:
//!
//! - [`QualifiedAtom`]: `category/name`, the key of a package group
//! - [`Atom`]: a possibly partial reference with an optional version
//!   comparator, repository and use dependencies
//! - [`FQAtom`]: one specific version from one specific repository

use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};

use crate::error::{AtomError, Result};
use crate::operator::Operator;
use crate::version::Version;

lazy_static! {
    static ref NAME_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9+_.-]*$").unwrap();
    static ref NAME_VERSION_REGEX: Regex =
        Regex::new(r"^(?P<name>.+?)-(?P<version>\d[^-]*(?:-r\d+)?)$").unwrap();
    static ref FLAG_REGEX: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9+_@.-]*$").unwrap();
}

/// How a use dependency constrains the flag of the depended-upon package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UseDepKind {
    /// `flag`: must be enabled
    Enabled,
    /// `-flag`: must be disabled
    Disabled,
    /// `flag?`: enabled if the depending package has it enabled
    IfEnabled,
    /// `!flag?`: disabled if the depending package has it disabled
    IfDisabled,
    /// `flag=`: same state as on the depending package
    Same,
    /// `!flag=`: opposite state to the depending package
    Opposite,
}

/// A flag requirement attached to an atom, e.g. the `ssl` in `net/curl[ssl]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UseDep {
    pub flag: String,
    pub kind: UseDepKind,
}

impl UseDep {
    pub fn enabled(flag: impl Into<String>) -> Self {
        Self { flag: flag.into(), kind: UseDepKind::Enabled }
    }

    pub fn disabled(flag: impl Into<String>) -> Self {
        Self { flag: flag.into(), kind: UseDepKind::Disabled }
    }

    /// Whether this dependency depends on the depending package's flags
    pub fn is_conditional(&self) -> bool {
        !matches!(self.kind, UseDepKind::Enabled | UseDepKind::Disabled)
    }

    /// The required flag state, for unconditional dependencies
    pub fn required_state(&self) -> Option<bool> {
        match self.kind {
            UseDepKind::Enabled => Some(true),
            UseDepKind::Disabled => Some(false),
            _ => None,
        }
    }

    fn parse(input: &str) -> Result<Self> {
        let token = input
            .trim()
            .trim_end_matches("(+)")
            .trim_end_matches("(-)");
        let (flag, kind) = if let Some(flag) = token.strip_prefix('!') {
            if let Some(flag) = flag.strip_suffix('?') {
                (flag, UseDepKind::IfDisabled)
            } else if let Some(flag) = flag.strip_suffix('=') {
                (flag, UseDepKind::Opposite)
            } else {
                return Err(AtomError::InvalidUseDep(input.to_string()));
            }
        } else if let Some(flag) = token.strip_prefix('-') {
            (flag, UseDepKind::Disabled)
        } else if let Some(flag) = token.strip_suffix('?') {
            (flag, UseDepKind::IfEnabled)
        } else if let Some(flag) = token.strip_suffix('=') {
            (flag, UseDepKind::Same)
        } else {
            (token, UseDepKind::Enabled)
        };
        if !FLAG_REGEX.is_match(flag) {
            return Err(AtomError::InvalidUseDep(input.to_string()));
        }
        Ok(Self { flag: flag.to_string(), kind })
    }
}

impl fmt::Display for UseDep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            UseDepKind::Enabled => write!(f, "{}", self.flag),
            UseDepKind::Disabled => write!(f, "-{}", self.flag),
            UseDepKind::IfEnabled => write!(f, "{}?", self.flag),
            UseDepKind::IfDisabled => write!(f, "!{}?", self.flag),
            UseDepKind::Same => write!(f, "{}=", self.flag),
            UseDepKind::Opposite => write!(f, "!{}=", self.flag),
        }
    }
}

/// `category/name`, identifying a package group regardless of version or repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedAtom {
    pub category: String,
    pub name: String,
}

impl QualifiedAtom {
    pub fn new(category: impl Into<String>, name: impl Into<String>) -> Self {
        Self { category: category.into(), name: name.into() }
    }

    /// An unversioned atom matching every member of the group
    pub fn to_atom(&self) -> Atom {
        Atom {
            category: Some(self.category.clone()),
            name: self.name.clone(),
            op: None,
            version: None,
            glob: false,
            repo: None,
            use_deps: Vec::new(),
        }
    }
}

impl FromStr for QualifiedAtom {
    type Err = AtomError;

    fn from_str(s: &str) -> Result<Self> {
        let (category, name) = s
            .split_once('/')
            .ok_or_else(|| AtomError::invalid_atom(s, "missing category"))?;
        validate_name(s, category)?;
        validate_name(s, name)?;
        Ok(Self::new(category, name))
    }
}

impl fmt::Display for QualifiedAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.name)
    }
}

/// A fully-qualified atom: one buildable version from one repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FQAtom {
    pub category: String,
    pub name: String,
    pub version: Version,
    pub repo: String,
}

impl FQAtom {
    pub fn new(
        category: impl Into<String>,
        name: impl Into<String>,
        version: Version,
        repo: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
            version,
            repo: repo.into(),
        }
    }

    /// Parse `category/name-version::repo`
    pub fn parse(input: &str) -> Result<Self> {
        let (rest, repo) = input
            .rsplit_once("::")
            .ok_or_else(|| AtomError::invalid_atom(input, "missing repository"))?;
        validate_name(input, repo)?;
        let (category, name_version) = rest
            .split_once('/')
            .ok_or_else(|| AtomError::invalid_atom(input, "missing category"))?;
        validate_name(input, category)?;
        let (name, version) = split_version(input, name_version)?
            .ok_or_else(|| AtomError::invalid_atom(input, "missing version"))?;
        Ok(Self::new(category, name, version, repo))
    }

    pub fn qualified(&self) -> QualifiedAtom {
        QualifiedAtom::new(&self.category, &self.name)
    }

    /// The same package in a different repository
    pub fn with_repo(&self, repo: impl Into<String>) -> Self {
        Self { repo: repo.into(), ..self.clone() }
    }
}

impl FromStr for FQAtom {
    type Err = AtomError;

    fn from_str(s: &str) -> Result<Self> {
        FQAtom::parse(s)
    }
}

impl fmt::Display for FQAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}-{}::{}", self.category, self.name, self.version, self.repo)
    }
}

/// A package reference as written in dependency strings and on the command line.
///
/// A version can only be given together with an operator: `cat/foo-1.0` is
/// the package named `foo-1.0`, while `=cat/foo-1.0` is version 1.0 of `foo`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom {
    pub category: Option<String>,
    pub name: String,
    pub op: Option<Operator>,
    pub version: Option<Version>,
    /// `=cat/foo-1.2*` matches every version starting with `1.2`
    pub glob: bool,
    pub repo: Option<String>,
    pub use_deps: Vec<UseDep>,
}

impl Atom {
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(AtomError::invalid_atom(input, "empty atom"));
        }

        let (rest, use_deps) = match trimmed.strip_suffix(']') {
            Some(body) => {
                let open = body
                    .find('[')
                    .ok_or_else(|| AtomError::invalid_atom(input, "unbalanced brackets"))?;
                let deps = body[open + 1..]
                    .split(',')
                    .filter(|s| !s.trim().is_empty())
                    .map(UseDep::parse)
                    .collect::<Result<Vec<_>>>()?;
                (&body[..open], deps)
            }
            None => (trimmed, Vec::new()),
        };

        let (rest, repo) = match rest.rsplit_once("::") {
            Some((head, repo)) => {
                validate_name(input, repo)?;
                (head, Some(repo.to_string()))
            }
            None => (rest, None),
        };

        let (op, rest) = Operator::split_prefix(rest);
        let (rest, glob) = match rest.strip_suffix('*') {
            Some(head) if op == Some(Operator::Equal) => (head, true),
            Some(_) => return Err(AtomError::invalid_atom(input, "'*' requires the '=' operator")),
            None => (rest, false),
        };

        let (category, rest) = match rest.split_once('/') {
            Some((category, name)) => {
                validate_name(input, category)?;
                (Some(category.to_string()), name)
            }
            None => (None, rest),
        };

        let (name, version) = if op.is_some() {
            let (name, version) = split_version(input, rest)?
                .ok_or_else(|| AtomError::invalid_atom(input, "operator given without a version"))?;
            (name, Some(version))
        } else {
            validate_name(input, rest)?;
            (rest.to_string(), None)
        };

        Ok(Self { category, name, op, version, glob, repo, use_deps })
    }

    /// An atom matching exactly one fully-qualified atom
    pub fn exact(atom: &FQAtom) -> Self {
        Self {
            category: Some(atom.category.clone()),
            name: atom.name.clone(),
            op: Some(Operator::Equal),
            version: Some(atom.version.clone()),
            glob: false,
            repo: Some(atom.repo.clone()),
            use_deps: Vec::new(),
        }
    }

    pub fn qualified(&self) -> Option<QualifiedAtom> {
        self.category
            .as_ref()
            .map(|category| QualifiedAtom::new(category, &self.name))
    }

    pub fn strip_use(&self) -> Self {
        self.with_use(Vec::new())
    }

    pub fn with_use(&self, use_deps: Vec<UseDep>) -> Self {
        Self { use_deps, ..self.clone() }
    }

    /// Whether `atom` is one of the packages this atom refers to. Use
    /// dependencies are ignored.
    pub fn matches(&self, atom: &FQAtom) -> bool {
        if self.category.as_ref().is_some_and(|c| *c != atom.category) {
            return false;
        }
        if self.name != atom.name {
            return false;
        }
        if self.repo.as_ref().is_some_and(|r| *r != atom.repo) {
            return false;
        }
        self.matches_version(&atom.version)
    }

    fn matches_version(&self, version: &Version) -> bool {
        let (Some(op), Some(wanted)) = (self.op, self.version.as_ref()) else {
            return true;
        };
        match op {
            Operator::Equal if self.glob => version.starts_with(wanted),
            Operator::Equal => version == wanted,
            Operator::Revision => version.cmp_base(wanted).is_eq(),
            Operator::LessThan => version < wanted,
            Operator::LessThanOrEqual => version <= wanted,
            Operator::GreaterThan => version > wanted,
            Operator::GreaterThanOrEqual => version >= wanted,
        }
    }

    fn exact_version(&self) -> Option<&Version> {
        match self.op {
            Some(Operator::Equal) if !self.glob => self.version.as_ref(),
            _ => None,
        }
    }

    /// Whether some package could match both atoms.
    ///
    /// Two ranges are assumed to overlap unless one of them pins an exact
    /// version the other rejects.
    pub fn intersects(&self, other: &Atom) -> bool {
        if self.name != other.name {
            return false;
        }
        if let (Some(a), Some(b)) = (&self.category, &other.category) {
            if a != b {
                return false;
            }
        }
        if let (Some(a), Some(b)) = (&self.repo, &other.repo) {
            if a != b {
                return false;
            }
        }
        match (self.exact_version(), other.exact_version()) {
            (Some(version), _) => other.matches_version(version),
            (None, Some(version)) => self.matches_version(version),
            (None, None) => true,
        }
    }
}

impl FromStr for Atom {
    type Err = AtomError;

    fn from_str(s: &str) -> Result<Self> {
        Atom::parse(s)
    }
}

impl From<&FQAtom> for Atom {
    fn from(atom: &FQAtom) -> Self {
        Atom::exact(atom)
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(op) = self.op {
            write!(f, "{}", op)?;
        }
        if let Some(category) = &self.category {
            write!(f, "{}/", category)?;
        }
        write!(f, "{}", self.name)?;
        if let Some(version) = &self.version {
            write!(f, "-{}", version)?;
        }
        if self.glob {
            f.write_str("*")?;
        }
        if let Some(repo) = &self.repo {
            write!(f, "::{}", repo)?;
        }
        if !self.use_deps.is_empty() {
            let deps: Vec<String> = self.use_deps.iter().map(|d| d.to_string()).collect();
            write!(f, "[{}]", deps.join(","))?;
        }
        Ok(())
    }
}

fn validate_name(input: &str, name: &str) -> Result<()> {
    if NAME_REGEX.is_match(name) {
        Ok(())
    } else {
        Err(AtomError::invalid_atom(input, format!("invalid name component \"{}\"", name)))
    }
}

/// Split `name-version` into its parts, if a valid version suffix is present
fn split_version(input: &str, name_version: &str) -> Result<Option<(String, Version)>> {
    let Some(caps) = NAME_VERSION_REGEX.captures(name_version) else {
        return Ok(None);
    };
    validate_name(input, &caps["name"])?;
    let version = Version::parse(&caps["version"])?;
    Ok(Some((caps["name"].to_string(), version)))
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(de::Error::custom)
            }
        }
    };
}

string_serde!(Atom);
string_serde!(FQAtom);
string_serde!(QualifiedAtom);
