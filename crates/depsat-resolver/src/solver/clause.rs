use std::collections::BTreeSet;
use std::fmt;

use depsat_atom::{Atom, FQAtom, FlagLiteral};

use super::literal::{Literal, Model, Var};

/// Soft-preference tiers, lowest priority first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    NotNeeded,
    Outdated,
    KeepInstalled,
    DefaultFlag,
    UserFlag,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::NotNeeded => "not-needed",
            Tier::Outdated => "outdated",
            Tier::KeepInstalled => "keep-installed",
            Tier::DefaultFlag => "default-flag",
            Tier::UserFlag => "user-flag",
        }
    }
}

/// Where a clause came from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    /// Atoms passed by the user for this resolution
    CommandLine,
    /// The persisted selection set
    World,
    /// Profile-forced flags
    Profile,
    /// The dependency expression of a package
    Package(FQAtom),
    /// Structural rules such as one version per package group
    Invariant,
    /// Soft preferences added by the weigher
    Preference(Tier),
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::CommandLine => f.write_str("packages passed on the command line"),
            Source::World => f.write_str("the world file"),
            Source::Profile => f.write_str("the profile"),
            Source::Package(atom) => write!(f, "{}", atom),
            Source::Invariant => f.write_str("inviolable rule"),
            Source::Preference(tier) => write!(f, "{} preference", tier.as_str()),
        }
    }
}

/// How a generic clause is enforced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Hard,
    Weighted(u64),
    /// At most this many of the literals may hold
    AtMost(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClauseKind {
    /// One of the candidates matching `dependency` is required
    Dependency { source: Source, dependency: Atom },
    /// Candidates matching `blocked` are forbidden
    Blocker { source: Source, blocked: Atom },
    /// A flag of a specific candidate must have a given state
    UseDependency {
        source: Source,
        target: FQAtom,
        requested: Atom,
        flag: FlagLiteral,
    },
    /// Part of a package's flag constraints
    RequiredUse {
        atom: FQAtom,
        flag: Literal,
        /// Human-readable form of `flag`
        label: String,
        /// The enclosing constraint expression
        context: String,
    },
    Generic {
        source: Source,
        description: String,
        bound: Bound,
    },
}

/// A disjunction of literals, with its provenance.
///
/// `requirements` holds the negations of the constraint literals appended by
/// [`Clause::constrain`]: the clause only has an effect in models where all
/// of them hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    kind: ClauseKind,
    literals: Vec<Literal>,
    requirements: BTreeSet<Literal>,
}

impl Clause {
    pub fn new(kind: ClauseKind, literals: Vec<Literal>) -> Self {
        Self {
            kind,
            literals,
            requirements: BTreeSet::new(),
        }
    }

    pub fn kind(&self) -> &ClauseKind {
        &self.kind
    }

    pub fn literals(&self) -> &[Literal] {
        &self.literals
    }

    pub fn requirements(&self) -> &BTreeSet<Literal> {
        &self.requirements
    }

    pub fn weight(&self) -> Option<u64> {
        match self.kind {
            ClauseKind::Generic { bound: Bound::Weighted(w), .. } => Some(w),
            _ => None,
        }
    }

    pub fn at_most(&self) -> Option<usize> {
        match self.kind {
            ClauseKind::Generic { bound: Bound::AtMost(k), .. } => Some(k),
            _ => None,
        }
    }

    pub fn is_hard(&self) -> bool {
        self.weight().is_none() && self.at_most().is_none()
    }

    /// Void the clause unless every constraint literal is false
    pub fn constrain(&mut self, constraints: &[Literal]) {
        for constraint in constraints {
            self.literals.push(constraint.clone());
            self.requirements.insert(!constraint);
        }
    }

    /// Literals other than the constraint literals
    pub fn targets(&self) -> impl Iterator<Item = &Literal> {
        self.literals
            .iter()
            .filter(|l| !self.requirements.contains(&!*l))
    }

    /// Whether the clause is in effect under `model`
    pub fn is_active(&self, model: &Model) -> bool {
        self.requirements.iter().all(|r| model.contains(r))
    }

    /// Whether this clause, active under `model`, directly contradicts `other`.
    ///
    /// Dependencies conflict with blockers of an overlapping atom. Flag
    /// requirements conflict with each other when they ask for opposite
    /// states of the same flag of the same package.
    pub fn blocks(&self, model: &Model, other: &Clause) -> bool {
        if !self.is_active(model) {
            return false;
        }
        match &self.kind {
            ClauseKind::Dependency { dependency, .. } => matches!(
                &other.kind,
                ClauseKind::Blocker { blocked, .. } if dependency.intersects(blocked)
            ),
            ClauseKind::Blocker { blocked, .. } => matches!(
                &other.kind,
                ClauseKind::Dependency { dependency, .. } if blocked.intersects(dependency)
            ),
            ClauseKind::UseDependency { .. } | ClauseKind::RequiredUse { .. } => {
                match (self.flag_setting(), other.flag_setting()) {
                    (Some((a, x)), Some((b, y))) => a == b && x.name == y.name && x.enabled != y.enabled,
                    _ => false,
                }
            }
            ClauseKind::Generic { .. } => false,
        }
    }

    /// Whether, under `model`, this clause can only be satisfied by `literal`
    pub fn forces(&self, model: &Model, literal: &Literal) -> bool {
        self.literals.contains(literal)
            && self
                .literals
                .iter()
                .filter(|l| *l != literal)
                .all(|l| model.falsifies(l))
    }

    /// The package whose selection makes this clause relevant
    pub fn subject(&self) -> Option<&FQAtom> {
        match &self.kind {
            ClauseKind::Dependency { source, .. }
            | ClauseKind::Blocker { source, .. }
            | ClauseKind::Generic { source, .. } => match source {
                Source::Package(atom) => Some(atom),
                _ => None,
            },
            ClauseKind::UseDependency { source, target, .. } => match source {
                Source::Package(atom) => Some(atom),
                Source::Profile => Some(target),
                _ => None,
            },
            ClauseKind::RequiredUse { atom, .. } => Some(atom),
        }
    }

    fn flag_setting(&self) -> Option<(&FQAtom, FlagLiteral)> {
        match &self.kind {
            ClauseKind::UseDependency { target, flag, .. } => Some((target, flag.clone())),
            ClauseKind::RequiredUse { atom, flag, .. } => match flag.var() {
                Var::Flag(_, name) => Some((
                    atom,
                    FlagLiteral {
                        name: name.clone(),
                        enabled: flag.is_positive(),
                    },
                )),
                _ => None,
            },
            _ => None,
        }
    }
}

fn flag_text(flag: &FlagLiteral) -> String {
    if flag.enabled {
        flag.name.clone()
    } else {
        format!("-{}", flag.name)
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ClauseKind::Dependency { source, dependency } => {
                write!(f, "{}: required by {}", dependency, source)
            }
            ClauseKind::Blocker { source, blocked } => {
                write!(f, "{}: blocked by {}", blocked, source)
            }
            ClauseKind::UseDependency { source: Source::Profile, target, flag, .. } => {
                write!(f, "{}[{}]: forced by {}", target, flag_text(flag), Source::Profile)
            }
            ClauseKind::UseDependency { source, requested, flag, .. } => {
                write!(f, "{}[{}]: required by {}", requested, flag_text(flag), source)
            }
            ClauseKind::RequiredUse { atom, label, context, .. } => {
                write!(f, "{} could not satisfy {}", atom, label)?;
                if context != label {
                    write!(f, ", which is part of the larger clause {}", context)?;
                }
                Ok(())
            }
            ClauseKind::Generic { source, description, .. } => {
                write!(f, "{} - {}", source, description)
            }
        }
    }
}
