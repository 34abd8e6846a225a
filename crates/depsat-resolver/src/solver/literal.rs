use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;
use std::ops::Not;

use depsat_atom::FQAtom;

/// A boolean variable of the formula
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Var {
    /// "This package version is installed"
    Package(FQAtom),
    /// "This package version is built with the flag enabled"
    Flag(FQAtom, String),
    /// Indicator introduced while lowering groups; never part of the result
    Anon(u32),
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Var::Package(atom) => write!(f, "{}", atom),
            Var::Flag(atom, flag) => write!(f, "{}[{}]", atom, flag),
            Var::Anon(n) => write!(f, "__{}", n),
        }
    }
}

/// A variable or its negation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Literal {
    var: Var,
    positive: bool,
}

impl Literal {
    pub fn new(var: Var, positive: bool) -> Self {
        Self { var, positive }
    }

    pub fn positive(var: Var) -> Self {
        Self::new(var, true)
    }

    pub fn negative(var: Var) -> Self {
        Self::new(var, false)
    }

    pub fn package(atom: &FQAtom) -> Self {
        Self::positive(Var::Package(atom.clone()))
    }

    pub fn flag(atom: &FQAtom, flag: &str, enabled: bool) -> Self {
        Self::new(Var::Flag(atom.clone(), flag.to_string()), enabled)
    }

    pub fn var(&self) -> &Var {
        &self.var
    }

    pub fn is_positive(&self) -> bool {
        self.positive
    }
}

impl Not for Literal {
    type Output = Literal;

    fn not(self) -> Literal {
        Literal { var: self.var, positive: !self.positive }
    }
}

impl Not for &Literal {
    type Output = Literal;

    fn not(self) -> Literal {
        Literal { var: self.var.clone(), positive: !self.positive }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.positive {
            f.write_str("-")?;
        }
        write!(f, "{}", self.var)
    }
}

/// Numeric ids for literals, assigned in order of first use.
///
/// A variable gets id `n > 0`; its positive literal maps to `n` and its
/// negation to `-n`. Ids are stable for the lifetime of the table.
#[derive(Debug, Default)]
pub struct LiteralTable {
    ids: HashMap<Var, i32>,
    vars: Vec<Var>,
}

impl LiteralTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&mut self, literal: &Literal) -> i32 {
        let id = self.var_id(literal.var());
        if literal.is_positive() {
            id
        } else {
            -id
        }
    }

    pub fn var_id(&mut self, var: &Var) -> i32 {
        if let Some(&id) = self.ids.get(var) {
            return id;
        }
        self.vars.push(var.clone());
        let id = self.vars.len() as i32;
        self.ids.insert(var.clone(), id);
        id
    }

    pub fn literal(&self, id: i32) -> Option<Literal> {
        if id == 0 {
            return None;
        }
        let var = self.vars.get(id.unsigned_abs() as usize - 1)?;
        Some(Literal::new(var.clone(), id > 0))
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// A total assignment, as the set of literals that hold
#[derive(Debug, Clone, Default)]
pub struct Model {
    literals: HashSet<Literal>,
}

impl Model {
    /// Build from signed variable ids, as reported by a solver
    pub fn from_assignment(assignment: &[i32], table: &LiteralTable) -> Self {
        let literals = assignment
            .iter()
            .filter_map(|&id| table.literal(id))
            .collect();
        Self { literals }
    }

    pub fn contains(&self, literal: &Literal) -> bool {
        self.literals.contains(literal)
    }

    /// Whether the literal is known to be false
    pub fn falsifies(&self, literal: &Literal) -> bool {
        self.literals.contains(&!literal)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Literal> {
        self.literals.iter()
    }

    pub fn len(&self) -> usize {
        self.literals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }
}

impl FromIterator<Literal> for Model {
    fn from_iter<I: IntoIterator<Item = Literal>>(iter: I) -> Self {
        Self { literals: iter.into_iter().collect() }
    }
}
