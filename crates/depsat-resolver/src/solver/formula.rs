use indexmap::{IndexMap, IndexSet};

use depsat_atom::{Atom, FQAtom, FlagLiteral, QualifiedAtom};

use super::clause::{Bound, Clause, ClauseKind, Source, Tier};
use super::literal::{Literal, Var};

/// An ordered collection of clauses plus indices over the variables they use.
///
/// Clause order is preserved: the diagnoser replays clauses in the order
/// they were appended.
#[derive(Debug, Clone, Default)]
pub struct Formula {
    clauses: Vec<Clause>,
    /// Package group -> every specific version referenced
    atoms: IndexMap<QualifiedAtom, IndexSet<FQAtom>>,
    /// Every flag variable referenced
    flags: IndexSet<Var>,
}

impl Formula {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, clause: Clause) {
        Self::index(&mut self.atoms, &mut self.flags, clause.literals());
        self.clauses.push(clause);
    }

    fn index<'a>(
        atoms: &mut IndexMap<QualifiedAtom, IndexSet<FQAtom>>,
        flags: &mut IndexSet<Var>,
        literals: impl IntoIterator<Item = &'a Literal>,
    ) {
        for literal in literals {
            match literal.var() {
                Var::Package(atom) => {
                    atoms
                        .entry(atom.qualified())
                        .or_default()
                        .insert(atom.clone());
                }
                var @ Var::Flag(..) => {
                    flags.insert(var.clone());
                }
                Var::Anon(_) => {}
            }
        }
    }

    pub fn append_dependency(&mut self, literals: Vec<Literal>, source: Source, dependency: Atom) {
        self.push(Clause::new(ClauseKind::Dependency { source, dependency }, literals));
    }

    pub fn append_blocker(&mut self, literals: Vec<Literal>, source: Source, blocked: Atom) {
        self.push(Clause::new(ClauseKind::Blocker { source, blocked }, literals));
    }

    pub fn append_use_dependency(
        &mut self,
        literals: Vec<Literal>,
        source: Source,
        target: FQAtom,
        requested: Atom,
        flag: FlagLiteral,
    ) {
        self.push(Clause::new(
            ClauseKind::UseDependency { source, target, requested, flag },
            literals,
        ));
    }

    pub fn append_required_use(
        &mut self,
        literals: Vec<Literal>,
        atom: FQAtom,
        flag: Literal,
        label: String,
        context: String,
    ) {
        self.push(Clause::new(
            ClauseKind::RequiredUse { atom, flag, label, context },
            literals,
        ));
    }

    /// Append a hard clause
    pub fn append(&mut self, literals: Vec<Literal>, source: Source, description: impl Into<String>) {
        self.push(Clause::new(
            ClauseKind::Generic {
                source,
                description: description.into(),
                bound: Bound::Hard,
            },
            literals,
        ));
    }

    pub fn append_weighted(
        &mut self,
        literals: Vec<Literal>,
        tier: Tier,
        description: impl Into<String>,
        weight: u64,
    ) {
        self.push(Clause::new(
            ClauseKind::Generic {
                source: Source::Preference(tier),
                description: description.into(),
                bound: Bound::Weighted(weight),
            },
            literals,
        ));
    }

    pub fn append_at_most(
        &mut self,
        literals: Vec<Literal>,
        k: usize,
        source: Source,
        description: impl Into<String>,
    ) {
        self.push(Clause::new(
            ClauseKind::Generic {
                source,
                description: description.into(),
                bound: Bound::AtMost(k),
            },
            literals,
        ));
    }

    pub fn merge(&mut self, other: Formula) {
        for (name, atoms) in other.atoms {
            self.atoms.entry(name).or_default().extend(atoms);
        }
        self.flags.extend(other.flags);
        self.clauses.extend(other.clauses);
    }

    /// Void every clause unless all of `constraints` are false.
    ///
    /// Cardinality clauses are left alone: adding literals to them would
    /// change what they count.
    pub fn add_constraints(&mut self, constraints: &[Literal]) {
        let mut constrained = false;
        for clause in &mut self.clauses {
            if clause.at_most().is_none() {
                clause.constrain(constraints);
                constrained = true;
            }
        }
        if constrained {
            Self::index(&mut self.atoms, &mut self.flags, constraints);
        }
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn atoms(&self) -> &IndexMap<QualifiedAtom, IndexSet<FQAtom>> {
        &self.atoms
    }

    pub fn flags(&self) -> &IndexSet<Var> {
        &self.flags
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

/// Pairwise "at most one" encoding: one clause `[-a, -b]` per pair.
///
/// The first literal is paired with each remaining literal, then the rest
/// are handled the same way, giving n(n-1)/2 clauses.
pub fn at_most_one(literals: &[Literal]) -> Vec<Vec<Literal>> {
    match literals.split_first() {
        None => Vec::new(),
        Some((first, rest)) => {
            let mut clauses: Vec<Vec<Literal>> = rest
                .iter()
                .map(|other| vec![!first, !other])
                .collect();
            clauses.extend(at_most_one(rest));
            clauses
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fq(s: &str) -> FQAtom {
        FQAtom::parse(s).unwrap()
    }

    #[test]
    fn test_push_indexes_atoms_and_flags() {
        let a1 = fq("cat/a-1::main");
        let a2 = fq("cat/a-2::main");
        let mut formula = Formula::new();
        formula.append(
            vec![Literal::package(&a1), !Literal::package(&a2), Literal::flag(&a1, "x", true)],
            Source::Invariant,
            "test",
        );
        formula.append(vec![Literal::positive(Var::Anon(0))], Source::Invariant, "anon");

        let group = formula.atoms().get(&a1.qualified()).unwrap();
        assert_eq!(group.len(), 2);
        assert_eq!(formula.flags().len(), 1);
        assert_eq!(formula.len(), 2);
    }

    #[test]
    fn test_add_constraints_skips_cardinality() {
        let a1 = fq("cat/a-1::main");
        let a2 = fq("cat/a-2::main");
        let p = Literal::package(&fq("cat/p-1::main"));
        let mut formula = Formula::new();
        formula.append(vec![Literal::package(&a1)], Source::Invariant, "hard");
        formula.append_at_most(
            vec![Literal::package(&a1), Literal::package(&a2)],
            1,
            Source::Invariant,
            "one version",
        );
        formula.add_constraints(&[!&p]);

        assert_eq!(formula.clauses()[0].literals().len(), 2);
        assert!(formula.clauses()[0].requirements().contains(&p));
        assert_eq!(formula.clauses()[1].literals().len(), 2);
        assert!(formula.clauses()[1].requirements().is_empty());
    }

    #[test]
    fn test_add_constraints_indexes_constraints() {
        let installed = fq("cat/p-1::installed");
        let owner = fq("cat/a-1::main");
        let mut formula = Formula::new();
        formula.append(vec![Literal::package(&fq("cat/x-1::main"))], Source::Invariant, "dep");
        formula.add_constraints(&[!Literal::package(&installed), !Literal::flag(&owner, "ssl", true)]);

        let group = formula.atoms().get(&installed.qualified()).unwrap();
        assert!(group.contains(&installed));
        assert!(formula.flags().contains(Literal::flag(&owner, "ssl", true).var()));

        // nothing to constrain, nothing to index
        let mut empty = Formula::new();
        empty.add_constraints(&[!Literal::package(&installed)]);
        assert!(empty.atoms().is_empty());
    }

    #[test]
    fn test_merge_unions_indices() {
        let mut first = Formula::new();
        first.append(vec![Literal::package(&fq("cat/a-1::main"))], Source::Invariant, "a");
        let mut second = Formula::new();
        second.append(vec![Literal::package(&fq("cat/a-2::main"))], Source::Invariant, "a");
        second.append(vec![Literal::package(&fq("cat/b-1::main"))], Source::Invariant, "b");

        first.merge(second);
        assert_eq!(first.len(), 3);
        assert_eq!(first.atoms().len(), 2);
        assert_eq!(first.atoms().get_index(0).map(|(_, atoms)| atoms.len()), Some(2));
    }

    #[test]
    fn test_at_most_one_clause_count() {
        for n in 0..8 {
            let literals: Vec<Literal> = (0..n).map(|i| Literal::positive(Var::Anon(i))).collect();
            assert_eq!(at_most_one(&literals).len(), (n * n.saturating_sub(1) / 2) as usize);
        }
    }

    #[test]
    fn test_at_most_one_rejects_two_true() {
        let literals: Vec<Literal> = (0..4).map(|i| Literal::positive(Var::Anon(i))).collect();
        let clauses = at_most_one(&literals);

        let satisfied = |assignment: &[bool]| {
            clauses.iter().all(|clause| {
                clause.iter().any(|lit| match lit.var() {
                    Var::Anon(i) => assignment[*i as usize] == lit.is_positive(),
                    _ => false,
                })
            })
        };

        for mask in 0u32..16 {
            let assignment: Vec<bool> = (0..4).map(|i| mask & (1 << i) != 0).collect();
            assert_eq!(satisfied(&assignment), mask.count_ones() <= 1, "mask {mask:04b}");
        }
    }
}
