//! Explaining why a formula has no solution
//!
//! Hard clauses are replayed in order into an incremental solver. The first
//! clause that makes the prefix unsatisfiable is the failing clause; among
//! the clauses accepted before it, one that directly contradicts it is looked
//! up and both are explained: which flag settings switched them on, and the
//! chain of dependencies that pulled their package in.

use std::collections::BTreeSet;
use std::fmt;

use log::debug;
use serde::Serialize;

use depsat_atom::FQAtom;

use crate::error::{ResolveError, Result};

use super::clause::{Clause, ClauseKind};
use super::formula::Formula;
use super::literal::{Literal, LiteralTable, Model, Var};
use super::sat::IncrementalSat;

/// One side of a conflict
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Explanation {
    pub clause: String,
    /// Clauses that forced the flag settings this clause depends on
    pub enabled_by: Vec<String>,
    /// Dependency clauses that pulled the clause's package in, innermost first
    pub required_by: Vec<String>,
    /// Set when the dependency chain loops back on itself
    pub cycle: Option<String>,
}

impl fmt::Display for Explanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.clause)?;
        for cause in &self.enabled_by {
            write!(f, "\n  because {}", cause)?;
        }
        let mut indent = 2;
        for step in &self.required_by {
            write!(f, "\n{:indent$}{}", "", step, indent = indent)?;
            indent += 2;
        }
        if let Some(atom) = &self.cycle {
            write!(f, "\n{:indent$}... (cycle through {})", "", atom, indent = indent)?;
        }
        Ok(())
    }
}

/// The failing clause and, when one is found, the clause it contradicts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictReport {
    pub failing: Explanation,
    pub contradicting: Option<Explanation>,
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.failing)?;
        if let Some(contradicting) = &self.contradicting {
            write!(f, "\ncontradicts\n{}", contradicting)?;
        }
        Ok(())
    }
}

/// Find and explain the first hard clause that cannot be added
pub fn diagnose(formula: &Formula, table: &mut LiteralTable) -> Result<ConflictReport> {
    let mut sat = IncrementalSat::new();
    for clause in formula.clauses() {
        if let Some(k) = clause.at_most() {
            let ids: Vec<i32> = clause.literals().iter().map(|l| table.id(l)).collect();
            sat.add_at_most(&ids, k);
        }
    }

    let mut accepted: Vec<&Clause> = Vec::new();
    let mut model = Model::default();
    for clause in formula.clauses().iter().filter(|c| c.is_hard()) {
        let ids: Vec<i32> = clause.literals().iter().map(|l| table.id(l)).collect();
        sat.add_clause(&ids);
        if sat.solve()? {
            model = Model::from_assignment(&sat.model().unwrap_or_default(), table);
            accepted.push(clause);
            continue;
        }

        debug!("Clause {} is unsatisfiable after {} accepted clauses", clause, accepted.len());
        if accepted.is_empty() {
            return Err(ResolveError::internal(format!(
                "{} is unsatisfiable on its own",
                clause
            )));
        }
        return Ok(Diagnosis { accepted: &accepted, model: &model }.explain(clause));
    }

    Err(ResolveError::internal(
        "every hard clause was satisfiable during conflict diagnosis",
    ))
}

struct Diagnosis<'d, 'f> {
    accepted: &'d [&'f Clause],
    /// Last model of the accepted prefix
    model: &'d Model,
}

impl<'f> Diagnosis<'_, 'f> {
    fn explain(&self, failing: &Clause) -> ConflictReport {
        let focus: Vec<Literal> = failing.targets().cloned().collect();
        let contradicting = self
            .find_contradiction(failing)
            .map(|(clause, focus)| self.describe(clause, &focus));
        ConflictReport {
            failing: self.describe(failing, &focus),
            contradicting,
        }
    }

    /// An accepted clause that rules out the failing one, with the literals
    /// it forces
    fn find_contradiction(&self, failing: &Clause) -> Option<(&'f Clause, Vec<Literal>)> {
        let targets = |c: &Clause| c.targets().cloned().collect::<Vec<_>>();

        if let Some(clause) = self.accepted.iter().copied().find(|c| c.blocks(self.model, failing)) {
            return Some((clause, targets(clause)));
        }
        if let Some(clause) = self.version_conflict(failing) {
            return Some((clause, targets(clause)));
        }
        for target in failing.targets() {
            let negated = !target;
            if let Some(clause) = self.accepted.iter().copied().find(|c| c.forces(self.model, &negated)) {
                return Some((clause, vec![negated]));
            }
        }
        None
    }

    /// An active dependency that already selected another version of a
    /// package the failing dependency asks for
    fn version_conflict(&self, failing: &Clause) -> Option<&'f Clause> {
        if !matches!(failing.kind(), ClauseKind::Dependency { .. }) {
            return None;
        }
        let wanted: BTreeSet<FQAtom> = failing
            .targets()
            .filter_map(|l| match l.var() {
                Var::Package(atom) if l.is_positive() => Some(atom.clone()),
                _ => None,
            })
            .collect();
        let groups: BTreeSet<_> = wanted.iter().map(FQAtom::qualified).collect();

        self.accepted.iter().copied().find(|clause| {
            matches!(clause.kind(), ClauseKind::Dependency { .. })
                && clause.is_active(self.model)
                && clause.targets().any(|l| match l.var() {
                    Var::Package(atom) => {
                        l.is_positive()
                            && self.model.contains(l)
                            && groups.contains(&atom.qualified())
                            && !wanted.contains(atom)
                    }
                    _ => false,
                })
        })
    }

    fn describe(&self, clause: &Clause, focus: &[Literal]) -> Explanation {
        let mut enabled_by = Vec::new();
        for literal in clause.literals().iter().filter(|l| !focus.contains(l)) {
            let condition = !literal;
            if !matches!(condition.var(), Var::Flag(..)) || !self.model.contains(&condition) {
                continue;
            }
            let cause = self
                .accepted
                .iter()
                .copied()
                .find(|c| !std::ptr::eq(*c, clause) && c.forces(self.model, &condition));
            if let Some(cause) = cause {
                let text = cause.to_string();
                if !enabled_by.contains(&text) {
                    enabled_by.push(text);
                }
            }
        }

        let (required_by, cycle) = self.provenance(clause);
        Explanation {
            clause: clause.to_string(),
            enabled_by,
            required_by,
            cycle,
        }
    }

    /// Walk dependency clauses from the clause's package towards a root,
    /// stopping at the first package whose every parent was already visited.
    fn provenance(&self, clause: &Clause) -> (Vec<String>, Option<String>) {
        let mut chain = Vec::new();
        let mut visited = BTreeSet::new();
        let mut subject = clause.subject().cloned();

        while let Some(atom) = subject.take() {
            let mut parents = self.accepted.iter().enumerate().filter(|(_, c)| {
                matches!(c.kind(), ClauseKind::Dependency { dependency, .. } if dependency.matches(&atom))
                    && c.is_active(self.model)
            });
            let mut seen_any = false;
            let next = parents.find(|(index, _)| {
                seen_any = true;
                !visited.contains(index)
            });

            match next {
                Some((index, parent)) => {
                    visited.insert(index);
                    chain.push(parent.to_string());
                    subject = parent.subject().cloned();
                }
                None if seen_any => return (chain, Some(atom.to_string())),
                None => break,
            }
        }
        (chain, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::clause::{Bound, Source};
    use depsat_atom::Atom;

    fn fq(s: &str) -> FQAtom {
        FQAtom::parse(s).unwrap()
    }

    fn dependency(source: Source, dep: &str, candidates: &[&FQAtom], requirer: Option<&FQAtom>) -> Clause {
        let mut clause = Clause::new(
            ClauseKind::Dependency { source, dependency: Atom::parse(dep).unwrap() },
            candidates.iter().map(|a| Literal::package(a)).collect(),
        );
        if let Some(requirer) = requirer {
            clause.constrain(&[!Literal::package(requirer)]);
        }
        clause
    }

    #[test]
    fn test_blocker_against_dependency() {
        let a = fq("cat/a-1::main");
        let b = fq("cat/b-1::main");
        let mut formula = Formula::new();
        formula.push(dependency(Source::CommandLine, "cat/a", &[&a], None));
        formula.push(dependency(Source::Package(a.clone()), "cat/b", &[&b], Some(&a)));
        formula.append_blocker(vec![!Literal::package(&b)], Source::CommandLine, Atom::parse("cat/b").unwrap());

        let report = diagnose(&formula, &mut LiteralTable::new()).unwrap();
        assert_eq!(report.failing.clause, "cat/b: blocked by packages passed on the command line");
        let contradicting = report.contradicting.unwrap();
        assert_eq!(contradicting.clause, "cat/b: required by cat/a-1::main");
        assert_eq!(
            contradicting.required_by,
            vec!["cat/a: required by packages passed on the command line"]
        );
        assert_eq!(contradicting.cycle, None);
    }

    #[test]
    fn test_version_conflict() {
        let a = fq("cat/a-1::main");
        let c1 = fq("cat/c-1::main");
        let c2 = fq("cat/c-2::main");
        let mut formula = Formula::new();
        formula.append_at_most(
            vec![Literal::package(&c1), Literal::package(&c2)],
            1,
            Source::Invariant,
            "one version",
        );
        formula.push(dependency(Source::CommandLine, "cat/a", &[&a], None));
        formula.push(dependency(Source::Package(a.clone()), "=cat/c-1", &[&c1], Some(&a)));
        formula.push(dependency(Source::CommandLine, "=cat/c-2", &[&c2], None));

        let report = diagnose(&formula, &mut LiteralTable::new()).unwrap();
        assert_eq!(report.failing.clause, "=cat/c-2: required by packages passed on the command line");
        assert_eq!(
            report.contradicting.map(|c| c.clause),
            Some("=cat/c-1: required by cat/a-1::main".to_string())
        );
    }

    #[test]
    fn test_dependency_cycle_is_truncated() {
        let a = fq("cat/a-1::main");
        let b = fq("cat/b-1::main");
        let c = fq("cat/c-1::main");
        let mut formula = Formula::new();
        // a and b require each other; a pulls in c, which is blocked
        formula.push(dependency(Source::Package(b.clone()), "cat/a", &[&a], Some(&b)));
        formula.push(dependency(Source::Package(a.clone()), "cat/b", &[&b], Some(&a)));
        formula.append(vec![Literal::package(&a)], Source::Invariant, "a is needed");
        formula.push(dependency(Source::Package(a.clone()), "cat/c", &[&c], Some(&a)));
        formula.append_blocker(vec![!Literal::package(&c)], Source::CommandLine, Atom::parse("cat/c").unwrap());

        let report = diagnose(&formula, &mut LiteralTable::new()).unwrap();
        let contradicting = report.contradicting.unwrap();
        assert_eq!(contradicting.clause, "cat/c: required by cat/a-1::main");
        assert_eq!(
            contradicting.required_by,
            vec!["cat/a: required by cat/b-1::main", "cat/b: required by cat/a-1::main"]
        );
        assert_eq!(contradicting.cycle.as_deref(), Some("cat/a-1::main"));
        assert!(contradicting.to_string().contains("... (cycle through cat/a-1::main)"));
    }

    #[test]
    fn test_satisfiable_formula_is_an_internal_error() {
        let a = fq("cat/a-1::main");
        let mut formula = Formula::new();
        formula.push(dependency(Source::CommandLine, "cat/a", &[&a], None));
        formula.push(Clause::new(
            ClauseKind::Generic { source: Source::Invariant, description: "soft".into(), bound: Bound::Weighted(3) },
            vec![!Literal::package(&a)],
        ));
        assert!(matches!(
            diagnose(&formula, &mut LiteralTable::new()),
            Err(ResolveError::Internal(_))
        ));
    }

    #[test]
    fn test_report_display() {
        let report = ConflictReport {
            failing: Explanation {
                clause: "cat/p-1::main[a]: forced by the profile".into(),
                enabled_by: vec![],
                required_by: vec![],
                cycle: None,
            },
            contradicting: Some(Explanation {
                clause: "cat/p-1::main could not satisfy b".into(),
                enabled_by: vec!["cat/p-1::main[-b]: forced by the profile".into()],
                required_by: vec!["cat/p: required by the world file".into()],
                cycle: None,
            }),
        };
        assert_eq!(
            report.to_string(),
            "cat/p-1::main[a]: forced by the profile\n\
             contradicts\n\
             cat/p-1::main could not satisfy b\n  \
             because cat/p-1::main[-b]: forced by the profile\n  \
             cat/p: required by the world file"
        );
    }
}
