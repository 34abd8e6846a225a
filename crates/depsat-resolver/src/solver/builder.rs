//! Lowering of selections, dependency strings and flag constraints into clauses

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, trace, warn};

use depsat_atom::expr::{expand_use_conditionals, render};
use depsat_atom::{
    parse_dependencies, parse_required_use, Atom, DepAtom, DepExpr, Expr, FQAtom, FlagLiteral,
    QualifiedAtom, UseExpr,
};

use crate::error::{ResolveError, Result};
use crate::universe::{parse_flag_setting, Environment, PackageRecord};

use super::clause::{Clause, ClauseKind, Source};
use super::context::ResolutionContext;
use super::formula::{at_most_one, Formula};
use super::literal::Literal;
use super::request::Request;

/// Result of expanding a request into hard clauses
#[derive(Debug)]
pub struct BuildOutput {
    pub formula: Formula,
    /// Every package record whose expressions were lowered
    pub processed: BTreeSet<FQAtom>,
    /// Package groups selected by this request
    pub new_selected: BTreeSet<QualifiedAtom>,
}

/// A starting point of the expansion: a selected atom and its candidates
struct Root {
    atom: Atom,
    records: Vec<Arc<PackageRecord>>,
    source: Source,
}

pub struct FormulaBuilder<'e, 'c> {
    env: Environment<'e>,
    ctx: &'c mut ResolutionContext,
    processed: BTreeSet<FQAtom>,
}

impl<'e, 'c> FormulaBuilder<'e, 'c> {
    pub fn new(env: Environment<'e>, ctx: &'c mut ResolutionContext) -> Self {
        Self {
            env,
            ctx,
            processed: BTreeSet::new(),
        }
    }

    /// Expand the request, the world set and the installed packages into
    /// the transitive closure of their hard constraints.
    pub fn build(mut self, request: &Request) -> Result<BuildOutput> {
        let start = Instant::now();

        for atom in request.selected.iter().chain(&request.deselected) {
            if self.env.universe.candidates(&atom.strip_use()).is_empty() {
                return Err(ResolveError::package_does_not_exist(atom));
            }
        }

        let mut formula = Formula::new();

        let mut deselected_groups = BTreeSet::new();
        for atom in &request.deselected {
            for record in self.env.universe.candidates(&atom.strip_use()) {
                deselected_groups.insert(record.atom.qualified());
                formula.append_blocker(
                    vec![!Literal::package(&record.atom)],
                    Source::CommandLine,
                    atom.clone(),
                );
            }
        }

        let mut roots = Vec::new();
        let mut new_selected = BTreeSet::new();
        for atom in &request.selected {
            let (name, records) = self.group_candidates(atom)?;
            if deselected_groups.contains(&name) {
                continue;
            }
            new_selected.insert(name);
            roots.push(Root {
                atom: atom.clone(),
                records,
                source: Source::CommandLine,
            });
        }

        for atom in self.env.selection.world() {
            let (name, records) = match self.group_candidates(&atom) {
                Ok(found) => found,
                Err(ResolveError::PackageDoesNotExist { .. }) => {
                    return Err(ResolveError::WorldPackageDoesNotExist { atom: atom.to_string() });
                }
                Err(e) => return Err(e),
            };
            if deselected_groups.contains(&name) {
                warn!("World entry {} is deselected and will not be kept", atom);
                continue;
            }
            // the command line takes precedence over the world set
            if new_selected.contains(&name) {
                continue;
            }
            roots.push(Root {
                atom,
                records,
                source: Source::World,
            });
        }

        let mut queue: VecDeque<Arc<PackageRecord>> = VecDeque::new();
        for root in &roots {
            self.lower_root(root, &mut formula);
            queue.extend(root.records.iter().cloned());
        }
        queue.extend(self.env.universe.all_installed());

        while let Some(record) = queue.pop_front() {
            if !self.processed.insert(record.atom.clone()) {
                continue;
            }
            let (package_formula, deps) = self.lower_record(&record)?;
            formula.merge(package_formula);
            self.apply_forced_flags(&record, &mut formula);

            for atom in deps {
                if self.processed.contains(&atom) {
                    continue;
                }
                let dep = self.env.universe.record(&atom).ok_or_else(|| {
                    ResolveError::internal(format!("candidate {} has no package record", atom))
                })?;
                queue.push_back(dep);
            }
        }

        let groups: Vec<Vec<Literal>> = formula
            .atoms()
            .values()
            .filter(|atoms| atoms.len() > 1)
            .map(|atoms| atoms.iter().map(Literal::package).collect())
            .collect();
        for literals in groups {
            formula.append_at_most(
                literals,
                1,
                Source::Invariant,
                "At most one version of a package may be installed",
            );
        }

        debug!(
            "Built formula with {} clauses over {} package groups from {} packages in {:?}",
            formula.len(),
            formula.atoms().len(),
            self.processed.len(),
            start.elapsed()
        );

        Ok(BuildOutput {
            formula,
            processed: self.processed,
            new_selected,
        })
    }

    /// Candidates of a user-level atom, which must all belong to one group
    fn group_candidates(&self, atom: &Atom) -> Result<(QualifiedAtom, Vec<Arc<PackageRecord>>)> {
        let records = self.env.universe.candidates(&atom.strip_use());
        let Some(first) = records.first() else {
            return Err(ResolveError::package_does_not_exist(atom));
        };
        let name = first.atom.qualified();
        if records.iter().any(|r| r.atom.qualified() != name) {
            let mut candidates: Vec<String> = records.iter().map(|r| r.atom.to_string()).collect();
            candidates.sort();
            return Err(ResolveError::AmbiguousAtom {
                atom: atom.to_string(),
                candidates,
            });
        }
        Ok((name, records))
    }

    fn lower_root(&self, root: &Root, formula: &mut Formula) {
        let literals = root.records.iter().map(|r| Literal::package(&r.atom)).collect();
        formula.append_dependency(literals, root.source.clone(), root.atom.strip_use());

        // conditional use deps have no depending package to refer to here
        for dep in &root.atom.use_deps {
            let Some(enabled) = dep.required_state() else {
                continue;
            };
            for record in &root.records {
                let mut clause = Clause::new(
                    ClauseKind::UseDependency {
                        source: root.source.clone(),
                        target: record.atom.clone(),
                        requested: root.atom.strip_use(),
                        flag: FlagLiteral { name: dep.flag.clone(), enabled },
                    },
                    vec![Literal::flag(&record.atom, &dep.flag, enabled)],
                );
                clause.constrain(&[!Literal::package(&record.atom)]);
                formula.push(clause);
            }
        }
    }

    /// Lower both expressions of a record; every resulting clause is void
    /// unless the record itself is selected.
    fn lower_record(&mut self, record: &PackageRecord) -> Result<(Formula, BTreeSet<FQAtom>)> {
        trace!("Lowering {}", record.atom);
        let invalid = |source| ResolveError::InvalidDependency {
            package: record.atom.to_string(),
            source,
        };

        let dependencies = parse_dependencies(&record.dependency_string()).map_err(invalid)?;
        let dependencies = expand_use_conditionals(&dependencies);
        let required_use = parse_required_use(&record.required_use).map_err(invalid)?;

        let mut deps = BTreeSet::new();
        let mut formula = self.lower_dependencies(record, &dependencies, false, &mut deps)?;
        formula.merge(self.lower_required_use(record, &required_use));
        formula.add_constraints(&[!Literal::package(&record.atom)]);
        Ok((formula, deps))
    }

    fn lower_dependencies(
        &mut self,
        record: &PackageRecord,
        nodes: &[DepExpr],
        in_any_of: bool,
        deps: &mut BTreeSet<FQAtom>,
    ) -> Result<Formula> {
        let mut formula = Formula::new();
        for node in nodes {
            match node {
                Expr::Leaf(leaf) => self.lower_dep_atom(record, leaf, in_any_of, &mut formula, deps)?,
                Expr::AllOf(children) => {
                    formula.merge(self.lower_dependencies(record, children, in_any_of, deps)?);
                }
                Expr::AnyOf(children) => {
                    let description = node.to_string();
                    let mut indicators = Vec::with_capacity(children.len());
                    for child in children {
                        let indicator = Literal::positive(self.ctx.fresh(format_args!("branch of {}", description)));
                        let mut branch =
                            self.lower_dependencies(record, std::slice::from_ref(child), true, deps)?;
                        branch.add_constraints(&[!&indicator]);
                        formula.merge(branch);
                        indicators.push(indicator);
                    }
                    formula.append(indicators, Source::Package(record.atom.clone()), description);
                }
                Expr::Conditional { flag, negated, body } => {
                    let mut inner = self.lower_dependencies(record, body, in_any_of, deps)?;
                    // `flag?` is void while the flag is off, `!flag?` while it is on
                    inner.add_constraints(&[Literal::flag(&record.atom, flag, *negated)]);
                    formula.merge(inner);
                }
                Expr::ExactlyOne(_) | Expr::AtMostOne(_) => {
                    return Err(ResolveError::internal(format!(
                        "cardinality group in the dependencies of {}",
                        record.atom
                    )));
                }
            }
        }
        Ok(formula)
    }

    fn lower_dep_atom(
        &mut self,
        record: &PackageRecord,
        leaf: &DepAtom,
        in_any_of: bool,
        formula: &mut Formula,
        deps: &mut BTreeSet<FQAtom>,
    ) -> Result<()> {
        let atom = leaf.atom();
        let source = Source::Package(record.atom.clone());
        let candidates = self.env.universe.candidates(&atom.strip_use());

        if candidates.is_empty() {
            if leaf.is_blocker() {
                return Ok(());
            }
            if in_any_of {
                // an empty clause: the enclosing branch cannot be chosen
                formula.append_dependency(Vec::new(), source, atom.strip_use());
                return Ok(());
            }
            return Err(ResolveError::PackageDoesNotExist {
                atom: atom.to_string(),
                required_by: Some(record.atom.to_string()),
            });
        }

        deps.extend(candidates.iter().map(|c| c.atom.clone()));
        let literals: Vec<Literal> = candidates.iter().map(|c| Literal::package(&c.atom)).collect();

        match leaf {
            DepAtom::Require(_) => formula.append_dependency(literals, source.clone(), atom.strip_use()),
            // a blocker with use deps only forbids the listed flag states
            DepAtom::Block(_) if atom.use_deps.is_empty() => {
                for literal in &literals {
                    formula.append_blocker(vec![!literal], source.clone(), atom.clone());
                }
            }
            DepAtom::Block(_) => {}
        }

        for dep in &atom.use_deps {
            let Some(required) = dep.required_state() else {
                continue;
            };
            let enabled = required != leaf.is_blocker();
            for candidate in &candidates {
                let mut clause = Clause::new(
                    ClauseKind::UseDependency {
                        source: source.clone(),
                        target: candidate.atom.clone(),
                        requested: atom.strip_use(),
                        flag: FlagLiteral { name: dep.flag.clone(), enabled },
                    },
                    vec![Literal::flag(&candidate.atom, &dep.flag, enabled)],
                );
                clause.constrain(&[!Literal::package(&candidate.atom)]);
                formula.push(clause);
            }
        }
        Ok(())
    }

    fn lower_required_use(&mut self, record: &PackageRecord, nodes: &[UseExpr]) -> Formula {
        let mut formula = Formula::new();
        let context = render(nodes);
        for node in nodes {
            let literal = self.lower_use_node(record, node, &mut formula);
            formula.append_required_use(
                vec![literal.clone()],
                record.atom.clone(),
                literal,
                node.to_string(),
                context.clone(),
            );
        }
        formula
    }

    /// Lower one node, returning a literal that implies the node holds.
    ///
    /// Flags stand for themselves. Groups get an indicator `g` and clauses
    /// enforcing the group whenever `g` is true.
    fn lower_use_node(&mut self, record: &PackageRecord, node: &UseExpr, formula: &mut Formula) -> Literal {
        if let Expr::Leaf(flag) = node {
            return Literal::flag(&record.atom, &flag.name, flag.enabled);
        }

        let description = node.to_string();
        let indicator = Literal::positive(self.ctx.fresh(&description));
        let source = Source::Package(record.atom.clone());

        match node {
            Expr::Leaf(_) => {}
            Expr::AllOf(children) => {
                for child in children {
                    self.require_under(record, child, &[!&indicator], &description, formula);
                }
            }
            Expr::Conditional { flag, negated, body } => {
                let condition = Literal::flag(&record.atom, flag, *negated);
                for child in body {
                    self.require_under(record, child, &[!&indicator, condition.clone()], &description, formula);
                }
            }
            Expr::AnyOf(children) | Expr::ExactlyOne(children) | Expr::AtMostOne(children) => {
                let members: Vec<Literal> = children
                    .iter()
                    .map(|child| self.lower_use_node(record, child, formula))
                    .collect();

                if matches!(node, Expr::AnyOf(_) | Expr::ExactlyOne(_)) {
                    let mut literals = vec![!&indicator];
                    literals.extend(members.iter().cloned());
                    formula.append(literals, source.clone(), description.clone());
                }
                if matches!(node, Expr::AtMostOne(_) | Expr::ExactlyOne(_)) {
                    for pair in at_most_one(&members) {
                        let mut literals = vec![!&indicator];
                        literals.extend(pair);
                        formula.append(literals, source.clone(), description.clone());
                    }
                }
            }
        }
        indicator
    }

    /// Require `child` whenever every constraint literal is false
    fn require_under(
        &mut self,
        record: &PackageRecord,
        child: &UseExpr,
        constraints: &[Literal],
        context: &str,
        formula: &mut Formula,
    ) {
        let literal = self.lower_use_node(record, child, formula);
        let mut clause = Clause::new(
            ClauseKind::RequiredUse {
                atom: record.atom.clone(),
                flag: literal.clone(),
                label: child.to_string(),
                context: context.to_string(),
            },
            vec![literal],
        );
        clause.constrain(constraints);
        formula.push(clause);
    }

    fn apply_forced_flags(&self, record: &PackageRecord, formula: &mut Formula) {
        for setting in self.env.flags.forced_flags(&record.atom) {
            let (name, enabled) = parse_flag_setting(&setting);
            formula.append_use_dependency(
                vec![Literal::flag(&record.atom, name, enabled)],
                Source::Profile,
                record.atom.clone(),
                Atom::exact(&record.atom),
                FlagLiteral { name: name.to_string(), enabled },
            );
        }
    }
}
