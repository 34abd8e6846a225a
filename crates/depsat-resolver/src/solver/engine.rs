//! Weighted MAX-SAT over the numeric form of a formula
//!
//! The default engine optimizes lexicographically. Soft clauses are split
//! into strata so that every weight in a stratum exceeds the combined weight
//! of all lighter strata; the tier floors make each tier at least one
//! stratum. Strata are minimized from the heaviest down by SAT-UNSAT linear
//! search over a generalized totalizer, and each optimum is fixed before the
//! next stratum is searched.

use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, trace};
use rustsat::encodings::pb::{BoundUpper, BoundUpperIncremental, GeneralizedTotalizer};
use rustsat::instances::{BasicVarManager, Cnf, ManageVars};
use rustsat::solvers::{Solve, SolveIncremental, SolverResult};
use rustsat::types::{Clause, Lit, TernaryVal, Var};
use rustsat_batsat::BasicSolver;

use crate::error::{ResolveError, Result};

use super::formula::Formula;
use super::literal::LiteralTable;

/// Numeric clauses ready for an engine.
///
/// Variables are numbered `1..=num_vars`; literals are signed ids.
#[derive(Debug, Clone, Default)]
pub struct WeightedCnf {
    pub num_vars: usize,
    pub hard: Vec<Vec<i32>>,
    pub at_most: Vec<(Vec<i32>, usize)>,
    pub soft: Vec<(Vec<i32>, u64)>,
}

impl WeightedCnf {
    pub fn from_formula(formula: &Formula, table: &mut LiteralTable) -> Self {
        let mut cnf = WeightedCnf::default();
        for clause in formula.clauses() {
            let ids: Vec<i32> = clause.literals().iter().map(|l| table.id(l)).collect();
            if let Some(k) = clause.at_most() {
                let mut ids = ids;
                ids.sort_unstable();
                ids.dedup();
                cnf.at_most.push((ids, k));
                continue;
            }
            // tautologies constrain nothing
            let Some(ids) = normalize(ids) else {
                continue;
            };
            match clause.weight() {
                Some(weight) => cnf.soft.push((ids, weight)),
                None => cnf.hard.push(ids),
            }
        }
        cnf.num_vars = table.len();
        cnf
    }

    /// Total weight of the soft clauses an assignment falsifies
    pub fn cost(&self, assignment: &[i32]) -> u64 {
        let values = values_of(assignment, self.num_vars);
        self.soft
            .iter()
            .filter(|(lits, _)| !lits.iter().any(|&l| holds(&values, l)))
            .map(|(_, weight)| weight)
            .sum()
    }

    /// Whether an assignment satisfies every hard and cardinality constraint
    pub fn is_feasible(&self, assignment: &[i32]) -> bool {
        let values = values_of(assignment, self.num_vars);
        self.hard.iter().all(|lits| lits.iter().any(|&l| holds(&values, l)))
            && self
                .at_most
                .iter()
                .all(|(lits, k)| lits.iter().filter(|&&l| holds(&values, l)).count() <= *k)
    }
}

/// Sort and dedup a clause, or `None` if it contains both polarities of a variable
fn normalize(mut ids: Vec<i32>) -> Option<Vec<i32>> {
    ids.sort_unstable();
    ids.dedup();
    if ids.iter().any(|&l| l > 0 && ids.binary_search(&-l).is_ok()) {
        return None;
    }
    Some(ids)
}

fn values_of(assignment: &[i32], num_vars: usize) -> Vec<bool> {
    let mut values = vec![false; num_vars + 1];
    for &lit in assignment {
        let var = lit.unsigned_abs() as usize;
        if var <= num_vars {
            values[var] = lit > 0;
        }
    }
    values
}

fn holds(values: &[bool], lit: i32) -> bool {
    values[lit.unsigned_abs() as usize] == (lit > 0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// An optimal assignment, one signed id per variable
    Optimal(Vec<i32>),
    Unsatisfiable,
    /// The search was stopped before it could prove optimality
    Cancelled,
}

/// A weighted MAX-SAT engine.
///
/// The built-in engine minimizes lexicographically by weight strata, see
/// [`StratifiedSearch`]; other engines may minimize the plain total.
pub trait MaxSatEngine {
    fn solve(&self, cnf: &WeightedCnf, cancel: &CancelToken) -> Result<Outcome>;
}

/// Cooperative cancellation, by request or by deadline
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().deadline_after(timeout)
    }

    /// A token sharing this one's flag, that also expires after `timeout`
    pub fn deadline_after(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        Self {
            cancelled: Arc::clone(&self.cancelled),
            deadline: Some(self.deadline.map_or(deadline, |d| d.min(deadline))),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Lexicographic MAX-SAT on top of an incremental SAT solver.
///
/// A cheaper heavier stratum always wins, even when the lighter strata
/// then cost more than the difference. The cancel token is polled between SAT calls; a single call is not
/// interrupted.
#[derive(Debug, Clone, Copy, Default)]
pub struct StratifiedSearch;

impl MaxSatEngine for StratifiedSearch {
    fn solve(&self, cnf: &WeightedCnf, cancel: &CancelToken) -> Result<Outcome> {
        let start = Instant::now();

        let mut search = Search::new(cnf, cancel)?;
        if !search.check(&[])? {
            return Ok(Outcome::Unsatisfiable);
        }
        if cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }

        let strata = strata(&cnf.soft);
        debug!(
            "Initial assignment costs {} over {} strata",
            cnf.cost(&search.best),
            strata.len()
        );
        for stratum in &strata {
            if !search.minimize(stratum)? {
                return Ok(Outcome::Cancelled);
            }
        }

        debug!(
            "Optimal cost {} after {} SAT calls in {:?}",
            cnf.cost(&search.best),
            search.calls,
            start.elapsed()
        );
        Ok(Outcome::Optimal(search.best))
    }
}

/// Soft clause indices grouped into strata, heaviest first.
///
/// A weight starts a new stratum when it exceeds the total weight of every
/// lighter clause; otherwise it joins the stratum below it. Zero weights
/// are dropped.
fn strata(soft: &[(Vec<i32>, u64)]) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..soft.len()).filter(|&i| soft[i].1 > 0).collect();
    order.sort_by_key(|&i| soft[i].1);

    let mut strata: Vec<Vec<usize>> = Vec::new();
    let mut lighter = 0u64;
    for group in order.chunk_by(|&a, &b| soft[a].1 == soft[b].1) {
        let weight = soft[group[0]].1;
        match strata.last_mut() {
            Some(current) if weight <= lighter => current.extend_from_slice(group),
            _ => strata.push(group.to_vec()),
        }
        lighter = lighter.saturating_add(weight.saturating_mul(group.len() as u64));
    }
    strata.reverse();
    strata
}

fn solver_error(e: impl std::fmt::Display) -> ResolveError {
    ResolveError::Solver(e.to_string())
}

fn lit(id: i32) -> Result<Lit> {
    Lit::from_ipasir(id).map_err(solver_error)
}

fn clause(ids: &[i32]) -> Result<Clause> {
    ids.iter().map(|&id| lit(id)).collect()
}

fn width(weight: u64) -> usize {
    usize::try_from(weight).unwrap_or(usize::MAX)
}

struct Search<'a> {
    cnf: &'a WeightedCnf,
    cancel: &'a CancelToken,
    solver: BasicSolver,
    vars: BasicVarManager,
    /// Per soft clause, a literal that is true whenever the clause is falsified
    violated: Vec<Lit>,
    best: Vec<i32>,
    calls: usize,
}

impl<'a> Search<'a> {
    fn new(cnf: &'a WeightedCnf, cancel: &'a CancelToken) -> Result<Self> {
        let num_vars = u32::try_from(cnf.num_vars).map_err(solver_error)?;
        let mut search = Self {
            cnf,
            cancel,
            solver: BasicSolver::default(),
            vars: BasicVarManager::from_next_free(Var::new(num_vars)),
            violated: Vec::with_capacity(cnf.soft.len()),
            best: Vec::new(),
            calls: 0,
        };

        let mut mentioned = vec![false; cnf.num_vars + 1];
        let mut mention = |ids: &[i32]| {
            for &id in ids {
                mentioned[id.unsigned_abs() as usize] = true;
            }
        };

        for ids in &cnf.hard {
            mention(ids.as_slice());
            search.add(clause(ids)?)?;
        }
        for (ids, k) in &cnf.at_most {
            mention(ids.as_slice());
            search.add_at_most(ids, *k)?;
        }
        for (ids, _) in &cnf.soft {
            let violated = match ids.as_slice() {
                [id] => !lit(*id)?,
                _ => {
                    mention(ids.as_slice());
                    let relax = search.vars.new_var().pos_lit();
                    let mut relaxed = ids.iter().map(|&id| lit(id)).collect::<Result<Vec<Lit>>>()?;
                    relaxed.push(relax);
                    search.add(relaxed.into_iter().collect())?;
                    relax
                }
            };
            search.violated.push(violated);
        }

        // variables the solver has not seen yet still need a value in every model
        let unseen: Vec<i32> = (1..=cnf.num_vars)
            .filter(|&v| !mentioned[v])
            .map(|v| v as i32)
            .collect();
        if !unseen.is_empty() {
            let anchor = search.vars.new_var().pos_lit();
            search.solver.add_unit(anchor).map_err(solver_error)?;
            for id in unseen {
                search.add([anchor, lit(id)?].into_iter().collect())?;
            }
        }
        Ok(search)
    }

    fn add(&mut self, clause: Clause) -> Result<()> {
        self.solver.add_clause(clause).map_err(solver_error)
    }

    fn add_units(&mut self, units: Vec<Lit>) -> Result<()> {
        for unit in units {
            self.solver.add_unit(unit).map_err(solver_error)?;
        }
        Ok(())
    }

    fn add_at_most(&mut self, ids: &[i32], k: usize) -> Result<()> {
        if ids.len() <= k {
            return Ok(());
        }
        let mut counter: GeneralizedTotalizer = ids
            .iter()
            .map(|&id| Ok((lit(id)?, 1)))
            .collect::<Result<Vec<(Lit, usize)>>>()?
            .into_iter()
            .collect();
        self.encode(&mut counter, k..=k)?;
        let units = counter.enforce_ub(k).map_err(solver_error)?;
        self.add_units(units)
    }

    /// Add whatever clauses `counter` still lacks to enforce bounds in `range`
    fn encode(&mut self, counter: &mut GeneralizedTotalizer, range: RangeInclusive<usize>) -> Result<()> {
        let mut clauses = Cnf::new();
        counter
            .encode_ub_change(range, &mut clauses, &mut self.vars)
            .map_err(solver_error)?;
        self.solver.add_cnf(clauses).map_err(solver_error)
    }

    /// Solve under `assumptions`, keeping the model when satisfiable
    fn check(&mut self, assumptions: &[Lit]) -> Result<bool> {
        self.calls += 1;
        match self.solver.solve_assumps(assumptions).map_err(solver_error)? {
            SolverResult::Sat => {
                self.best = self.model()?;
                Ok(true)
            }
            SolverResult::Unsat => Ok(false),
            SolverResult::Interrupted => Err(ResolveError::Solver("SAT call was interrupted".into())),
        }
    }

    fn model(&self) -> Result<Vec<i32>> {
        (1..=self.cnf.num_vars as i32)
            .map(|id| {
                let value = self.solver.lit_val(lit(id)?).map_err(solver_error)?;
                Ok(if value == TernaryVal::True { id } else { -id })
            })
            .collect()
    }

    fn stratum_cost(&self, stratum: &[usize]) -> u64 {
        let values = values_of(&self.best, self.cnf.num_vars);
        stratum
            .iter()
            .map(|&i| &self.cnf.soft[i])
            .filter(|(lits, _)| !lits.iter().any(|&l| holds(&values, l)))
            .map(|(_, weight)| weight)
            .sum()
    }

    /// Lower the stratum's cost until the solver proves no cheaper model
    /// exists, then fix that cost. False when cancelled first.
    fn minimize(&mut self, stratum: &[usize]) -> Result<bool> {
        let mut cost = self.stratum_cost(stratum);
        if cost == 0 {
            let units = stratum.iter().map(|&i| !self.violated[i]).collect();
            self.add_units(units)?;
            return Ok(true);
        }

        let mut counter: GeneralizedTotalizer = stratum
            .iter()
            .map(|&i| (self.violated[i], width(self.cnf.soft[i].1)))
            .collect();

        while cost > 0 {
            if self.cancel.is_cancelled() {
                return Ok(false);
            }
            let bound = width(cost - 1);
            self.encode(&mut counter, bound..=bound)?;
            let assumptions = counter.enforce_ub(bound).map_err(solver_error)?;
            if !self.check(&assumptions)? {
                break;
            }
            let improved = self.stratum_cost(stratum);
            trace!("Stratum cost improved from {} to {}", cost, improved);
            cost = improved;
        }

        let bound = width(cost);
        self.encode(&mut counter, bound..=bound)?;
        let units = counter.enforce_ub(bound).map_err(solver_error)?;
        self.add_units(units)?;
        Ok(true)
    }
}
