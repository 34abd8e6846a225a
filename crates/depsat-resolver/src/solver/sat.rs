use varisat::{ExtendFormula, Lit, Solver};

use crate::error::{ResolveError, Result};

/// Incremental satisfiability checks over signed variable ids
pub struct IncrementalSat {
    solver: Solver<'static>,
}

impl IncrementalSat {
    pub fn new() -> Self {
        Self { solver: Solver::new() }
    }

    pub fn add_clause(&mut self, clause: &[i32]) {
        let lits: Vec<Lit> = clause.iter().map(|&id| Lit::from_dimacs(id as isize)).collect();
        self.solver.add_clause(&lits);
    }

    /// Forbid more than `k` of `literals` holding at once
    pub fn add_at_most(&mut self, literals: &[i32], k: usize) {
        if literals.len() <= k {
            return;
        }
        // every (k+1)-subset must contain a false literal
        let mut subset = Vec::with_capacity(k + 1);
        self.exclude_subsets(literals, k + 1, &mut subset);
    }

    fn exclude_subsets(&mut self, literals: &[i32], size: usize, subset: &mut Vec<i32>) {
        if subset.len() == size {
            let clause: Vec<i32> = subset.iter().map(|id| -id).collect();
            self.add_clause(&clause);
            return;
        }
        let needed = size - subset.len();
        for i in 0..literals.len() {
            if literals.len() - i < needed {
                break;
            }
            subset.push(literals[i]);
            self.exclude_subsets(&literals[i + 1..], size, subset);
            subset.pop();
        }
    }

    pub fn solve(&mut self) -> Result<bool> {
        self.solver
            .solve()
            .map_err(|e| ResolveError::Solver(e.to_string()))
    }

    /// Signed ids of the last satisfying assignment
    pub fn model(&self) -> Option<Vec<i32>> {
        self.solver
            .model()
            .map(|lits| lits.iter().map(|lit| lit.to_dimacs() as i32).collect())
    }
}

impl Default for IncrementalSat {
    fn default() -> Self {
        Self::new()
    }
}
