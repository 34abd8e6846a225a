use std::time::Instant;

use log::{debug, info, warn};

use crate::config::{ResolveOptions, ResolverConfig};
use crate::error::{ResolveError, Result};
use crate::universe::Environment;

use super::builder::FormulaBuilder;
use super::context::ResolutionContext;
use super::decode::{decode, Resolution};
use super::diagnose::diagnose;
use super::engine::{CancelToken, MaxSatEngine, Outcome, StratifiedSearch, WeightedCnf};
use super::literal::Model;
use super::request::Request;
use super::transaction::Transaction;
use super::weigh::Weigher;

/// Resolves requests against one environment.
///
/// Every call to [`Resolver::resolve`] builds its own formula and literal
/// table, so a resolver can be reused for any number of requests.
pub struct Resolver<'e> {
    env: Environment<'e>,
    config: ResolverConfig,
    engine: Box<dyn MaxSatEngine + 'e>,
    cancel: CancelToken,
}

impl<'e> Resolver<'e> {
    pub fn new(env: Environment<'e>) -> Self {
        Self {
            env,
            config: ResolverConfig::default(),
            engine: Box::new(StratifiedSearch),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_engine(mut self, engine: Box<dyn MaxSatEngine + 'e>) -> Self {
        self.engine = engine;
        self
    }

    /// Share a token through which another thread can stop the search
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn resolve(&self, request: &Request, options: &ResolveOptions) -> Result<Resolution> {
        self.config.weights.validate()?;
        let start = Instant::now();

        let mut ctx = ResolutionContext::new();
        let output = FormulaBuilder::new(self.env, &mut ctx).build(request)?;
        let mut formula = output.formula;

        Weigher::new(self.env, self.config.weights).weigh(&mut formula, &output.new_selected, options)?;

        let cnf = WeightedCnf::from_formula(&formula, ctx.table_mut());
        debug!(
            "Solving {} variables ({} anonymous), {} hard, {} cardinality and {} soft clauses",
            cnf.num_vars,
            ctx.anonymous_count(),
            cnf.hard.len(),
            cnf.at_most.len(),
            cnf.soft.len()
        );

        let cancel = match self.config.timeout() {
            Some(timeout) => self.cancel.deadline_after(timeout),
            None => self.cancel.clone(),
        };

        match self.engine.solve(&cnf, &cancel)? {
            Outcome::Optimal(assignment) => {
                let model = Model::from_assignment(&assignment, ctx.table());
                let resolution = decode(&model, output.new_selected)?;
                info!(
                    "Resolved {} packages ({} excluded) in {:?}",
                    resolution.enabled.len(),
                    resolution.disabled.len(),
                    start.elapsed()
                );
                Ok(resolution)
            }
            Outcome::Unsatisfiable => {
                info!("No solution exists, looking for the conflicting constraints");
                let report = diagnose(&formula, ctx.table_mut())?;
                Err(ResolveError::Unsatisfiable(Box::new(report)))
            }
            Outcome::Cancelled => {
                warn!("Search stopped after {:?} without a proven optimum", start.elapsed());
                Err(ResolveError::Inconclusive)
            }
        }
    }

    /// The operations needed to reach `resolution` from the installed state
    pub fn transaction(&self, resolution: &Resolution, options: &ResolveOptions) -> Result<Transaction> {
        Transaction::from_resolution(resolution, &self.env, options)
    }
}
