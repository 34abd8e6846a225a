use log::trace;

use super::literal::{LiteralTable, Var};

/// State owned by a single resolution.
///
/// Literal ids and anonymous variable numbers are only meaningful within
/// the context that produced them, so independent resolutions never share
/// counters.
#[derive(Debug, Default)]
pub struct ResolutionContext {
    table: LiteralTable,
    next_anon: u32,
}

impl ResolutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh anonymous variable standing for `description`
    pub fn fresh(&mut self, description: impl std::fmt::Display) -> Var {
        let var = Var::Anon(self.next_anon);
        self.next_anon += 1;
        trace!("{} stands for {}", var, description);
        var
    }

    pub fn table(&self) -> &LiteralTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut LiteralTable {
        &mut self.table
    }

    pub fn anonymous_count(&self) -> u32 {
        self.next_anon
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_variables_are_distinct() {
        let mut ctx = ResolutionContext::new();
        let a = ctx.fresh("|| ( a b )");
        let b = ctx.fresh("^^ ( x y )");
        assert_ne!(a, b);
        assert_eq!(b, Var::Anon(1));
        assert_eq!(ctx.anonymous_count(), 2);
    }

    #[test]
    fn test_contexts_are_independent() {
        let mut first = ResolutionContext::new();
        let mut second = ResolutionContext::new();
        first.fresh("one");
        first.fresh("two");
        assert_eq!(second.fresh("other"), Var::Anon(0));
    }
}
