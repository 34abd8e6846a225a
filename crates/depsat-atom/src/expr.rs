//! Dependency and flag-constraint expressions
//!
//! Both grammars share one tree shape, [`Expr`], and differ only in their
//! leaves and in which group operators they allow:
//!
//! - dependency strings: atoms, `!!atom` blockers, `||` groups and `flag?` conditionals
//! - flag constraints: flag literals plus the `^^` and `??` cardinality groups

use std::fmt;

use crate::atom::{Atom, UseDep, UseDepKind};
use crate::error::{AtomError, Result};

/// A node of a parsed expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr<T> {
    Leaf(T),
    /// `( a b )`: every child must hold
    AllOf(Vec<Expr<T>>),
    /// `|| ( a b )`: at least one child must hold
    AnyOf(Vec<Expr<T>>),
    /// `^^ ( a b )`: exactly one child must hold
    ExactlyOne(Vec<Expr<T>>),
    /// `?? ( a b )`: at most one child may hold
    AtMostOne(Vec<Expr<T>>),
    /// `flag? ( a b )`, or `!flag? ( a b )` when negated
    Conditional {
        flag: String,
        negated: bool,
        body: Vec<Expr<T>>,
    },
}

/// Leaf of a dependency expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepAtom {
    Require(Atom),
    Block(Atom),
}

impl DepAtom {
    pub fn atom(&self) -> &Atom {
        match self {
            DepAtom::Require(atom) | DepAtom::Block(atom) => atom,
        }
    }

    pub fn is_blocker(&self) -> bool {
        matches!(self, DepAtom::Block(_))
    }

    fn with_atom(&self, atom: Atom) -> Self {
        match self {
            DepAtom::Require(_) => DepAtom::Require(atom),
            DepAtom::Block(_) => DepAtom::Block(atom),
        }
    }

    fn parse(token: &str) -> Result<Self> {
        // `!atom` is treated like the hard `!!atom` form
        match token.strip_prefix("!!").or_else(|| token.strip_prefix('!')) {
            Some(rest) => Ok(DepAtom::Block(Atom::parse(rest)?)),
            None => Ok(DepAtom::Require(Atom::parse(token)?)),
        }
    }
}

impl fmt::Display for DepAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DepAtom::Require(atom) => write!(f, "{}", atom),
            DepAtom::Block(atom) => write!(f, "!!{}", atom),
        }
    }
}

/// Leaf of a flag-constraint expression: `flag` or `!flag`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlagLiteral {
    pub name: String,
    pub enabled: bool,
}

impl FlagLiteral {
    fn parse(token: &str) -> Result<Self> {
        let (name, enabled) = match token.strip_prefix('!') {
            Some(name) => (name, false),
            None => (token, true),
        };
        validate_flag(name)?;
        Ok(Self { name: name.to_string(), enabled })
    }
}

impl fmt::Display for FlagLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.enabled {
            write!(f, "{}", self.name)
        } else {
            write!(f, "!{}", self.name)
        }
    }
}

pub type DepExpr = Expr<DepAtom>;
pub type UseExpr = Expr<FlagLiteral>;

/// Parse a dependency string such as `cat/a || ( cat/b cat/c ) doc? ( cat/d )`
pub fn parse_dependencies(input: &str) -> Result<Vec<DepExpr>> {
    Parser::new(input, false).parse_all(DepAtom::parse)
}

/// Parse a flag-constraint string such as `^^ ( x y ) a? ( b )`
pub fn parse_required_use(input: &str) -> Result<Vec<UseExpr>> {
    Parser::new(input, true).parse_all(FlagLiteral::parse)
}

/// Render a list of nodes the way they would be written
pub fn render<T: fmt::Display>(nodes: &[Expr<T>]) -> String {
    nodes
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Rewrite conditional use dependencies into explicit conditionals over
/// the depending package's flags, leaving only `flag`/`-flag` on atoms.
pub fn expand_use_conditionals(nodes: &[DepExpr]) -> Vec<DepExpr> {
    nodes.iter().map(expand_node).collect()
}

fn expand_node(node: &DepExpr) -> DepExpr {
    match node {
        Expr::Leaf(leaf) => expand_leaf(leaf),
        Expr::AllOf(children) => Expr::AllOf(expand_use_conditionals(children)),
        Expr::AnyOf(children) => Expr::AnyOf(expand_use_conditionals(children)),
        Expr::ExactlyOne(children) => Expr::ExactlyOne(expand_use_conditionals(children)),
        Expr::AtMostOne(children) => Expr::AtMostOne(expand_use_conditionals(children)),
        Expr::Conditional { flag, negated, body } => Expr::Conditional {
            flag: flag.clone(),
            negated: *negated,
            body: expand_use_conditionals(body),
        },
    }
}

fn expand_leaf(leaf: &DepAtom) -> DepExpr {
    let atom = leaf.atom();
    let (conditional, plain): (Vec<&UseDep>, Vec<&UseDep>) =
        atom.use_deps.iter().partition(|dep| dep.is_conditional());
    if conditional.is_empty() {
        return Expr::Leaf(leaf.clone());
    }

    let plain: Vec<UseDep> = plain.into_iter().cloned().collect();
    let variant = |extra: Option<UseDep>| {
        let mut deps = plain.clone();
        deps.extend(extra);
        Expr::Leaf(leaf.with_atom(atom.with_use(deps)))
    };
    let branch = |flag: &str, negated: bool, body: DepExpr| Expr::Conditional {
        flag: flag.to_string(),
        negated,
        body: vec![body],
    };

    let mut expanded = Vec::new();
    for dep in conditional {
        let flag = dep.flag.as_str();
        let (when_enabled, when_disabled) = match dep.kind {
            UseDepKind::IfEnabled => (Some(UseDep::enabled(flag)), None),
            UseDepKind::IfDisabled => (None, Some(UseDep::disabled(flag))),
            UseDepKind::Same => (Some(UseDep::enabled(flag)), Some(UseDep::disabled(flag))),
            UseDepKind::Opposite => (Some(UseDep::disabled(flag)), Some(UseDep::enabled(flag))),
            UseDepKind::Enabled | UseDepKind::Disabled => continue,
        };
        expanded.push(branch(flag, false, variant(when_enabled)));
        expanded.push(branch(flag, true, variant(when_disabled)));
    }
    Expr::AllOf(expanded)
}

impl<T: fmt::Display> fmt::Display for Expr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Leaf(leaf) => write!(f, "{}", leaf),
            Expr::AllOf(children) => write!(f, "( {} )", render(children)),
            Expr::AnyOf(children) => write!(f, "|| ( {} )", render(children)),
            Expr::ExactlyOne(children) => write!(f, "^^ ( {} )", render(children)),
            Expr::AtMostOne(children) => write!(f, "?? ( {} )", render(children)),
            Expr::Conditional { flag, negated, body } => {
                let bang = if *negated { "!" } else { "" };
                write!(f, "{}{}? ( {} )", bang, flag, render(body))
            }
        }
    }
}

fn validate_flag(name: &str) -> Result<()> {
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '_' | '@' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(AtomError::InvalidFlag(name.to_string()))
    }
}

/// Split an expression into tokens. Parentheses are separate tokens unless
/// they appear inside an atom's `[...]` use-dependency block.
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut brackets = 0usize;

    for c in input.chars() {
        match c {
            '[' => {
                brackets += 1;
                current.push(c);
            }
            ']' => {
                brackets = brackets.saturating_sub(1);
                current.push(c);
            }
            '(' | ')' if brackets == 0 => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                tokens.push(c.to_string());
            }
            c if c.is_whitespace() && brackets == 0 => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<String>,
    pos: usize,
    allow_cardinality: bool,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, allow_cardinality: bool) -> Self {
        Self {
            input,
            tokens: tokenize(input),
            pos: 0,
            allow_cardinality,
        }
    }

    fn parse_all<T>(mut self, leaf: fn(&str) -> Result<T>) -> Result<Vec<Expr<T>>> {
        self.parse_sequence(leaf, 0)
    }

    fn parse_sequence<T>(&mut self, leaf: fn(&str) -> Result<T>, depth: usize) -> Result<Vec<Expr<T>>> {
        let mut nodes = Vec::new();
        loop {
            let Some(token) = self.tokens.get(self.pos).cloned() else {
                if depth > 0 {
                    return Err(AtomError::UnbalancedParens(self.input.to_string()));
                }
                return Ok(nodes);
            };
            self.pos += 1;

            let node = match token.as_str() {
                ")" if depth == 0 => return Err(AtomError::UnbalancedParens(self.input.to_string())),
                ")" => return Ok(nodes),
                "(" => Expr::AllOf(self.parse_group(leaf, depth)?),
                "||" => {
                    self.expect_open(&token)?;
                    Expr::AnyOf(self.parse_group(leaf, depth)?)
                }
                "^^" | "??" => {
                    if !self.allow_cardinality {
                        return Err(AtomError::OperatorNotAllowed {
                            operator: token,
                            expr: self.input.to_string(),
                        });
                    }
                    self.expect_open(&token)?;
                    let children = self.parse_group(leaf, depth)?;
                    if token == "^^" {
                        Expr::ExactlyOne(children)
                    } else {
                        Expr::AtMostOne(children)
                    }
                }
                t if t.ends_with('?') => {
                    let condition = &t[..t.len() - 1];
                    let (flag, negated) = match condition.strip_prefix('!') {
                        Some(flag) => (flag, true),
                        None => (condition, false),
                    };
                    validate_flag(flag)?;
                    self.expect_open(&token)?;
                    Expr::Conditional {
                        flag: flag.to_string(),
                        negated,
                        body: self.parse_group(leaf, depth)?,
                    }
                }
                t => Expr::Leaf(leaf(t)?),
            };
            nodes.push(node);
        }
    }

    fn parse_group<T>(&mut self, leaf: fn(&str) -> Result<T>, depth: usize) -> Result<Vec<Expr<T>>> {
        let children = self.parse_sequence(leaf, depth + 1)?;
        if children.is_empty() {
            return Err(AtomError::EmptyGroup(self.input.to_string()));
        }
        Ok(children)
    }

    fn expect_open(&mut self, operator: &str) -> Result<()> {
        match self.tokens.get(self.pos) {
            Some(t) if t == "(" => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(AtomError::DanglingOperator {
                operator: operator.to_string(),
                expr: self.input.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(s: &str) -> Atom {
        Atom::parse(s).unwrap()
    }

    #[test]
    fn test_parse_flat_dependencies() {
        let nodes = parse_dependencies("cat/a >=cat/b-1.0 !!cat/c").unwrap();
        assert_eq!(
            nodes,
            vec![
                Expr::Leaf(DepAtom::Require(atom("cat/a"))),
                Expr::Leaf(DepAtom::Require(atom(">=cat/b-1.0"))),
                Expr::Leaf(DepAtom::Block(atom("cat/c"))),
            ]
        );
    }

    #[test]
    fn test_parse_nested_dependencies() {
        let nodes = parse_dependencies("|| ( cat/a ( cat/b cat/c ) ) !doc? ( cat/d[ssl(+)] )").unwrap();
        assert_eq!(nodes.len(), 2);
        match &nodes[0] {
            Expr::AnyOf(children) => {
                assert_eq!(children.len(), 2);
                assert!(matches!(&children[1], Expr::AllOf(inner) if inner.len() == 2));
            }
            other => panic!("unexpected node {other:?}"),
        }
        match &nodes[1] {
            Expr::Conditional { flag, negated, body } => {
                assert_eq!(flag, "doc");
                assert!(*negated);
                assert_eq!(body.len(), 1);
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_empty_string_parses_to_nothing() {
        assert!(parse_dependencies("").unwrap().is_empty());
        assert!(parse_required_use("   ").unwrap().is_empty());
    }

    #[test]
    fn test_dependency_grammar_rejects_cardinality_groups() {
        assert!(matches!(
            parse_dependencies("^^ ( cat/a cat/b )"),
            Err(AtomError::OperatorNotAllowed { .. })
        ));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_required_use("( a b"), Err(AtomError::UnbalancedParens(_))));
        assert!(matches!(parse_required_use("a b )"), Err(AtomError::UnbalancedParens(_))));
        assert!(matches!(parse_required_use("|| a b"), Err(AtomError::DanglingOperator { .. })));
        assert!(matches!(parse_required_use("|| ( )"), Err(AtomError::EmptyGroup(_))));
        assert!(matches!(parse_required_use("!? ( a )"), Err(AtomError::InvalidFlag(_))));
    }

    #[test]
    fn test_parse_required_use() {
        let nodes = parse_required_use("^^ ( x !y ) ?? ( a b ) a? ( b )").unwrap();
        assert_eq!(
            nodes[0],
            Expr::ExactlyOne(vec![
                Expr::Leaf(FlagLiteral { name: "x".into(), enabled: true }),
                Expr::Leaf(FlagLiteral { name: "y".into(), enabled: false }),
            ])
        );
        assert!(matches!(nodes[1], Expr::AtMostOne(_)));
        assert!(matches!(nodes[2], Expr::Conditional { negated: false, .. }));
    }

    #[test]
    fn test_display_is_canonical() {
        let input = "||   ( cat/a  cat/b ) doc? ( !!cat/c )";
        let nodes = parse_dependencies(input).unwrap();
        assert_eq!(render(&nodes), "|| ( cat/a cat/b ) doc? ( !!cat/c )");

        let nodes = parse_required_use("!a? ( ^^ ( b c ) )").unwrap();
        assert_eq!(render(&nodes), "!a? ( ^^ ( b c ) )");
    }

    #[test]
    fn test_tokenize_keeps_brackets_together() {
        let tokens = tokenize("cat/a[x(+),y] (cat/b)");
        assert_eq!(tokens, vec!["cat/a[x(+),y]", "(", "cat/b", ")"]);
    }

    #[test]
    fn test_expand_if_enabled() {
        let nodes = parse_dependencies("cat/a[ssl?]").unwrap();
        let expanded = expand_use_conditionals(&nodes);
        assert_eq!(render(&expanded), "( ssl? ( cat/a[ssl] ) !ssl? ( cat/a ) )");
    }

    #[test]
    fn test_expand_all_forms() {
        let cases = [
            ("cat/a[!x?]", "( x? ( cat/a ) !x? ( cat/a[-x] ) )"),
            ("cat/a[x=]", "( x? ( cat/a[x] ) !x? ( cat/a[-x] ) )"),
            ("cat/a[!x=]", "( x? ( cat/a[-x] ) !x? ( cat/a[x] ) )"),
            ("cat/a[y,x?]", "( x? ( cat/a[y,x] ) !x? ( cat/a[y] ) )"),
            ("cat/a[y,-z]", "cat/a[y,-z]"),
        ];
        for (input, expected) in cases {
            let expanded = expand_use_conditionals(&parse_dependencies(input).unwrap());
            assert_eq!(render(&expanded), expected, "expanding {input}");
        }
    }

    #[test]
    fn test_expand_inside_groups_and_blockers() {
        let nodes = parse_dependencies("|| ( !!cat/a[x?] cat/b )").unwrap();
        let expanded = expand_use_conditionals(&nodes);
        assert_eq!(
            render(&expanded),
            "|| ( ( x? ( !!cat/a[x] ) !x? ( !!cat/a ) ) cat/b )"
        );
    }
}
