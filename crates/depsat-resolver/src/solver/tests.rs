//! End-to-end resolution scenarios
//!
//! Each test builds a small in-memory environment, resolves a request and
//! checks the enabled packages, flag states, transaction or conflict report.

use std::sync::{Arc, Mutex};

use super::*;
use crate::config::{ResolveOptions, ResolverConfig, Weights};
use crate::error::{ResolveError, Result};
use crate::memory::MemoryEnvironment;
use depsat_atom::{Atom, FQAtom, QualifiedAtom};

fn request(selected: &[&str]) -> Request {
    let mut request = Request::new();
    for atom in selected {
        request.select(Atom::parse(atom).unwrap());
    }
    request
}

fn resolve(env: &MemoryEnvironment, request: &Request, options: ResolveOptions) -> Result<Resolution> {
    Resolver::new(env.environment()).resolve(request, &options)
}

fn names(atoms: &[FQAtom]) -> Vec<String> {
    atoms.iter().map(|a| a.to_string()).collect()
}

fn fq(s: &str) -> FQAtom {
    FQAtom::parse(s).unwrap()
}

fn conflict(result: Result<Resolution>) -> String {
    match result {
        Err(ResolveError::Unsatisfiable(report)) => report.to_string(),
        other => panic!("expected a conflict, got {other:?}"),
    }
}

fn operations(transaction: &Transaction) -> Vec<String> {
    transaction.operations.iter().map(|op| op.to_string()).collect()
}

#[test]
fn test_stable_version_preferred_over_unaccepted_testing() {
    let mut env = MemoryEnvironment::new();
    env.add_package("cat/a-1.0::main", |p| p.rdepend = "cat/b".into()).unwrap();
    env.add_package("cat/b-1.0::main", |_| {}).unwrap();
    env.add_package("cat/b-2.0::main", |p| p.keyword = Some("~amd64".into())).unwrap();

    let resolution = resolve(&env, &request(&["cat/a"]), ResolveOptions::default()).unwrap();
    assert_eq!(names(&resolution.enabled), vec!["cat/a-1.0::main", "cat/b-1.0::main"]);
    assert!(resolution.new_selected.contains(&"cat/a".parse::<QualifiedAtom>().unwrap()));

    env.accept_keyword("~amd64");
    let resolution = resolve(&env, &request(&["cat/a"]), ResolveOptions::default()).unwrap();
    assert_eq!(names(&resolution.enabled), vec!["cat/a-1.0::main", "cat/b-2.0::main"]);
}

#[test]
fn test_forced_flags_against_conditional_constraint() {
    let mut env = MemoryEnvironment::new();
    env.add_package("cat/p-1::main", |p| {
        p.iuse = ["a".to_string(), "b".to_string()].into();
        p.required_use = "a? ( b )".into();
    })
    .unwrap();
    env.force_flags("cat/p", &["a", "-b"]).unwrap();

    let report = conflict(resolve(&env, &request(&["cat/p"]), ResolveOptions::default()));
    assert!(report.contains("cat/p-1::main[a]: forced by the profile"), "{report}");
    assert!(report.contains("cat/p-1::main[-b]: forced by the profile"), "{report}");
    assert!(
        report.contains("cat/p-1::main could not satisfy b, which is part of the larger clause a? ( b )"),
        "{report}"
    );
    assert!(report.contains("contradicts"), "{report}");
}

#[test]
fn test_exactly_one_with_both_members_forced() {
    let mut env = MemoryEnvironment::new();
    env.add_package("cat/p-1::main", |p| {
        p.iuse = ["x".to_string(), "y".to_string()].into();
        p.required_use = "^^ ( x y )".into();
    })
    .unwrap();
    env.force_flags("cat/p", &["x", "y"]).unwrap();

    let report = conflict(resolve(&env, &request(&["cat/p"]), ResolveOptions::default()));
    assert!(report.contains("cat/p-1::main[x]: forced by the profile"), "{report}");
    assert!(report.contains("cat/p-1::main[y]: forced by the profile"), "{report}");
    assert!(report.contains("^^ ( x y )"), "{report}");
}

#[test]
fn test_depclean_removes_unneeded_package() {
    let mut env = MemoryEnvironment::new();
    env.add_package("cat/a-1::main", |_| {}).unwrap();
    env.add_installed("cat/a-1", &[], |_| {}).unwrap();
    env.add_installed("cat/c-1", &[], |_| {}).unwrap();
    env.add_world("cat/a").unwrap();

    let kept = resolve(&env, &Request::new(), ResolveOptions::default()).unwrap();
    assert!(kept.is_enabled(&fq("cat/c-1::installed")));

    let options = ResolveOptions { depclean: true, ..Default::default() };
    let cleaned = resolve(&env, &Request::new(), options).unwrap();
    assert!(cleaned.is_enabled(&fq("cat/a-1::installed")));
    assert_eq!(names(&cleaned.disabled), vec!["cat/c-1::installed"]);

    let transaction = Resolver::new(env.environment()).transaction(&cleaned, &options).unwrap();
    assert_eq!(operations(&transaction), vec!["remove cat/c-1::installed"]);
}

#[test]
fn test_resolution_is_a_fixed_point() {
    let mut env = MemoryEnvironment::new();
    env.add_package("cat/a-1::main", |p| p.rdepend = "cat/b[ssl]".into()).unwrap();
    env.add_package("cat/b-1::main", |p| p.iuse = ["ssl".to_string()].into()).unwrap();
    env.add_package("cat/c-1::main", |_| {}).unwrap();

    let options = ResolveOptions::default();
    let resolution = resolve(&env, &request(&["cat/a"]), options).unwrap();
    let transaction = Resolver::new(env.environment()).transaction(&resolution, &options).unwrap();
    assert_eq!(operations(&transaction), vec!["new cat/a-1::main", "new cat/b-1::main"]);
    assert!(transaction.flags_for(&fq("cat/b-1::main")).unwrap().contains("ssl"));
    let changes: Vec<String> = transaction.flag_changes.iter().map(|c| c.to_string()).collect();
    assert_eq!(changes, vec!["cat/b-1::main[ssl]"]);

    env.apply(&transaction);
    assert_eq!(env.world, vec![Atom::parse("cat/a").unwrap()]);

    let again = resolve(&env, &Request::new(), options).unwrap();
    assert_eq!(names(&again.enabled), vec!["cat/a-1::installed", "cat/b-1::installed"]);
    let transaction = Resolver::new(env.environment()).transaction(&again, &options).unwrap();
    assert!(transaction.is_empty(), "{transaction}");
}

#[test]
fn test_blocker_removes_installed_package() {
    let mut env = MemoryEnvironment::new();
    env.add_package("cat/a-1::main", |p| p.rdepend = "!!cat/c".into()).unwrap();
    env.add_installed("cat/c-1", &[], |_| {}).unwrap();

    let options = ResolveOptions::default();
    let resolution = resolve(&env, &request(&["cat/a"]), options).unwrap();
    assert_eq!(names(&resolution.enabled), vec!["cat/a-1::main"]);
    let transaction = Resolver::new(env.environment()).transaction(&resolution, &options).unwrap();
    assert_eq!(
        operations(&transaction),
        vec!["new cat/a-1::main", "remove cat/c-1::installed"]
    );
}

#[test]
fn test_blocker_against_selection_is_reported() {
    let mut env = MemoryEnvironment::new();
    env.add_package("cat/a-1::main", |p| p.rdepend = "!!cat/c".into()).unwrap();
    env.add_package("cat/c-1::main", |_| {}).unwrap();

    let report = conflict(resolve(&env, &request(&["cat/a", "cat/c"]), ResolveOptions::default()));
    assert!(report.contains("cat/c: blocked by cat/a-1::main"), "{report}");
    assert!(report.contains("cat/c: required by packages passed on the command line"), "{report}");
}

#[test]
fn test_any_of_prefers_installed_alternative() {
    let mut env = MemoryEnvironment::new();
    env.add_package("cat/a-1::main", |p| p.rdepend = "|| ( cat/x cat/y )".into()).unwrap();
    env.add_package("cat/x-1::main", |_| {}).unwrap();
    env.add_installed("cat/y-1", &[], |_| {}).unwrap();

    let resolution = resolve(&env, &request(&["cat/a"]), ResolveOptions::default()).unwrap();
    assert_eq!(names(&resolution.enabled), vec!["cat/a-1::main", "cat/y-1::installed"]);
}

#[test]
fn test_any_of_skips_missing_alternative() {
    let mut env = MemoryEnvironment::new();
    env.add_package("cat/a-1::main", |p| p.rdepend = "|| ( cat/gone cat/y )".into()).unwrap();
    env.add_package("cat/y-1::main", |_| {}).unwrap();

    let resolution = resolve(&env, &request(&["cat/a"]), ResolveOptions::default()).unwrap();
    assert_eq!(names(&resolution.enabled), vec!["cat/a-1::main", "cat/y-1::main"]);
}

#[test]
fn test_system_binary_is_preferred() {
    let mut env = MemoryEnvironment::new();
    env.add_package("cat/a-1::main", |p| p.rdepend = "|| ( dev-vcs/git sys-bin/git )".into()).unwrap();
    env.add_package("dev-vcs/git-2::main", |_| {}).unwrap();
    env.add_package("sys-bin/git-1::main", |_| {}).unwrap();
    env.add_system_binary("git");

    let resolution = resolve(&env, &request(&["cat/a"]), ResolveOptions::default()).unwrap();
    assert_eq!(names(&resolution.enabled), vec!["cat/a-1::main", "sys-bin/git-1::main"]);
}

#[test]
fn test_nested_required_use_group_is_enforced() {
    let mut env = MemoryEnvironment::new();
    env.add_package("cat/p-1::main", |p| {
        p.iuse = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        p.required_use = "|| ( a ( b c ) )".into();
    })
    .unwrap();
    env.force_flags("cat/p", &["-a"]).unwrap();

    let resolution = resolve(&env, &request(&["cat/p"]), ResolveOptions::default()).unwrap();
    let flags: Vec<String> = resolution
        .flags_of(&fq("cat/p-1::main"))
        .map(|c| c.to_string())
        .collect();
    assert_eq!(flags, vec!["cat/p-1::main[-a]", "cat/p-1::main[b]", "cat/p-1::main[c]"]);
}

#[test]
fn test_user_flag_overrides_default() {
    let mut env = MemoryEnvironment::new();
    env.add_package("cat/a-1::main", |p| {
        p.iuse = ["ssl".to_string()].into();
        p.rdepend = "ssl? ( cat/openssl )".into();
    })
    .unwrap();
    env.add_package("cat/openssl-3::main", |_| {}).unwrap();

    let plain = resolve(&env, &request(&["cat/a"]), ResolveOptions::default()).unwrap();
    assert_eq!(names(&plain.enabled), vec!["cat/a-1::main"]);

    env.set_user_flags("cat/a", &["ssl"]).unwrap();
    let with_ssl = resolve(&env, &request(&["cat/a"]), ResolveOptions::default()).unwrap();
    assert_eq!(names(&with_ssl.enabled), vec!["cat/a-1::main", "cat/openssl-3::main"]);
}

#[test]
fn test_update_replaces_installed_version() {
    let mut env = MemoryEnvironment::new();
    env.add_package("cat/a-1::main", |_| {}).unwrap();
    env.add_package("cat/a-2::main", |_| {}).unwrap();
    env.add_installed("cat/a-1", &[], |_| {}).unwrap();
    env.add_world("cat/a").unwrap();

    let kept = resolve(&env, &Request::new(), ResolveOptions::default()).unwrap();
    assert_eq!(names(&kept.enabled), vec!["cat/a-1::installed"]);

    let options = ResolveOptions { update: true, ..Default::default() };
    let updated = resolve(&env, &Request::new(), options).unwrap();
    assert_eq!(names(&updated.enabled), vec!["cat/a-2::main"]);
    let transaction = Resolver::new(env.environment()).transaction(&updated, &options).unwrap();
    assert_eq!(operations(&transaction), vec!["update cat/a (1 -> 2)"]);
}

#[test]
fn test_dependency_upgrades_installed_package_with_dependencies() {
    let mut env = MemoryEnvironment::new();
    env.add_package("cat/a-1::main", |p| p.rdepend = ">=cat/p-2".into()).unwrap();
    env.add_package("cat/p-2::main", |_| {}).unwrap();
    env.add_package("cat/x-1::main", |_| {}).unwrap();
    env.add_installed("cat/p-1", &[], |p| p.rdepend = "cat/x".into()).unwrap();

    let options = ResolveOptions::default();
    let resolution = resolve(&env, &request(&["cat/a"]), options).unwrap();
    assert!(resolution.is_enabled(&fq("cat/p-2::main")));
    assert!(!resolution.is_enabled(&fq("cat/p-1::installed")));
    assert_eq!(names(&resolution.enabled), vec!["cat/a-1::main", "cat/p-2::main"]);

    let transaction = Resolver::new(env.environment()).transaction(&resolution, &options).unwrap();
    assert!(operations(&transaction).contains(&"update cat/p (1 -> 2)".to_string()), "{transaction}");
}

#[test]
fn test_default_flag_used_only_in_conditional_is_kept() {
    let mut env = MemoryEnvironment::new();
    env.add_package("cat/a-1::main", |p| {
        p.iuse = ["+ssl".to_string()].into();
        p.rdepend = "ssl? ( cat/q )".into();
    })
    .unwrap();
    env.add_package("cat/q-1::main", |_| {}).unwrap();

    let resolution = resolve(&env, &request(&["cat/a"]), ResolveOptions::default()).unwrap();
    assert_eq!(names(&resolution.enabled), vec!["cat/a-1::main", "cat/q-1::main"]);
    let flags: Vec<String> = resolution
        .flags_of(&fq("cat/a-1::main"))
        .map(|c| c.to_string())
        .collect();
    assert_eq!(flags, vec!["cat/a-1::main[ssl]"]);
}

#[test]
fn test_deselect_removes_world_package() {
    let mut env = MemoryEnvironment::new();
    env.add_package("cat/a-1::main", |_| {}).unwrap();
    env.add_installed("cat/a-1", &[], |_| {}).unwrap();
    env.add_world("cat/a").unwrap();

    let mut request = Request::new();
    request.deselect(Atom::parse("cat/a").unwrap());
    let resolution = resolve(&env, &request, ResolveOptions::default()).unwrap();
    assert!(resolution.enabled.is_empty());
    assert!(resolution.disabled.contains(&fq("cat/a-1::installed")));
}

#[test]
fn test_version_conflict_is_reported() {
    let mut env = MemoryEnvironment::new();
    env.add_package("cat/a-1::main", |p| p.rdepend = "=cat/c-1".into()).unwrap();
    env.add_package("cat/c-1::main", |_| {}).unwrap();
    env.add_package("cat/c-2::main", |_| {}).unwrap();

    let report = conflict(resolve(&env, &request(&["cat/a", "=cat/c-2"]), ResolveOptions::default()));
    assert!(report.contains("=cat/c-1: required by cat/a-1::main"), "{report}");
    assert!(report.contains("=cat/c-2: required by packages passed on the command line"), "{report}");
}

#[test]
fn test_unknown_package() {
    let env = MemoryEnvironment::new();
    let result = resolve(&env, &request(&["cat/nothing"]), ResolveOptions::default());
    assert!(matches!(result, Err(ResolveError::PackageDoesNotExist { .. })));
}

#[test]
fn test_independent_resolutions_agree() {
    let mut env = MemoryEnvironment::new();
    env.add_package("cat/a-1::main", |p| p.rdepend = "|| ( cat/x cat/y ) cat/z".into()).unwrap();
    env.add_package("cat/x-1::main", |_| {}).unwrap();
    env.add_package("cat/y-1::main", |_| {}).unwrap();
    env.add_package("cat/z-1::main", |_| {}).unwrap();

    let resolver = Resolver::new(env.environment());
    let first = resolver.resolve(&request(&["cat/a"]), &ResolveOptions::default()).unwrap();
    let second = resolver.resolve(&request(&["cat/a"]), &ResolveOptions::default()).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.enabled.len(), 3);
}

#[test]
fn test_cancelled_resolution_is_inconclusive() {
    let mut env = MemoryEnvironment::new();
    env.add_package("cat/a-1::main", |_| {}).unwrap();

    let token = CancelToken::new();
    token.cancel();
    let result = Resolver::new(env.environment())
        .with_cancel_token(token)
        .resolve(&request(&["cat/a"]), &ResolveOptions::default());
    assert!(matches!(result, Err(ResolveError::Inconclusive)));
}

#[test]
fn test_invalid_weights_are_rejected() {
    let mut env = MemoryEnvironment::new();
    env.add_package("cat/a-1::main", |_| {}).unwrap();

    let config = ResolverConfig {
        weights: Weights { keep_installed: 0, ..Weights::default() },
        timeout_secs: None,
    };
    let result = Resolver::new(env.environment())
        .with_config(config)
        .resolve(&request(&["cat/a"]), &ResolveOptions::default());
    assert!(matches!(result, Err(ResolveError::Config(_))));
}

#[test]
fn test_long_dependency_chain_resolves_in_time() {
    let length = 50;
    let mut env = MemoryEnvironment::new();
    for i in 0..length {
        for version in 1..=3 {
            env.add_package(&format!("cat/p{i}-{version}::main"), |p| {
                p.iuse = ["+ssl", "doc", "x"].iter().map(|s| s.to_string()).collect();
                p.required_use = "?? ( doc x )".into();
                if i + 1 < length {
                    p.rdepend = format!("ssl? ( cat/p{} )", i + 1);
                }
            })
            .unwrap();
        }
    }

    let config = ResolverConfig { timeout_secs: Some(60), ..ResolverConfig::default() };
    let resolution = Resolver::new(env.environment())
        .with_config(config)
        .resolve(&request(&["cat/p0"]), &ResolveOptions::default())
        .unwrap();
    assert_eq!(resolution.enabled.len(), length);
    assert!(resolution.enabled.iter().all(|a| a.version.to_string() == "3"));
    assert!(resolution
        .flag_changes
        .iter()
        .all(|c| c.enabled == (c.flag == "ssl")));
}

/// Delegates to the built-in engine and records the problem sizes it sees
struct Recording(Arc<Mutex<Vec<usize>>>);

impl MaxSatEngine for Recording {
    fn solve(&self, cnf: &WeightedCnf, cancel: &CancelToken) -> Result<Outcome> {
        self.0.lock().unwrap().push(cnf.num_vars);
        StratifiedSearch.solve(cnf, cancel)
    }
}

#[test]
fn test_custom_engine_is_used() {
    let mut env = MemoryEnvironment::new();
    env.add_package("cat/a-1::main", |p| p.rdepend = "cat/b".into()).unwrap();
    env.add_package("cat/b-1::main", |_| {}).unwrap();

    let sizes = Arc::new(Mutex::new(Vec::new()));
    let resolution = Resolver::new(env.environment())
        .with_engine(Box::new(Recording(sizes.clone())))
        .resolve(&request(&["cat/a"]), &ResolveOptions::default())
        .unwrap();
    assert_eq!(names(&resolution.enabled), vec!["cat/a-1::main", "cat/b-1::main"]);
    assert_eq!(*sizes.lock().unwrap(), vec![2]);
}
