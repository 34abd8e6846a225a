//! Soft preferences over the hard formula
//!
//! Preferences come in tiers. Every clause of a tier weighs more than all
//! clauses of the lower tiers combined, so no amount of lower-tier cost can
//! outweigh a single higher-tier preference.

use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::sync::Arc;

use log::debug;

use depsat_atom::{FQAtom, QualifiedAtom};

use crate::config::{ResolveOptions, Weights};
use crate::error::{ResolveError, Result};
use crate::universe::{parse_flag_setting, Environment, PackageRecord};

use super::clause::Tier;
use super::formula::Formula;
use super::literal::{Literal, Var};

/// Running totals used to keep tiers strictly ordered
#[derive(Debug, Default)]
struct TierLedger {
    /// Sum of the weights issued by every closed tier
    floor: u64,
    /// Sum of the weights issued by the open tier
    issued: u64,
}

impl TierLedger {
    fn weight(&self, base: u64) -> u64 {
        base.saturating_add(self.floor)
    }

    fn issue(&mut self, formula: &mut Formula, literals: Vec<Literal>, tier: Tier, description: String, weight: u64) {
        formula.append_weighted(literals, tier, description, weight);
        self.issued = self.issued.saturating_add(weight);
    }

    fn close_tier(&mut self, tier: Tier) {
        debug!("{} tier issued a total weight of {}", tier.as_str(), self.issued);
        self.floor = self.floor.saturating_add(self.issued);
        self.issued = 0;
    }
}

pub struct Weigher<'e> {
    env: Environment<'e>,
    weights: Weights,
}

impl<'e> Weigher<'e> {
    pub fn new(env: Environment<'e>, weights: Weights) -> Self {
        Self { env, weights }
    }

    /// Append every soft clause to `formula`
    pub fn weigh(
        &self,
        formula: &mut Formula,
        new_selected: &BTreeSet<QualifiedAtom>,
        options: &ResolveOptions,
    ) -> Result<()> {
        let groups: Vec<(QualifiedAtom, Vec<FQAtom>)> = formula
            .atoms()
            .iter()
            .map(|(name, atoms)| (name.clone(), atoms.iter().cloned().collect()))
            .collect();
        let flags: Vec<(FQAtom, String)> = formula
            .flags()
            .iter()
            .filter_map(|var| match var {
                Var::Flag(atom, flag) => Some((atom.clone(), flag.clone())),
                _ => None,
            })
            .collect();

        let mut soft = Formula::new();
        let mut ledger = TierLedger::default();

        self.weigh_not_needed(&groups, new_selected, &mut soft, &mut ledger);
        ledger.close_tier(Tier::NotNeeded);

        for (_, atoms) in &groups {
            self.weigh_versions(atoms, &mut soft, &mut ledger)?;
        }
        ledger.close_tier(Tier::Outdated);

        self.weigh_installed(&groups, new_selected, options, &mut soft, &mut ledger);
        ledger.close_tier(Tier::KeepInstalled);

        for (atom, flag) in &flags {
            self.weigh_default_flag(atom, flag, new_selected, options, &mut soft, &mut ledger)?;
        }
        ledger.close_tier(Tier::DefaultFlag);

        for (atom, flag) in &flags {
            self.weigh_user_flag(atom, flag, new_selected, options, &mut soft, &mut ledger);
        }
        ledger.close_tier(Tier::UserFlag);

        formula.merge(soft);
        Ok(())
    }

    /// Whether a package's flags are chosen afresh instead of kept
    fn reconsiders_flags(&self, atom: &FQAtom, new_selected: &BTreeSet<QualifiedAtom>, options: &ResolveOptions) -> bool {
        let name = atom.qualified();
        (options.deep && options.newuse)
            || new_selected.contains(&name)
            || self.env.universe.installed(&name).is_none()
    }

    fn record(&self, atom: &FQAtom) -> Result<Arc<PackageRecord>> {
        self.env
            .universe
            .record(atom)
            .ok_or_else(|| ResolveError::internal(format!("no package record for {}", atom)))
    }

    /// Packages nobody asked for and nothing has installed should stay out
    fn weigh_not_needed(
        &self,
        groups: &[(QualifiedAtom, Vec<FQAtom>)],
        new_selected: &BTreeSet<QualifiedAtom>,
        soft: &mut Formula,
        ledger: &mut TierLedger,
    ) {
        for (name, atoms) in groups {
            if new_selected.contains(name) || self.env.universe.installed(name).is_some() {
                continue;
            }
            for atom in atoms {
                if self.env.selection.is_selected(atom) {
                    continue;
                }
                ledger.issue(
                    soft,
                    vec![!Literal::package(atom)],
                    Tier::NotNeeded,
                    format!("{} is not needed", atom),
                    self.weights.not_needed,
                );
            }
        }
    }

    /// Rank the versions of one group, penalizing each by its rank.
    ///
    /// Stable versions come before testing ones, then newer before older,
    /// then higher repository priority. Installed records rank last among
    /// equal versions so that real repositories are preferred.
    fn weigh_versions(&self, atoms: &[FQAtom], soft: &mut Formula, ledger: &mut TierLedger) -> Result<()> {
        let mut records = atoms
            .iter()
            .map(|atom| self.record(atom))
            .collect::<Result<Vec<_>>>()?;

        records.sort_by_cached_key(|record| {
            let priority = if record.is_installed() {
                i32::MIN
            } else {
                self.env.universe.repo_priority(&record.atom.repo)
            };
            (
                self.env.universe.stability(record),
                Reverse(record.atom.version.clone()),
                Reverse(priority),
            )
        });

        let step = self.weights.update_diff.saturating_add(ledger.floor);
        let mut weight = ledger.weight(self.weights.base_update);
        for record in records {
            let literal = Literal::package(&record.atom);
            ledger.issue(
                soft,
                vec![!&literal],
                Tier::Outdated,
                format!("prefer newer versions over {}", record.atom),
                weight,
            );
            weight = weight.saturating_add(step);

            if record.atom.category == "sys-bin" && self.env.universe.has_system_binary(&record) {
                let bonus = ledger.weight(self.weights.sys_bin);
                ledger.issue(
                    soft,
                    vec![literal],
                    Tier::Outdated,
                    format!("{} is provided by the system", record.atom),
                    bonus,
                );
            }
        }
        Ok(())
    }

    fn weigh_installed(
        &self,
        groups: &[(QualifiedAtom, Vec<FQAtom>)],
        new_selected: &BTreeSet<QualifiedAtom>,
        options: &ResolveOptions,
        soft: &mut Formula,
        ledger: &mut TierLedger,
    ) {
        let weight = ledger.weight(self.weights.keep_installed);
        // updates may replace whatever is installed
        let keep_weight = if options.update { self.weights.keep_installed } else { weight };

        for record in self.env.universe.all_installed() {
            if new_selected.contains(&record.atom.qualified()) {
                continue;
            }
            let literal = Literal::package(&record.atom);
            if !self.env.selection.is_selected(&record.atom) {
                if options.depclean {
                    ledger.issue(
                        soft,
                        vec![!literal],
                        Tier::KeepInstalled,
                        format!("remove {} if nothing needs it", record.atom),
                        weight,
                    );
                } else {
                    ledger.issue(
                        soft,
                        vec![literal],
                        Tier::KeepInstalled,
                        format!("keep {} installed", record.atom),
                        keep_weight,
                    );
                }
            } else if !options.update {
                ledger.issue(
                    soft,
                    vec![literal],
                    Tier::KeepInstalled,
                    format!("keep selected package {} installed", record.atom),
                    weight,
                );
            }
        }

        if options.depclean {
            let weight = ledger.weight(self.weights.keep_installed.saturating_add(self.weights.not_needed));
            for (name, atoms) in groups {
                if new_selected.contains(name) || self.env.universe.installed(name).is_some() {
                    continue;
                }
                for atom in atoms.iter().filter(|a| !self.env.selection.is_selected(a)) {
                    ledger.issue(
                        soft,
                        vec![!Literal::package(atom)],
                        Tier::KeepInstalled,
                        format!("avoid installing {} while cleaning", atom),
                        weight,
                    );
                }
            }
        }
    }

    fn weigh_default_flag(
        &self,
        atom: &FQAtom,
        flag: &str,
        new_selected: &BTreeSet<QualifiedAtom>,
        options: &ResolveOptions,
        soft: &mut Formula,
        ledger: &mut TierLedger,
    ) -> Result<()> {
        let record = self.record(atom)?;
        let (enabled, description) = if self.reconsiders_flags(atom, new_selected, options) {
            if user_setting(&self.env.flags.user_flags(atom), flag).is_some()
                || user_setting(&self.env.flags.global_user_flags(), flag).is_some()
            {
                return Ok(());
            }
            let enabled = self.env.flags.effective_flags(&record).0.contains(flag);
            (enabled, format!("default value of {}", flag))
        } else {
            let enabled = self.env.enabled_flags(&record).contains(flag);
            (enabled, format!("installed value of {}", flag))
        };

        let weight = ledger.weight(self.weights.default_flag);
        ledger.issue(
            soft,
            vec![!Literal::package(atom), Literal::flag(atom, flag, enabled)],
            Tier::DefaultFlag,
            description,
            weight,
        );
        Ok(())
    }

    fn weigh_user_flag(
        &self,
        atom: &FQAtom,
        flag: &str,
        new_selected: &BTreeSet<QualifiedAtom>,
        options: &ResolveOptions,
        soft: &mut Formula,
        ledger: &mut TierLedger,
    ) {
        if !self.reconsiders_flags(atom, new_selected, options) {
            return;
        }
        // per-package settings override global ones
        let setting = user_setting(&self.env.flags.user_flags(atom), flag)
            .or_else(|| user_setting(&self.env.flags.global_user_flags(), flag));
        if let Some(enabled) = setting {
            let weight = ledger.weight(self.weights.user_flag);
            ledger.issue(
                soft,
                vec![!Literal::package(atom), Literal::flag(atom, flag, enabled)],
                Tier::UserFlag,
                format!("user setting of {}", flag),
                weight,
            );
        }
    }
}

/// The state a flag set gives `flag`, if it mentions it at all
fn user_setting(settings: &BTreeSet<String>, flag: &str) -> Option<bool> {
    settings.iter().find_map(|setting| {
        let (name, enabled) = parse_flag_setting(setting);
        (name == flag).then_some(enabled)
    })
}
