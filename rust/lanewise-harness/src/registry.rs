//! Named scenarios and the configurations each one must run under.

use lanewise_codegen::Tier;
use serde::Serialize;

use crate::driver::ScenarioCtx;
use crate::error::HarnessError;
use crate::runner::ExecConfig;

pub type ScenarioFn = fn(&mut ScenarioCtx) -> Result<(), HarnessError>;

/// Which configurations of a run's matrix a scenario uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Coverage {
    /// Tier independent: every configuration of the matrix.
    AllTiers,
    /// Only the optimizing tier.
    OptimizingOnly,
}

impl Coverage {
    /// The configurations of `matrix` this coverage selects, always
    /// including scalar-lowered/optimizing.
    pub fn select(self, matrix: &[ExecConfig]) -> Vec<ExecConfig> {
        let mut configs: Vec<ExecConfig> = matrix
            .iter()
            .copied()
            .filter(|c| match self {
                Coverage::AllTiers => true,
                Coverage::OptimizingOnly => c.tier == Tier::Optimizing,
            })
            .collect();
        if !configs.contains(&ExecConfig::BASELINE_REQUIREMENT) {
            configs.push(ExecConfig::BASELINE_REQUIREMENT);
        }
        configs
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Scenario {
    pub name: &'static str,
    pub description: &'static str,
    pub coverage: Coverage,
    pub run: ScenarioFn,
}

/// An ordered set of uniquely named scenarios.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    scenarios: Vec<Scenario>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in scenario table.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for scenario in crate::scenarios::SCENARIOS {
            registry.scenarios.push(*scenario);
        }
        registry
    }

    /// Add a scenario; a scenario with the same name is replaced.
    pub fn register(&mut self, scenario: Scenario) {
        match self.scenarios.iter_mut().find(|s| s.name == scenario.name) {
            Some(existing) => *existing = scenario,
            None => self.scenarios.push(scenario),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scenario> {
        self.scenarios.iter()
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// Scenarios whose name contains `filter`; all of them for `None`.
    pub fn matching<'a>(&'a self, filter: Option<&'a str>) -> impl Iterator<Item = &'a Scenario> {
        self.scenarios
            .iter()
            .filter(move |s| filter.map_or(true, |f| s.name.contains(f)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanewise_codegen::LoweringMode;
    use std::collections::HashSet;

    fn noop(_: &mut ScenarioCtx) -> Result<(), HarnessError> {
        Ok(())
    }

    #[test]
    fn builtin_names_are_unique() {
        let registry = Registry::builtin();
        let names: HashSet<_> = registry.iter().map(|s| s.name).collect();
        assert_eq!(names.len(), registry.len());
        assert!(!registry.is_empty());
    }

    #[test]
    fn register_replaces_by_name() {
        let mut registry = Registry::new();
        let first = Scenario {
            name: "x",
            description: "first",
            coverage: Coverage::AllTiers,
            run: noop,
        };
        registry.register(first);
        registry.register(Scenario {
            description: "second",
            ..first
        });
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("x").map(|s| s.description), Some("second"));
    }

    #[test]
    fn filter_matches_substrings() {
        let registry = Registry::builtin();
        let all_true: Vec<_> = registry.matching(Some("all_true")).collect();
        assert_eq!(all_true.len(), 3);
        assert_eq!(registry.matching(None).count(), registry.len());
    }

    #[test]
    fn coverage_always_includes_lowered_optimizing() {
        let native_only = [ExecConfig::new(LoweringMode::Native, Tier::Baseline)];
        assert_eq!(
            Coverage::OptimizingOnly.select(&native_only),
            vec![ExecConfig::BASELINE_REQUIREMENT]
        );
        assert_eq!(Coverage::AllTiers.select(&ExecConfig::matrix()).len(), 4);
        assert_eq!(Coverage::OptimizingOnly.select(&ExecConfig::matrix()).len(), 2);
    }
}
