//! Running scenarios across configurations and judging the results.
//!
//! A scenario receives a [`ScenarioCtx`] holding the configurations it must
//! run under. Each check compiles the module fresh for every configuration,
//! runs the same probe on each instance, and requires that
//!
//! 1. every configuration observes the same value, and
//! 2. that value equals an expectation computed independently on the host.
//!
//! A failure names a configuration that missed the expectation. When all of
//! them miss it and they also differ among themselves, the failure is a
//! disagreement between the first configuration and one that differs.
//!
//! The first failure ends the scenario. The driver turns the scenario's
//! result into an [`Outcome`]; nothing is retried.

use std::fmt::Debug;

use lanewise_codegen::TrapCode;
use lanewise_wasm::Module;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::HarnessError;
use crate::registry::{Coverage, Registry, Scenario};
use crate::runner::{ExecConfig, Instance, Runner};

// ---------------------------------------------------------------------------
// Scenario context
// ---------------------------------------------------------------------------

pub struct ScenarioCtx {
    name: &'static str,
    configs: Vec<ExecConfig>,
    runner: Runner,
    checks: usize,
}

impl ScenarioCtx {
    pub fn new(name: &'static str, configs: Vec<ExecConfig>) -> Self {
        Self {
            name,
            configs,
            runner: Runner::new(),
            checks: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn configs(&self) -> &[ExecConfig] {
        &self.configs
    }

    /// Number of checks that passed so far.
    pub fn checks(&self) -> usize {
        self.checks
    }

    /// Turn the vector feature gate on or off for later checks.
    pub fn set_simd(&mut self, simd: bool) {
        self.runner = self.runner.with_simd(simd);
    }

    /// Run `probe` on a fresh instance per configuration; every result must
    /// equal `expected`. A failure names a configuration that got something
    /// else.
    pub fn check<T, F>(
        &mut self,
        check: &str,
        module: &Module,
        expected: T,
        mut probe: F,
    ) -> Result<(), HarnessError>
    where
        T: PartialEq + Debug,
        F: FnMut(&mut Instance) -> Result<T, HarnessError>,
    {
        let mut observed: Vec<(ExecConfig, T)> = Vec::with_capacity(self.configs.len());
        for &config in &self.configs {
            let mut instance = self.runner.instantiate(module, config)?;
            let value = probe(&mut instance)?;
            debug!(scenario = self.name, check, %config, ?value, "observed");
            observed.push((config, value));
        }

        // Blame a configuration that misses the expectation. Disagreement is
        // only reported when every configuration misses it.
        let Some((config, actual)) = observed.iter().find(|(_, value)| *value != expected) else {
            self.checks += 1;
            return Ok(());
        };
        let all_wrong = observed.iter().all(|(_, value)| *value != expected);
        if all_wrong {
            if let Some((reference, first)) = observed.first() {
                if let Some((other, value)) = observed[1..].iter().find(|(_, v)| v != first) {
                    return Err(HarnessError::Disagreement {
                        config: *other,
                        reference: *reference,
                        check: check.to_string(),
                        expected: format!("{first:?}"),
                        actual: format!("{value:?}"),
                    });
                }
            }
        }
        Err(HarnessError::Mismatch {
            config: *config,
            check: check.to_string(),
            expected: format!("{expected:?}"),
            actual: format!("{actual:?}"),
        })
    }

    /// Run `probe` per configuration and require that it traps with `code`.
    pub fn expect_trap<T, F>(
        &mut self,
        check: &str,
        module: &Module,
        code: TrapCode,
        mut probe: F,
    ) -> Result<(), HarnessError>
    where
        T: Debug,
        F: FnMut(&mut Instance) -> Result<T, HarnessError>,
    {
        for &config in &self.configs {
            let mut instance = self.runner.instantiate(module, config)?;
            match probe(&mut instance) {
                Err(HarnessError::Trap { code: got, .. }) if got == code => {}
                Err(HarnessError::Trap { code: got, .. }) => {
                    return Err(HarnessError::Mismatch {
                        config,
                        check: check.to_string(),
                        expected: format!("trap: {code}"),
                        actual: format!("trap: {got}"),
                    })
                }
                Err(other) => return Err(other),
                Ok(value) => {
                    return Err(HarnessError::Mismatch {
                        config,
                        check: check.to_string(),
                        expected: format!("trap: {code}"),
                        actual: format!("returned {value:?}"),
                    })
                }
            }
        }
        self.checks += 1;
        Ok(())
    }

    /// Require that compiling `module` fails under every configuration.
    pub fn expect_compile_error(&mut self, check: &str, module: &Module) -> Result<(), HarnessError> {
        for &config in &self.configs {
            match self.runner.instantiate(module, config) {
                Err(HarnessError::Compile { source, .. }) => {
                    debug!(scenario = self.name, check, %config, %source, "rejected as expected");
                }
                Err(other) => return Err(other),
                Ok(_) => {
                    return Err(HarnessError::Mismatch {
                        config,
                        check: check.to_string(),
                        expected: "compilation error".to_string(),
                        actual: "module compiled".to_string(),
                    })
                }
            }
        }
        self.checks += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Outcomes and reports
// ---------------------------------------------------------------------------

/// How one scenario ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    Mismatch {
        config: ExecConfig,
        check: String,
        expected: String,
        actual: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reference: Option<ExecConfig>,
    },
    Trapped {
        config: ExecConfig,
        trap: String,
    },
    Failed {
        #[serde(skip_serializing_if = "Option::is_none")]
        config: Option<ExecConfig>,
        message: String,
    },
}

impl Outcome {
    pub fn from_result(result: Result<(), HarnessError>) -> Self {
        let err = match result {
            Ok(()) => return Outcome::Passed,
            Err(err) => err,
        };
        match err {
            HarnessError::Mismatch {
                config,
                check,
                expected,
                actual,
            } => Outcome::Mismatch {
                config,
                check,
                expected,
                actual,
                reference: None,
            },
            HarnessError::Disagreement {
                config,
                reference,
                check,
                expected,
                actual,
            } => Outcome::Mismatch {
                config,
                check,
                expected,
                actual,
                reference: Some(reference),
            },
            HarnessError::Trap { config, code } => Outcome::Trapped {
                config,
                trap: code.to_string(),
            },
            other => Outcome::Failed {
                config: other.config(),
                message: other.to_string(),
            },
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Outcome::Passed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Passed => "ok",
            Outcome::Mismatch { .. } => "MISMATCH",
            Outcome::Trapped { .. } => "TRAPPED",
            Outcome::Failed { .. } => "FAILED",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Passed => f.write_str("ok"),
            Outcome::Mismatch {
                config,
                check,
                expected,
                actual,
                reference: None,
            } => write!(f, "[{config}] {check}: expected {expected}, got {actual}"),
            Outcome::Mismatch {
                config,
                check,
                expected,
                actual,
                reference: Some(reference),
            } => write!(
                f,
                "[{config}] {check}: got {actual}, but [{reference}] got {expected}"
            ),
            Outcome::Trapped { config, trap } => write!(f, "[{config}] trapped: {trap}"),
            Outcome::Failed { message, .. } => f.write_str(message),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub coverage: Coverage,
    pub configs: Vec<ExecConfig>,
    pub checks: usize,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub scenarios: Vec<ScenarioReport>,
    pub passed: usize,
    pub failed: usize,
}

impl RunReport {
    pub fn push(&mut self, report: ScenarioReport) {
        if report.outcome.is_pass() {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        self.scenarios.push(report);
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &ScenarioReport> {
        self.scenarios.iter().filter(|s| !s.outcome.is_pass())
    }

    pub fn to_json(&self) -> Result<String, HarnessError> {
        serde_json::to_string_pretty(self).map_err(|e| HarnessError::Config(e.to_string()))
    }

    /// One line per scenario, then a summary line.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let width = self.scenarios.iter().map(|s| s.name.len()).max().unwrap_or(0);
        for s in &self.scenarios {
            out.push_str(&format!(
                "{:<8} {:<width$}  {} config(s), {} check(s)\n",
                s.outcome.label(),
                s.name,
                s.configs.len(),
                s.checks,
            ));
            if !s.outcome.is_pass() {
                out.push_str(&format!("         {}\n", s.outcome));
            }
        }
        out.push_str(&format!(
            "\n{} passed, {} failed, {} total\n",
            self.passed,
            self.failed,
            self.scenarios.len()
        ));
        out
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Runs registered scenarios over a configuration matrix.
#[derive(Debug, Clone)]
pub struct Driver {
    registry: Registry,
    matrix: Vec<ExecConfig>,
}

impl Driver {
    pub fn new(registry: Registry, matrix: Vec<ExecConfig>) -> Self {
        Self { registry, matrix }
    }

    /// The built-in scenarios over the full matrix.
    pub fn builtin() -> Self {
        Self::new(Registry::builtin(), ExecConfig::matrix())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn matrix(&self) -> &[ExecConfig] {
        &self.matrix
    }

    pub fn run(&self, name: &str) -> Result<ScenarioReport, HarnessError> {
        let scenario = self
            .registry
            .get(name)
            .ok_or_else(|| HarnessError::UnknownScenario(name.to_string()))?;
        Ok(self.run_scenario(scenario))
    }

    /// Run every scenario whose name contains `filter`.
    pub fn run_matching(&self, filter: Option<&str>) -> RunReport {
        let mut report = RunReport::default();
        for scenario in self.registry.matching(filter) {
            report.push(self.run_scenario(scenario));
        }
        info!(
            passed = report.passed,
            failed = report.failed,
            "run finished"
        );
        report
    }

    fn run_scenario(&self, scenario: &Scenario) -> ScenarioReport {
        let configs = scenario.coverage.select(&self.matrix);
        debug!(scenario = scenario.name, configs = configs.len(), "starting");
        let mut ctx = ScenarioCtx::new(scenario.name, configs.clone());
        let outcome = Outcome::from_result((scenario.run)(&mut ctx));
        match &outcome {
            Outcome::Passed => info!(scenario = scenario.name, checks = ctx.checks(), "passed"),
            other => warn!(scenario = scenario.name, outcome = %other, "failed"),
        }
        ScenarioReport {
            name: scenario.name.to_string(),
            coverage: scenario.coverage,
            configs,
            checks: ctx.checks(),
            outcome,
        }
    }
}
