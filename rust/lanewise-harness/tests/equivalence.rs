//! The built-in registry across the full configuration matrix.

use lanewise_codegen::{LoweringMode, Tier, Val};
use lanewise_harness::{
    Coverage, Driver, ExecConfig, HarnessError, Outcome, Registry, Runner, Scenario, ScenarioCtx,
};
use lanewise_wasm::{FuncType, LaneShape, ModuleBuilder, SimdBinop, ValueType};

#[test]
fn every_builtin_scenario_passes() {
    let report = Driver::builtin().run_matching(None);
    for failure in report.failures() {
        eprintln!("{}: {}", failure.name, failure.outcome);
    }
    assert!(report.is_success(), "{}", report.render_text());
    assert_eq!(report.passed, Registry::builtin().len());
    for scenario in &report.scenarios {
        assert!(scenario.checks > 0, "{} ran no checks", scenario.name);
    }
}

#[test]
fn coverage_decides_config_count() {
    let report = Driver::builtin().run_matching(None);
    for scenario in &report.scenarios {
        let expected = match scenario.coverage {
            Coverage::AllTiers => 4,
            Coverage::OptimizingOnly => 2,
        };
        assert_eq!(scenario.configs.len(), expected, "{}", scenario.name);
        assert!(scenario.configs.contains(&ExecConfig::BASELINE_REQUIREMENT));
    }
}

#[test]
fn repeated_runs_are_identical() {
    let driver = Driver::builtin();
    let first = driver.run_matching(Some("call_return"));
    let second = driver.run_matching(Some("call_return"));
    let outcomes = |r: &lanewise_harness::RunReport| -> Vec<(String, Outcome, usize)> {
        r.scenarios
            .iter()
            .map(|s| (s.name.clone(), s.outcome.clone(), s.checks))
            .collect()
    };
    assert_eq!(outcomes(&first), outcomes(&second));
    assert_eq!(first.scenarios.len(), 4);
}

#[test]
fn lowered_only_matrix_still_passes() {
    let driver = Driver::new(
        Registry::builtin(),
        ExecConfig::product(&[LoweringMode::ScalarLowered], &[Tier::Baseline, Tier::Optimizing]),
    );
    let report = driver.run_matching(Some("true"));
    assert_eq!(report.scenarios.len(), 6);
    assert!(report.is_success(), "{}", report.render_text());
}

#[test]
fn named_scenario_reports_its_checks() {
    let report = Driver::builtin().run("i8x16_eq_s128_const").unwrap();
    assert_eq!(report.outcome, Outcome::Passed);
    assert_eq!(report.checks, 2);
    assert!(report
        .configs
        .iter()
        .all(|c| c.tier == Tier::Optimizing));
}

fn i16_wrong_width(ctx: &mut ScenarioCtx) -> Result<(), HarnessError> {
    // i16x8.add where the host side (wrongly) expects i32 lanes.
    let mut b = ModuleBuilder::new();
    let f = b.new_function(FuncType::new([ValueType::I32], [ValueType::I32]))?;
    b.body(&f)?
        .local_get(0)?
        .splat(LaneShape::I32x4)?
        .local_get(0)?
        .splat(LaneShape::I32x4)?
        .binop(SimdBinop::I16x8Add)?
        .extract_lane(LaneShape::I32x4, 0)?;
    let module = b.build()?;
    ctx.check("lane 0", &module, Val::I32(0x0001_0000), |inst| {
        inst.call1(f.index(), &[Val::I32(0x8000)])
    })
}

#[test]
fn wrong_expectation_is_a_mismatch_not_a_disagreement() {
    let mut registry = Registry::new();
    registry.register(Scenario {
        name: "i16_wrong_width",
        description: "",
        coverage: Coverage::AllTiers,
        run: i16_wrong_width,
    });
    let report = Driver::new(registry, ExecConfig::matrix())
        .run("i16_wrong_width")
        .unwrap();
    match report.outcome {
        Outcome::Mismatch {
            reference: None,
            actual,
            ..
        } => assert_eq!(actual, "I32(0)"),
        other => panic!("unexpected outcome {other}"),
    }
}

#[test]
fn runner_without_simd_rejects_vector_modules() {
    let mut b = ModuleBuilder::new();
    let f = b
        .new_function(FuncType::new([ValueType::V128], [ValueType::V128]))
        .unwrap();
    b.body(&f).unwrap().local_get(0).unwrap();
    let module = b.build().unwrap();
    for config in ExecConfig::matrix() {
        assert!(Runner::new().instantiate(&module, config).is_ok());
        assert!(matches!(
            Runner::new().with_simd(false).instantiate(&module, config),
            Err(HarnessError::Compile { .. })
        ));
    }
}
