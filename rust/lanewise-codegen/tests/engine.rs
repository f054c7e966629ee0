//! Engine contract tests: compile, instantiate, call, read globals, across
//! both lowering modes and both tiers.

use lanewise_codegen::{
    CodegenError, Engine, EngineConfig, Instance, LoweringMode, Tier, TrapCode, Val,
};
use lanewise_wasm::{
    ConstValue, FuncType, LaneShape, Module, ModuleBuilder, ScalarOp, SimdBinop, SimdUnop,
    ValueType, V128,
};

use ValueType::{F32, I32, V128 as Vec128};

fn all_configs() -> Vec<EngineConfig> {
    let mut out = Vec::new();
    for mode in [LoweringMode::Native, LoweringMode::ScalarLowered] {
        for tier in [Tier::Baseline, Tier::Optimizing] {
            out.push(EngineConfig::new(mode, tier));
        }
    }
    out
}

fn instantiate(module: &Module, config: EngineConfig) -> Instance {
    Engine::new(config)
        .compile(module.bytes())
        .unwrap_or_else(|e| panic!("{config}: compile failed: {e}"))
        .instantiate()
        .unwrap()
}

/// Run `f` under every config and check all of them return the same thing.
fn agree<T: PartialEq + std::fmt::Debug>(
    module: &Module,
    mut f: impl FnMut(&mut Instance) -> T,
) -> T {
    let mut results = Vec::new();
    for config in all_configs() {
        let mut instance = instantiate(module, config);
        results.push((config, f(&mut instance)));
    }
    let (first_config, first) = &results[0];
    for (config, r) in &results[1..] {
        assert_eq!(r, first, "{config} disagrees with {first_config}");
    }
    results.remove(0).1
}

// ============================================================================
// Vector arithmetic
// ============================================================================

#[test]
fn vector_binops_round_trip_through_parameters() {
    let mut b = ModuleBuilder::new();
    let ops = [
        SimdBinop::I8x16Add,
        SimdBinop::I8x16Sub,
        SimdBinop::I16x8Mul,
        SimdBinop::I16x8Ne,
        SimdBinop::I32x4Mul,
        SimdBinop::I32x4Eq,
        SimdBinop::F32x4Min,
        SimdBinop::F32x4Max,
        SimdBinop::F32x4Ne,
        SimdBinop::V128Xor,
    ];
    let mut funcs = Vec::new();
    for op in ops {
        let f = b
            .new_function(FuncType::new([Vec128, Vec128], [Vec128]))
            .unwrap();
        b.body(&f)
            .unwrap()
            .local_get(0)
            .unwrap()
            .local_get(1)
            .unwrap()
            .binop(op)
            .unwrap();
        funcs.push(f);
    }
    let module = b.build().unwrap();

    let x = V128::from_f32x4([1.5, -2.0, 0.0, 1.0e10]);
    let y = V128::from_f32x4([0.5, -0.0, -0.0, 3.0]);
    let out = agree(&module, |inst| {
        funcs
            .iter()
            .map(|f| {
                inst.call(
                    f.index(),
                    &[Val::V128(x.into_bytes()), Val::V128(y.into_bytes())],
                )
                .unwrap()
            })
            .collect::<Vec<_>>()
    });

    // -0.0 orders below +0.0.
    let min = V128::from_bytes(out[6][0].as_v128().unwrap());
    assert_eq!(min.f32_lane(2).to_bits(), (-0.0f32).to_bits());
    let max = V128::from_bytes(out[7][0].as_v128().unwrap());
    assert_eq!(max.f32_lane(2).to_bits(), 0.0f32.to_bits());
    // f32x4.ne(-2.0, -0.0) is true, (0.0, -0.0) is false.
    let ne = V128::from_bytes(out[8][0].as_v128().unwrap());
    assert_eq!(ne.u32_lane(1), u32::MAX);
    assert_eq!(ne.u32_lane(2), 0);
}

#[test]
fn narrow_lanes_wrap() {
    let mut b = ModuleBuilder::new();
    let f = b.new_function(FuncType::new([I32], [I32])).unwrap();
    b.body(&f)
        .unwrap()
        .local_get(0)
        .unwrap()
        .splat(LaneShape::I16x8)
        .unwrap()
        .local_get(0)
        .unwrap()
        .splat(LaneShape::I16x8)
        .unwrap()
        .binop(SimdBinop::I16x8Mul)
        .unwrap()
        .extract_lane_u(LaneShape::I16x8, 7)
        .unwrap();
    let module = b.build().unwrap();
    let r = agree(&module, |inst| inst.call(0, &[Val::I32(0x1_0301)]).unwrap());
    // 0x0301 * 0x0301 = 0x90601 -> 0x0601.
    assert_eq!(r, vec![Val::I32(0x0601)]);
}

#[test]
fn unops_agree() {
    let mut b = ModuleBuilder::new();
    let ops = [
        SimdUnop::I8x16Neg,
        SimdUnop::I16x8Neg,
        SimdUnop::I32x4Neg,
        SimdUnop::F32x4Neg,
        SimdUnop::F32x4Abs,
        SimdUnop::F32x4Sqrt,
        SimdUnop::V128Not,
    ];
    for op in ops {
        let f = b.new_function(FuncType::new([Vec128], [Vec128])).unwrap();
        b.body(&f).unwrap().local_get(0).unwrap().unop(op).unwrap();
    }
    let module = b.build().unwrap();
    let input = V128::from_f32x4([4.0, 9.0, 0.25, -0.0]);
    let out = agree(&module, |inst| {
        (0..ops.len() as u32)
            .map(|i| inst.call(i, &[Val::V128(input.into_bytes())]).unwrap())
            .collect::<Vec<_>>()
    });
    let sqrt = V128::from_bytes(out[5][0].as_v128().unwrap());
    assert_eq!(sqrt.f32_lane(0), 2.0);
    assert_eq!(sqrt.f32_lane(2), 0.5);
    assert_eq!(sqrt.f32_lane(3).to_bits(), (-0.0f32).to_bits());
    let abs = V128::from_bytes(out[4][0].as_v128().unwrap());
    assert_eq!(abs.f32_lane(3).to_bits(), 0);
    let neg = V128::from_bytes(out[3][0].as_v128().unwrap());
    assert_eq!(neg.f32_lane(1), -9.0);
}

#[test]
fn replace_lane_keeps_low_bits() {
    let mut b = ModuleBuilder::new();
    let f = b.new_function(FuncType::new([I32], [Vec128])).unwrap();
    b.body(&f)
        .unwrap()
        .v128_const(V128::from_i8x16([0; 16]))
        .unwrap()
        .local_get(0)
        .unwrap()
        .replace_lane(LaneShape::I8x16, 13)
        .unwrap();
    let module = b.build().unwrap();
    let r = agree(&module, |inst| inst.call(0, &[Val::I32(0x1ff)]).unwrap());
    let mut expected = [0u8; 16];
    expected[13] = 0xff;
    assert_eq!(r, vec![Val::V128(expected)]);
}

// ============================================================================
// Calls and globals
// ============================================================================

#[test]
fn vectors_cross_call_boundaries() {
    let mut b = ModuleBuilder::new();
    let entry = b.new_function(FuncType::new([F32], [F32])).unwrap();
    let neg = b.new_function(FuncType::new([Vec128], [Vec128])).unwrap();
    b.body(&neg)
        .unwrap()
        .local_get(0)
        .unwrap()
        .unop(SimdUnop::F32x4Neg)
        .unwrap();
    b.body(&entry)
        .unwrap()
        .local_get(0)
        .unwrap()
        .splat(LaneShape::F32x4)
        .unwrap()
        .call(&neg)
        .unwrap()
        .extract_lane(LaneShape::F32x4, 3)
        .unwrap();
    b.export(&entry, "main").unwrap();
    let module = b.build().unwrap();
    let r = agree(&module, |inst| inst.call_export("main", &[Val::f32(1.25)]).unwrap());
    assert_eq!(r, vec![Val::f32(-1.25)]);
}

#[test]
fn vector_global_is_rewritten_and_read_back() {
    let mut b = ModuleBuilder::new();
    let g = b
        .add_global_init(ConstValue::V128(V128::from_i32x4([1, 2, 3, 4])))
        .unwrap();
    let f = b.new_function(FuncType::new([], [])).unwrap();
    b.body(&f)
        .unwrap()
        .global_get(&g)
        .unwrap()
        .global_get(&g)
        .unwrap()
        .binop(SimdBinop::I32x4Add)
        .unwrap()
        .global_set(&g)
        .unwrap();
    let module = b.build().unwrap();
    let bytes = agree(&module, |inst| {
        assert_eq!(
            inst.read_global(0).unwrap(),
            V128::from_i32x4([1, 2, 3, 4]).into_bytes()
        );
        inst.call(0, &[]).unwrap();
        inst.read_global(0).unwrap()
    });
    assert_eq!(V128::from_bytes(bytes), V128::from_i32x4([2, 4, 6, 8]));
}

#[test]
fn scalar_globals_use_low_bytes() {
    let mut b = ModuleBuilder::new();
    let g = b.add_global(F32).unwrap();
    let f = b.new_function(FuncType::new([], [])).unwrap();
    b.body(&f)
        .unwrap()
        .f32_const(-3.5)
        .unwrap()
        .global_set(&g)
        .unwrap();
    let module = b.build().unwrap();
    let v = agree(&module, |inst| {
        inst.call(0, &[]).unwrap();
        inst.global_value(0).unwrap()
    });
    assert_eq!(v, Val::f32(-3.5));
}

#[test]
fn instances_do_not_share_globals() {
    let mut b = ModuleBuilder::new();
    let g = b.add_global_init(ConstValue::I32(10)).unwrap();
    let f = b.new_function(FuncType::new([], [])).unwrap();
    b.body(&f)
        .unwrap()
        .global_get(&g)
        .unwrap()
        .i32_const(1)
        .unwrap()
        .scalar(ScalarOp::I32Add)
        .unwrap()
        .global_set(&g)
        .unwrap();
    let module = b.build().unwrap();
    let compiled = Engine::default().compile(module.bytes()).unwrap();
    let mut a = compiled.instantiate().unwrap();
    let fresh = compiled.instantiate().unwrap();
    a.call(0, &[]).unwrap();
    assert_eq!(a.global_value(0).unwrap(), Val::I32(11));
    assert_eq!(fresh.global_value(0).unwrap(), Val::I32(10));
}

// ============================================================================
// Traps
// ============================================================================

fn division_module() -> Module {
    let mut b = ModuleBuilder::new();
    let div_s = b.new_function(FuncType::new([I32, I32], [I32])).unwrap();
    let div_u = b.new_function(FuncType::new([I32, I32], [I32])).unwrap();
    let nested = b
        .new_function(FuncType::new([I32], [Vec128]))
        .unwrap();
    for (f, op) in [(&div_s, ScalarOp::I32DivS), (&div_u, ScalarOp::I32DivU)] {
        b.body(f)
            .unwrap()
            .local_get(0)
            .unwrap()
            .local_get(1)
            .unwrap()
            .scalar(op)
            .unwrap();
    }
    // Traps inside a callee must abort the caller too.
    b.body(&nested)
        .unwrap()
        .i32_const(7)
        .unwrap()
        .local_get(0)
        .unwrap()
        .call(&div_s)
        .unwrap()
        .splat(LaneShape::I32x4)
        .unwrap();
    b.build().unwrap()
}

#[test]
fn division_traps_in_every_config() {
    let module = division_module();
    for config in all_configs() {
        let mut inst = instantiate(&module, config);
        assert_eq!(
            inst.call(0, &[Val::I32(-7), Val::I32(2)]).unwrap(),
            vec![Val::I32(-3)],
            "{config}"
        );
        assert_eq!(
            inst.call(1, &[Val::I32(-7), Val::I32(2)]).unwrap(),
            vec![Val::I32(0x7fff_fffc)],
            "{config}"
        );
        assert!(matches!(
            inst.call(0, &[Val::I32(1), Val::I32(0)]),
            Err(CodegenError::Trap(TrapCode::IntegerDivisionByZero))
        ));
        assert!(matches!(
            inst.call(1, &[Val::I32(1), Val::I32(0)]),
            Err(CodegenError::Trap(TrapCode::IntegerDivisionByZero))
        ));
        assert!(matches!(
            inst.call(0, &[Val::I32(i32::MIN), Val::I32(-1)]),
            Err(CodegenError::Trap(TrapCode::IntegerOverflow))
        ));
        assert!(matches!(
            inst.call(2, &[Val::I32(0)]),
            Err(CodegenError::Trap(TrapCode::IntegerDivisionByZero))
        ));
        // The instance stays usable after a trap.
        let ok = inst.call(2, &[Val::I32(7)]).unwrap();
        assert_eq!(ok, vec![Val::V128(V128::from_i32x4([1; 4]).into_bytes())]);
    }
}

// ============================================================================
// Feature gate and failures
// ============================================================================

#[test]
fn simd_gate_off_rejects_vector_modules() {
    let mut b = ModuleBuilder::new();
    let f = b.new_function(FuncType::new([], [Vec128])).unwrap();
    b.body(&f).unwrap().v128_const(V128::ZERO).unwrap();
    let module = b.build().unwrap();
    for config in all_configs() {
        let err = Engine::new(config.with_simd(false))
            .compile(module.bytes())
            .unwrap_err();
        assert!(matches!(err, CodegenError::Invalid(_)), "{config}: {err}");
    }
}

#[test]
fn simd_gate_off_still_compiles_scalar_modules() {
    let mut b = ModuleBuilder::new();
    let f = b.new_function(FuncType::new([I32], [I32])).unwrap();
    b.body(&f)
        .unwrap()
        .local_get(0)
        .unwrap()
        .scalar(ScalarOp::I32Eqz)
        .unwrap();
    let module = b.build().unwrap();
    let mut inst = Engine::new(EngineConfig::default().with_simd(false))
        .compile(module.bytes())
        .unwrap()
        .instantiate()
        .unwrap();
    assert_eq!(inst.call(0, &[Val::I32(0)]).unwrap(), vec![Val::I32(1)]);
}

#[test]
fn unknown_export_is_reported() {
    let mut b = ModuleBuilder::new();
    b.new_function(FuncType::new([], [])).unwrap();
    let module = b.build().unwrap();
    let mut inst = instantiate(&module, EngineConfig::default());
    assert!(matches!(
        inst.call_export("missing", &[]),
        Err(CodegenError::UnknownExport(name)) if name == "missing"
    ));
}
