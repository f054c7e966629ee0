//! The built-in scenario catalog.
//!
//! Each scenario builds its own module, runs it under every configuration
//! its coverage selects, and compares against expectations computed by
//! [`crate::host`]. The inputs are fixed and chosen so that no float result
//! is a NaN, which keeps every comparison bit-exact.

use lanewise_codegen::{TrapCode, Val};
use lanewise_wasm::{
    ConstValue, FuncRef, FuncType, LaneShape, Module, ModuleBuilder, ScalarOp, SimdBinop,
    SimdUnop, ValueType, V128,
};

use crate::driver::ScenarioCtx;
use crate::error::HarnessError;
use crate::host;
use crate::registry::{Coverage, Scenario};
use crate::runner::Instance;

use ValueType::{F32, I32, V128 as Vec128};

type Outcome = Result<(), HarnessError>;

pub static SCENARIOS: &[Scenario] = &[
    Scenario {
        name: "i8x16_splat_f32x4_sqrt",
        description: "i8x16 splat of 0x5b reinterpreted as f32x4, sqrt, stored to a global",
        coverage: Coverage::AllTiers,
        run: i8x16_splat_f32x4_sqrt,
    },
    Scenario {
        name: "f32x4_call_return",
        description: "f32x4.neg in a callee taking and returning v128",
        coverage: Coverage::AllTiers,
        run: f32x4_call_return,
    },
    Scenario {
        name: "i8x16_call_return",
        description: "i8x16.add in a callee taking two v128 arguments",
        coverage: Coverage::AllTiers,
        run: i8x16_call_return,
    },
    Scenario {
        name: "i16x8_call_return",
        description: "i16x8.add in a callee taking two v128 arguments",
        coverage: Coverage::AllTiers,
        run: i16x8_call_return,
    },
    Scenario {
        name: "i32x4_call_return",
        description: "i32x4.add in a callee taking two v128 arguments",
        coverage: Coverage::AllTiers,
        run: i32x4_call_return,
    },
    Scenario {
        name: "i8x16_eq_s128_const",
        description: "chained i8x16.eq over three constant vectors, signed lane extract",
        coverage: Coverage::OptimizingOnly,
        run: i8x16_eq_s128_const,
    },
    Scenario {
        name: "f32x4_min_s128_const",
        description: "f32x4.min of two constant vectors",
        coverage: Coverage::OptimizingOnly,
        run: f32x4_min_s128_const,
    },
    Scenario {
        name: "all_true_i8x16",
        description: "i32x4 splat reduced with i8x16.all_true",
        coverage: Coverage::AllTiers,
        run: all_true_i8x16,
    },
    Scenario {
        name: "all_true_i16x8",
        description: "i32x4 splat reduced with i16x8.all_true",
        coverage: Coverage::AllTiers,
        run: all_true_i16x8,
    },
    Scenario {
        name: "all_true_i32x4",
        description: "i32x4 splat reduced with i32x4.all_true",
        coverage: Coverage::AllTiers,
        run: all_true_i32x4,
    },
    Scenario {
        name: "any_true_i8x16",
        description: "v128.any_true on an i32x4 splat; the opcode ignores shape, so this is the same module checked under the i8x16 name",
        coverage: Coverage::AllTiers,
        run: any_true_i8x16,
    },
    Scenario {
        name: "any_true_i16x8",
        description: "v128.any_true on an i32x4 splat; the opcode ignores shape, so this is the same module checked under the i16x8 name",
        coverage: Coverage::AllTiers,
        run: any_true_i16x8,
    },
    Scenario {
        name: "any_true_i32x4",
        description: "v128.any_true on an i32x4 splat; the opcode ignores shape, so this is the same module checked under the i32x4 name",
        coverage: Coverage::AllTiers,
        run: any_true_i32x4,
    },
    Scenario {
        name: "narrow_lane_wrapping",
        description: "i8x16/i16x8/i32x4 arithmetic and comparisons at lane overflow boundaries",
        coverage: Coverage::AllTiers,
        run: narrow_lane_wrapping,
    },
    Scenario {
        name: "extract_lane_sign",
        description: "signed and unsigned extraction of narrow lanes with the top bit set",
        coverage: Coverage::AllTiers,
        run: extract_lane_sign,
    },
    Scenario {
        name: "f32x4_arith",
        description: "f32x4 arithmetic, min/max and comparisons including signed zeros",
        coverage: Coverage::AllTiers,
        run: f32x4_arith,
    },
    Scenario {
        name: "v128_bitwise",
        description: "v128 and/or/xor/not",
        coverage: Coverage::AllTiers,
        run: v128_bitwise,
    },
    Scenario {
        name: "i16x8_replace_lane",
        description: "replace one i16 lane and read every lane back",
        coverage: Coverage::AllTiers,
        run: i16x8_replace_lane,
    },
    Scenario {
        name: "v128_global_round_trip",
        description: "v128 global with a constant initializer, rewritten by a body",
        coverage: Coverage::AllTiers,
        run: v128_global_round_trip,
    },
    Scenario {
        name: "i32_division_traps",
        description: "i32.div_s/div_u traps, also through a vector-returning caller",
        coverage: Coverage::AllTiers,
        run: i32_division_traps,
    },
    Scenario {
        name: "simd_feature_gate",
        description: "vector modules fail to compile with the simd feature off",
        coverage: Coverage::AllTiers,
        run: simd_feature_gate,
    },
];

/// Fixed inputs for the splat-then-reduce scenarios.
const REDUCE_INPUTS: [i32; 10] = [
    0,
    1,
    0xff,
    0x00FF_00FF,
    0x0000_00FF,
    0x0101_0101,
    0x0001_0001,
    0x00FF_FF00,
    -1,
    i32::MIN,
];

fn binop_function(b: &mut ModuleBuilder, op: SimdBinop) -> Result<FuncRef, HarnessError> {
    let f = b.new_function(FuncType::new([Vec128, Vec128], [Vec128]))?;
    b.body(&f)?.local_get(0)?.local_get(1)?.binop(op)?;
    Ok(f)
}

fn unop_function(b: &mut ModuleBuilder, op: SimdUnop) -> Result<FuncRef, HarnessError> {
    let f = b.new_function(FuncType::new([Vec128], [Vec128]))?;
    b.body(&f)?.local_get(0)?.unop(op)?;
    Ok(f)
}

fn v128_result(inst: &mut Instance, f: &FuncRef, args: &[Val]) -> Result<V128, HarnessError> {
    match inst.call1(f.index(), args)? {
        Val::V128(bytes) => Ok(V128::from_bytes(bytes)),
        other => Err(HarnessError::Mismatch {
            config: inst.config(),
            check: format!("result type of function {}", f.index()),
            expected: "v128".to_string(),
            actual: other.to_string(),
        }),
    }
}

fn v(x: V128) -> Val {
    Val::V128(x.into_bytes())
}

// ---------------------------------------------------------------------------
// Reinterpretation and calls
// ---------------------------------------------------------------------------

fn i8x16_splat_f32x4_sqrt(ctx: &mut ScenarioCtx) -> Outcome {
    let mut b = ModuleBuilder::new();
    let g = b.add_global(Vec128)?;
    let f = b.new_function(FuncType::new([], []))?;
    b.body(&f)?
        .i32_const(0x5b)?
        .splat(LaneShape::I8x16)?
        .unop(SimdUnop::F32x4Sqrt)?
        .global_set(&g)?;
    let module = b.build()?;

    let expected = f32::from_bits(0x5b5b_5b5b).sqrt().to_bits();
    ctx.check("global lane 0 bits", &module, expected, |inst| {
        inst.call(f.index(), &[])?;
        let bytes = inst.read_global(g.index())?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    })?;
    ctx.check(
        "global, every lane",
        &module,
        V128::from_u32x4([expected; 4]),
        |inst| {
            inst.call(f.index(), &[])?;
            inst.read_global_v128(g.index())
        },
    )
}

fn f32x4_call_return(ctx: &mut ScenarioCtx) -> Outcome {
    let mut b = ModuleBuilder::new();
    let entry = b.new_function(FuncType::new([F32], [F32]))?;
    let neg = unop_function(&mut b, SimdUnop::F32x4Neg)?;
    b.body(&entry)?
        .local_get(0)?
        .splat(LaneShape::F32x4)?
        .call(&neg)?
        .extract_lane(LaneShape::F32x4, 0)?;
    b.export(&entry, "main")?;
    let module = b.build()?;

    let inputs = [1.0f32, -0.0, 3.5, 1.0e-30, -f32::MAX];
    let expected: Vec<Vec<Val>> = inputs.iter().map(|x| vec![Val::f32(-x)]).collect();
    ctx.check("main(x) lane 0", &module, expected, |inst| {
        inputs
            .iter()
            .map(|x| inst.call_export("main", &[Val::f32(*x)]))
            .collect()
    })
}

/// Callee `(v128, v128) -> v128` adding at `shape`; the caller splats its
/// argument twice, calls, and reads the first and the last lane.
fn int_call_return(ctx: &mut ScenarioCtx, shape: LaneShape, add: SimdBinop) -> Outcome {
    let last = shape.lane_count() - 1;
    let mut b = ModuleBuilder::new();
    let first_lane = b.new_function(FuncType::new([I32], [I32]))?;
    let last_lane = b.new_function(FuncType::new([I32], [I32]))?;
    let callee = binop_function(&mut b, add)?;
    for (f, lane) in [(&first_lane, 0), (&last_lane, last)] {
        let body = b
            .body(f)?
            .local_get(0)?
            .splat(shape)?
            .local_get(0)?
            .splat(shape)?
            .call(&callee)?;
        if shape.is_narrow() {
            body.extract_lane_u(shape, lane)?;
        } else {
            body.extract_lane(shape, lane)?;
        }
    }
    let module = b.build()?;

    let mask = match shape.lane_bits() {
        8 => 0xff_u32,
        16 => 0xffff,
        _ => u32::MAX,
    };
    let inputs = [1i32, 0x7f, 0xff, 0x1234, 0x7fff_ffff, -3];
    let expected: Vec<Val> = inputs
        .iter()
        .map(|s| Val::I32(((*s as u32).wrapping_mul(2) & mask) as i32))
        .collect();
    for (f, check) in [(&first_lane, "lane 0 of callee(s, s)"), (&last_lane, "last lane of callee(s, s)")] {
        ctx.check(check, &module, expected.clone(), |inst| {
            inputs
                .iter()
                .map(|s| inst.call1(f.index(), &[Val::I32(*s)]))
                .collect()
        })?;
    }
    Ok(())
}

fn i8x16_call_return(ctx: &mut ScenarioCtx) -> Outcome {
    int_call_return(ctx, LaneShape::I8x16, SimdBinop::I8x16Add)
}

fn i16x8_call_return(ctx: &mut ScenarioCtx) -> Outcome {
    int_call_return(ctx, LaneShape::I16x8, SimdBinop::I16x8Add)
}

fn i32x4_call_return(ctx: &mut ScenarioCtx) -> Outcome {
    int_call_return(ctx, LaneShape::I32x4, SimdBinop::I32x4Add)
}

// ---------------------------------------------------------------------------
// Constant vectors
// ---------------------------------------------------------------------------

const EQ_C1: V128 = V128::from_bytes([
    0x00, 0x00, 0x80, 0xbf, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x80, 0x3f, 0x00, 0x00, 0x00,
    0x40,
]);
const EQ_C2: V128 = V128::from_bytes([
    0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00, 0x01, 0x01, 0x01, 0x01, 0x02, 0x02, 0x02,
    0x02,
]);
const EQ_C3: V128 = V128::from_bytes([
    0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00,
]);

fn i8x16_eq_s128_const(ctx: &mut ScenarioCtx) -> Outcome {
    let mut b = ModuleBuilder::new();
    let lane4 = b.new_function(FuncType::new([], [I32]))?;
    let whole = b.new_function(FuncType::new([], [Vec128]))?;
    for f in [&lane4, &whole] {
        b.body(f)?
            .v128_const(EQ_C1)?
            .v128_const(EQ_C2)?
            .binop(SimdBinop::I8x16Eq)?
            .v128_const(EQ_C3)?
            .binop(SimdBinop::I8x16Eq)?;
    }
    b.body(&lane4)?.extract_lane_s(LaneShape::I8x16, 4)?;
    let module = b.build()?;

    let result = host::i8x16_eq(host::i8x16_eq(EQ_C1, EQ_C2), EQ_C3);
    ctx.check(
        "extract_lane_s 4",
        &module,
        Val::I32(i32::from(result.i8_lane(4))),
        |inst| inst.call1(lane4.index(), &[]),
    )?;
    ctx.check("whole vector", &module, result, |inst| {
        v128_result(inst, &whole, &[])
    })
}

fn f32x4_min_s128_const(ctx: &mut ScenarioCtx) -> Outcome {
    let a = V128::from_f32x4([1.0, 2.0, 3.0, 4.0]);
    let c = V128::from_f32x4([5.0, 6.0, 7.0, 8.0]);
    let mut b = ModuleBuilder::new();
    let lane0 = b.new_function(FuncType::new([], [F32]))?;
    let whole = b.new_function(FuncType::new([], [Vec128]))?;
    for f in [&lane0, &whole] {
        b.body(f)?
            .v128_const(a)?
            .v128_const(c)?
            .binop(SimdBinop::F32x4Min)?;
    }
    b.body(&lane0)?.extract_lane(LaneShape::F32x4, 0)?;
    let module = b.build()?;

    let result = host::map2_f32(a, c, host::wasm_fmin);
    ctx.check(
        "lane 0",
        &module,
        Val::f32(result.f32_lane(0)),
        |inst| inst.call1(lane0.index(), &[]),
    )?;
    ctx.check("whole vector", &module, result, |inst| {
        v128_result(inst, &whole, &[])
    })
}

// ---------------------------------------------------------------------------
// Reductions
// ---------------------------------------------------------------------------

/// `(x) -> i32x4.splat(x) |> reduce`, one module per reduction.
fn splat_reduce(
    ctx: &mut ScenarioCtx,
    check: &str,
    reduce: impl FnOnce(&mut lanewise_wasm::FunctionBody) -> Result<(), HarnessError>,
    expected: impl Fn(V128) -> i32,
) -> Outcome {
    let mut b = ModuleBuilder::new();
    let f = b.new_function(FuncType::new([I32], [I32]))?;
    reduce(b.body(&f)?.local_get(0)?.splat(LaneShape::I32x4)?)?;
    let module = b.build()?;

    let expected: Vec<Val> = REDUCE_INPUTS
        .iter()
        .map(|x| Val::I32(expected(host::i32x4_splat(*x))))
        .collect();
    ctx.check(check, &module, expected, |inst| {
        REDUCE_INPUTS
            .iter()
            .map(|x| inst.call1(f.index(), &[Val::I32(*x)]))
            .collect()
    })
}

fn all_true_i8x16(ctx: &mut ScenarioCtx) -> Outcome {
    splat_reduce(
        ctx,
        "i8x16.all_true(i32x4.splat(x))",
        |body| body.all_true(LaneShape::I8x16).map(drop).map_err(Into::into),
        |v| host::all_true(v, 1),
    )
}

fn all_true_i16x8(ctx: &mut ScenarioCtx) -> Outcome {
    splat_reduce(
        ctx,
        "i16x8.all_true(i32x4.splat(x))",
        |body| body.all_true(LaneShape::I16x8).map(drop).map_err(Into::into),
        |v| host::all_true(v, 2),
    )
}

fn all_true_i32x4(ctx: &mut ScenarioCtx) -> Outcome {
    splat_reduce(
        ctx,
        "i32x4.all_true(i32x4.splat(x))",
        |body| body.all_true(LaneShape::I32x4).map(drop).map_err(Into::into),
        |v| host::all_true(v, 4),
    )
}

fn any_true_i8x16(ctx: &mut ScenarioCtx) -> Outcome {
    splat_reduce(
        ctx,
        "any_true i8x16",
        |body| body.any_true(LaneShape::I8x16).map(drop).map_err(Into::into),
        host::any_true,
    )
}

fn any_true_i16x8(ctx: &mut ScenarioCtx) -> Outcome {
    splat_reduce(
        ctx,
        "any_true i16x8",
        |body| body.any_true(LaneShape::I16x8).map(drop).map_err(Into::into),
        host::any_true,
    )
}

fn any_true_i32x4(ctx: &mut ScenarioCtx) -> Outcome {
    splat_reduce(
        ctx,
        "any_true i32x4",
        |body| body.any_true(LaneShape::I32x4).map(drop).map_err(Into::into),
        host::any_true,
    )
}

// ---------------------------------------------------------------------------
// Lane arithmetic
// ---------------------------------------------------------------------------

fn narrow_lane_wrapping(ctx: &mut ScenarioCtx) -> Outcome {
    let a8 = V128::from_i8x16([
        127, -128, 0, -1, 1, 100, -100, 64, 127, -128, 5, -5, 0x55, -0x56, 0, 1,
    ]);
    let b8 = V128::from_i8x16([
        1, -1, -128, -1, 127, 100, 100, -64, -1, 1, 5, 5, 0x55, 0x56, 0, -1,
    ]);
    let a16 = V128::from_i16x8([i16::MAX, i16::MIN, 0x0101, -1, 0x00ff, 300, -300, 0x4000]);
    let b16 = V128::from_i16x8([2, -1, 0x0101, -1, 0x0100, 300, 300, 4]);
    let a32 = V128::from_i32x4([i32::MAX, i32::MIN, 0x0001_0000, -7]);
    let b32 = V128::from_i32x4([2, -1, 0x0001_0000, 7]);

    type Case = (SimdBinop, V128, V128, V128);
    let cases: Vec<Case> = vec![
        (SimdBinop::I8x16Add, a8, b8, host::map2_i8(a8, b8, i8::wrapping_add)),
        (SimdBinop::I8x16Sub, a8, b8, host::map2_i8(a8, b8, i8::wrapping_sub)),
        (SimdBinop::I8x16Eq, a8, b8, host::i8x16_eq(a8, b8)),
        (SimdBinop::I8x16Ne, a8, b8, host::map2_i8(a8, b8, |x, y| host::mask(x != y))),
        (SimdBinop::I16x8Add, a16, b16, host::map2_i16(a16, b16, i16::wrapping_add)),
        (SimdBinop::I16x8Sub, a16, b16, host::map2_i16(a16, b16, i16::wrapping_sub)),
        (SimdBinop::I16x8Mul, a16, b16, host::map2_i16(a16, b16, i16::wrapping_mul)),
        (SimdBinop::I16x8Eq, a16, b16, host::map2_i16(a16, b16, |x, y| host::mask(x == y))),
        (SimdBinop::I16x8Ne, a16, b16, host::map2_i16(a16, b16, |x, y| host::mask(x != y))),
        (SimdBinop::I32x4Add, a32, b32, host::map2_i32(a32, b32, i32::wrapping_add)),
        (SimdBinop::I32x4Sub, a32, b32, host::map2_i32(a32, b32, i32::wrapping_sub)),
        (SimdBinop::I32x4Mul, a32, b32, host::map2_i32(a32, b32, i32::wrapping_mul)),
        (SimdBinop::I32x4Eq, a32, b32, host::map2_i32(a32, b32, |x, y| host::mask(x == y))),
        (SimdBinop::I32x4Ne, a32, b32, host::map2_i32(a32, b32, |x, y| host::mask(x != y))),
    ];
    let negs = [
        (SimdUnop::I8x16Neg, a8, V128::from_i8x16(std::array::from_fn(|i| a8.i8_lane(i).wrapping_neg()))),
        (SimdUnop::I16x8Neg, a16, V128::from_i16x8(std::array::from_fn(|i| a16.i16_lane(i).wrapping_neg()))),
        (SimdUnop::I32x4Neg, a32, V128::from_i32x4(std::array::from_fn(|i| a32.i32_lane(i).wrapping_neg()))),
    ];

    let mut b = ModuleBuilder::new();
    let mut binops = Vec::new();
    for (op, ..) in &cases {
        binops.push(binop_function(&mut b, *op)?);
    }
    let mut unops = Vec::new();
    for (op, ..) in &negs {
        unops.push(unop_function(&mut b, *op)?);
    }
    let module = b.build()?;

    let expected: Vec<V128> = cases
        .iter()
        .map(|c| c.3)
        .chain(negs.iter().map(|n| n.2))
        .collect();
    ctx.check("every op on boundary lanes", &module, expected, |inst| {
        let mut out = Vec::new();
        for (f, (_, x, y, _)) in binops.iter().zip(&cases) {
            out.push(v128_result(inst, f, &[v(*x), v(*y)])?);
        }
        for (f, (_, x, _)) in unops.iter().zip(&negs) {
            out.push(v128_result(inst, f, &[v(*x)])?);
        }
        Ok(out)
    })
}

fn extract_lane_sign(ctx: &mut ScenarioCtx) -> Outcome {
    let pattern = V128::from_bytes([
        0x80, 0x7f, 0xff, 0x00, 0x01, 0x80, 0x00, 0x80, 0xfe, 0xff, 0x34, 0x12, 0x00, 0x00,
        0xff, 0x7f,
    ]);
    let mut b = ModuleBuilder::new();
    let mut funcs = Vec::new();
    let mut expected = Vec::new();
    for lane in 0..16u8 {
        for signed in [true, false] {
            let f = b.new_function(FuncType::new([Vec128], [I32]))?;
            let body = b.body(&f)?.local_get(0)?;
            if signed {
                body.extract_lane_s(LaneShape::I8x16, lane)?;
                expected.push(Val::I32(i32::from(pattern.i8_lane(usize::from(lane)))));
            } else {
                body.extract_lane_u(LaneShape::I8x16, lane)?;
                expected.push(Val::I32(i32::from(pattern.u8_lane(usize::from(lane)))));
            }
            funcs.push(f);
        }
    }
    for lane in 0..8u8 {
        for signed in [true, false] {
            let f = b.new_function(FuncType::new([Vec128], [I32]))?;
            let body = b.body(&f)?.local_get(0)?;
            if signed {
                body.extract_lane_s(LaneShape::I16x8, lane)?;
                expected.push(Val::I32(i32::from(pattern.i16_lane(usize::from(lane)))));
            } else {
                body.extract_lane_u(LaneShape::I16x8, lane)?;
                expected.push(Val::I32(i32::from(pattern.u16_lane(usize::from(lane)))));
            }
            funcs.push(f);
        }
    }
    let module = b.build()?;

    ctx.check("every narrow lane, both signs", &module, expected, |inst| {
        funcs
            .iter()
            .map(|f| inst.call1(f.index(), &[v(pattern)]))
            .collect()
    })
}

fn f32x4_arith(ctx: &mut ScenarioCtx) -> Outcome {
    let a = V128::from_f32x4([1.5, -0.0, 0.0, 1.0e30]);
    let c = V128::from_f32x4([-2.25, 0.0, -0.0, 1.0e10]);
    // Nonzero divisors only.
    let d = V128::from_f32x4([4.0, 2.0, -8.0, 1.0e-10]);

    let binops: Vec<(SimdBinop, V128, V128, V128)> = vec![
        (SimdBinop::F32x4Add, a, c, host::map2_f32(a, c, |x, y| x + y)),
        (SimdBinop::F32x4Sub, a, c, host::map2_f32(a, c, |x, y| x - y)),
        (SimdBinop::F32x4Mul, a, c, host::map2_f32(a, c, |x, y| x * y)),
        (SimdBinop::F32x4Div, a, d, host::map2_f32(a, d, |x, y| x / y)),
        (SimdBinop::F32x4Min, a, c, host::map2_f32(a, c, host::wasm_fmin)),
        (SimdBinop::F32x4Max, a, c, host::map2_f32(a, c, host::wasm_fmax)),
        (SimdBinop::F32x4Eq, a, c, host::f32x4_cmp(a, c, |x, y| x == y)),
        (SimdBinop::F32x4Ne, a, c, host::f32x4_cmp(a, c, |x, y| x != y)),
    ];
    let sqrt_input = V128::from_f32x4([4.0, 2.0, 0.0, 1.0e-20]);
    let unops = [
        (SimdUnop::F32x4Neg, a, host::map_f32(a, |x| -x)),
        (SimdUnop::F32x4Abs, c, host::map_f32(c, f32::abs)),
        (SimdUnop::F32x4Sqrt, sqrt_input, host::map_f32(sqrt_input, f32::sqrt)),
    ];

    let mut b = ModuleBuilder::new();
    let mut bin_funcs = Vec::new();
    for (op, ..) in &binops {
        bin_funcs.push(binop_function(&mut b, *op)?);
    }
    let mut un_funcs = Vec::new();
    for (op, ..) in &unops {
        un_funcs.push(unop_function(&mut b, *op)?);
    }
    let module = b.build()?;

    let expected: Vec<V128> = binops
        .iter()
        .map(|c| c.3)
        .chain(unops.iter().map(|u| u.2))
        .collect();
    ctx.check("every f32x4 op", &module, expected, |inst| {
        let mut out = Vec::new();
        for (f, (_, x, y, _)) in bin_funcs.iter().zip(&binops) {
            out.push(v128_result(inst, f, &[v(*x), v(*y)])?);
        }
        for (f, (_, x, _)) in un_funcs.iter().zip(&unops) {
            out.push(v128_result(inst, f, &[v(*x)])?);
        }
        Ok(out)
    })
}

fn v128_bitwise(ctx: &mut ScenarioCtx) -> Outcome {
    let a = V128::from_u32x4([0xF0F0_F0F0, 0x0000_FFFF, 0x1234_5678, 0]);
    let c = V128::from_u32x4([0xFF00_FF00, 0xFFFF_FFFF, 0x8765_4321, 0]);
    let bytes = |f: fn(u8, u8) -> u8| {
        V128::from_bytes(std::array::from_fn(|i| f(a.u8_lane(i), c.u8_lane(i))))
    };

    let mut b = ModuleBuilder::new();
    let and = binop_function(&mut b, SimdBinop::V128And)?;
    let or = binop_function(&mut b, SimdBinop::V128Or)?;
    let xor = binop_function(&mut b, SimdBinop::V128Xor)?;
    let not = unop_function(&mut b, SimdUnop::V128Not)?;
    let module = b.build()?;

    let expected = vec![
        bytes(|x, y| x & y),
        bytes(|x, y| x | y),
        bytes(|x, y| x ^ y),
        V128::from_bytes(a.into_bytes().map(|x| !x)),
    ];
    ctx.check("and, or, xor, not", &module, expected, |inst| {
        Ok(vec![
            v128_result(inst, &and, &[v(a), v(c)])?,
            v128_result(inst, &or, &[v(a), v(c)])?,
            v128_result(inst, &xor, &[v(a), v(c)])?,
            v128_result(inst, &not, &[v(a)])?,
        ])
    })
}

fn i16x8_replace_lane(ctx: &mut ScenarioCtx) -> Outcome {
    let base = V128::from_i16x8([10, 20, 30, 40, 50, 60, 70, 80]);
    let replaced_lane = 5u8;

    let mut b = ModuleBuilder::new();
    let whole = b.new_function(FuncType::new([I32], [Vec128]))?;
    b.body(&whole)?
        .v128_const(base)?
        .local_get(0)?
        .replace_lane(LaneShape::I16x8, replaced_lane)?;
    let mut lanes = Vec::new();
    for lane in 0..8u8 {
        let f = b.new_function(FuncType::new([I32], [I32]))?;
        b.body(&f)?
            .v128_const(base)?
            .local_get(0)?
            .replace_lane(LaneShape::I16x8, replaced_lane)?
            .extract_lane_s(LaneShape::I16x8, lane)?;
        lanes.push(f);
    }
    let module = b.build()?;

    let x = 0x1_8001_i32;
    let mut expected_lanes: [i16; 8] = std::array::from_fn(|i| base.i16_lane(i));
    expected_lanes[usize::from(replaced_lane)] = x as i16;
    let expected = V128::from_i16x8(expected_lanes);

    ctx.check("whole vector", &module, expected, |inst| {
        v128_result(inst, &whole, &[Val::I32(x)])
    })?;
    ctx.check(
        "every lane",
        &module,
        expected_lanes.map(|l| Val::I32(i32::from(l))).to_vec(),
        |inst| {
            lanes
                .iter()
                .map(|f| inst.call1(f.index(), &[Val::I32(x)]))
                .collect()
        },
    )
}

fn v128_global_round_trip(ctx: &mut ScenarioCtx) -> Outcome {
    let init = V128::from_i32x4([1, -2, 3, i32::MAX]);
    let scale = V128::from_i32x4([3; 4]);
    let flip = V128::from_u32x4([0, 0xFFFF_0000, 0x8000_0000, 1]);

    let mut b = ModuleBuilder::new();
    let g = b.add_global_init(ConstValue::V128(init))?;
    let step = b.new_function(FuncType::new([], []))?;
    b.body(&step)?
        .global_get(&g)?
        .v128_const(scale)?
        .binop(SimdBinop::I32x4Mul)?
        .v128_const(flip)?
        .binop(SimdBinop::V128Xor)?
        .global_set(&g)?;
    let module = b.build()?;

    let host_step = |x: V128| {
        let scaled = host::map2_i32(x, scale, i32::wrapping_mul);
        host::map2_i32(scaled, flip, |p, q| p ^ q)
    };
    let once = host_step(init);
    let twice = host_step(once);

    ctx.check("initial, after one step, after two", &module, vec![init, once, twice], |inst| {
        let initial = inst.read_global_v128(g.index())?;
        inst.call(step.index(), &[])?;
        let first = inst.read_global_v128(g.index())?;
        inst.call(step.index(), &[])?;
        let second = inst.read_global_v128(g.index())?;
        Ok(vec![initial, first, second])
    })
}

// ---------------------------------------------------------------------------
// Traps and the feature gate
// ---------------------------------------------------------------------------

fn i32_division_traps(ctx: &mut ScenarioCtx) -> Outcome {
    let mut b = ModuleBuilder::new();
    let div_s = b.new_function(FuncType::new([I32, I32], [I32]))?;
    let div_u = b.new_function(FuncType::new([I32, I32], [I32]))?;
    for (f, op) in [(&div_s, ScalarOp::I32DivS), (&div_u, ScalarOp::I32DivU)] {
        b.body(f)?.local_get(0)?.local_get(1)?.scalar(op)?;
    }
    // 100 / x, splatted: the trap has to cross a vector-returning frame.
    let splat_quotient = b.new_function(FuncType::new([I32], [Vec128]))?;
    b.body(&splat_quotient)?
        .i32_const(100)?
        .local_get(0)?
        .call(&div_s)?
        .splat(LaneShape::I32x4)?;
    let module = b.build()?;

    let pairs = [(7, 2), (-7, 2), (7, -2), (i32::MIN, 1), (0, 5)];
    let expected: Vec<Val> = pairs
        .iter()
        .flat_map(|&(x, y)| {
            [
                Val::I32(x.wrapping_div(y)),
                Val::I32(((x as u32) / (y as u32)) as i32),
            ]
        })
        .collect();
    ctx.check("quotients", &module, expected, |inst| {
        let mut out = Vec::new();
        for &(x, y) in &pairs {
            out.push(inst.call1(div_s.index(), &[Val::I32(x), Val::I32(y)])?);
            out.push(inst.call1(div_u.index(), &[Val::I32(x), Val::I32(y)])?);
        }
        Ok(out)
    })?;

    ctx.expect_trap("div_s by zero", &module, TrapCode::IntegerDivisionByZero, |inst| {
        inst.call(div_s.index(), &[Val::I32(1), Val::I32(0)])
    })?;
    ctx.expect_trap("div_u by zero", &module, TrapCode::IntegerDivisionByZero, |inst| {
        inst.call(div_u.index(), &[Val::I32(1), Val::I32(0)])
    })?;
    ctx.expect_trap("div_s overflow", &module, TrapCode::IntegerOverflow, |inst| {
        inst.call(div_s.index(), &[Val::I32(i32::MIN), Val::I32(-1)])
    })?;
    ctx.expect_trap(
        "trap through a vector frame",
        &module,
        TrapCode::IntegerDivisionByZero,
        |inst| inst.call(splat_quotient.index(), &[Val::I32(0)]),
    )?;
    ctx.check(
        "instance usable after trap",
        &module,
        (
            Some(TrapCode::IntegerDivisionByZero),
            vec![Val::V128(host::i32x4_splat(25).into_bytes())],
        ),
        |inst| call_after_trap(inst, &splat_quotient, &[Val::I32(0)], &[Val::I32(4)]),
    )
}

/// Call `f` with `trapping`, then again with `args` on the same instance.
/// Returns the trap of the first call (`None` if it returned) and the
/// results of the second.
fn call_after_trap(
    inst: &mut Instance,
    f: &FuncRef,
    trapping: &[Val],
    args: &[Val],
) -> Result<(Option<TrapCode>, Vec<Val>), HarnessError> {
    let trap = match inst.call(f.index(), trapping) {
        Err(HarnessError::Trap { code, .. }) => Some(code),
        Err(other) => return Err(other),
        Ok(_) => None,
    };
    Ok((trap, inst.call(f.index(), args)?))
}

fn vector_module() -> Result<Module, HarnessError> {
    let mut b = ModuleBuilder::new();
    let f = b.new_function(FuncType::new([I32], [I32]))?;
    b.body(&f)?
        .local_get(0)?
        .splat(LaneShape::I32x4)?
        .any_true(LaneShape::I32x4)?;
    Ok(b.build()?)
}

fn simd_feature_gate(ctx: &mut ScenarioCtx) -> Outcome {
    let vector = vector_module()?;
    let mut b = ModuleBuilder::new();
    let f = b.new_function(FuncType::new([I32, I32], [I32]))?;
    b.body(&f)?.local_get(0)?.local_get(1)?.scalar(ScalarOp::I32Xor)?;
    let scalar = b.build()?;

    ctx.set_simd(false);
    let gated = ctx
        .expect_compile_error("vector module, simd off", &vector)
        .and_then(|()| {
            ctx.check("scalar module, simd off", &scalar, Val::I32(0b0110), |inst| {
                inst.call1(f.index(), &[Val::I32(0b0101), Val::I32(0b0011)])
            })
        });
    ctx.set_simd(true);
    gated?;
    ctx.check("vector module, simd on", &vector, Val::I32(1), |inst| {
        inst.call1(0, &[Val::I32(3)])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_scenario_builds_its_modules() {
        // Construction errors surface as `Encode`, before any engine runs;
        // an empty config list skips execution entirely.
        for scenario in SCENARIOS {
            let mut ctx = ScenarioCtx::new(scenario.name, Vec::new());
            if let Err(err) = (scenario.run)(&mut ctx) {
                panic!("{}: {err}", scenario.name);
            }
        }
    }

    #[test]
    fn call_after_trap_reports_a_missing_trap() {
        let mut b = ModuleBuilder::new();
        let f = b.new_function(FuncType::new([I32], [I32])).unwrap();
        b.body(&f)
            .unwrap()
            .i32_const(12)
            .unwrap()
            .local_get(0)
            .unwrap()
            .scalar(ScalarOp::I32DivU)
            .unwrap();
        let module = b.build().unwrap();
        let config = crate::runner::ExecConfig::BASELINE_REQUIREMENT;
        let mut inst = crate::runner::Runner::new().instantiate(&module, config).unwrap();

        let (trap, results) = call_after_trap(&mut inst, &f, &[Val::I32(0)], &[Val::I32(4)]).unwrap();
        assert_eq!(trap, Some(TrapCode::IntegerDivisionByZero));
        assert_eq!(results, vec![Val::I32(3)]);

        let (trap, _) = call_after_trap(&mut inst, &f, &[Val::I32(1)], &[Val::I32(4)]).unwrap();
        assert_eq!(trap, None);
    }

    #[test]
    fn eq_constants_reduce_to_all_ones() {
        let result = host::i8x16_eq(host::i8x16_eq(EQ_C1, EQ_C2), EQ_C3);
        assert_eq!(result, V128::from_u32x4([u32::MAX; 4]));
        assert_eq!(result.i8_lane(4), -1);
    }

    #[test]
    fn sqrt_expectation_is_finite() {
        let x = f32::from_bits(0x5b5b_5b5b);
        assert!(x.is_normal());
        assert!(x.sqrt().is_normal());
    }
}
