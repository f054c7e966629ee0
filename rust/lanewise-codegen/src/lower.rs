//! Scalar lowering: every `v128` is four `i32` words and every lane
//! operation is expanded into scalar code.
//!
//! Word `k` holds bytes `4k..4k+3` of the vector, little-endian, so lane
//! `i` of an `i8x16` is bits `8*(i%4)..` of word `i/4` and lane `i` of an
//! `i16x8` is bits `16*(i%2)..` of word `i/2`. Operations unpack the words
//! into per-lane `i32` (or `f32`) values, compute lane by lane, and pack the
//! results back. Narrow lanes are unpacked zero-extended; packing masks each
//! lane, which gives wrapping arithmetic for free.

use cranelift_codegen::ir::condcodes::{FloatCC, IntCC};
use cranelift_codegen::ir::{types, InstBuilder, MemFlags, Type as ClifType, Value};
use cranelift_frontend::FunctionBuilder;

use crate::config::LoweringMode;
use crate::types::slot_flags;
use crate::vector::{Binop, Shape, Unop, VectorLowering};

pub struct ScalarLanes;

pub type Words = [Value; 4];

fn word_const(b: &mut FunctionBuilder, w: u32) -> Value {
    b.ins().iconst(types::I32, i64::from(w))
}

/// Per-lane values of `shape`, in lane order.
fn unpack(b: &mut FunctionBuilder, shape: Shape, words: Words) -> Vec<Value> {
    match shape {
        Shape::I32x4 => words.to_vec(),
        Shape::F32x4 => words
            .iter()
            .map(|w| b.ins().bitcast(types::F32, MemFlags::new(), *w))
            .collect(),
        Shape::I16x8 | Shape::I8x16 => {
            let bits = shape.lane_bits() as i64;
            let per_word = 32 / bits;
            let mut lanes = Vec::with_capacity(usize::from(shape.lanes()));
            for w in words {
                for k in 0..per_word {
                    let shifted = if k == 0 {
                        w
                    } else {
                        b.ins().ushr_imm(w, k * bits)
                    };
                    // The top lane of a word needs no mask after the shift.
                    let lane = if k == per_word - 1 {
                        shifted
                    } else {
                        b.ins().band_imm(shifted, shape.lane_mask())
                    };
                    lanes.push(lane);
                }
            }
            lanes
        }
    }
}

/// Inverse of [`unpack`]. Integer lanes may carry garbage above the lane
/// width; it is masked off.
fn pack(b: &mut FunctionBuilder, shape: Shape, lanes: &[Value]) -> Words {
    let mut words = Vec::with_capacity(4);
    match shape {
        Shape::I32x4 => words.extend_from_slice(lanes),
        Shape::F32x4 => {
            for lane in lanes {
                words.push(b.ins().bitcast(types::I32, MemFlags::new(), *lane));
            }
        }
        Shape::I16x8 | Shape::I8x16 => {
            let bits = shape.lane_bits() as i64;
            let per_word = (32 / bits) as usize;
            for chunk in lanes.chunks(per_word) {
                let mut word = None;
                for (k, lane) in chunk.iter().enumerate() {
                    let mut part = *lane;
                    if k != per_word - 1 {
                        part = b.ins().band_imm(part, shape.lane_mask());
                    }
                    if k != 0 {
                        part = b.ins().ishl_imm(part, k as i64 * bits);
                    }
                    word = Some(match word {
                        None => part,
                        Some(acc) => b.ins().bor(acc, part),
                    });
                }
                if let Some(word) = word {
                    words.push(word);
                }
            }
        }
    }
    [words[0], words[1], words[2], words[3]]
}

/// `i32` all-ones when `flag` (an `i8` 0/1) is set, else zero.
fn mask_from_flag(b: &mut FunctionBuilder, flag: Value) -> Value {
    let wide = b.ins().uextend(types::I32, flag);
    b.ins().ineg(wide)
}

fn lanewise(
    b: &mut FunctionBuilder,
    shape: Shape,
    v: Words,
    mut f: impl FnMut(&mut FunctionBuilder, Value) -> Value,
) -> Words {
    let lanes = unpack(b, shape, v);
    let out: Vec<Value> = lanes.into_iter().map(|lane| f(b, lane)).collect();
    pack(b, shape, &out)
}

fn lanewise2(
    b: &mut FunctionBuilder,
    shape: Shape,
    x: Words,
    y: Words,
    mut f: impl FnMut(&mut FunctionBuilder, Value, Value) -> Value,
) -> Words {
    let xs = unpack(b, shape, x);
    let ys = unpack(b, shape, y);
    let out: Vec<Value> = xs
        .into_iter()
        .zip(ys)
        .map(|(l, r)| f(b, l, r))
        .collect();
    pack(b, shape, &out)
}

fn wordwise2(
    b: &mut FunctionBuilder,
    x: Words,
    y: Words,
    f: impl Fn(&mut FunctionBuilder, Value, Value) -> Value,
) -> Words {
    [
        f(b, x[0], y[0]),
        f(b, x[1], y[1]),
        f(b, x[2], y[2]),
        f(b, x[3], y[3]),
    ]
}

impl VectorLowering for ScalarLanes {
    type Repr = Words;

    const MODE: LoweringMode = LoweringMode::ScalarLowered;
    const PARTS: &'static [ClifType] = &[types::I32, types::I32, types::I32, types::I32];

    fn assemble(parts: &[Value]) -> Words {
        [parts[0], parts[1], parts[2], parts[3]]
    }

    fn parts(v: Words) -> Vec<Value> {
        v.to_vec()
    }

    fn constant(b: &mut FunctionBuilder, bytes: [u8; 16]) -> Words {
        let mut words = [0u32; 4];
        for (k, chunk) in bytes.chunks_exact(4).enumerate() {
            words[k] = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        [
            word_const(b, words[0]),
            word_const(b, words[1]),
            word_const(b, words[2]),
            word_const(b, words[3]),
        ]
    }

    fn load(b: &mut FunctionBuilder, base: Value, offset: i32) -> Words {
        let mut word = |k: i32| b.ins().load(types::I32, slot_flags(), base, offset + 4 * k);
        [word(0), word(1), word(2), word(3)]
    }

    fn store(b: &mut FunctionBuilder, v: Words, base: Value, offset: i32) {
        for (k, w) in v.iter().enumerate() {
            b.ins().store(slot_flags(), *w, base, offset + 4 * k as i32);
        }
    }

    fn splat(b: &mut FunctionBuilder, shape: Shape, x: Value) -> Words {
        let word = match shape {
            Shape::I32x4 => x,
            Shape::F32x4 => b.ins().bitcast(types::I32, MemFlags::new(), x),
            Shape::I16x8 => {
                let lane = b.ins().band_imm(x, 0xffff);
                b.ins().imul_imm(lane, 0x0001_0001)
            }
            Shape::I8x16 => {
                let lane = b.ins().band_imm(x, 0xff);
                b.ins().imul_imm(lane, 0x0101_0101)
            }
        };
        [word; 4]
    }

    fn extract_lane(
        b: &mut FunctionBuilder,
        shape: Shape,
        lane: u8,
        signed: bool,
        v: Words,
    ) -> Value {
        let lanes = unpack(b, shape, v);
        let x = lanes[usize::from(lane)];
        if shape.is_narrow() && signed {
            let narrow = b.ins().ireduce(shape.lane_type(), x);
            b.ins().sextend(types::I32, narrow)
        } else {
            x
        }
    }

    fn replace_lane(b: &mut FunctionBuilder, shape: Shape, lane: u8, v: Words, x: Value) -> Words {
        let mut lanes = unpack(b, shape, v);
        lanes[usize::from(lane)] = x;
        pack(b, shape, &lanes)
    }

    fn unary(b: &mut FunctionBuilder, op: Unop, v: Words) -> Words {
        match op {
            Unop::Neg(Shape::F32x4) => lanewise(b, Shape::F32x4, v, |b, l| b.ins().fneg(l)),
            Unop::Neg(shape) => lanewise(b, shape, v, |b, l| b.ins().ineg(l)),
            Unop::FAbs => lanewise(b, Shape::F32x4, v, |b, l| b.ins().fabs(l)),
            Unop::FSqrt => lanewise(b, Shape::F32x4, v, |b, l| b.ins().sqrt(l)),
            Unop::Not => [
                b.ins().bnot(v[0]),
                b.ins().bnot(v[1]),
                b.ins().bnot(v[2]),
                b.ins().bnot(v[3]),
            ],
        }
    }

    fn binary(b: &mut FunctionBuilder, op: Binop, x: Words, y: Words) -> Words {
        match op {
            Binop::Add(Shape::F32x4) => lanewise2(b, Shape::F32x4, x, y, |b, l, r| b.ins().fadd(l, r)),
            Binop::Sub(Shape::F32x4) => lanewise2(b, Shape::F32x4, x, y, |b, l, r| b.ins().fsub(l, r)),
            Binop::Mul(Shape::F32x4) => lanewise2(b, Shape::F32x4, x, y, |b, l, r| b.ins().fmul(l, r)),
            // Float comparisons yield integer masks in i32 lanes.
            Binop::Eq(Shape::F32x4) | Binop::Ne(Shape::F32x4) => {
                let cc = if matches!(op, Binop::Eq(_)) {
                    FloatCC::Equal
                } else {
                    FloatCC::NotEqual
                };
                let xs = unpack(b, Shape::F32x4, x);
                let ys = unpack(b, Shape::F32x4, y);
                let masks: Vec<Value> = xs
                    .into_iter()
                    .zip(ys)
                    .map(|(l, r)| {
                        let flag = b.ins().fcmp(cc, l, r);
                        mask_from_flag(b, flag)
                    })
                    .collect();
                pack(b, Shape::I32x4, &masks)
            }
            Binop::Add(shape) => lanewise2(b, shape, x, y, |b, l, r| b.ins().iadd(l, r)),
            Binop::Sub(shape) => lanewise2(b, shape, x, y, |b, l, r| b.ins().isub(l, r)),
            Binop::Mul(shape) => lanewise2(b, shape, x, y, |b, l, r| b.ins().imul(l, r)),
            Binop::Eq(shape) => lanewise2(b, shape, x, y, |b, l, r| {
                let flag = b.ins().icmp(IntCC::Equal, l, r);
                mask_from_flag(b, flag)
            }),
            Binop::Ne(shape) => lanewise2(b, shape, x, y, |b, l, r| {
                let flag = b.ins().icmp(IntCC::NotEqual, l, r);
                mask_from_flag(b, flag)
            }),
            Binop::FDiv => lanewise2(b, Shape::F32x4, x, y, |b, l, r| b.ins().fdiv(l, r)),
            Binop::FMin => lanewise2(b, Shape::F32x4, x, y, |b, l, r| b.ins().fmin(l, r)),
            Binop::FMax => lanewise2(b, Shape::F32x4, x, y, |b, l, r| b.ins().fmax(l, r)),
            Binop::And => wordwise2(b, x, y, |b, l, r| b.ins().band(l, r)),
            Binop::Or => wordwise2(b, x, y, |b, l, r| b.ins().bor(l, r)),
            Binop::Xor => wordwise2(b, x, y, |b, l, r| b.ins().bxor(l, r)),
        }
    }

    fn all_true(b: &mut FunctionBuilder, shape: Shape, v: Words) -> Value {
        // Float shapes are rejected by validation; their bits reduce as i32x4.
        let shape = if shape.is_float() { Shape::I32x4 } else { shape };
        let lanes = unpack(b, shape, v);
        let mut acc = None;
        for lane in lanes {
            let nonzero = b.ins().icmp_imm(IntCC::NotEqual, lane, 0);
            acc = Some(match acc {
                None => nonzero,
                Some(prev) => b.ins().band(prev, nonzero),
            });
        }
        match acc {
            Some(flag) => b.ins().uextend(types::I32, flag),
            None => b.ins().iconst(types::I32, 1),
        }
    }

    fn any_true(b: &mut FunctionBuilder, v: Words) -> Value {
        let lo = b.ins().bor(v[0], v[1]);
        let hi = b.ins().bor(v[2], v[3]);
        let any = b.ins().bor(lo, hi);
        let flag = b.ins().icmp_imm(IntCC::NotEqual, any, 0);
        b.ins().uextend(types::I32, flag)
    }
}
