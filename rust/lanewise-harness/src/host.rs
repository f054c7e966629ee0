//! Host-side reference semantics for vector lanes.
//!
//! Expectations are computed here, lane by lane on plain Rust scalars, and
//! never by running either engine mode.

use lanewise_wasm::V128;

/// wasm `fmin`: NaN if either operand is NaN, and `-0.0 < +0.0`.
pub fn wasm_fmin(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::NAN
    } else if a == b {
        // Equal values differ at most in sign; prefer the negative one.
        f32::from_bits(a.to_bits() | b.to_bits())
    } else if a < b {
        a
    } else {
        b
    }
}

/// wasm `fmax`: NaN if either operand is NaN, and `+0.0 > -0.0`.
pub fn wasm_fmax(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::NAN
    } else if a == b {
        f32::from_bits(a.to_bits() & b.to_bits())
    } else if a > b {
        a
    } else {
        b
    }
}

pub fn map2_i8(a: V128, b: V128, f: impl Fn(i8, i8) -> i8) -> V128 {
    V128::from_i8x16(std::array::from_fn(|i| f(a.i8_lane(i), b.i8_lane(i))))
}

pub fn map2_i16(a: V128, b: V128, f: impl Fn(i16, i16) -> i16) -> V128 {
    V128::from_i16x8(std::array::from_fn(|i| f(a.i16_lane(i), b.i16_lane(i))))
}

pub fn map2_i32(a: V128, b: V128, f: impl Fn(i32, i32) -> i32) -> V128 {
    V128::from_i32x4(std::array::from_fn(|i| f(a.i32_lane(i), b.i32_lane(i))))
}

pub fn map2_f32(a: V128, b: V128, f: impl Fn(f32, f32) -> f32) -> V128 {
    V128::from_f32x4(std::array::from_fn(|i| f(a.f32_lane(i), b.f32_lane(i))))
}

pub fn map_f32(a: V128, f: impl Fn(f32) -> f32) -> V128 {
    V128::from_f32x4(std::array::from_fn(|i| f(a.f32_lane(i))))
}

/// Lane comparison result: all ones or all zeros of the lane width.
pub fn mask<T: From<i8>>(cond: bool) -> T {
    T::from(if cond { -1 } else { 0 })
}

pub fn i8x16_eq(a: V128, b: V128) -> V128 {
    map2_i8(a, b, |x, y| mask(x == y))
}

/// f32 comparisons produce i32 lanes.
pub fn f32x4_cmp(a: V128, b: V128, f: impl Fn(f32, f32) -> bool) -> V128 {
    V128::from_i32x4(std::array::from_fn(|i| mask(f(a.f32_lane(i), b.f32_lane(i)))))
}

/// Bytes of `x` when splatted as i32x4 are the little-endian bytes of `x`,
/// repeated.
pub fn i32x4_splat(x: i32) -> V128 {
    V128::from_i32x4([x; 4])
}

/// 1 iff every lane of `lane_bytes` width is nonzero.
pub fn all_true(v: V128, lane_bytes: usize) -> i32 {
    v.bytes()
        .chunks_exact(lane_bytes)
        .all(|lane| lane.iter().any(|b| *b != 0)) as i32
}

/// 1 iff any lane is nonzero, at any width.
pub fn any_true(v: V128) -> i32 {
    v.bytes().iter().any(|b| *b != 0) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fmin_fmax_order_signed_zeros() {
        assert_eq!(wasm_fmin(0.0, -0.0).to_bits(), (-0.0f32).to_bits());
        assert_eq!(wasm_fmin(-0.0, 0.0).to_bits(), (-0.0f32).to_bits());
        assert_eq!(wasm_fmax(-0.0, 0.0).to_bits(), 0.0f32.to_bits());
        assert_eq!(wasm_fmin(1.0, 5.0), 1.0);
        assert_eq!(wasm_fmax(1.0, 5.0), 5.0);
        assert!(wasm_fmin(f32::NAN, 1.0).is_nan());
        assert!(wasm_fmax(1.0, f32::NAN).is_nan());
    }

    #[test]
    fn reductions_at_each_width() {
        let v = i32x4_splat(0x00FF_00FF);
        assert_eq!(all_true(v, 1), 0);
        assert_eq!(all_true(v, 2), 1);
        assert_eq!(all_true(v, 4), 1);
        let v = i32x4_splat(0x0000_00FF);
        assert_eq!(all_true(v, 2), 0);
        assert_eq!(any_true(v), 1);
        assert_eq!(any_true(V128::ZERO), 0);
    }

    #[test]
    fn masks_are_lane_wide() {
        let a = V128::from_i8x16([1; 16]);
        let mut lanes = [1i8; 16];
        lanes[3] = 2;
        let eq = i8x16_eq(a, V128::from_i8x16(lanes));
        assert_eq!(eq.u8_lane(0), 0xff);
        assert_eq!(eq.u8_lane(3), 0);
        let f = f32x4_cmp(
            V128::from_f32x4([1.0; 4]),
            V128::from_f32x4([1.0, 2.0, 1.0, 2.0]),
            |x, y| x == y,
        );
        assert_eq!(f, V128::from_u32x4([u32::MAX, 0, u32::MAX, 0]));
    }
}
