//! 128-bit constant vectors.
//!
//! A [`V128`] is always stored as its canonical little-endian 16-byte form:
//! lane `i` of an N-bit shape occupies bytes `i*N/8 .. (i+1)*N/8`, least
//! significant byte first. The typed constructors and lane readers do the
//! serialization so callers never hand-encode bytes, and never depend on host
//! byte order.

/// A 16-byte vector literal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct V128([u8; 16]);

impl V128 {
    pub const ZERO: V128 = V128([0; 16]);

    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn from_i8x16(lanes: [i8; 16]) -> Self {
        Self(lanes.map(|l| l as u8))
    }

    pub fn from_i16x8(lanes: [i16; 8]) -> Self {
        let mut bytes = [0u8; 16];
        for (chunk, lane) in bytes.chunks_exact_mut(2).zip(lanes) {
            chunk.copy_from_slice(&lane.to_le_bytes());
        }
        Self(bytes)
    }

    pub fn from_i32x4(lanes: [i32; 4]) -> Self {
        Self::from_u32x4(lanes.map(|l| l as u32))
    }

    pub fn from_u32x4(lanes: [u32; 4]) -> Self {
        let mut bytes = [0u8; 16];
        for (chunk, lane) in bytes.chunks_exact_mut(4).zip(lanes) {
            chunk.copy_from_slice(&lane.to_le_bytes());
        }
        Self(bytes)
    }

    pub fn from_f32x4(lanes: [f32; 4]) -> Self {
        Self::from_u32x4(lanes.map(f32::to_bits))
    }

    /// The vector as an `i128`, little-endian, as `v128.const` encodes it.
    pub fn to_i128(self) -> i128 {
        i128::from_le_bytes(self.0)
    }

    pub fn bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn into_bytes(self) -> [u8; 16] {
        self.0
    }

    pub fn u8_lane(&self, lane: usize) -> u8 {
        self.0[lane]
    }

    pub fn i8_lane(&self, lane: usize) -> i8 {
        self.0[lane] as i8
    }

    pub fn u16_lane(&self, lane: usize) -> u16 {
        u16::from_le_bytes([self.0[lane * 2], self.0[lane * 2 + 1]])
    }

    pub fn i16_lane(&self, lane: usize) -> i16 {
        self.u16_lane(lane) as i16
    }

    pub fn u32_lane(&self, lane: usize) -> u32 {
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.0[lane * 4..lane * 4 + 4]);
        u32::from_le_bytes(word)
    }

    pub fn i32_lane(&self, lane: usize) -> i32 {
        self.u32_lane(lane) as i32
    }

    pub fn f32_lane(&self, lane: usize) -> f32 {
        f32::from_bits(self.u32_lane(lane))
    }

    /// The four 32-bit words a scalar-lowered vector is split into.
    pub fn words(&self) -> [u32; 4] {
        [0, 1, 2, 3].map(|i| self.u32_lane(i))
    }
}

impl From<[u8; 16]> for V128 {
    fn from(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Debug for V128 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "V128(")?;
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 && i % 4 == 0 {
                write!(f, "_")?;
            }
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f32x4_literal_matches_raw_bytes() {
        // f32x4(1.0, 2.0, 3.0, 4.0)
        let raw = V128::from_bytes([
            0x00, 0x00, 0x80, 0x3f, 0x00, 0x00, 0x00, 0x40, 0x00, 0x00, 0x40, 0x40, 0x00, 0x00,
            0x80, 0x40,
        ]);
        assert_eq!(V128::from_f32x4([1.0, 2.0, 3.0, 4.0]), raw);
        assert_eq!(raw.f32_lane(2), 3.0);
    }

    #[test]
    fn i16_lanes_are_little_endian() {
        let v = V128::from_i16x8([0x0102, -1, 0, 0, 0, 0, 0, 0x7f00]);
        assert_eq!(v.bytes()[0], 0x02);
        assert_eq!(v.bytes()[1], 0x01);
        assert_eq!(v.i16_lane(1), -1);
        assert_eq!(v.u16_lane(1), 0xffff);
        assert_eq!(v.i16_lane(7), 0x7f00);
    }

    #[test]
    fn words_follow_lane_order() {
        let v = V128::from_i32x4([1, -2, 3, i32::MIN]);
        assert_eq!(v.words(), [1, 0xffff_fffe, 3, 0x8000_0000]);
        assert_eq!(v.i32_lane(1), -2);
    }

    #[test]
    fn i128_is_little_endian() {
        let mut bytes = [0u8; 16];
        bytes[0] = 0xaa;
        assert_eq!(V128::from_bytes(bytes).to_i128(), 0xaa);
    }

    #[test]
    fn debug_groups_words() {
        let v = V128::from_u32x4([0x0403_0201, 0, 0, 0xffff_ffff]);
        assert_eq!(
            format!("{v:?}"),
            "V128(01020304_00000000_00000000_ffffffff)"
        );
    }
}
