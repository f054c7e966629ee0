//! Layout of the per-instance context block passed to generated code.
//!
//! The block is an array of 16-byte slots. Slot 0 holds the pending trap
//! code (a little-endian `u32`, zero when no trap is pending); global `i`
//! lives in slot `i + 1`. Scalar globals occupy the low bytes of their slot.

/// Size in bytes of one slot, and of the largest value type.
pub const SLOT_SIZE: usize = 16;

/// Byte offset of the trap code.
pub const TRAP_OFFSET: i32 = 0;

/// One 16-byte, 16-aligned storage cell.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Slot(pub [u8; SLOT_SIZE]);

impl Slot {
    pub const ZERO: Slot = Slot([0; SLOT_SIZE]);

    pub fn from_u32(value: u32) -> Self {
        let mut slot = Slot::ZERO;
        slot.0[..4].copy_from_slice(&value.to_le_bytes());
        slot
    }

    pub fn low_u32(&self) -> u32 {
        u32::from_le_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }
}

/// Byte offset of global `index` inside the context block.
pub fn global_offset(index: u32) -> i32 {
    (SLOT_SIZE as i32) * (index as i32 + 1)
}

/// Number of slots needed for `globals` globals plus the trap slot.
pub fn slot_count(globals: usize) -> usize {
    globals + 1
}
