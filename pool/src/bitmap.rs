//! Bitmap-as-interval-boundary helpers.
//!
//! Unlike a conventional allocation bitmap, a set bit here does not mean
//! "this slot is free" — it marks a slot as the *first* or *last* index of
//! a maximal free run (a run of length 1 sets only one bit, representing
//! both endpoints at once). Occupied slots and interior free slots are
//! always clear. This is what lets the free/coalesce path answer "is index
//! i-1 / i+1 a run boundary?" with a single bit test instead of walking a
//! run.

use core::mem::size_of;

pub const WORD_BITS: usize = usize::BITS as usize;

pub const fn bitmap_words(slot_count: u32) -> usize {
    (slot_count as usize).div_ceil(WORD_BITS)
}

pub const fn bitmap_bytes(slot_count: u32) -> usize {
    bitmap_words(slot_count) * size_of::<usize>()
}

/// # Safety
/// `bitmap` must point to at least `bitmap_words(slot_count)` live `usize`s
/// for some `slot_count > index`.
pub unsafe fn bit_is_set(bitmap: *const usize, index: u32) -> bool {
    let word = index as usize / WORD_BITS;
    let bit = index as usize % WORD_BITS;
    (*bitmap.add(word) >> bit) & 1 != 0
}

/// # Safety
/// Same requirements as [`bit_is_set`].
pub unsafe fn set_bit(bitmap: *mut usize, index: u32) {
    let word = index as usize / WORD_BITS;
    let bit = index as usize % WORD_BITS;
    *bitmap.add(word) |= 1usize << bit;
}

/// # Safety
/// Same requirements as [`bit_is_set`].
pub unsafe fn clear_bit(bitmap: *mut usize, index: u32) {
    let word = index as usize / WORD_BITS;
    let bit = index as usize % WORD_BITS;
    *bitmap.add(word) &= !(1usize << bit);
}
