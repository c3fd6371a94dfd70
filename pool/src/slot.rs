//! The two overlays a free slot's storage can hold.
//!
//! An occupied slot's bytes belong entirely to the caller. A free slot's
//! bytes are reused to hold one of two overlapping shapes:
//!
//! - [`FirstSlotOverlay`] — written at the *first* slot of a free run. Its
//!   `node` links the run into a bucket free-list; `run_len` is the run's
//!   length in slots and is always >= 1.
//! - [`LastSlotOverlay`] — written at the *last* slot of a free run whose
//!   length is >= 2 (a length-1 run has only a first slot, which doubles as
//!   the last). Its `sentinel` word is always zero, which is how
//!   [`is_first_slot`] tells the two shapes apart: a first-slot overlay's
//!   third word is `run_len`, which is always non-zero.
//!
//! Both overlays are exactly [`MIN_SLOT_SIZE`] bytes (three machine words),
//! which is the floor `Pool::init` rounds every element size up to.

use crate::list::ListNode;
use core::mem::size_of;
use core::ptr;

pub const OVERLAY_WORDS: usize = 3;
pub const MIN_SLOT_SIZE: usize = OVERLAY_WORDS * size_of::<usize>();

#[repr(C)]
pub struct FirstSlotOverlay {
    pub node: ListNode,
    pub run_len: usize,
}

#[repr(C)]
pub struct LastSlotOverlay {
    pub back_ptr: *mut u8,
    _reserved: usize,
    sentinel: usize,
}

fn as_first(slot: *mut u8) -> *mut FirstSlotOverlay {
    slot as *mut FirstSlotOverlay
}

fn as_last(slot: *mut u8) -> *mut LastSlotOverlay {
    slot as *mut LastSlotOverlay
}

/// # Safety
/// `slot` must point to a writable region of at least [`MIN_SLOT_SIZE`]
/// bytes that is not currently occupied by a live allocation.
pub unsafe fn write_first(slot: *mut u8, run_len: usize) {
    debug_assert!(run_len >= 1);
    (*as_first(slot)).run_len = run_len;
}

/// # Safety
/// `slot` must point to the *last* slot of a run of length >= 2, writable
/// for at least [`MIN_SLOT_SIZE`] bytes.
pub unsafe fn write_last(slot: *mut u8, first_slot: *mut u8) {
    let last = as_last(slot);
    (*last).back_ptr = first_slot;
    (*last)._reserved = 0;
    (*last).sentinel = 0;
}

/// # Safety
/// `slot` must currently hold a [`FirstSlotOverlay`].
pub unsafe fn run_len_of(slot: *mut u8) -> usize {
    (*as_first(slot)).run_len
}

/// # Safety
/// `slot` must currently hold a [`LastSlotOverlay`].
pub unsafe fn back_ptr_of(slot: *mut u8) -> *mut u8 {
    (*as_last(slot)).back_ptr
}

/// Tells a first-slot overlay from a last-slot overlay by inspecting the
/// third word: a first slot's `run_len` is always non-zero, a last slot's
/// `sentinel` is always zero.
///
/// # Safety
/// `slot` must currently hold one of the two overlays (i.e. be free).
pub unsafe fn is_first_slot(slot: *mut u8) -> bool {
    (*as_last(slot)).sentinel != 0
}

/// # Safety
/// `slot` must currently hold a [`FirstSlotOverlay`].
pub unsafe fn node_ptr(slot: *mut u8) -> *mut ListNode {
    ptr::addr_of_mut!((*as_first(slot)).node)
}

/// Recovers the owning slot address from a pointer to its embedded
/// [`ListNode`]. Sound for any node obtained from `node_ptr`, since `node`
/// is `FirstSlotOverlay`'s first field at offset 0.
pub fn slot_of_node(node: *mut ListNode) -> *mut u8 {
    node as *mut u8
}
