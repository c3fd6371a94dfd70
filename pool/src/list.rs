//! Intrusive doubly-linked list with a circular sentinel node.
//!
//! Modelled on the classic kernel `list_head` pattern: a `ListNode` is
//! embedded as the *first field* of whatever struct needs to live on a list
//! (a `ClusterHeader`, a free slot's first-slot overlay), and a `ListHead`
//! is a sentinel node whose `next`/`prev` form the ends of the chain. The
//! sentinel always points to itself when the list is empty, which is what
//! lets [`ListHead::unlink_fast`] remove a node in O(1) without ever being
//! given the list it lives on.

use core::marker::PhantomData;
use core::ptr;

/// An intrusive link. Embed this as the first field of a `#[repr(C)]` type.
#[repr(C)]
pub struct ListNode {
    next: *mut ListNode,
    prev: *mut ListNode,
}

impl ListNode {
    pub const fn empty() -> Self {
        Self {
            next: ptr::null_mut(),
            prev: ptr::null_mut(),
        }
    }
}

/// A circular, sentinel-based list head.
///
/// Must be [`init`](ListHead::init)ed once placed at its final address —
/// the sentinel links to itself, so a `ListHead` must never be moved after
/// that point.
#[repr(C)]
pub struct ListHead {
    sentinel: ListNode,
}

impl ListHead {
    pub const fn new() -> Self {
        Self {
            sentinel: ListNode::empty(),
        }
    }

    /// Self-links the sentinel. Must be called exactly once, after the
    /// `ListHead` has reached the address it will occupy for its lifetime.
    pub fn init(&mut self) {
        let p = self.sentinel_ptr();
        self.sentinel.next = p;
        self.sentinel.prev = p;
    }

    fn sentinel_ptr(&self) -> *mut ListNode {
        ptr::from_ref(&self.sentinel) as *mut ListNode
    }

    pub fn is_empty(&self) -> bool {
        self.sentinel.next == self.sentinel_ptr()
    }

    /// Inserts `node` directly after the sentinel (the new head).
    ///
    /// # Safety
    /// `node` must not already be linked into any list, and must stay valid
    /// (not be freed or moved) for as long as it remains linked.
    pub unsafe fn insert_head(&mut self, node: *mut ListNode) {
        let head = self.sentinel_ptr();
        let old_first = self.sentinel.next;
        (*node).next = old_first;
        (*node).prev = head;
        (*old_first).prev = node;
        self.sentinel.next = node;
    }

    /// Inserts `node` directly before the sentinel (the new tail).
    ///
    /// # Safety
    /// Same requirements as [`insert_head`](Self::insert_head).
    pub unsafe fn insert_tail(&mut self, node: *mut ListNode) {
        let head = self.sentinel_ptr();
        let old_last = self.sentinel.prev;
        (*node).prev = old_last;
        (*node).next = head;
        (*old_last).next = node;
        self.sentinel.prev = node;
    }

    /// Removes `node` from whatever list it is currently linked into.
    ///
    /// This is the operation the bucket free-lists rely on for O(1) removal
    /// during coalescing: the caller only needs the node's own pointer, not
    /// the `ListHead` it came from.
    ///
    /// # Safety
    /// `node` must currently be linked into some list (its `next`/`prev`
    /// must be valid pointers, e.g. to a sentinel).
    pub unsafe fn unlink_fast(node: *mut ListNode) {
        let next = (*node).next;
        let prev = (*node).prev;
        (*prev).next = next;
        (*next).prev = prev;
        (*node).next = ptr::null_mut();
        (*node).prev = ptr::null_mut();
    }

    /// Removes and returns the tail node, or null if the list is empty.
    ///
    /// # Safety
    /// The list must have been `init`ed.
    pub unsafe fn pop_tail(&mut self) -> *mut ListNode {
        if self.is_empty() {
            return ptr::null_mut();
        }
        let node = self.sentinel.prev;
        Self::unlink_fast(node);
        node
    }

    /// Removes and returns the head node, or null if the list is empty.
    ///
    /// # Safety
    /// The list must have been `init`ed.
    pub unsafe fn pop_head(&mut self) -> *mut ListNode {
        if self.is_empty() {
            return ptr::null_mut();
        }
        let node = self.sentinel.next;
        Self::unlink_fast(node);
        node
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            sentinel: self.sentinel_ptr(),
            cur: self.sentinel.next,
            _marker: PhantomData,
        }
    }
}

/// Forward iterator over a [`ListHead`]'s linked nodes.
pub struct Iter<'a> {
    sentinel: *mut ListNode,
    cur: *mut ListNode,
    _marker: PhantomData<&'a ListHead>,
}

impl Iterator for Iter<'_> {
    type Item = *mut ListNode;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cur == self.sentinel {
            return None;
        }
        let node = self.cur;
        // Safety: node != sentinel, so it's a live, linked node.
        self.cur = unsafe { (*node).next };
        Some(node)
    }
}
