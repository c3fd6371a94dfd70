#![no_std]
#![allow(unsafe_op_in_unsafe_fn)]

//! Fixed-element-size memory pool allocator.
//!
//! Hands out and reclaims equally sized storage slots in amortised O(1),
//! grouping them into contiguous clusters and coalescing adjacent free
//! slots into runs tracked by bucketed free-lists. See [`pool::Pool`].

extern crate alloc;

pub mod bitmap;
pub mod cluster;
pub mod error;
pub mod list;
pub mod pool;
pub mod slot;
pub mod tests;

pub use error::{PoolError, PoolResult};
pub use pool::{AcquireHook, Finalizer, NUM_BUCKETS, Pool, ReleaseHook};
