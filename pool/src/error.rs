//! Unified error type for the pool allocator.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    Exhausted,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "pool exhausted: backing acquire hook failed"),
        }
    }
}

pub type PoolResult<T = ()> = Result<T, PoolError>;
