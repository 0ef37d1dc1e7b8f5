//! Concurrency-safe generic containers.
//!
//! Every piece of shared limiter state lives in one of these containers; no
//! caller-side locking is needed on top of them.

mod map;
mod set;

pub use map::ConcurrentMap;
pub use set::ConcurrentSet;
