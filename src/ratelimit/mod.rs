//! Rate limiting algorithms and state management.

mod backend;
mod leaking_bucket;
mod lifecycle;
mod quota;
mod rate;
mod token_bucket;

pub use backend::{AdmissionControl, Decision};
pub use leaking_bucket::{LeakingBucket, SlotPool};
pub use quota::{Consumption, QuotaKey, QuotaTable};
pub use rate::{Limit, Rate};
pub use token_bucket::{TokenBucket, TokenBucketBuilder};
