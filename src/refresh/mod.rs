//! Per-widget refresh scheduling.
//!
//! - `policy` — `CachePolicy` and the normal next-update computation
//! - `state` — `RefreshState`: outcome bookkeeping and early-retry backoff

pub mod policy;
pub mod state;

pub use policy::CachePolicy;
pub use state::{MAX_RETRY_COUNT, Outcome, RefreshState};
