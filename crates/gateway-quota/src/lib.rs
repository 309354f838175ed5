//! # Gateway Quota
//!
//! Admission control for the relay gateway:
//! - Per tenant key, per window (minute/hour/day), per dimension (requests/tokens)
//! - A tenant-independent per-IP gate that runs before authentication
//!
//! Counters live in the shared TTL cache under time-bucketed keys, so stale
//! buckets expire on their own.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod ip_gate;
pub mod ledger;

pub use ip_gate::IpGate;
pub use ledger::{bucket_index, counter_key, retry_after, Admission, QuotaLedger, TOKEN_HEADROOM};
