//! Account selection strategies.

use gateway_core::UpstreamAccount;
use rand::Rng;
use std::fmt::Debug;

/// Picks one account out of the eligible candidates.
///
/// Implementations only ever see `active` accounts and must be stateless
/// with respect to callers: failures demote accounts, never the caller.
pub trait SelectionStrategy: Send + Sync + Debug {
    /// Index of the chosen candidate, `None` when `candidates` is empty
    fn choose(&self, candidates: &[UpstreamAccount]) -> Option<usize>;

    /// Strategy name for logs
    fn name(&self) -> &'static str;
}

/// Uniform random choice
#[derive(Debug, Default, Clone, Copy)]
pub struct UniformRandom;

impl SelectionStrategy for UniformRandom {
    fn choose(&self, candidates: &[UpstreamAccount]) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        Some(rand::thread_rng().gen_range(0..candidates.len()))
    }

    fn name(&self) -> &'static str {
        "uniform_random"
    }
}

/// Prefer the account with the fewest recorded errors, then the one idle longest
#[derive(Debug, Default, Clone, Copy)]
pub struct FewestErrors;

impl SelectionStrategy for FewestErrors {
    fn choose(&self, candidates: &[UpstreamAccount]) -> Option<usize> {
        candidates
            .iter()
            .enumerate()
            .min_by_key(|(_, a)| (a.error_count, a.last_used_at))
            .map(|(i, _)| i)
    }

    fn name(&self) -> &'static str {
        "fewest_errors"
    }
}
