//! Token accounting for collaborator calls.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

/// Token usage reported by a single collaborator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UsageDelta {
    /// Prompt tokens.
    pub input_tokens: u64,
    /// Completion tokens.
    pub output_tokens: u64,
}

impl UsageDelta {
    /// Creates a new usage delta.
    #[must_use]
    pub const fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// A call that reported no usage.
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0, 0)
    }
}

/// Running token totals for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UsageCounters {
    /// Total prompt tokens.
    pub input_tokens: u64,
    /// Total completion tokens.
    pub output_tokens: u64,
}

impl UsageCounters {
    /// Returns input plus output tokens.
    #[must_use]
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

impl Add<UsageDelta> for UsageCounters {
    type Output = Self;

    fn add(self, delta: UsageDelta) -> Self {
        Self {
            input_tokens: self.input_tokens.saturating_add(delta.input_tokens),
            output_tokens: self.output_tokens.saturating_add(delta.output_tokens),
        }
    }
}

impl AddAssign<UsageDelta> for UsageCounters {
    fn add_assign(&mut self, delta: UsageDelta) {
        *self = *self + delta;
    }
}

/// A collaborator result paired with the usage it cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Metered<T> {
    /// The returned value.
    pub value: T,
    /// Tokens consumed producing it.
    pub usage: UsageDelta,
}

impl<T> Metered<T> {
    /// Pairs a value with its usage.
    #[must_use]
    pub fn new(value: T, usage: UsageDelta) -> Self {
        Self { value, usage }
    }

    /// A value whose call reported no usage.
    #[must_use]
    pub fn free(value: T) -> Self {
        Self::new(value, UsageDelta::zero())
    }
}

/// Per-job aggregator of every metered call.
///
/// Owned by the single task running a job; never shared across jobs.
#[derive(Debug, Clone, Default)]
pub struct UsageAccountant {
    totals: UsageCounters,
    calls: usize,
}

impl UsageAccountant {
    /// Creates an empty accountant.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one call's usage into the totals.
    pub fn add(&mut self, delta: UsageDelta) {
        self.totals += delta;
        self.calls += 1;
    }

    /// Records a metered value and hands back the value.
    pub fn record<T>(&mut self, metered: Metered<T>) -> T {
        self.add(metered.usage);
        metered.value
    }

    /// Returns the running totals.
    #[must_use]
    pub fn totals(&self) -> UsageCounters {
        self.totals
    }

    /// Returns the number of calls recorded.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls
    }
}
