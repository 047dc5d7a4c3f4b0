//! Expansion options.

use serde::{Deserialize, Serialize};

use crate::dst::DstPolicy;

/// Default cap on generator iterations per event.
///
/// A daily rule over a thirty-year window needs about 11 000.
pub const DEFAULT_MAX_ITERATIONS: u64 = 100_000;

/// Knobs for [`crate::expander::expand_with_options`] and
/// [`crate::expander::expand_many`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExpandOptions {
    /// Iteration guard. `None` disables it.
    pub max_iterations: Option<u64>,
    /// What to do with timed slots that land in a DST gap.
    pub dst_policy: DstPolicy,
    /// In bulk expansion, skip (and log) events whose own definition is
    /// invalid instead of failing the whole listing.
    pub skip_malformed: bool,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            max_iterations: Some(DEFAULT_MAX_ITERATIONS),
            dst_policy: DstPolicy::default(),
            skip_malformed: false,
        }
    }
}

impl ExpandOptions {
    #[must_use]
    pub fn with_max_iterations(mut self, max: Option<u64>) -> Self {
        self.max_iterations = max;
        self
    }

    #[must_use]
    pub fn with_dst_policy(mut self, policy: DstPolicy) -> Self {
        self.dst_policy = policy;
        self
    }

    #[must_use]
    pub fn skipping_malformed(mut self) -> Self {
        self.skip_malformed = true;
        self
    }
}
