use tracing::warn;

use crate::error::Result;

/// Remote accesses still permitted in this run.
///
/// Initialised once and only ever decremented. A quota reset on the remote
/// side mid-run is ignored; the next run picks it up.
#[derive(Debug, Clone)]
pub struct Budget {
    initial: i64,
    remaining: i64,
}

impl Budget {
    pub fn new(quota: i64) -> Self {
        Self {
            initial: quota,
            remaining: quota,
        }
    }

    /// Build from the remote's reported quota, optionally capped.
    /// An unknown quota counts as zero so the run halts straight away.
    pub fn from_quota(quota: Result<i64>, cap: Option<i64>) -> Self {
        let quota = match quota {
            Ok(q) => q,
            Err(e) => {
                warn!("failed to read remote rate limit, assuming none left: {e}");
                0
            }
        };
        let quota = match cap {
            Some(c) => quota.min(c),
            None => quota,
        };
        Self::new(quota)
    }

    /// Charge `cost` up front, then report whether the budget still covers it.
    pub fn reserve(&mut self, cost: u32) -> bool {
        self.remaining -= i64::from(cost);
        self.remaining >= 0
    }

    pub fn remaining(&self) -> i64 {
        self.remaining
    }

    pub fn initial(&self) -> i64 {
        self.initial
    }

    pub fn spent(&self) -> i64 {
        self.initial - self.remaining
    }
}
