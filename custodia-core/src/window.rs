//! Rolling 24-hour spend accounting.
//!
//! Each delegation tracks how much its agent has spent inside the current
//! window. The window does not tick on a timer; it rolls lazily, the moment
//! a send (or a remaining-allowance query) observes that 24 hours have
//! elapsed since `window_start`.

use crate::{Amount, SPEND_WINDOW_SECS};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Rolling-window spend state for one delegation.
///
/// Invariant: while `now < window_start + 24h`, `spent_today` never exceeds
/// the delegation's daily limit — the ledger checks before recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendWindow {
    /// When the current window opened.
    pub window_start: DateTime<Utc>,
    /// Amount spent since `window_start`.
    pub spent_today: Amount,
}

impl SpendWindow {
    /// Open a fresh window at `now` with nothing spent.
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            window_start: now,
            spent_today: 0,
        }
    }

    /// Whether the window has elapsed as of `now`.
    pub fn elapsed(&self, now: DateTime<Utc>) -> bool {
        now >= self.window_start + Duration::seconds(SPEND_WINDOW_SECS)
    }

    /// Roll the window if it has elapsed, zeroing `spent_today` and
    /// advancing `window_start` to `now`. Returns whether a roll happened.
    ///
    /// Must be called before limit evaluation so a stale window never
    /// rejects a send the fresh window would allow.
    pub fn roll_if_elapsed(&mut self, now: DateTime<Utc>) -> bool {
        if self.elapsed(now) {
            self.spent_today = 0;
            self.window_start = now;
            true
        } else {
            false
        }
    }

    /// Whether adding `amount` would push the window over `daily_limit`.
    pub fn would_exceed(&self, amount: Amount, daily_limit: Amount) -> bool {
        match self.spent_today.checked_add(amount) {
            Some(total) => total > daily_limit,
            None => true,
        }
    }

    /// Record a spend inside the current window.
    pub fn record(&mut self, amount: Amount) {
        self.spent_today = self.spent_today.saturating_add(amount);
    }

    /// Allowance left in the window as of `now`, against `daily_limit`.
    ///
    /// Read-only: an elapsed window reports the full limit without rolling.
    pub fn remaining(&self, daily_limit: Amount, now: DateTime<Utc>) -> Amount {
        if self.elapsed(now) {
            daily_limit
        } else {
            daily_limit.saturating_sub(self.spent_today)
        }
    }
}
