//! Expiry classification.
//!
//! Pure functions only. Used to annotate listings and warning views; never
//! consulted by mutating operations.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// Default look-ahead for [`ExpiryStatus::ExpiringSoon`].
pub const DEFAULT_WARNING_WINDOW_DAYS: u32 = 30;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryStatus {
    Expired,
    ExpiringSoon,
    Normal,
}

impl ExpiryStatus {
    /// Expired or about to expire.
    pub fn needs_attention(&self) -> bool {
        !matches!(self, ExpiryStatus::Normal)
    }
}

/// How far ahead an expiry date starts counting as "soon".
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryPolicy {
    pub warning_window_days: u32,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            warning_window_days: DEFAULT_WARNING_WINDOW_DAYS,
        }
    }
}

impl ExpiryPolicy {
    pub fn new(warning_window_days: u32) -> Self {
        Self {
            warning_window_days,
        }
    }

    /// `Expired` iff `expiry < today`; `ExpiringSoon` iff
    /// `today <= expiry <= today + window` (both ends inclusive); otherwise
    /// `Normal`. Lots without an expiry date are always `Normal`.
    pub fn classify(&self, expiry_date: Option<NaiveDate>, today: NaiveDate) -> ExpiryStatus {
        let Some(expiry) = expiry_date else {
            return ExpiryStatus::Normal;
        };

        if expiry < today {
            return ExpiryStatus::Expired;
        }

        // Past the end of the calendar everything is "soon".
        let horizon = today
            .checked_add_days(Days::new(u64::from(self.warning_window_days)))
            .unwrap_or(NaiveDate::MAX);

        if expiry <= horizon {
            ExpiryStatus::ExpiringSoon
        } else {
            ExpiryStatus::Normal
        }
    }
}

/// Classify with the default 30-day window.
pub fn classify(expiry_date: Option<NaiveDate>, today: NaiveDate) -> ExpiryStatus {
    ExpiryPolicy::default().classify(expiry_date, today)
}
