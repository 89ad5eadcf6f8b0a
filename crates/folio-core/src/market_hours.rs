//! Market-hours utilities.
//!
//! Decides whether the exchange's regular session is open at a given UTC
//! instant. Used to gate the decision and risk loops.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Source of the current time.
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Regular session window in exchange-local time.
///
/// Both bounds are inclusive: with the default 09:00-15:30 window an instant at
/// 15:30:59 local is still inside the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketHours {
    #[serde(default = "default_open_hour")]
    pub open_hour: u32,
    #[serde(default)]
    pub open_minute: u32,
    #[serde(default = "default_close_hour")]
    pub close_hour: u32,
    #[serde(default = "default_close_minute")]
    pub close_minute: u32,
    /// Exchange offset from UTC, in hours (KRX: +9).
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
    /// Closed on Saturday and Sunday.
    #[serde(default = "default_weekdays_only")]
    pub weekdays_only: bool,
}

fn default_open_hour() -> u32 {
    9
}

fn default_close_hour() -> u32 {
    15
}

fn default_close_minute() -> u32 {
    30
}

fn default_utc_offset_hours() -> i32 {
    9
}

fn default_weekdays_only() -> bool {
    true
}

impl Default for MarketHours {
    fn default() -> Self {
        Self {
            open_hour: default_open_hour(),
            open_minute: 0,
            close_hour: default_close_hour(),
            close_minute: default_close_minute(),
            utc_offset_hours: default_utc_offset_hours(),
            weekdays_only: default_weekdays_only(),
        }
    }
}

impl MarketHours {
    /// Check the configured bounds.
    pub fn validate(&self) -> Result<()> {
        if self.open_hour > 23 || self.close_hour > 23 || self.open_minute > 59 || self.close_minute > 59 {
            return Err(CoreError::InvalidMarketHours(
                "hours must be 0-23 and minutes 0-59".to_string(),
            ));
        }
        if self.open_minute_of_day() > self.close_minute_of_day() {
            return Err(CoreError::InvalidMarketHours(
                "open must not be after close".to_string(),
            ));
        }
        if !(-12..=14).contains(&self.utc_offset_hours) {
            return Err(CoreError::InvalidMarketHours(format!(
                "utc_offset_hours out of range: {}",
                self.utc_offset_hours
            )));
        }
        Ok(())
    }

    fn open_minute_of_day(&self) -> u32 {
        self.open_hour * 60 + self.open_minute
    }

    fn close_minute_of_day(&self) -> u32 {
        self.close_hour * 60 + self.close_minute
    }

    /// Check if the session is open at a given UTC datetime.
    #[must_use]
    pub fn is_open_at(&self, dt: DateTime<Utc>) -> bool {
        let local = dt + Duration::hours(i64::from(self.utc_offset_hours));

        if self.weekdays_only && matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }

        let minute_of_day = local.hour() * 60 + local.minute();
        (self.open_minute_of_day()..=self.close_minute_of_day()).contains(&minute_of_day)
    }

    /// Check if the session is open now according to `clock`.
    #[must_use]
    pub fn is_open(&self, clock: &dyn Clock) -> bool {
        self.is_open_at(clock.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    // 2026-02-09 is Monday. KST = UTC+9, so 00:00 UTC is 09:00 KST.

    #[test]
    fn test_open_at_session_start() {
        let hours = MarketHours::default();
        assert!(hours.is_open_at(utc(2026, 2, 9, 0, 0)));
    }

    #[test]
    fn test_closed_before_open() {
        let hours = MarketHours::default();
        // 08:59 KST
        assert!(!hours.is_open_at(utc(2026, 2, 8, 23, 59)));
    }

    #[test]
    fn test_close_minute_inclusive() {
        let hours = MarketHours::default();
        // 15:30 KST is still open, 15:31 is not
        assert!(hours.is_open_at(utc(2026, 2, 9, 6, 30)));
        assert!(!hours.is_open_at(utc(2026, 2, 9, 6, 31)));
    }

    #[test]
    fn test_weekend_closed() {
        let hours = MarketHours::default();
        // Saturday 10:00 KST (2026-02-07 01:00 UTC)
        assert!(!hours.is_open_at(utc(2026, 2, 7, 1, 0)));
    }

    #[test]
    fn test_weekend_open_when_not_weekdays_only() {
        let hours = MarketHours {
            weekdays_only: false,
            ..Default::default()
        };
        assert!(hours.is_open_at(utc(2026, 2, 7, 1, 0)));
    }

    #[test]
    fn test_weekday_taken_in_local_time() {
        // Sunday 23:30 UTC is Monday 08:30 KST.
        let hours = MarketHours {
            open_hour: 8,
            close_hour: 9,
            close_minute: 0,
            ..Default::default()
        };
        assert!(hours.is_open_at(utc(2026, 2, 8, 23, 30)));
        // Friday 23:30 UTC is Saturday 08:30 KST.
        assert!(!hours.is_open_at(utc(2026, 2, 6, 23, 30)));
    }

    #[test]
    fn test_is_open_uses_clock() {
        let mut clock = MockClock::new();
        clock.expect_now().return_const(utc(2026, 2, 10, 2, 0));
        assert!(MarketHours::default().is_open(&clock));
    }

    #[test]
    fn test_validate() {
        assert!(MarketHours::default().validate().is_ok());
        let bad = MarketHours {
            open_hour: 16,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
