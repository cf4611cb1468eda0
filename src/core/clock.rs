// Wall-clock access for the core.
//
// "Today" and "next midnight" are always evaluated in the bot's configured
// timezone, so every service that cares about calendar days goes through a
// Clock instead of calling Utc::now() directly. Tests swap in a clock they
// can move by hand.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

pub trait Clock: Send + Sync {
    /// Current instant in the configured timezone.
    fn now(&self) -> DateTime<Tz>;

    /// Current calendar day in the configured timezone.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        self.now().with_timezone(&Utc)
    }
}

/// Clock backed by the system time, projected into a fixed IANA zone.
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }
}

#[cfg(test)]
pub use test_clocks::{FixedClock, PausedClock};


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock_rolls_over_midnight() {
        let clock = FixedClock::at(2024, 5, 1, 23, 59);
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());

        clock.advance(chrono::Duration::minutes(2));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());
    }

    #[test]
    fn test_system_clock_uses_configured_zone() {
        let clock = SystemClock::new(chrono_tz::Asia::Tokyo);
        assert_eq!(clock.now().timezone(), chrono_tz::Asia::Tokyo);
    }
}
