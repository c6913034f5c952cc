//! Cache policies.

use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta, Timelike, Utc};

/// How often a widget refreshes when nothing goes wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Never refreshed automatically (static content).
    Infinite,
    /// Refreshed a fixed duration after the last update.
    FixedDuration(Duration),
    /// Refreshed at the start of every wall-clock hour.
    AlignedHourly,
}

impl CachePolicy {
    /// When the next regular update is due, measured from `now`.
    ///
    /// `None` for [`CachePolicy::Infinite`].
    pub fn next_update(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Infinite => None,
            Self::FixedDuration(every) => {
                let every = TimeDelta::from_std(*every).unwrap_or(TimeDelta::MAX);
                Some(now.checked_add_signed(every).unwrap_or(DateTime::<Utc>::MAX_UTC))
            }
            Self::AlignedHourly => Some(next_hour_boundary(now)),
        }
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, Self::Infinite)
    }
}

/// Start of the wall-clock hour following `now`, in local time.
///
/// An instant already sitting on `:00:00` moves a full hour ahead.
pub fn next_hour_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
    let local = now.with_timezone(&Local);
    let into_hour = TimeDelta::seconds(i64::from(local.minute() * 60 + local.second()))
        + TimeDelta::nanoseconds(i64::from(local.nanosecond()));

    now - into_hour + TimeDelta::hours(1)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn infinite_never_schedules() {
        assert_eq!(CachePolicy::Infinite.next_update(Utc::now()), None);
        assert!(CachePolicy::Infinite.is_infinite());
    }

    #[test]
    fn fixed_duration_adds_interval() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 17, 42).unwrap();
        let policy = CachePolicy::FixedDuration(Duration::from_secs(300));
        assert_eq!(
            policy.next_update(now),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 22, 42).unwrap())
        );
    }

    #[test]
    fn huge_duration_saturates() {
        let policy = CachePolicy::FixedDuration(Duration::from_secs(u64::MAX));
        assert!(policy.next_update(Utc::now()).is_some());
    }

    #[test]
    fn hourly_lands_on_boundary() {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        for offset_secs in [0_i64, 1, 59, 61, 1799, 3599] {
            let now = base + TimeDelta::seconds(offset_secs) + TimeDelta::milliseconds(250);
            let next = CachePolicy::AlignedHourly.next_update(now).unwrap();
            let local = next.with_timezone(&Local);

            assert_eq!(local.minute(), 0, "offset {offset_secs}");
            assert_eq!(local.second(), 0, "offset {offset_secs}");
            assert_eq!(local.nanosecond(), 0, "offset {offset_secs}");
            assert!(next > now);
            assert!(next - now <= TimeDelta::hours(1));
        }
    }

    #[test]
    fn exact_boundary_moves_a_full_hour() {
        let local_top = Local::now()
            .with_minute(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap();
        let now = local_top.with_timezone(&Utc);
        assert_eq!(next_hour_boundary(now) - now, TimeDelta::hours(1));
    }
}
