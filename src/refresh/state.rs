//! Widget refresh state and early-retry backoff.

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use super::policy::CachePolicy;
use crate::error::FetchError;

/// Ceiling for consecutive failed updates; the backoff stops growing here.
pub const MAX_RETRY_COUNT: u32 = 5;

/// Aggregate result of one widget update cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Everything was fetched.
    Success,
    /// Some sub-fetches failed but there is enough to show.
    PartialFailure(FetchError),
    /// Nothing usable was retrieved.
    TotalFailure(FetchError),
}

impl From<Result<(), FetchError>> for Outcome {
    fn from(result: Result<(), FetchError>) -> Self {
        match result {
            Ok(()) => Self::Success,
            Err(err) if err.is_partial() => Self::PartialFailure(err),
            Err(err) => Self::TotalFailure(err),
        }
    }
}

/// Scheduling and status record of a single widget.
///
/// Mutated only by the widget's own update cycle; callers must not run two
/// cycles of the same widget at once.
#[derive(Debug, Clone)]
pub struct RefreshState {
    policy: CachePolicy,
    next_update: Option<DateTime<Utc>>,
    retry_count: u32,
    content_available: bool,
    last_error: Option<FetchError>,
    last_notice: Option<FetchError>,
    last_updated: Option<DateTime<Utc>>,
}

impl RefreshState {
    /// Fresh state: due immediately, no content yet.
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            next_update: None,
            retry_count: 0,
            content_available: false,
            last_error: None,
            last_notice: None,
            last_updated: None,
        }
    }

    /// Mark content as present from the start (static widgets).
    pub fn with_content_available(mut self) -> Self {
        self.content_available = true;
        self
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn next_update(&self) -> Option<DateTime<Utc>> {
        self.next_update
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn content_available(&self) -> bool {
        self.content_available
    }

    pub fn last_error(&self) -> Option<&FetchError> {
        self.last_error.as_ref()
    }

    pub fn last_notice(&self) -> Option<&FetchError> {
        self.last_notice.as_ref()
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    /// Whether the widget should be updated at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if self.policy.is_infinite() {
            return false;
        }

        match self.next_update {
            None => true,
            Some(next) => now > next,
        }
    }

    /// Absorb the outcome of an update cycle finished at `now`.
    pub fn report(&mut self, outcome: Outcome, now: DateTime<Utc>) {
        match outcome {
            Outcome::Success => {
                self.last_error = None;
                self.last_notice = None;
                self.content_available = true;
                self.last_updated = Some(now);
                self.retry_count = 0;
                self.next_update = self.policy.next_update(now);
            }
            Outcome::PartialFailure(notice) => {
                self.last_error = None;
                self.last_notice = Some(notice);
                self.content_available = true;
                self.last_updated = Some(now);
                self.schedule_early_update(now);
            }
            Outcome::TotalFailure(err) => {
                self.last_error = Some(err);
                self.last_notice = None;
                self.schedule_early_update(now);
            }
        }
    }

    /// Classify a fetch result, record it, and tell the caller whether the
    /// freshly fetched data may be stored.
    pub fn report_result(&mut self, result: Result<(), FetchError>, now: DateTime<Utc>) -> bool {
        let outcome = Outcome::from(result);
        let can_continue = !matches!(outcome, Outcome::TotalFailure(_));
        self.report(outcome, now);
        can_continue
    }

    /// Delay before the next retry for the current failure streak.
    pub fn retry_delay(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.retry_count * self.retry_count))
    }

    fn schedule_early_update(&mut self, now: DateTime<Utc>) {
        self.retry_count = (self.retry_count + 1).min(MAX_RETRY_COUNT);

        let early = now + self.retry_delay();
        self.next_update = self.policy.next_update(now).map(|usual| early.min(usual));

        debug!(
            retry_count = self.retry_count,
            next_update = ?self.next_update,
            "Scheduled early update"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 20, 8, 0, 0).unwrap()
    }

    fn hourly_fixed() -> RefreshState {
        RefreshState::new(CachePolicy::FixedDuration(Duration::from_secs(3600)))
    }

    fn no_content() -> FetchError {
        FetchError::NoContent("down".into())
    }

    fn partial() -> FetchError {
        FetchError::PartialContent {
            failed: 2,
            total: 10,
            what: "feeds".into(),
        }
    }

    #[test]
    fn new_state_is_due_immediately() {
        let state = hourly_fixed();
        assert!(state.is_due(t0()));
        assert!(!state.content_available());
    }

    #[test]
    fn infinite_is_never_due() {
        let state = RefreshState::new(CachePolicy::Infinite);
        assert!(!state.is_due(t0()));
    }

    #[test]
    fn success_schedules_normal_update() {
        let mut state = hourly_fixed();
        state.report(Outcome::Success, t0());

        assert_eq!(state.next_update(), Some(t0() + TimeDelta::hours(1)));
        assert!(state.content_available());
        assert_eq!(state.retry_count(), 0);
        assert!(!state.is_due(t0() + TimeDelta::minutes(59)));
        assert!(!state.is_due(t0() + TimeDelta::hours(1)));
        assert!(state.is_due(t0() + TimeDelta::hours(1) + TimeDelta::seconds(1)));
    }

    #[test]
    fn backoff_grows_quadratically_then_caps() {
        let mut state = hourly_fixed();
        let mut delays = Vec::new();

        for _ in 0..7 {
            state.report(Outcome::TotalFailure(no_content()), t0());
            delays.push((state.next_update().unwrap() - t0()).num_minutes());
        }

        assert_eq!(delays, vec![1, 4, 9, 16, 25, 25, 25]);
        assert_eq!(state.retry_count(), MAX_RETRY_COUNT);
    }

    #[test]
    fn success_resets_backoff() {
        let mut state = hourly_fixed();
        for _ in 0..4 {
            state.report(Outcome::TotalFailure(no_content()), t0());
        }
        state.report(Outcome::Success, t0());
        state.report(Outcome::TotalFailure(no_content()), t0());

        assert_eq!(state.next_update(), Some(t0() + TimeDelta::minutes(1)));
    }

    #[test]
    fn retry_never_later_than_normal_interval() {
        let mut state = RefreshState::new(CachePolicy::FixedDuration(Duration::from_secs(600)));
        for _ in 0..MAX_RETRY_COUNT {
            state.report(Outcome::TotalFailure(no_content()), t0());
            let normal = state.policy().next_update(t0()).unwrap();
            assert!(state.next_update().unwrap() <= normal);
        }
        // 16 and 25 minutes would both exceed the 10 minute interval.
        assert_eq!(state.next_update(), Some(t0() + TimeDelta::minutes(10)));
    }

    #[test]
    fn hourly_retry_capped_at_boundary() {
        let mut state = RefreshState::new(CachePolicy::AlignedHourly);
        let now = t0() + TimeDelta::minutes(50);
        for _ in 0..MAX_RETRY_COUNT {
            state.report(Outcome::TotalFailure(no_content()), now);
        }
        let boundary = CachePolicy::AlignedHourly.next_update(now).unwrap();
        assert!(state.next_update().unwrap() <= boundary);
    }

    #[test]
    fn partial_failure_keeps_content_and_sets_notice() {
        let mut state = hourly_fixed();
        state.report(Outcome::TotalFailure(no_content()), t0());
        state.report(Outcome::PartialFailure(partial()), t0());

        assert!(state.content_available());
        assert!(state.last_error().is_none());
        assert_eq!(state.last_notice(), Some(&partial()));
        assert_eq!(state.retry_count(), 2);
        assert_eq!(state.next_update(), Some(t0() + TimeDelta::minutes(4)));
    }

    #[test]
    fn first_total_failure_leaves_no_content() {
        let mut state = hourly_fixed();
        state.report(Outcome::TotalFailure(no_content()), t0());

        assert!(!state.content_available());
        assert_eq!(state.last_error(), Some(&no_content()));
        assert!(state.last_notice().is_none());
    }

    #[test]
    fn content_sticks_across_total_failures() {
        let mut state = hourly_fixed();
        state.report(Outcome::Success, t0());
        for _ in 0..3 {
            state.report(Outcome::TotalFailure(no_content()), t0());
            assert!(state.content_available());
        }
    }

    #[test]
    fn error_and_notice_are_exclusive() {
        let mut state = hourly_fixed();
        state.report(Outcome::PartialFailure(partial()), t0());
        state.report(Outcome::TotalFailure(no_content()), t0());
        assert!(state.last_notice().is_none());
        assert!(state.last_error().is_some());

        state.report(Outcome::Success, t0());
        assert!(state.last_notice().is_none());
        assert!(state.last_error().is_none());
    }

    #[test]
    fn report_result_classifies() {
        let mut state = hourly_fixed();
        assert!(state.report_result(Ok(()), t0()));
        assert!(state.report_result(Err(partial()), t0()));
        assert!(!state.report_result(Err(no_content()), t0()));

        let transport = FetchError::Request {
            url: "http://x".into(),
            reason: "refused".into(),
        };
        assert!(!state.report_result(Err(transport), t0()));
        assert_eq!(state.retry_count(), 3);
    }

    #[test]
    fn infinite_failure_stays_unscheduled() {
        let mut state = RefreshState::new(CachePolicy::Infinite).with_content_available();
        state.report(Outcome::TotalFailure(no_content()), t0());
        assert_eq!(state.next_update(), None);
        assert!(!state.is_due(t0()));
        assert!(state.content_available());
    }
}
