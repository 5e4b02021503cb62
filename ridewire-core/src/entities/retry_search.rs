//! Pending proximity searches awaiting a retry.
//!
//! A search exists only while its ride is pending and no driver has been
//! found yet. Whoever removes the entry owns its outcome: the ticker when
//! it finds matches or gives up, the lifecycle engine when the ride is
//! booked or cancelled. A removed search can never fire again.

use dashmap::DashMap;
use ridewire_sdk::objects::{Coordinates, RequestId, UserId};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::DispatchConfig;

#[derive(Debug, Clone)]
pub struct RetrySearch {
    pub request_id: RequestId,
    pub rider_id: UserId,
    pub origin: Coordinates,
    pub radius_m: f64,
    /// Retry attempts made so far (the immediate search is not counted).
    pub attempts: u32,
    pub max_attempts: u32,
    pub interval: Duration,
    pub next_attempt_at: Instant,
    /// Hard backstop; reaching it ends the search whatever the attempt count.
    pub deadline: Instant,
}

impl RetrySearch {
    pub fn new(
        request_id: RequestId,
        rider_id: UserId,
        origin: Coordinates,
        radius_m: f64,
        config: &DispatchConfig,
        now: Instant,
    ) -> Self {
        Self {
            request_id,
            rider_id,
            origin,
            radius_m,
            attempts: 0,
            max_attempts: config.max_search_attempts,
            interval: config.retry_interval.min(MAX_DELAY),
            next_attempt_at: later(now, config.retry_interval),
            deadline: later(now, config.search_timeout()),
        }
    }
}

/// `now + delay`, saturating at a year out.
fn later(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay.min(MAX_DELAY)).unwrap_or(now)
}

const MAX_DELAY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// What the ticker should do with one search.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchStep {
    /// Run a proximity search. If it finds nobody and `last` is set, the
    /// search must be expired.
    Attempt {
        rider_id: UserId,
        origin: Coordinates,
        radius_m: f64,
        last: bool,
    },
    /// Give up without searching again.
    Expire { rider_id: UserId },
}

#[derive(Default)]
pub struct SearchTable {
    searches: DashMap<RequestId, RetrySearch>,
}

impl SearchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a search, replacing any previous one for the same request.
    pub fn start(&self, search: RetrySearch) {
        self.searches.insert(search.request_id, search);
    }

    /// Remove a search. Only the caller that gets `Some` back may act on
    /// its outcome.
    pub fn cancel(&self, request_id: &RequestId) -> Option<RetrySearch> {
        self.searches.remove(request_id).map(|(_, search)| search)
    }

    pub fn is_active(&self, request_id: &RequestId) -> bool {
        self.searches.contains_key(request_id)
    }

    pub fn get(&self, request_id: &RequestId) -> Option<RetrySearch> {
        self.searches
            .get(request_id)
            .map(|search| search.value().clone())
    }

    /// Ids of searches that need attention at `now`.
    pub fn due(&self, now: Instant) -> Vec<RequestId> {
        self.searches
            .iter()
            .filter(|search| now >= search.next_attempt_at || now >= search.deadline)
            .map(|search| search.request_id)
            .collect()
    }

    /// Advance one search by a tick.
    ///
    /// Consumes an attempt when one is due. Returns `None` if the search is
    /// gone or nothing is due yet.
    pub fn step(&self, request_id: &RequestId, now: Instant) -> Option<SearchStep> {
        let mut entry = self.searches.get_mut(request_id)?;
        let search = entry.value_mut();

        if now >= search.next_attempt_at && search.attempts < search.max_attempts {
            search.attempts += 1;
            search.next_attempt_at += search.interval;
            return Some(SearchStep::Attempt {
                rider_id: search.rider_id.clone(),
                origin: search.origin,
                radius_m: search.radius_m,
                last: search.attempts >= search.max_attempts || now >= search.deadline,
            });
        }

        if now >= search.deadline || search.attempts >= search.max_attempts {
            return Some(SearchStep::Expire {
                rider_id: search.rider_id.clone(),
            });
        }

        None
    }

    pub fn len(&self) -> usize {
        self.searches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.searches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(interval_secs: u64, max: u32) -> DispatchConfig {
        DispatchConfig {
            retry_interval: Duration::from_secs(interval_secs),
            max_search_attempts: max,
            ..DispatchConfig::default()
        }
    }

    fn search(config: &DispatchConfig, now: Instant) -> RetrySearch {
        RetrySearch::new(
            RequestId::generate(),
            UserId::from("u1"),
            Coordinates::new(10.0, 10.0),
            5_000.0,
            config,
            now,
        )
    }

    #[test]
    fn test_not_due_before_interval() {
        let now = Instant::now();
        let table = SearchTable::new();
        let search = search(&config(5, 10), now);
        let id = search.request_id;
        table.start(search);

        assert!(table.due(now).is_empty());
        assert_eq!(table.step(&id, now + Duration::from_secs(4)), None);
        assert_eq!(table.due(now + Duration::from_secs(5)), vec![id]);
    }

    #[test]
    fn test_attempts_are_bounded_then_expire() {
        let start = Instant::now();
        let table = SearchTable::new();
        let search = search(&config(5, 3), start);
        let id = search.request_id;
        table.start(search);

        let mut lasts = Vec::new();
        for n in 1..=3u64 {
            match table.step(&id, start + Duration::from_secs(5 * n)) {
                Some(SearchStep::Attempt { last, .. }) => lasts.push(last),
                other => panic!("expected attempt, got {other:?}"),
            }
        }
        assert_eq!(lasts, vec![false, false, true]);
        assert_eq!(table.get(&id).unwrap().attempts, 3);

        assert!(matches!(
            table.step(&id, start + Duration::from_secs(20)),
            Some(SearchStep::Expire { .. })
        ));
    }

    #[test]
    fn test_deadline_forces_expiry() {
        let start = Instant::now();
        let table = SearchTable::new();
        let search = search(&config(5, 10), start);
        let id = search.request_id;
        table.start(search);

        // A stalled ticker wakes up past the backstop: the one attempt it
        // still gets is the last.
        let late = start + Duration::from_secs(50);
        assert!(matches!(
            table.step(&id, late),
            Some(SearchStep::Attempt { last: true, .. })
        ));
    }

    #[test]
    fn test_oversized_interval_saturates() {
        let now = Instant::now();
        let search = search(&config(u64::MAX, u32::MAX), now);
        assert_eq!(search.interval, MAX_DELAY);
        assert_eq!(search.next_attempt_at, now + MAX_DELAY);
        assert_eq!(search.deadline, now + MAX_DELAY);

        let table = SearchTable::new();
        let id = search.request_id;
        table.start(search);
        assert!(matches!(
            table.step(&id, now + MAX_DELAY),
            Some(SearchStep::Attempt { .. })
        ));
    }

    #[test]
    fn test_cancel_is_exactly_once() {
        let table = SearchTable::new();
        let search = search(&config(5, 10), Instant::now());
        let id = search.request_id;
        table.start(search);

        assert!(table.cancel(&id).is_some());
        assert!(table.cancel(&id).is_none());
        assert!(!table.is_active(&id));
        assert_eq!(table.step(&id, Instant::now()), None);
    }
}
