//! In-memory storage for captured responses.

use std::sync::{Arc, Mutex, TryLockError};
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::time::Instant;

use super::CacheKey;
use crate::{Headers, Response, StatusCode};

/// A frozen copy of a finalized response.
///
/// Built once, after every `on_starting` callback has run; nothing about it
/// can change afterwards.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    status: StatusCode,
    headers: Headers,
    body: Bytes,
    created: Instant,
    ttl: Duration,
}

impl CachedResponse {
    /// Captures `response` as it is now, valid for `ttl`.
    pub fn capture(response: &Response, ttl: Duration) -> Self {
        let mut headers = response.headers().clone();
        headers.remove("age");
        Self {
            status: response.status(),
            headers,
            body: response.body_ref().clone(),
            created: Instant::now(),
            ttl,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Time elapsed between capture and `now`.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created)
    }

    pub fn is_fresh(&self, now: Instant) -> bool {
        self.age(now) < self.ttl
    }

    /// Replays the snapshot with an `Age` header in whole seconds.
    pub fn to_response(&self, now: Instant) -> Response {
        let mut response =
            Response::from_parts(self.status, self.headers.clone(), self.body.clone());
        response.set_header("Age", self.age(now).as_secs().to_string());
        response
    }
}

/// How often lookups and inserts sweep out expired entries by default.
pub const DEFAULT_SCAN_FREQUENCY: Duration = Duration::from_secs(60);

/// Shared, concurrent map from [`CacheKey`] to [`CachedResponse`].
///
/// Clones share the same entries. An expired entry is dropped when its key is
/// looked up, and every other expired entry is swept out by the first lookup
/// or insert once the scan frequency has elapsed since the previous sweep.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    entries: Arc<DashMap<CacheKey, CachedResponse>>,
    scan_frequency: Duration,
    last_scan: Arc<Mutex<Instant>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_scan_frequency(DEFAULT_SCAN_FREQUENCY)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that sweeps expired entries at most once per `frequency`.
    pub fn with_scan_frequency(frequency: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            scan_frequency: frequency,
            last_scan: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn scan_frequency(&self) -> Duration {
        self.scan_frequency
    }

    /// Returns the entry for `key` if it is still fresh.
    pub fn get(&self, key: &CacheKey) -> Option<CachedResponse> {
        let now = Instant::now();
        self.scan_if_due(now);
        // Clone out first: removing while a shard guard is held would deadlock.
        let entry = self.entries.get(key).map(|e| e.value().clone())?;
        if entry.is_fresh(now) {
            return Some(entry);
        }
        self.entries.remove_if(key, |_, e| !e.is_fresh(now));
        tracing::debug!(key = %key, "expired response evicted");
        None
    }

    pub fn set(&self, key: CacheKey, entry: CachedResponse) {
        self.scan_if_due(Instant::now());
        self.entries.insert(key, entry);
    }

    pub fn remove(&self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    fn purge_expired_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_fresh(now));
        before.saturating_sub(self.entries.len())
    }

    // At most one caller sweeps; the others carry on without waiting.
    fn scan_if_due(&self, now: Instant) {
        let mut last_scan = match self.last_scan.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return,
        };
        if now.saturating_duration_since(*last_scan) < self.scan_frequency {
            return;
        }
        *last_scan = now;
        drop(last_scan);

        let removed = self.purge_expired_at(now);
        if removed > 0 {
            tracing::debug!(removed, "expired responses swept");
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Method, Request};

    fn key(path: &str) -> CacheKey {
        CacheKey::from_request(&Request::new(Method::Get, path), false)
    }

    fn page(body: &str) -> Response {
        Response::new(StatusCode::Ok)
            .content_type("text/html")
            .header("Age", "99")
            .body(body.to_owned())
    }

    #[test]
    fn capture_is_independent_of_later_edits() {
        let mut response = page("v1");
        let snapshot = CachedResponse::capture(&response, Duration::from_secs(60));
        response.add_header("X-Later", "1");

        assert!(!snapshot.headers().contains("x-later"));
        assert!(!snapshot.headers().contains("age"));
        assert_eq!(snapshot.body().as_ref(), b"v1");
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let store = MemoryStore::new();
        store.set(key("/"), CachedResponse::capture(&page("x"), Duration::from_secs(60)));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(store.get(&key("/")).is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(store.get(&key("/")).is_none());
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn replay_reports_age() {
        let snapshot = CachedResponse::capture(&page("x"), Duration::from_secs(60));
        tokio::time::advance(Duration::from_secs(7)).await;

        let replay = snapshot.to_response(Instant::now());
        assert_eq!(replay.headers().get("age"), Some("7"));
        assert_eq!(replay.content_type_value(), Some("text/html"));
    }

    #[tokio::test(start_paused = true)]
    async fn unvisited_entries_are_swept_on_schedule() {
        let store = MemoryStore::with_scan_frequency(Duration::from_secs(30));
        store.set(key("/once"), CachedResponse::capture(&page("a"), Duration::from_secs(5)));
        store.set(key("/kept"), CachedResponse::capture(&page("b"), Duration::from_secs(300)));

        // Expired, but not yet time to sweep.
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(store.get(&key("/kept")).is_some());
        assert_eq!(store.len(), 2);

        tokio::time::advance(Duration::from_secs(20)).await;
        store.set(key("/other"), CachedResponse::capture(&page("c"), Duration::from_secs(300)));
        assert_eq!(store.len(), 2);
        assert!(store.remove(&key("/kept")));
        assert!(store.remove(&key("/other")));
    }

    #[tokio::test(start_paused = true)]
    async fn purge_expired_keeps_fresh_entries() {
        let store = MemoryStore::new();
        store.set(key("/short"), CachedResponse::capture(&page("a"), Duration::from_secs(5)));
        store.set(key("/long"), CachedResponse::capture(&page("b"), Duration::from_secs(50)));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.remove(&key("/long")));
    }
}
