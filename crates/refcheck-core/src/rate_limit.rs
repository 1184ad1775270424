//! Per-capability rate limiting with adaptive governor instances.
//!
//! Each external call waits for its governor permit via `until_ready()`, which
//! spaces requests at the configured rate. On 429 the governor is slowed and
//! the call is retried once after `Retry-After`. Budgeted capabilities are
//! additionally serialized so that at most one call per instance is in flight.

use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use crate::lookup::{LookupError, crossref, scopus, serpapi};

/// Type alias for governor's direct rate limiter.
type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

const MAX_SLOWDOWN: u32 = 16;
const DECAY_AFTER: Duration = Duration::from_secs(60);

fn quota_for(period: Duration) -> Quota {
    Quota::with_period(period).unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
}

/// Rate limiter for one capability with adaptive rate adjustment via ArcSwap.
///
/// When a 429 is received, the governor is atomically swapped to a slower rate.
/// After 60s with no 429s, the original rate is restored.
pub struct AdaptiveLimiter {
    limiter: ArcSwap<DirectLimiter>,
    /// Base period between allowed requests.
    base_period: Duration,
    /// Current slowdown factor (1 = normal, 2 = half rate, etc.).
    current_factor: AtomicU32,
    last_429: std::sync::Mutex<Option<Instant>>,
}

impl AdaptiveLimiter {
    /// Create a new limiter with the given period between requests.
    pub fn new(period: Duration) -> Self {
        let limiter = Arc::new(DirectLimiter::direct(quota_for(period)));
        Self {
            limiter: ArcSwap::from(limiter),
            base_period: period,
            current_factor: AtomicU32::new(1),
            last_429: std::sync::Mutex::new(None),
        }
    }

    /// Create a limiter allowing `n` requests per second.
    pub fn per_second(n: u32) -> Self {
        let ms = 1000 / n.max(1) as u64;
        Self::new(Duration::from_millis(ms))
    }

    /// Wait until the rate limiter allows a request.
    pub async fn acquire(&self) {
        self.try_decay();
        let limiter = self.limiter.load();
        limiter.until_ready().await;
    }

    /// Called when a 429 is received. Doubles the slowdown factor and swaps the governor.
    pub fn on_rate_limited(&self) {
        if let Ok(mut last) = self.last_429.lock() {
            *last = Some(Instant::now());
        }

        let _ = self
            .current_factor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |f| {
                Some((f * 2).min(MAX_SLOWDOWN))
            });

        let factor = self.current_factor.load(Ordering::SeqCst);
        if let Some(scaled) = self.base_period.checked_mul(factor) {
            self.limiter
                .store(Arc::new(DirectLimiter::direct(quota_for(scaled))));
        }
    }

    /// Current slowdown factor (1 = configured rate).
    pub fn slowdown(&self) -> u32 {
        self.current_factor.load(Ordering::SeqCst)
    }

    /// If 60s have passed since the last 429, restore the original rate.
    fn try_decay(&self) {
        let should_restore = self
            .last_429
            .lock()
            .ok()
            .and_then(|last| last.map(|t| t.elapsed() >= DECAY_AFTER))
            .unwrap_or(false);

        if should_restore && self.current_factor.load(Ordering::SeqCst) > 1 {
            self.current_factor.store(1, Ordering::SeqCst);
            self.limiter
                .store(Arc::new(DirectLimiter::direct(quota_for(self.base_period))));
        }
    }
}

/// Collection of per-capability rate limiters, keyed by capability name.
///
/// Also owns the serial locks of budgeted capabilities. A lock is created on
/// the first budgeted call for a name, whether or not that name has a limiter.
pub struct RateLimiters {
    limiters: HashMap<String, AdaptiveLimiter>,
    serial: std::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self::new(false)
    }
}

impl RateLimiters {
    /// Build rate limiters for the HTTP capabilities.
    pub fn new(has_crossref_mailto: bool) -> Self {
        let mut limiters = HashMap::new();

        // Crossref: 1/s anonymous, 3/s in the polite pool
        let crossref_rate = if has_crossref_mailto { 3 } else { 1 };
        limiters.insert(
            crossref::NAME.to_string(),
            AdaptiveLimiter::per_second(crossref_rate),
        );

        // Scopus: keyed search, conservative 2/s
        limiters.insert(scopus::NAME.to_string(), AdaptiveLimiter::per_second(2));

        // SerpAPI: every call spends account credit
        limiters.insert(serpapi::NAME.to_string(), AdaptiveLimiter::per_second(1));

        Self {
            limiters,
            serial: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// No limiters at all (tests, offline runs).
    pub fn empty() -> Self {
        Self {
            limiters: HashMap::new(),
            serial: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Add or replace the limiter for a capability.
    pub fn insert(&mut self, name: &str, limiter: AdaptiveLimiter) {
        self.limiters.insert(name.to_string(), limiter);
    }

    /// Get the rate limiter for a given capability, if one exists.
    pub fn get(&self, name: &str) -> Option<&AdaptiveLimiter> {
        self.limiters.get(name)
    }

    /// Serial lock shared by every call to the named capability.
    fn serial_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.serial.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(locks.entry(name.to_string()).or_default())
    }
}

/// Check if an HTTP response is a 429 and extract Retry-After if present.
pub fn check_rate_limit_response(resp: &reqwest::Response) -> Result<(), LookupError> {
    if resp.status().as_u16() == 429 {
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        Err(LookupError::RateLimited { retry_after })
    } else {
        Ok(())
    }
}

/// Parse a Retry-After header value (seconds or HTTP-date).
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    if let Ok(secs) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    // HTTP-date: use a conservative fixed wait
    if value.contains(',') || value.contains("GMT") {
        return Some(Duration::from_secs(5));
    }
    None
}

/// Run one external call under the capability's rate limiter.
///
/// 1. If `budgeted`, takes the capability's serial lock for the whole call
/// 2. Acquires the governor permit (waits if needed)
/// 3. Calls `call()`
/// 4. On 429: slows the governor, sleeps for `Retry-After` (capped at
///    `timeout`) and retries once
pub async fn call_with_rate_limit<T, F, Fut>(
    name: &str,
    budgeted: bool,
    timeout: Duration,
    rate_limiters: &RateLimiters,
    call: F,
) -> Result<T, LookupError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, LookupError>>,
{
    let limiter = rate_limiters.get(name);

    let serial = budgeted.then(|| rate_limiters.serial_lock(name));
    let _serial = match &serial {
        Some(lock) => Some(lock.lock().await),
        None => None,
    };

    if let Some(lim) = limiter {
        lim.acquire().await;
    }

    match call().await {
        Err(LookupError::RateLimited { retry_after }) => {
            if let Some(lim) = limiter {
                lim.on_rate_limited();
            }

            let wait = retry_after.unwrap_or(Duration::from_secs(2)).min(timeout);
            tracing::info!(
                lookup = name,
                wait_secs = wait.as_secs_f64(),
                "429 rate limited, waiting then retrying"
            );
            tokio::time::sleep(wait).await;

            if let Some(lim) = limiter {
                lim.acquire().await;
            }

            // Single retry; a second 429 is returned to the caller
            call().await
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::TitleSearch;
    use crate::lookup::mock::{MockResponse, MockSearch};

    // ── parse_retry_after ──────────────────────────────────────────────

    #[test]
    fn parse_integer_seconds() {
        assert_eq!(parse_retry_after(" 7 "), Some(Duration::from_secs(7)));
    }

    #[test]
    fn parse_http_date() {
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn parse_garbage_none() {
        assert_eq!(parse_retry_after("soon"), None);
    }

    // ── check_rate_limit_response ──────────────────────────────────────

    #[test]
    fn ok_on_200() {
        let http_resp = http::Response::builder().status(200).body("").unwrap();
        let resp = reqwest::Response::from(http_resp);
        assert!(check_rate_limit_response(&resp).is_ok());
    }

    #[test]
    fn rate_limited_429_with_retry_after() {
        let http_resp = http::Response::builder()
            .status(429)
            .header("retry-after", "3")
            .body("")
            .unwrap();
        let resp = reqwest::Response::from(http_resp);
        assert_eq!(
            check_rate_limit_response(&resp),
            Err(LookupError::RateLimited {
                retry_after: Some(Duration::from_secs(3))
            })
        );
    }

    // ── AdaptiveLimiter ────────────────────────────────────────────────

    #[test]
    fn slowdown_doubles_and_caps() {
        let limiter = AdaptiveLimiter::per_second(10);
        assert_eq!(limiter.slowdown(), 1);
        limiter.on_rate_limited();
        assert_eq!(limiter.slowdown(), 2);
        for _ in 0..10 {
            limiter.on_rate_limited();
        }
        assert_eq!(limiter.slowdown(), MAX_SLOWDOWN);
    }

    #[tokio::test]
    async fn decay_restores_after_cooldown() {
        let limiter = AdaptiveLimiter::per_second(10);
        limiter.on_rate_limited();
        limiter.on_rate_limited();
        {
            let mut last = limiter.last_429.lock().unwrap();
            *last = Some(Instant::now() - Duration::from_secs(61));
        }
        limiter.acquire().await;
        assert_eq!(limiter.slowdown(), 1);
    }

    // ── RateLimiters ───────────────────────────────────────────────────

    #[test]
    fn default_has_http_capabilities() {
        let limiters = RateLimiters::default();
        for name in ["Crossref", "Scopus", "Google Scholar"] {
            assert!(limiters.get(name).is_some(), "missing limiter for {name}");
        }
        assert!(limiters.get("Nope").is_none());
    }

    #[test]
    fn crossref_rate_varies_with_mailto() {
        let without = RateLimiters::new(false);
        let with = RateLimiters::new(true);
        assert!(
            with.get("Crossref").unwrap().base_period
                < without.get("Crossref").unwrap().base_period
        );
    }

    // ── call_with_rate_limit ───────────────────────────────────────────

    async fn run_search(db: &MockSearch, limiters: &RateLimiters) -> Result<usize, LookupError> {
        let client = reqwest::Client::new();
        let timeout = Duration::from_secs(10);
        call_with_rate_limit(db.name(), db.is_budgeted(), timeout, limiters, || {
            db.search("A Paper", 3, &client, timeout)
        })
        .await
        .map(|hits| hits.len())
    }

    #[tokio::test(start_paused = true)]
    async fn success_first_try() {
        let db = MockSearch::new("Google Scholar", MockResponse::hit("A Paper"));
        let limiters = RateLimiters::default();
        assert_eq!(run_search(&db, &limiters).await, Ok(1));
        assert_eq!(db.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_retries_once() {
        let db = MockSearch::new(
            "Google Scholar",
            MockResponse::RateLimited {
                retry_after: Some(Duration::from_secs(5)),
            },
        );
        let limiters = RateLimiters::default();
        assert!(run_search(&db, &limiters).await.is_err());
        assert_eq!(db.call_count(), 2);
        assert_eq!(limiters.get("Google Scholar").unwrap().slowdown(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_429_can_succeed() {
        let db = MockSearch::with_sequence(
            "Scopus",
            vec![
                MockResponse::RateLimited { retry_after: None },
                MockResponse::hit("A Paper"),
            ],
        );
        let limiters = RateLimiters::default();
        assert_eq!(run_search(&db, &limiters).await, Ok(1));
        assert_eq!(db.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn other_error_no_retry() {
        let db = MockSearch::new("Scopus", MockResponse::Error("connection refused".into()));
        let limiters = RateLimiters::default();
        assert!(run_search(&db, &limiters).await.is_err());
        assert_eq!(db.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn budgeted_calls_do_not_overlap() {
        let db = Arc::new(
            MockSearch::new("Budget", MockResponse::hit("A Paper"))
                .with_delay(Duration::from_millis(50))
                .budgeted(),
        );
        let mut limiters = RateLimiters::empty();
        limiters.insert("Budget", AdaptiveLimiter::per_second(1000));
        let limiters = Arc::new(limiters);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let db = Arc::clone(&db);
            let limiters = Arc::clone(&limiters);
            handles.push(tokio::spawn(async move {
                run_search(&db, &limiters).await
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap(), Ok(1));
        }
        assert_eq!(db.call_count(), 4);
        assert_eq!(db.max_concurrent_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn budgeted_calls_serialize_without_a_limiter() {
        let db = Arc::new(
            MockSearch::new("Unregistered", MockResponse::hit("A Paper"))
                .with_delay(Duration::from_millis(50))
                .budgeted(),
        );
        let limiters = Arc::new(RateLimiters::empty());

        let mut handles = Vec::new();
        for _ in 0..4 {
            let db = Arc::clone(&db);
            let limiters = Arc::clone(&limiters);
            handles.push(tokio::spawn(async move {
                run_search(&db, &limiters).await
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap(), Ok(1));
        }
        assert_eq!(db.max_concurrent_calls(), 1);
    }
}
