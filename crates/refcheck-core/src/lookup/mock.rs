//! Mock lookup capabilities for testing.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{
    IdentifierResolver, LookupError, LookupFuture, ResolvedWork, SearchHit, TitleSearch,
};

/// A configurable mock response for [`MockSearch`] and [`MockResolver`].
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Candidates as `(title, url)` pairs. For a resolver only the first is used.
    Hits(Vec<(String, Option<String>)>),
    /// No results / identifier unknown.
    Empty,
    /// Simulate a 429 rate-limit response.
    RateLimited { retry_after: Option<Duration> },
    /// Simulate the service's quota running out.
    QuotaExceeded(String),
    /// Simulate a transport failure.
    Error(String),
}

impl MockResponse {
    /// One candidate with a title and no URL.
    pub fn hit(title: &str) -> Self {
        MockResponse::Hits(vec![(title.to_string(), None)])
    }

    /// Several candidates with titles only.
    pub fn hits(titles: &[&str]) -> Self {
        MockResponse::Hits(titles.iter().map(|t| (t.to_string(), None)).collect())
    }
}

/// Shared call bookkeeping: scripted responses, latency, counters.
struct Script {
    name: &'static str,
    /// Each call pops the next response (reversed so `pop` takes the first).
    responses: Mutex<Vec<MockResponse>>,
    /// Used when the sequence is empty (or in single-response mode).
    fallback: MockResponse,
    delay: Option<Duration>,
    budgeted: bool,
    call_count: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    queries: Mutex<Vec<(String, usize)>>,
}

impl Script {
    fn new(name: &'static str, mut responses: Vec<MockResponse>) -> Self {
        responses.reverse();
        let fallback = responses.first().cloned().unwrap_or(MockResponse::Empty);
        Self {
            name,
            responses: Mutex::new(responses),
            fallback,
            delay: None,
            budgeted: false,
            call_count: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    fn next_response(&self, query: &str, limit: usize) -> MockResponse {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut q) = self.queries.lock() {
            q.push((query.to_string(), limit));
        }
        match self.responses.lock() {
            Ok(mut seq) => seq.pop().unwrap_or_else(|| self.fallback.clone()),
            Err(_) => self.fallback.clone(),
        }
    }

    /// Sleep (if configured) while tracking the number of overlapping calls.
    async fn simulate_latency(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

fn into_result(response: MockResponse) -> Result<Vec<SearchHit>, LookupError> {
    match response {
        MockResponse::Hits(hits) => Ok(hits
            .into_iter()
            .map(|(title, url)| SearchHit { title, url })
            .collect()),
        MockResponse::Empty => Ok(vec![]),
        MockResponse::RateLimited { retry_after } => Err(LookupError::RateLimited { retry_after }),
        MockResponse::QuotaExceeded(msg) => Err(LookupError::QuotaExceeded(msg)),
        MockResponse::Error(msg) => Err(LookupError::Transport(msg)),
    }
}

macro_rules! script_builders {
    ($ty:ident) => {
        impl $ty {
            /// Create a mock that always returns `response`.
            pub fn new(name: &'static str, response: MockResponse) -> Self {
                Self(Script::new(name, vec![response]))
            }

            /// Create a mock that returns responses in order, repeating the last one.
            pub fn with_sequence(name: &'static str, responses: Vec<MockResponse>) -> Self {
                Self(Script::new(name, responses))
            }

            /// Set simulated network latency per call.
            pub fn with_delay(mut self, delay: Duration) -> Self {
                self.0.delay = Some(delay);
                self
            }

            /// Mark the mock as a budgeted (serialized) capability.
            pub fn budgeted(mut self) -> Self {
                self.0.budgeted = true;
                self
            }

            /// How many times the capability has been called.
            pub fn call_count(&self) -> usize {
                self.0.call_count.load(Ordering::SeqCst)
            }

            /// Highest number of calls that were in flight at the same time.
            pub fn max_concurrent_calls(&self) -> usize {
                self.0.max_in_flight.load(Ordering::SeqCst)
            }

            /// Queries received, with the requested limit.
            pub fn queries(&self) -> Vec<(String, usize)> {
                self.0.queries.lock().map(|q| q.clone()).unwrap_or_default()
            }
        }
    };
}

/// A hand-rolled mock implementing [`TitleSearch`].
pub struct MockSearch(Script);

/// A hand-rolled mock implementing [`IdentifierResolver`].
pub struct MockResolver(Script);

script_builders!(MockSearch);
script_builders!(MockResolver);

impl TitleSearch for MockSearch {
    fn name(&self) -> &str {
        self.0.name
    }

    fn is_budgeted(&self) -> bool {
        self.0.budgeted
    }

    fn search<'a>(
        &'a self,
        query: &'a str,
        limit: usize,
        _client: &'a reqwest::Client,
        _timeout: Duration,
    ) -> LookupFuture<'a, Vec<SearchHit>> {
        let response = self.0.next_response(query, limit);
        Box::pin(async move {
            self.0.simulate_latency().await;
            into_result(response).map(|mut hits| {
                hits.truncate(limit.max(1));
                hits
            })
        })
    }
}

impl IdentifierResolver for MockResolver {
    fn name(&self) -> &str {
        self.0.name
    }

    fn is_budgeted(&self) -> bool {
        self.0.budgeted
    }

    fn resolve<'a>(
        &'a self,
        doi: &'a str,
        _client: &'a reqwest::Client,
        _timeout: Duration,
    ) -> LookupFuture<'a, Option<ResolvedWork>> {
        let response = self.0.next_response(doi, 1);
        Box::pin(async move {
            self.0.simulate_latency().await;
            into_result(response).map(|hits| {
                hits.into_iter().next().map(|h| ResolvedWork {
                    title: Some(h.title).filter(|t| !t.is_empty()),
                    url: h.url,
                })
            })
        })
    }
}
