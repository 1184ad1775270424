//! External bibliographic capabilities and their HTTP implementations.

pub mod crossref;
pub mod mock;
pub mod scopus;
pub mod serpapi;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::Config;

/// Error from a single external call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// Server returned 429 Too Many Requests.
    #[error("rate limited (429)")]
    RateLimited { retry_after: Option<Duration> },
    /// The service says the account's request budget is spent.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("HTTP {status}")]
    Http { status: u16 },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for LookupError {
    fn from(e: reqwest::Error) -> Self {
        LookupError::Transport(e.to_string())
    }
}

/// A work found by resolving an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedWork {
    pub title: Option<String>,
    pub url: Option<String>,
}

/// One candidate returned by a title search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub url: Option<String>,
}

pub type LookupFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LookupError>> + Send + 'a>>;

/// Resolves a DOI to the work it names.
pub trait IdentifierResolver: Send + Sync {
    /// The canonical name of this service (e.g., "Crossref").
    fn name(&self) -> &str;

    /// Whether the service enforces a request budget. Calls to a budgeted
    /// instance never overlap.
    fn is_budgeted(&self) -> bool {
        false
    }

    /// `Ok(None)` means the identifier is unknown to the service.
    fn resolve<'a>(
        &'a self,
        doi: &'a str,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> LookupFuture<'a, Option<ResolvedWork>>;
}

/// Searches a bibliographic index by free text.
pub trait TitleSearch: Send + Sync {
    /// The canonical name of this service (e.g., "Scopus").
    fn name(&self) -> &str;

    /// Whether the service enforces a request budget. Calls to a budgeted
    /// instance never overlap.
    fn is_budgeted(&self) -> bool {
        false
    }

    /// Return at most `limit` candidates in the service's ranking order.
    /// An empty list is "no results", not an error.
    fn search<'a>(
        &'a self,
        query: &'a str,
        limit: usize,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> LookupFuture<'a, Vec<SearchHit>>;
}

/// Session-wide, sticky record of the secondary search running out of quota.
///
/// Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct QuotaState(Arc<AtomicBool>);

impl QuotaState {
    /// Mark the quota as spent. Returns `true` only for the first caller.
    pub fn mark_exhausted(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_exhausted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The set of capabilities a verification session talks to.
///
/// An absent capability makes its pipeline step a clean miss.
pub struct Lookups {
    pub resolver: Option<Arc<dyn IdentifierResolver>>,
    pub primary: Option<Arc<dyn TitleSearch>>,
    pub secondary: Option<Arc<dyn TitleSearch>>,
    pub remedial: Option<Arc<dyn TitleSearch>>,
    pub quota: QuotaState,
    client: reqwest::Client,
}

impl Default for Lookups {
    fn default() -> Self {
        Self::new()
    }
}

impl Lookups {
    /// No capabilities at all; every record ends up NOT_FOUND.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            resolver: None,
            primary: None,
            secondary: None,
            remedial: None,
            quota: QuotaState::default(),
            client,
        }
    }

    /// Build the HTTP-backed capabilities the configuration allows.
    ///
    /// Crossref needs no key. Scopus and Google Scholar (via SerpAPI) are only
    /// added when their key is present. The remedial step reuses the
    /// secondary search instance so both share one request budget.
    pub fn from_config(config: &Config) -> Self {
        let mut lookups = Self::new();

        if !config.is_disabled(crossref::NAME) {
            lookups.resolver = Some(Arc::new(crossref::Crossref {
                mailto: config.crossref_mailto.clone(),
            }));
        }

        match &config.scopus_api_key {
            Some(key) if !config.is_disabled(scopus::NAME) => {
                lookups.primary = Some(Arc::new(scopus::Scopus::new(key.clone())));
            }
            Some(_) => {}
            None => tracing::warn!("no Scopus API key; primary title search disabled"),
        }

        match &config.serpapi_key {
            Some(key) if !config.is_disabled(serpapi::NAME) => {
                let scholar: Arc<dyn TitleSearch> =
                    Arc::new(serpapi::GoogleScholar::new(key.clone()));
                lookups.secondary = Some(Arc::clone(&scholar));
                lookups.remedial = Some(scholar);
            }
            Some(_) => {}
            None => tracing::warn!("no SerpAPI key; Google Scholar search disabled"),
        }

        lookups
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn IdentifierResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_primary(mut self, search: Arc<dyn TitleSearch>) -> Self {
        self.primary = Some(search);
        self
    }

    pub fn with_secondary(mut self, search: Arc<dyn TitleSearch>) -> Self {
        self.secondary = Some(search);
        self
    }

    pub fn with_remedial(mut self, search: Arc<dyn TitleSearch>) -> Self {
        self.remedial = Some(search);
        self
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Names of the configured capabilities, in pipeline order.
    pub fn names(&self) -> Vec<String> {
        let mut names = Vec::new();
        if let Some(r) = &self.resolver {
            names.push(r.name().to_string());
        }
        for s in [&self.primary, &self.secondary].into_iter().flatten() {
            if !names.iter().any(|n| n == s.name()) {
                names.push(s.name().to_string());
            }
        }
        names
    }
}

/// Build a Google Scholar search link for a query (used for manual follow-up).
pub fn scholar_search_url(query: &str) -> String {
    format!(
        "https://scholar.google.com/scholar?q={}",
        urlencoding::encode(query)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_state_is_sticky_and_shared() {
        let a = QuotaState::default();
        let b = a.clone();
        assert!(!b.is_exhausted());
        assert!(a.mark_exhausted());
        assert!(!b.mark_exhausted());
        assert!(b.is_exhausted());
    }

    #[test]
    fn from_config_without_keys_has_only_resolver() {
        let lookups = Lookups::from_config(&Config::default());
        assert!(lookups.resolver.is_some());
        assert!(lookups.primary.is_none());
        assert!(lookups.secondary.is_none());
        assert!(lookups.remedial.is_none());
        assert_eq!(lookups.names(), vec!["Crossref".to_string()]);
    }

    #[test]
    fn from_config_shares_scholar_between_secondary_and_remedial() {
        let config = Config {
            serpapi_key: Some("k".into()),
            scopus_api_key: Some("s".into()),
            ..Config::default()
        };
        let lookups = Lookups::from_config(&config);
        let secondary = lookups.secondary.as_ref().unwrap();
        let remedial = lookups.remedial.as_ref().unwrap();
        assert!(Arc::ptr_eq(secondary, remedial));
        assert_eq!(
            lookups.names(),
            vec!["Crossref".to_string(), "Scopus".into(), "Google Scholar".into()]
        );
    }

    #[test]
    fn disabled_lookups_are_left_out() {
        let config = Config {
            serpapi_key: Some("k".into()),
            disabled_lookups: vec!["crossref".into(), "Google Scholar".into()],
            ..Config::default()
        };
        let lookups = Lookups::from_config(&config);
        assert!(lookups.resolver.is_none());
        assert!(lookups.secondary.is_none());
    }

    #[test]
    fn scholar_url_encodes_query() {
        assert_eq!(
            scholar_search_url("deep learning & more"),
            "https://scholar.google.com/scholar?q=deep%20learning%20%26%20more"
        );
    }
}
