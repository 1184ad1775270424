//! Tiered verification of a single record.
//!
//! The pipeline is an ordered list of [`Step`]s. Each step returns a
//! [`StepOutcome`]; the first hit decides the tier, a miss moves on, and a
//! failure either moves on or stops the walk depending on the step.

use std::time::Duration;

use crate::lookup::{LookupError, Lookups, SearchHit};
use crate::matching::{classify_secondary, primary_title_matches, remedial_matches};
use crate::rate_limit::call_with_rate_limit;
use crate::{Config, Degradation, ReferenceRecord, Tier, Verdict};

/// Candidates requested from the primary search.
const PRIMARY_LIMIT: usize = 3;
/// Upper bound on candidates requested from the secondary search.
const MAX_SECONDARY_LIMIT: usize = 3;

/// One verification tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Resolve the record's DOI; any resolved title is authoritative.
    Identifier,
    /// Exact (case-insensitive) title match in the primary index.
    PrimaryTitle,
    /// Strict-normalized equality or similarity in the secondary search.
    SecondaryTitle,
    /// Raw reference text against the secondary search, single result.
    Remedial,
}

impl Step {
    /// Steps that depend on the secondary search and its quota.
    fn uses_secondary(&self) -> bool {
        matches!(self, Step::SecondaryTitle | Step::Remedial)
    }

    /// How a walk-stopping failure of this step reads in warnings and reports.
    fn failure_note(&self) -> &'static str {
        match self {
            Step::Identifier => "DOI lookup error",
            Step::PrimaryTitle => "primary search error",
            Step::SecondaryTitle => "secondary search error, remedial step skipped",
            Step::Remedial => "remedial search error",
        }
    }
}

/// Default tier order.
pub const DEFAULT_STEPS: [Step; 4] = [
    Step::Identifier,
    Step::PrimaryTitle,
    Step::SecondaryTitle,
    Step::Remedial,
];

/// Result of running one step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Hit {
        tier: Tier,
        url: Option<String>,
    },
    /// Nothing found, or the step does not apply to this record.
    Miss,
    Failed {
        lookup: String,
        error: LookupError,
        /// Skip the remaining steps and finalize as NOT_FOUND.
        stop: bool,
    },
}

/// Runs the tier steps for records against one set of lookups.
pub struct MatchPipeline<'a> {
    lookups: &'a Lookups,
    config: &'a Config,
    steps: &'a [Step],
    on_quota_exhausted: Option<&'a (dyn Fn(&str) + Send + Sync)>,
}

impl<'a> MatchPipeline<'a> {
    pub fn new(lookups: &'a Lookups, config: &'a Config) -> Self {
        Self {
            lookups,
            config,
            steps: &DEFAULT_STEPS,
            on_quota_exhausted: None,
        }
    }

    /// Use a custom step order.
    pub fn with_steps(mut self, steps: &'a [Step]) -> Self {
        self.steps = steps;
        self
    }

    /// Called once per session, by whichever record first sees the quota run out.
    pub fn on_quota_exhausted(mut self, hook: &'a (dyn Fn(&str) + Send + Sync)) -> Self {
        self.on_quota_exhausted = Some(hook);
        self
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// Verify one record. Returns `None` for a record without a title.
    pub async fn verify(&self, record: ReferenceRecord) -> Option<Verdict> {
        let title = record.title.clone()?;

        let mut failed_lookups = Vec::new();
        let mut degraded = None;
        let mut decided = (Tier::NotFound, None);
        let mut used_secondary = false;

        for step in self.steps {
            used_secondary |= step.uses_secondary();
            match self.run_step(*step, &record, &title).await {
                StepOutcome::Hit { tier, url } => {
                    tracing::debug!(?step, %tier, title = %title, "tier hit");
                    decided = (tier, url);
                    break;
                }
                StepOutcome::Miss => {
                    tracing::trace!(?step, title = %title, "tier miss");
                }
                StepOutcome::Failed {
                    lookup,
                    error,
                    stop,
                } => {
                    tracing::warn!(?step, lookup = %lookup, error = %error, "lookup failed");
                    failed_lookups.push(lookup);
                    if stop {
                        degraded = Some(match error {
                            LookupError::QuotaExceeded(_) => Degradation::QuotaExceeded,
                            other => Degradation::SearchError(format!(
                                "{}: {}",
                                step.failure_note(),
                                other
                            )),
                        });
                        break;
                    }
                }
            }
        }

        let (tier, url) = decided;
        // A negative produced after the quota ran out is not a clean negative.
        if degraded.is_none()
            && tier == Tier::NotFound
            && used_secondary
            && self.lookups.quota.is_exhausted()
        {
            degraded = Some(Degradation::QuotaExceeded);
        }

        Some(Verdict {
            record,
            tier,
            url,
            degraded,
            failed_lookups,
        })
    }

    /// Run a single step for a record whose title is `title`.
    pub async fn run_step(&self, step: Step, record: &ReferenceRecord, title: &str) -> StepOutcome {
        match step {
            Step::Identifier => self.identifier(record).await,
            Step::PrimaryTitle => self.primary(title).await,
            Step::SecondaryTitle => self.secondary(title).await,
            Step::Remedial => self.remedial(&record.raw_text).await,
        }
    }

    async fn identifier(&self, record: &ReferenceRecord) -> StepOutcome {
        let (Some(doi), Some(resolver)) = (record.doi.as_deref(), self.lookups.resolver.as_ref())
        else {
            return StepOutcome::Miss;
        };

        let client = self.lookups.client();
        let timeout = self.timeout();
        let result = call_with_rate_limit(
            resolver.name(),
            resolver.is_budgeted(),
            timeout,
            &self.config.rate_limiters,
            || resolver.resolve(doi, client, timeout),
        )
        .await;

        match result {
            Ok(Some(work)) if work.title.as_deref().is_some_and(|t| !t.trim().is_empty()) => {
                StepOutcome::Hit {
                    tier: Tier::DoiHit,
                    url: work.url.or_else(|| Some(format!("https://doi.org/{}", doi))),
                }
            }
            Ok(_) => StepOutcome::Miss,
            Err(error) => StepOutcome::Failed {
                lookup: resolver.name().to_string(),
                error,
                stop: false,
            },
        }
    }

    async fn primary(&self, title: &str) -> StepOutcome {
        let Some(search) = self.lookups.primary.as_ref() else {
            return StepOutcome::Miss;
        };

        let client = self.lookups.client();
        let timeout = self.timeout();
        let result = call_with_rate_limit(
            search.name(),
            search.is_budgeted(),
            timeout,
            &self.config.rate_limiters,
            || search.search(title, PRIMARY_LIMIT, client, timeout),
        )
        .await;

        match result {
            Ok(hits) => hits
                .into_iter()
                .find(|h| primary_title_matches(title, &h.title))
                .map_or(StepOutcome::Miss, |h| StepOutcome::Hit {
                    tier: Tier::TitleHitPrimary,
                    url: h.url,
                }),
            Err(error) => StepOutcome::Failed {
                lookup: search.name().to_string(),
                error,
                stop: false,
            },
        }
    }

    async fn secondary(&self, title: &str) -> StepOutcome {
        let Some(search) = self.lookups.secondary.as_ref() else {
            return StepOutcome::Miss;
        };
        let limit = self.config.secondary_limit.clamp(1, MAX_SECONDARY_LIMIT);

        let hits = match self.search_with_quota(search.as_ref(), title, limit).await {
            Ok(hits) => hits,
            Err(outcome) => return outcome,
        };

        match classify_secondary(title, &hits, self.config.similarity_threshold) {
            Some((tier, hit)) => StepOutcome::Hit {
                tier,
                url: hit.url.clone(),
            },
            None => StepOutcome::Miss,
        }
    }

    async fn remedial(&self, raw_text: &str) -> StepOutcome {
        let Some(search) = self.lookups.remedial.as_ref() else {
            return StepOutcome::Miss;
        };

        let hits = match self.search_with_quota(search.as_ref(), raw_text, 1).await {
            Ok(hits) => hits,
            Err(outcome) => return outcome,
        };

        match hits.into_iter().next() {
            Some(hit) if remedial_matches(raw_text, &hit.title) => StepOutcome::Hit {
                tier: Tier::TitleRemedial,
                url: hit.url,
            },
            _ => StepOutcome::Miss,
        }
    }

    /// Search through a quota-bound capability. Any failure stops the walk;
    /// a quota error also flips the session's sticky flag.
    async fn search_with_quota(
        &self,
        search: &dyn crate::lookup::TitleSearch,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, StepOutcome> {
        let quota = &self.lookups.quota;
        if quota.is_exhausted() {
            return Err(StepOutcome::Failed {
                lookup: search.name().to_string(),
                error: LookupError::QuotaExceeded("quota exhausted earlier in this session".into()),
                stop: true,
            });
        }

        let client = self.lookups.client();
        let timeout = self.timeout();
        let result = call_with_rate_limit(
            search.name(),
            search.is_budgeted(),
            timeout,
            &self.config.rate_limiters,
            || search.search(query, limit, client, timeout),
        )
        .await;

        result.map_err(|error| {
            if matches!(error, LookupError::QuotaExceeded(_)) && quota.mark_exhausted() {
                tracing::warn!(lookup = search.name(), "search quota exhausted");
                if let Some(hook) = self.on_quota_exhausted {
                    hook(search.name());
                }
            }
            StepOutcome::Failed {
                lookup: search.name().to_string(),
                error,
                stop: true,
            }
        })
    }
}
