//! End-to-end tier decisions through `check_records`, using mock lookups.

use std::sync::Arc;

use refcheck_core::lookup::mock::{MockResolver, MockResponse, MockSearch};
use refcheck_core::{
    CitationStyle, Config, Lookups, RateLimiters, ReferenceRecord, Tier, check_records,
};
use tokio_util::sync::CancellationToken;

fn config() -> Arc<Config> {
    Arc::new(Config {
        rate_limiters: Arc::new(RateLimiters::empty()),
        num_workers: 2,
        ..Config::default()
    })
}

fn apa(title: &str, doi: Option<&str>) -> ReferenceRecord {
    ReferenceRecord {
        raw_text: format!("Huang, C. (2021). {title}. Journal X, 5(2), 10-20."),
        style: CitationStyle::Apa,
        title: Some(title.to_string()),
        doi: doi.map(String::from),
    }
}

#[tokio::test]
async fn every_titled_record_gets_exactly_one_tier() {
    let resolver = Arc::new(MockResolver::with_sequence(
        "Crossref",
        vec![MockResponse::Hits(vec![(
            "Some resolved title".into(),
            Some("https://doi.org/10.1000/xyz123".into()),
        )])],
    ));
    let primary = Arc::new(MockSearch::new(
        "Scopus",
        MockResponse::hits(&["A Study of Citation Networks"]),
    ));
    let scholar = Arc::new(MockSearch::new(
        "Google Scholar",
        MockResponse::hits(&["graph neural network for nlp"]),
    ));
    let lookups = Arc::new(
        Lookups::new()
            .with_resolver(resolver)
            .with_primary(primary)
            .with_secondary(scholar.clone())
            .with_remedial(scholar),
    );

    let records = vec![
        apa("Unrelated words here", Some("10.1000/xyz123")),
        apa("A study of citation networks", None),
        apa("Graph Neural Networks for NLP", None),
        apa("Nothing like any candidate at all", None),
    ];
    let report = check_records(records, lookups, config(), |_| {}, CancellationToken::new()).await;

    let tiers: Vec<_> = report.entries.iter().map(|v| v.tier).collect();
    assert_eq!(
        tiers,
        vec![
            Tier::DoiHit,
            Tier::TitleHitPrimary,
            Tier::TitleSimilar,
            Tier::NotFound
        ]
    );
    assert_eq!(report.counts.total(), 4);
    assert_eq!(report.counts.matched(), 2);
    assert_eq!(report.counts.title_similar, 1);
    assert_eq!(report.counts.not_found, 1);
    assert_eq!(
        report.entries[0].url.as_deref(),
        Some("https://doi.org/10.1000/xyz123")
    );
    assert!(report.entries[3].degraded.is_none());
}

#[tokio::test]
async fn no_lookups_configured_means_clean_not_found() {
    let report = check_records(
        vec![apa("Anything", Some("10.1/abc"))],
        Arc::new(Lookups::new()),
        config(),
        |_| {},
        CancellationToken::new(),
    )
    .await;
    assert_eq!(report.entries[0].tier, Tier::NotFound);
    assert!(report.entries[0].degraded.is_none());
    assert!(report.entries[0].failed_lookups.is_empty());
}

#[tokio::test]
async fn rate_limited_call_is_retried_once() {
    let primary = Arc::new(MockSearch::with_sequence(
        "Scopus",
        vec![
            MockResponse::RateLimited {
                retry_after: Some(std::time::Duration::from_millis(1)),
            },
            MockResponse::hit("Retried title"),
        ],
    ));
    let lookups = Arc::new(Lookups::new().with_primary(primary.clone()));

    let report = check_records(
        vec![apa("Retried title", None)],
        lookups,
        config(),
        |_| {},
        CancellationToken::new(),
    )
    .await;
    assert_eq!(report.entries[0].tier, Tier::TitleHitPrimary);
    assert_eq!(primary.call_count(), 2);
}
