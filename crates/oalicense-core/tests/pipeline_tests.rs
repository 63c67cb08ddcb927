//! Resolution pipeline integration tests

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use common::*;
use oalicense_core::{
    BibjsonRecord, CacheBackend, CacheEntry, DetectionScope, DetectorRegistry, IdentifierType,
    LicenseConfig, LicenseRecord, NoProviderPolicy, Provenance, ProvenanceCategory,
    RequestedIdentifier, Resolver, FAILED_TO_OBTAIN_LICENSE,
};

const PLOS_DOI: &str = "10.1371/journal.pone.0000001";

fn requests(ids: &[&str]) -> Vec<RequestedIdentifier> {
    ids.iter().map(|id| RequestedIdentifier::new(*id)).collect()
}

// === End to end ===

#[tokio::test]
async fn test_cc_by_resolved_then_served_from_cache() {
    let license = StaticLicense::answering("plos", "cc-by");
    let (provider, registry) = plos_registry(license.clone());
    let (_, resolver) = resolver_with(LicenseConfig::default(), registry);

    let first = resolver.resolve_batch(requests(&[PLOS_DOI])).await;
    assert_eq!(first.results.len(), 1);
    assert_eq!(first.results[0].licenses()[0].license_type, "cc-by");
    assert_eq!(license.calls(), 1);

    let dispatcher = RecordingDispatcher::new();
    let second = resolver.lookup(&requests(&[PLOS_DOI]), &dispatcher);
    assert_eq!(second.results.len(), 1);
    assert_eq!(second.results[0].licenses()[0].license_type, "cc-by");
    assert_eq!(license.calls(), 1);
    assert_eq!(provider.calls(), 1);
    assert_eq!(dispatcher.count(), 0);
}

#[tokio::test]
async fn test_lookup_dispatches_then_answers_after_worker_runs() {
    let license = StaticLicense::answering("plos", "cc-by");
    let (_, registry) = plos_registry(license.clone());
    let (_, resolver) = resolver_with(LicenseConfig::default(), registry);
    let dispatcher = RecordingDispatcher::new();

    let first = resolver.lookup(&requests(&[PLOS_DOI]), &dispatcher);
    assert_eq!(first.processing.len(), 1);
    assert_eq!(first.processing[0].identifier.canonical, "doi:10.1371/journal.pone.0000001");

    let items = dispatcher.take();
    assert_eq!(items.len(), 1);
    let outcome = resolver.run(items.into_iter().next().unwrap()).await;
    assert!(outcome.is_resolved());

    let second = resolver.lookup(&requests(&[PLOS_DOI]), &dispatcher);
    assert_eq!(second.results.len(), 1);
    assert_eq!(second.results[0].identifier[0].canonical, "doi:10.1371/journal.pone.0000001");
    assert_eq!(dispatcher.count(), 0);
}

#[tokio::test]
async fn test_stored_license_carries_handler() {
    let license = StaticLicense::answering("plos", "cc-by");
    let (_, registry) = plos_registry(license);
    let (_, resolver) = resolver_with(LicenseConfig::default(), registry);

    let results = resolver.resolve_batch(requests(&[PLOS_DOI])).await;
    let provenance = &results.results[0].licenses()[0].provenance;
    assert_eq!(provenance.handler.as_deref(), Some("plos"));
    assert_eq!(provenance.handler_version.as_deref(), Some("0.1"));
}

// === Staleness ===

#[tokio::test]
async fn test_stale_pmid_reenters_detection() {
    let mut config = LicenseConfig::default();
    config.cache.stale_window_seconds = 180 * 24 * 60 * 60;
    let (_, resolver) = resolver_with(config, DetectorRegistry::new());

    let identifier = oalicense_core::normalize("99999999", None).unwrap();
    let mut bibjson = BibjsonRecord::for_identifier(identifier.clone());
    bibjson.add_license(LicenseRecord::new(
        "cc-by",
        Provenance::new(Utc::now() - days(400), "tester", "", ProvenanceCategory::PageScrape),
    ));
    let entry = CacheEntry {
        bibjson: Some(bibjson),
        ..CacheEntry::new(identifier.clone())
    };
    resolver.cache().put(entry.key(), &entry);

    let dispatcher = RecordingDispatcher::new();
    let results = resolver.lookup(&requests(&["99999999"]), &dispatcher);
    assert!(results.results.is_empty());
    assert_eq!(results.processing.len(), 1);
    assert_eq!(dispatcher.count(), 1);

    // The stale record was replaced by the queued marker
    let cached = resolver.cache().get("pmid:99999999").unwrap();
    assert!(cached.queued);
    assert!(cached.bibjson.is_none());
}

// === Partial failure ===

#[tokio::test]
async fn test_one_faulting_identifier_does_not_affect_the_rest() {
    let dois = [
        "10.1371/journal.pone.0000001",
        "10.1371/journal.pone.0000002",
        "10.1371/journal.pone.0000003",
        "10.1371/journal.pone.0000004",
    ];
    let license = StaticLicense::faulting_on("plos", "cc-by", "doi:10.1371/journal.pone.0000003");
    let (_, registry) = plos_registry(license);
    let (_, resolver) = resolver_with(LicenseConfig::default(), registry);

    let results = resolver.resolve_batch(requests(&dois)).await;
    assert_eq!(results.requested, 4);
    assert!(results.is_complete());
    assert_eq!(results.errors.len(), 1);
    assert_eq!(results.errors[0].identifier.canonical, "doi:10.1371/journal.pone.0000003");
    assert!(results.errors[0].error.contains("page layout changed"));
    assert_eq!(results.results.len() + results.processing.len(), 3);
}

#[tokio::test]
async fn test_fault_is_recorded_and_reported_on_next_poll() {
    let license = StaticLicense::faulting_on("plos", "cc-by", "doi:10.1371/journal.pone.0000001");
    let (_, registry) = plos_registry(license.clone());
    let (_, resolver) = resolver_with(LicenseConfig::default(), registry);
    let dispatcher = RecordingDispatcher::new();

    resolver.lookup(&requests(&[PLOS_DOI]), &dispatcher);
    let item = dispatcher.take().pop().unwrap();
    assert!(!resolver.run(item).await.is_resolved());

    let cached = resolver.cache().get("doi:10.1371/journal.pone.0000001").unwrap();
    assert!(!cached.queued);
    assert!(cached.error.unwrap().contains("page layout changed"));

    let next = resolver.lookup(&requests(&[PLOS_DOI]), &dispatcher);
    assert_eq!(next.errors.len(), 1);
    assert!(next.errors[0].error.contains("page layout changed"));
    assert_eq!(dispatcher.count(), 0);
    assert_eq!(license.calls(), 1);
}

#[tokio::test]
async fn test_slow_detector_times_out() {
    let mut config = LicenseConfig::default();
    config.detection.timeout_seconds = 1;
    let license = StaticLicense::slow("plos", "cc-by", Duration::from_secs(30));
    let (_, registry) = plos_registry(license);
    let (_, resolver) = resolver_with(config, registry);

    let results = resolver.resolve_batch(requests(&[PLOS_DOI])).await;
    assert_eq!(results.errors.len(), 1);
    assert!(results.errors[0].error.contains("timed out"), "{}", results.errors[0].error);
}

// === Cache states ===

#[test]
fn test_queued_identifier_is_not_dispatched_twice() {
    let (_, registry) = plos_registry(StaticLicense::answering("plos", "cc-by"));
    let (_, resolver) = resolver_with(LicenseConfig::default(), registry);
    let dispatcher = RecordingDispatcher::new();

    let first = resolver.lookup(&requests(&[PLOS_DOI]), &dispatcher);
    let second = resolver.lookup(&requests(&[PLOS_DOI]), &dispatcher);
    assert_eq!(first.processing.len(), 1);
    assert_eq!(second.processing.len(), 1);
    assert_eq!(dispatcher.count(), 1);
}

#[test]
fn test_recorded_error_is_reported() {
    let (_, resolver) = resolver_with(LicenseConfig::default(), DetectorRegistry::new());
    let identifier = oalicense_core::normalize("12345678", None).unwrap();
    let entry = CacheEntry {
        error: Some("publisher refuses automated access".to_string()),
        ..CacheEntry::new(identifier)
    };
    resolver.cache().put(entry.key(), &entry);

    let dispatcher = RecordingDispatcher::new();
    let results = resolver.lookup(&requests(&["12345678"]), &dispatcher);
    assert_eq!(results.errors.len(), 1);
    assert!(results.errors[0].error.contains("publisher refuses automated access"));
    assert_eq!(dispatcher.count(), 0);
}

#[test]
fn test_corrupt_cache_value_is_a_miss() {
    let (backend, resolver) = resolver_with(LicenseConfig::default(), DetectorRegistry::new());
    backend
        .set_ex("pmid:12345678", Duration::from_secs(60), b"\xff\xfe not json")
        .unwrap();

    let dispatcher = RecordingDispatcher::new();
    let results = resolver.lookup(&requests(&["12345678"]), &dispatcher);
    assert_eq!(results.processing.len(), 1);
    assert!(resolver.cache().get("pmid:12345678").unwrap().queued);
}

#[test]
fn test_closed_dispatcher_reports_error_and_clears_marker() {
    let (_, resolver) = resolver_with(LicenseConfig::default(), DetectorRegistry::new());
    let results = resolver.lookup(&requests(&["12345678"]), &ClosedDispatcher);
    assert_eq!(results.errors.len(), 1);
    assert!(results.errors[0].error.contains("worker pool is closed"));
    assert!(resolver.cache().get("pmid:12345678").is_none());
}

// === Normalisation failures ===

#[test]
fn test_unknown_and_invalid_identifiers_are_errors() {
    let (_, resolver) = resolver_with(LicenseConfig::default(), DetectorRegistry::new());
    let dispatcher = RecordingDispatcher::new();
    let batch = vec![
        RequestedIdentifier::new("not an identifier"),
        RequestedIdentifier::with_type("12345678", "doi"),
        RequestedIdentifier::new("12345678"),
    ];

    let results = resolver.lookup(&batch, &dispatcher);
    assert!(results.is_complete());
    assert_eq!(results.errors.len(), 2);
    assert!(results.errors[0]
        .error
        .contains("unable to determine the type of the identifier"));
    assert!(results.errors[1].error.contains("cannot validate"));
    assert_eq!(results.processing.len(), 1);
    assert_eq!(dispatcher.count(), 1);
}

// === Detection outcomes ===

#[tokio::test]
async fn test_no_license_found_is_cached_as_failure() {
    let license = StaticLicense::silent("plos");
    let (_, registry) = plos_registry(license.clone());
    let (_, resolver) = resolver_with(LicenseConfig::default(), registry);

    let results = resolver.resolve_batch(requests(&[PLOS_DOI])).await;
    assert_eq!(results.results.len(), 1);
    let record = &results.results[0];
    assert!(!record.is_licensed());
    let failure = &record.licenses()[0];
    assert_eq!(failure.license_type, FAILED_TO_OBTAIN_LICENSE);
    assert_eq!(failure.provenance.category, ProvenanceCategory::Failure);
    assert_eq!(failure.provenance.handler.as_deref(), Some("plos"));
    assert_eq!(failure.provenance.source, PLOS_ARTICLE);

    let dispatcher = RecordingDispatcher::new();
    let again = resolver.lookup(&requests(&[PLOS_DOI]), &dispatcher);
    assert_eq!(again.results, results.results);
    assert_eq!(dispatcher.count(), 0);
    assert_eq!(license.calls(), 1);
}

#[tokio::test]
async fn test_no_provider_resolves_without_a_license() {
    let (_, resolver) = resolver_with(LicenseConfig::default(), DetectorRegistry::new());
    let results = resolver.resolve_batch(requests(&["12345678"])).await;
    assert_eq!(results.results.len(), 1);
    assert!(!results.results[0].is_licensed());
    assert_eq!(
        results.results[0].licenses()[0].license_type,
        FAILED_TO_OBTAIN_LICENSE
    );
    assert!(resolver.cache().get("pmid:12345678").is_some());
}

#[tokio::test]
async fn test_page_detector_runs_before_site_detector() {
    let page = StaticLicense::silent("page");
    let site = StaticLicense::answering("site", "cc0");
    let mut registry = DetectorRegistry::new();
    registry.register_provider(IdentifierType::Doi, StaticProvider::new(PLOS_ARTICLE));
    registry
        .register_license("journals.plos.org/plosone", DetectionScope::Page, page.clone())
        .unwrap();
    registry
        .register_license("journals.plos.org", DetectionScope::Site, site.clone())
        .unwrap();
    let (_, resolver) = resolver_with(LicenseConfig::default(), registry);

    let results = resolver.resolve_batch(requests(&[PLOS_DOI])).await;
    assert_eq!(results.results[0].licenses()[0].license_type, "cc0");
    assert_eq!(page.calls(), 1);
    assert_eq!(site.calls(), 1);
}

// === Idempotence ===

#[tokio::test]
async fn test_repeated_lookup_of_fresh_identifier_is_a_no_op() {
    let license = StaticLicense::answering("plos", "cc-by");
    let (_, registry) = plos_registry(license.clone());
    let (_, resolver) = resolver_with(LicenseConfig::default(), registry);
    resolver.resolve_batch(requests(&[PLOS_DOI])).await;

    let dispatcher = RecordingDispatcher::new();
    let first = resolver.lookup(&requests(&[PLOS_DOI]), &dispatcher);
    let second = resolver.lookup(&requests(&[PLOS_DOI]), &dispatcher);
    assert_eq!(first, second);
    assert_eq!(license.calls(), 1);
    assert_eq!(dispatcher.count(), 0);
}

#[test]
fn test_duplicates_are_classified_independently() {
    let (_, resolver) = resolver_with(LicenseConfig::default(), DetectorRegistry::new());
    let dispatcher = RecordingDispatcher::new();
    let results = resolver.lookup(&requests(&["12345678", "12345678"]), &dispatcher);
    assert_eq!(results.requested, 2);
    assert_eq!(results.processing.len(), 2);
    assert!(dispatcher.count() >= 1);
}

#[tokio::test]
async fn test_worker_pool_end_to_end() {
    let license = StaticLicense::answering("plos", "cc-by");
    let (_, registry) = plos_registry(license);
    let (_, resolver) = resolver_with(LicenseConfig::default(), registry);
    let (pool, mut completions) = oalicense_core::WorkerPool::spawn(Arc::clone(&resolver), 2);

    let first = resolver.lookup(&requests(&[PLOS_DOI]), &pool);
    assert_eq!(first.processing.len(), 1);

    let completion = completions.recv().await.unwrap();
    assert!(completion.outcome.is_resolved());

    let second = resolver.lookup(&requests(&[PLOS_DOI]), &pool);
    assert_eq!(second.results.len(), 1);
}

/// Look up once through the pool, wait for the worker, then poll again
async fn poll_after_worker(
    resolver: &Arc<Resolver>,
    ids: &[&str],
) -> oalicense_core::ResultSet {
    let (pool, mut completions) = oalicense_core::WorkerPool::spawn(Arc::clone(resolver), 2);

    let first = resolver.lookup(&requests(ids), &pool);
    assert_eq!(first.processing.len(), ids.len());
    for _ in ids {
        completions.recv().await.unwrap();
    }

    let polled = resolver.lookup(&requests(ids), &pool);
    assert!(polled.processing.is_empty());
    polled
}

/// Poll again; answered from the cache without dispatching
fn poll_cached(resolver: &Arc<Resolver>, ids: &[&str]) -> oalicense_core::ResultSet {
    let dispatcher = RecordingDispatcher::new();
    let polled = resolver.lookup(&requests(ids), &dispatcher);
    assert_eq!(dispatcher.count(), 0);
    polled
}

#[tokio::test]
async fn test_worker_pool_fault_reaches_errors_on_poll() {
    let license = StaticLicense::faulting_on("plos", "cc-by", "doi:10.1371/journal.pone.0000003");
    let (_, registry) = plos_registry(license.clone());
    let (_, resolver) = resolver_with(LicenseConfig::default(), registry);
    let dois = [
        "10.1371/journal.pone.0000001",
        "10.1371/journal.pone.0000002",
        "10.1371/journal.pone.0000003",
    ];

    let polled = poll_after_worker(&resolver, &dois).await;
    assert_eq!(polled.results.len(), 2);
    assert_eq!(polled.errors.len(), 1);
    assert_eq!(polled.errors[0].identifier.canonical, "doi:10.1371/journal.pone.0000003");
    assert!(polled.errors[0].error.contains("page layout changed"));

    let polled_again = poll_cached(&resolver, &dois);
    assert_eq!(polled_again.errors.len(), 1);
    assert_eq!(license.calls(), 3);
}

#[tokio::test]
async fn test_worker_pool_silent_detector_reaches_results_on_poll() {
    let license = StaticLicense::silent("plos");
    let (_, registry) = plos_registry(license.clone());
    let (_, resolver) = resolver_with(LicenseConfig::default(), registry);

    let polled = poll_after_worker(&resolver, &[PLOS_DOI]).await;
    assert_eq!(polled.results.len(), 1);
    assert!(!polled.results[0].is_licensed());

    poll_cached(&resolver, &[PLOS_DOI]);
    assert_eq!(license.calls(), 1);
}

#[tokio::test]
async fn test_worker_pool_no_provider_reaches_results_on_poll() {
    let (_, resolver) = resolver_with(LicenseConfig::default(), DetectorRegistry::new());

    let polled = poll_after_worker(&resolver, &["12345678"]).await;
    assert_eq!(polled.results.len(), 1);
    assert_eq!(
        polled.results[0].licenses()[0].license_type,
        FAILED_TO_OBTAIN_LICENSE
    );
}

#[tokio::test]
async fn test_worker_pool_no_provider_error_policy_reaches_errors_on_poll() {
    let mut config = LicenseConfig::default();
    config.detection.no_provider = NoProviderPolicy::Error;
    let (_, resolver) = resolver_with(config, DetectorRegistry::new());

    let polled = poll_after_worker(&resolver, &["12345678"]).await;
    assert_eq!(polled.errors.len(), 1);
    assert!(polled.errors[0].error.contains("no provider found for pmid:12345678"));
}
