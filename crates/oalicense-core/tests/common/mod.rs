//! Test detectors and dispatchers

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};

use oalicense_core::{
    CacheEntry, Detector, DetectorFault, DetectorRegistry, DispatchError, Dispatcher,
    InMemoryBackend, LicenseConfig, LicenseRecord, Provenance, ProvenanceCategory, Provider,
    Resolver, WorkItem,
};

/// Provider detector answering the same URL for every identifier
pub struct StaticProvider {
    url: String,
    pub calls: AtomicUsize,
}

impl StaticProvider {
    pub fn new(url: &str) -> Arc<Self> {
        Arc::new(Self {
            url: url.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Detector for StaticProvider {
    type Output = Provider;

    fn name(&self) -> &str {
        "static_provider"
    }

    async fn detect(&self, _entry: &CacheEntry) -> Result<Option<Provider>, DetectorFault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Provider::from_url(self.url.as_str())))
    }
}

/// License detector with a configurable answer
pub struct StaticLicense {
    name: &'static str,
    code: Option<&'static str>,
    /// Identifier (canonical) for which the detector faults
    faults_on: Option<String>,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl StaticLicense {
    pub fn answering(name: &'static str, code: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            code: Some(code),
            faults_on: None,
            delay: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn silent(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            code: None,
            faults_on: None,
            delay: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn faulting_on(name: &'static str, code: &'static str, canonical: &str) -> Arc<Self> {
        Arc::new(Self {
            name,
            code: Some(code),
            faults_on: Some(canonical.to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn slow(name: &'static str, code: &'static str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name,
            code: Some(code),
            faults_on: None,
            delay: Some(delay),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Detector for StaticLicense {
    type Output = LicenseRecord;

    fn name(&self) -> &str {
        self.name
    }

    async fn detect(&self, entry: &CacheEntry) -> Result<Option<LicenseRecord>, DetectorFault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.faults_on.as_deref() == Some(entry.key()) {
            return Err(DetectorFault::failed(self.name, "page layout changed"));
        }

        let source = entry
            .provider
            .as_ref()
            .and_then(|p| p.url.first().cloned())
            .unwrap_or_default();
        Ok(self.code.map(|code| {
            LicenseRecord::new(
                code,
                Provenance::new(Utc::now(), "tester", source, ProvenanceCategory::PageScrape),
            )
        }))
    }
}

/// Dispatcher that records work instead of running it
#[derive(Default)]
pub struct RecordingDispatcher {
    items: Mutex<Vec<WorkItem>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<WorkItem> {
        std::mem::take(&mut *self.items.lock().unwrap())
    }

    pub fn count(&self) -> usize {
        self.items.lock().unwrap().len()
    }
}

impl Dispatcher for RecordingDispatcher {
    fn dispatch(&self, item: WorkItem) -> Result<(), DispatchError> {
        self.items.lock().unwrap().push(item);
        Ok(())
    }
}

/// Dispatcher whose workers have gone away
pub struct ClosedDispatcher;

impl Dispatcher for ClosedDispatcher {
    fn dispatch(&self, _item: WorkItem) -> Result<(), DispatchError> {
        Err(DispatchError::Closed)
    }
}

pub const PLOS_ARTICLE: &str =
    "http://journals.plos.org/plosone/article?id=10.1371/journal.pone.0000001";

/// A registry with one DOI provider detector and one page-level detector for PLOS
pub fn plos_registry(license: Arc<StaticLicense>) -> (Arc<StaticProvider>, DetectorRegistry) {
    let provider = StaticProvider::new(PLOS_ARTICLE);
    let mut registry = DetectorRegistry::new();
    registry.register_provider(oalicense_core::IdentifierType::Doi, provider.clone());
    registry
        .register_license(
            "http://journals.plos.org/",
            oalicense_core::DetectionScope::Page,
            license,
        )
        .unwrap();
    (provider, registry)
}

pub fn resolver_with(
    config: LicenseConfig,
    registry: DetectorRegistry,
) -> (Arc<InMemoryBackend>, Arc<Resolver>) {
    let backend = Arc::new(InMemoryBackend::new());
    let resolver = Arc::new(Resolver::new(
        Arc::new(config),
        backend.clone(),
        Arc::new(registry),
    ));
    (backend, resolver)
}

pub fn days(n: i64) -> TimeDelta {
    TimeDelta::days(n)
}
