//! Resolution pipeline
//!
//! Per identifier: normalise, check the cache, then detect the provider,
//! detect the license and store it. The synchronous entry point
//! [`Resolver::lookup`] answers from the cache and hands every miss to a
//! [`Dispatcher`]; [`Resolver::resolve`] runs the whole chain in-process.
//!
//! Identifiers are independent. A failure is recorded against its own
//! identifier and never aborts the rest of the batch.

use std::future::Future;
use std::sync::Arc;

use rayon::prelude::*;

use crate::cache::{is_stale, CacheBackend, CacheStore};
use crate::config::{LicenseConfig, NoProviderPolicy};
use crate::detectors::AGENT;
use crate::dispatch::{Dispatcher, Stage, WorkItem};
use crate::error::{DetectorFault, LicenseError, Result};
use crate::identifier::{normalize, Identifier, IdentifierType, RequestedIdentifier};
use crate::record::{BibjsonRecord, CacheEntry, LicenseRecord};
use crate::registry::{DetectionScope, DetectorRegistry};
use crate::result::{Outcome, ResultSet};

/// What the cache says about an identifier
#[derive(Debug, Clone, PartialEq)]
pub enum CacheCheck {
    /// A fresh record that can be returned as is
    Fresh(CacheEntry),
    /// Already handed to the workers
    Queued,
    /// A permanent failure was recorded
    Failed(String),
    /// Nothing usable; detection is needed
    Miss,
}

/// Result of advancing a work item by one stage
#[derive(Debug)]
pub enum Step {
    Next(WorkItem),
    Done(Outcome),
}

/// Runs identifiers through cache and detectors
pub struct Resolver {
    config: Arc<LicenseConfig>,
    cache: CacheStore,
    registry: Arc<DetectorRegistry>,
}

impl Resolver {
    pub fn new(
        config: Arc<LicenseConfig>,
        backend: Arc<dyn CacheBackend>,
        registry: Arc<DetectorRegistry>,
    ) -> Self {
        let cache = CacheStore::new(backend, config.cache.ttl());
        Self {
            config,
            cache,
            registry,
        }
    }

    pub fn config(&self) -> &LicenseConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn registry(&self) -> &DetectorRegistry {
        &self.registry
    }

    /// Normalise a requested identifier
    ///
    /// An identifier whose type cannot be determined is an error here, as is
    /// a type name nobody recognises.
    pub fn normalize(&self, request: &RequestedIdentifier) -> Result<Identifier> {
        if let Some(reason) = &request.malformed {
            return Err(LicenseError::Malformed {
                id: request.id.clone(),
                reason: reason.clone(),
            });
        }

        let asserted = match request.asserted_type.as_deref() {
            Some(name) => Some(
                IdentifierType::parse(name)
                    .ok_or_else(|| LicenseError::UnknownType(request.id.clone()))?,
            ),
            None => None,
        };

        let identifier = normalize(&request.id, asserted)?;
        if !identifier.is_known() {
            return Err(LicenseError::UnknownType(request.id.clone()));
        }
        Ok(identifier)
    }

    /// Classify the cached state of `identifier`
    ///
    /// Stale records are invalidated and reported as a miss.
    pub fn check_cache(&self, identifier: &Identifier) -> CacheCheck {
        let key = identifier.canonical.as_str();
        let Some(entry) = self.cache.get(key) else {
            return CacheCheck::Miss;
        };

        if entry.queued {
            return CacheCheck::Queued;
        }

        if let Some(error) = &entry.error {
            return CacheCheck::Failed(format!("identifier has a recorded error: {}", error));
        }

        match &entry.bibjson {
            Some(bibjson) if !is_stale(bibjson, self.config.cache.stale_window()) => {
                CacheCheck::Fresh(entry)
            }
            _ => {
                tracing::debug!("cached record for {} is stale, invalidating", key);
                self.cache.invalidate(key);
                CacheCheck::Miss
            }
        }
    }

    /// Answer a batch from the cache, dispatching everything else
    ///
    /// Returns without waiting on any detector. Misses are marked queued in
    /// the cache and reported as processing.
    pub fn lookup(
        &self,
        requests: &[RequestedIdentifier],
        dispatcher: &dyn Dispatcher,
    ) -> ResultSet {
        let outcomes: Vec<(Identifier, Outcome)> = requests
            .par_iter()
            .map(|request| self.lookup_one(request, dispatcher))
            .collect();

        let mut results = ResultSet::new(requests.len());
        for (identifier, outcome) in outcomes {
            results.add_outcome(identifier, outcome);
        }
        results
    }

    fn lookup_one(
        &self,
        request: &RequestedIdentifier,
        dispatcher: &dyn Dispatcher,
    ) -> (Identifier, Outcome) {
        let identifier = match self.normalize(request) {
            Ok(identifier) => identifier,
            Err(e) => {
                return (
                    Identifier::undetermined(request.id.clone()),
                    Outcome::Errored(e.to_string()),
                )
            }
        };

        let outcome = match self.check_cache(&identifier) {
            CacheCheck::Fresh(entry) => Outcome::Resolved(entry.bibjson_for_caller()),
            CacheCheck::Queued => Outcome::Processing,
            CacheCheck::Failed(error) => Outcome::Errored(error),
            CacheCheck::Miss => self.enqueue(&identifier, dispatcher),
        };
        (identifier, outcome)
    }

    fn enqueue(&self, identifier: &Identifier, dispatcher: &dyn Dispatcher) -> Outcome {
        let item = WorkItem::new(identifier.clone());
        self.cache
            .put_with_ttl(item.key(), &item.entry, self.config.cache.queued_ttl());

        match dispatcher.dispatch(item) {
            Ok(()) => Outcome::Processing,
            Err(e) => {
                tracing::warn!("could not dispatch {}: {}", identifier, e);
                self.cache.invalidate(&identifier.canonical);
                Outcome::Errored(LicenseError::from(e).to_string())
            }
        }
    }

    /// Resolve one identifier to a final outcome, running detectors if needed
    pub async fn resolve(&self, request: &RequestedIdentifier) -> (Identifier, Outcome) {
        let identifier = match self.normalize(request) {
            Ok(identifier) => identifier,
            Err(e) => {
                return (
                    Identifier::undetermined(request.id.clone()),
                    Outcome::Errored(e.to_string()),
                )
            }
        };

        let outcome = match self.check_cache(&identifier) {
            CacheCheck::Fresh(entry) => Outcome::Resolved(entry.bibjson_for_caller()),
            CacheCheck::Failed(error) => Outcome::Errored(error),
            CacheCheck::Queued | CacheCheck::Miss => {
                self.run(WorkItem::new(identifier.clone())).await
            }
        };
        (identifier, outcome)
    }

    /// Resolve a batch concurrently and wait for every final outcome
    pub async fn resolve_batch(self: &Arc<Self>, requests: Vec<RequestedIdentifier>) -> ResultSet {
        let mut results = ResultSet::new(requests.len());

        let handles: Vec<_> = requests
            .into_iter()
            .map(|request| {
                let resolver = Arc::clone(self);
                let raw = request.id.clone();
                let handle = tokio::spawn(async move { resolver.resolve(&request).await });
                (raw, handle)
            })
            .collect();

        for (raw, handle) in handles {
            match handle.await {
                Ok((identifier, outcome)) => results.add_outcome(identifier, outcome),
                Err(e) => {
                    tracing::warn!("resolution of {} aborted: {}", raw, e);
                    results.add_outcome(
                        Identifier::undetermined(raw),
                        Outcome::Errored(format!("detection aborted: {}", e)),
                    );
                }
            }
        }
        results
    }

    /// Advance a work item through every remaining stage
    pub async fn run(&self, mut item: WorkItem) -> Outcome {
        loop {
            match self.advance(item).await {
                Step::Next(next) => item = next,
                Step::Done(outcome) => return outcome,
            }
        }
    }

    /// Advance a work item by one stage
    pub async fn advance(&self, item: WorkItem) -> Step {
        tracing::debug!("{} entering {}", item.key(), item.stage);
        match item.stage {
            Stage::DetectProvider => self.detect_provider(item.entry).await,
            Stage::DetectLicense => self.detect_license(item.entry).await,
            Stage::Store => self.store(item.entry),
        }
    }

    async fn detect_provider(&self, mut entry: CacheEntry) -> Step {
        let key = entry.key().to_string();

        match self
            .timed(Stage::DetectProvider, self.registry.detect_provider(&entry))
            .await
        {
            Ok(Some(provider)) if !provider.is_empty() => {
                entry.provider = Some(provider);
                Step::Next(WorkItem::at(entry, Stage::DetectLicense))
            }
            Ok(_) => match self.config.detection.no_provider {
                NoProviderPolicy::Resolve => {
                    tracing::debug!("no provider found for {}", key);
                    let failure = LicenseRecord::failed_to_obtain(
                        AGENT,
                        "",
                        "no provider could be determined for this record, so the license is unknown",
                    );
                    Step::Next(WorkItem::at(with_license(entry, failure), Stage::Store))
                }
                NoProviderPolicy::Error => {
                    let error = format!("no provider found for {}", key);
                    self.record_error(&entry.identifier, &error)
                }
            },
            Err(fault) => self.fail(&entry.identifier, fault),
        }
    }

    async fn detect_license(&self, entry: CacheEntry) -> Step {
        let key = entry.key().to_string();
        let Some(provider) = entry.provider.clone() else {
            return Step::Next(WorkItem::at(entry, Stage::DetectProvider));
        };

        let mut tried = None;
        for scope in [DetectionScope::Page, DetectionScope::Site] {
            let Some(detector) = self.registry.license_detector_for(scope, &provider) else {
                continue;
            };
            tracing::debug!(
                "applying {} license detector {} to {}",
                scope,
                detector.name(),
                key
            );

            match self.timed(Stage::DetectLicense, detector.detect(&entry)).await {
                Ok(Some(mut license)) => {
                    if license.provenance.handler.is_none() {
                        license.provenance.handler = Some(detector.name().to_string());
                        license.provenance.handler_version = Some(detector.version().to_string());
                    }
                    return Step::Next(WorkItem::at(with_license(entry, license), Stage::Store));
                }
                Ok(None) => tried = Some(detector),
                Err(fault) => return self.fail(&entry.identifier, fault),
            }
        }

        tracing::debug!("no license found for {}", key);
        let source = provider.url.first().cloned().unwrap_or_default();
        let failure = match tried {
            Some(detector) => {
                let mut failure = LicenseRecord::failed_to_obtain(
                    AGENT,
                    source,
                    "a detector ran and failed to find a license for this record, so the license is unknown",
                );
                failure.provenance = failure.provenance.with_handler(detector.name(), detector.version());
                failure
            }
            None => LicenseRecord::failed_to_obtain(
                AGENT,
                source,
                "no license detector is registered for this provider, so the license is unknown",
            ),
        };
        Step::Next(WorkItem::at(with_license(entry, failure), Stage::Store))
    }

    fn store(&self, mut entry: CacheEntry) -> Step {
        entry.queued = false;
        entry.error = None;
        let bibjson = entry.bibjson_for_caller();
        entry.bibjson = Some(bibjson.clone());

        self.cache.put(entry.key(), &entry);
        if bibjson.is_licensed() {
            tracing::info!("cached license for {}", entry.key());
        } else {
            tracing::info!("cached unknown license for {}", entry.key());
        }
        Step::Done(Outcome::Resolved(bibjson))
    }

    fn fail(&self, identifier: &Identifier, fault: DetectorFault) -> Step {
        tracing::warn!("detection for {} failed: {}", identifier, fault);
        self.record_error(identifier, &LicenseError::from(fault).to_string())
    }

    fn record_error(&self, identifier: &Identifier, error: &str) -> Step {
        self.record_failure(identifier, error);
        Step::Done(Outcome::Errored(error.to_string()))
    }

    /// Replace the queued marker with a recorded error
    ///
    /// The error expires with the queued TTL, after which the identifier is
    /// detected again.
    pub fn record_failure(&self, identifier: &Identifier, error: &str) {
        let entry = CacheEntry {
            error: Some(error.to_string()),
            ..CacheEntry::new(identifier.clone())
        };
        self.cache
            .put_with_ttl(&identifier.canonical, &entry, self.config.cache.queued_ttl());
    }

    async fn timed<T>(
        &self,
        stage: Stage,
        detection: impl Future<Output = std::result::Result<T, DetectorFault>>,
    ) -> std::result::Result<T, DetectorFault> {
        let after = self.config.detection.timeout();
        tokio::time::timeout(after, detection)
            .await
            .map_err(|_| DetectorFault::Timeout {
                stage: stage.to_string(),
                after,
            })?
    }
}

fn with_license(mut entry: CacheEntry, license: LicenseRecord) -> CacheEntry {
    let mut bibjson = entry
        .bibjson
        .take()
        .unwrap_or_else(|| BibjsonRecord::for_identifier(entry.identifier.clone()));
    bibjson.add_license(license);
    entry.bibjson = Some(bibjson);
    entry
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("cache", &self.cache)
            .field("registry", &self.registry)
            .finish()
    }
}
