//! Detector registry
//!
//! Two lookup tables built once at start-up:
//! - identifier type → ordered provider detectors (first non-empty answer wins)
//! - provider key → license detector, per [`DetectionScope`]
//!
//! Provider keys are URLs compared after [`clean_url`]. A lookup prefers an
//! exact key, then the longest key that is a path prefix of the provider URL,
//! then a key on the same host. No match is a normal outcome.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::error::{DetectorFault, RegistryError};
use crate::identifier::IdentifierType;
use crate::record::{CacheEntry, LicenseRecord, Provider};

/// A pluggable detection step
///
/// `Ok(None)` means the detector found nothing; `Err` means it failed.
#[async_trait]
pub trait Detector: Send + Sync {
    type Output: Send;

    /// Short name recorded in provenance and logs
    fn name(&self) -> &str;

    fn version(&self) -> &str {
        "0.1"
    }

    async fn detect(&self, entry: &CacheEntry) -> Result<Option<Self::Output>, DetectorFault>;
}

/// Detector that locates the provider hosting a work
pub type ProviderDetector = dyn Detector<Output = Provider>;

/// Detector that reads a license from a provider
pub type LicenseDetector = dyn Detector<Output = LicenseRecord>;

/// Granularity of a license detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectionScope {
    /// Inspects the individual article page
    Page,
    /// Applies one license to everything a provider hosts
    Site,
}

impl fmt::Display for DetectionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionScope::Page => f.write_str("page"),
            DetectionScope::Site => f.write_str("site"),
        }
    }
}

struct ProviderBinding {
    priority: i32,
    detector: Arc<ProviderDetector>,
}

struct LicenseBinding {
    key: String,
    host: Option<String>,
    scope: DetectionScope,
    detector: Arc<LicenseDetector>,
}

/// Strip scheme and leading `www.`, drop trailing `/`, lower-case
pub fn clean_url(url: &str) -> String {
    let url = url.trim();
    let url = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .unwrap_or(url);
    let url = url.strip_prefix("www.").unwrap_or(url);
    url.trim_end_matches('/').to_lowercase()
}

fn host_of(cleaned: &str) -> Option<String> {
    Url::parse(&format!("http://{}", cleaned))
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
}

fn is_path_prefix(key: &str, url: &str) -> bool {
    url.strip_prefix(key)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(['/', '?', '#']))
}

/// Registry of provider and license detectors
#[derive(Default)]
pub struct DetectorRegistry {
    providers: HashMap<IdentifierType, Vec<ProviderBinding>>,
    licenses: Vec<LicenseBinding>,
}

impl DetectorRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider detector for an identifier type at default priority
    pub fn register_provider(&mut self, id_type: IdentifierType, detector: Arc<ProviderDetector>) {
        self.register_provider_with_priority(id_type, 0, detector);
    }

    /// Register a provider detector; higher priority runs first, ties keep registration order
    pub fn register_provider_with_priority(
        &mut self,
        id_type: IdentifierType,
        priority: i32,
        detector: Arc<ProviderDetector>,
    ) {
        let bindings = self.providers.entry(id_type).or_default();
        let position = bindings
            .iter()
            .position(|b| b.priority < priority)
            .unwrap_or(bindings.len());
        bindings.insert(position, ProviderBinding { priority, detector });
    }

    /// Bind a license detector to a provider key
    pub fn register_license(
        &mut self,
        key: &str,
        scope: DetectionScope,
        detector: Arc<LicenseDetector>,
    ) -> Result<(), RegistryError> {
        let cleaned = clean_url(key);
        if cleaned.is_empty() {
            return Err(RegistryError::InvalidKey(key.to_string()));
        }
        if self
            .licenses
            .iter()
            .any(|b| b.key == cleaned && b.scope == scope)
        {
            return Err(RegistryError::AlreadyRegistered {
                key: cleaned,
                scope: scope.to_string(),
            });
        }

        self.licenses.push(LicenseBinding {
            host: host_of(&cleaned),
            key: cleaned,
            scope,
            detector,
        });
        Ok(())
    }

    /// Provider detectors for a type, in the order they are tried
    pub fn provider_detectors(&self, id_type: IdentifierType) -> Vec<Arc<ProviderDetector>> {
        self.providers
            .get(&id_type)
            .map(|bindings| bindings.iter().map(|b| b.detector.clone()).collect())
            .unwrap_or_default()
    }

    /// License detector for a single provider URL
    pub fn license_detector(
        &self,
        scope: DetectionScope,
        provider_url: &str,
    ) -> Option<Arc<LicenseDetector>> {
        self.license_detector_for(scope, &Provider::from_url(provider_url))
    }

    /// License detector for a provider, trying its URLs in order at each precedence level
    pub fn license_detector_for(
        &self,
        scope: DetectionScope,
        provider: &Provider,
    ) -> Option<Arc<LicenseDetector>> {
        let urls: Vec<String> = provider.url.iter().map(|u| clean_url(u)).collect();
        let candidates = || self.licenses.iter().filter(move |b| b.scope == scope);

        let exact = urls
            .iter()
            .find_map(|url| candidates().find(|b| &b.key == url));
        if let Some(binding) = exact {
            return Some(binding.detector.clone());
        }

        let prefix = urls.iter().find_map(|url| {
            candidates()
                .filter(|b| is_path_prefix(&b.key, url))
                .max_by_key(|b| b.key.len())
        });
        if let Some(binding) = prefix {
            return Some(binding.detector.clone());
        }

        urls.iter()
            .filter_map(|url| host_of(url))
            .find_map(|host| candidates().find(|b| b.host.as_deref() == Some(host.as_str())))
            .map(|b| b.detector.clone())
    }

    /// Run the provider detectors for the entry's type until one answers
    ///
    /// A fault stops the chain and is returned to the caller.
    pub async fn detect_provider(
        &self,
        entry: &CacheEntry,
    ) -> Result<Option<Provider>, DetectorFault> {
        for detector in self.provider_detectors(entry.identifier.identifier_type) {
            tracing::debug!("applying provider detector {} to {}", detector.name(), entry.key());
            if let Some(provider) = detector.detect(entry).await? {
                return Ok(Some(provider));
            }
        }
        Ok(None)
    }

    /// Number of provider detectors across all types
    pub fn provider_count(&self) -> usize {
        self.providers.values().map(Vec::len).sum()
    }

    /// Number of license bindings
    pub fn license_count(&self) -> usize {
        self.licenses.len()
    }
}

impl fmt::Debug for DetectorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectorRegistry")
            .field("providers", &self.provider_count())
            .field("licenses", &self.license_count())
            .finish()
    }
}
