//! License records, provenance and the cached entry shape
//!
//! The serialized forms follow bibjson conventions: a bibliographic record
//! carries an `identifier` list and an optional `license` list, and each
//! license carries the `provenance` of the determination.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identifier::Identifier;

/// Fixed timestamp format for provenance dates (second precision, UTC)
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// License code recorded when detection ran but could not determine a license
pub const FAILED_TO_OBTAIN_LICENSE: &str = "failed-to-obtain-license";

/// Format a timestamp the way provenance dates are stored
pub fn format_date(date: DateTime<Utc>) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parse a stored provenance date; anything not in [`DATE_FORMAT`] is `None`
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, DATE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// How a license determination was made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceCategory {
    /// Found by inspecting the article page
    #[default]
    PageScrape,
    /// Applies to everything the provider hosts
    SiteScrape,
    /// A detector ran but could not decide
    Failure,
    /// Anything recorded by another system
    #[serde(other)]
    Other,
}

/// Who determined a license, when, and from where
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Timestamp in [`DATE_FORMAT`]; kept as text so foreign values survive a round trip
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default)]
    pub agent: String,
    /// Provider URL that was inspected
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub category: ProvenanceCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<String>,
    #[serde(default)]
    pub description: String,
    /// Name of the detector that produced the license
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler_version: Option<String>,
}

impl Provenance {
    pub fn new(
        date: DateTime<Utc>,
        agent: impl Into<String>,
        source: impl Into<String>,
        category: ProvenanceCategory,
    ) -> Self {
        Self {
            date: Some(format_date(date)),
            agent: agent.into(),
            source: source.into(),
            category,
            jurisdiction: None,
            description: String::new(),
            handler: None,
            handler_version: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_handler(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.handler = Some(name.into());
        self.handler_version = Some(version.into());
        self
    }

    /// The date if present and parseable
    pub fn parsed_date(&self) -> Option<DateTime<Utc>> {
        self.date.as_deref().and_then(parse_date)
    }
}

/// A single license statement about a work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseRecord {
    /// License code, e.g. `cc-by`
    #[serde(rename = "type")]
    pub license_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_access: Option<bool>,
    pub provenance: Provenance,
}

impl LicenseRecord {
    pub fn new(license_type: impl Into<String>, provenance: Provenance) -> Self {
        Self {
            license_type: license_type.into(),
            version: None,
            url: None,
            open_access: None,
            provenance,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_open_access(mut self, open_access: bool) -> Self {
        self.open_access = Some(open_access);
        self
    }

    /// Entry stating that no license could be determined
    ///
    /// Dated now, so the record stays fresh for the stale window and the
    /// detectors are not rerun on every lookup.
    pub fn failed_to_obtain(
        agent: impl Into<String>,
        source: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let provenance = Provenance::new(Utc::now(), agent, source, ProvenanceCategory::Failure)
            .with_description(description);
        Self::new(FAILED_TO_OBTAIN_LICENSE, provenance).with_open_access(false)
    }

    pub fn is_failure(&self) -> bool {
        self.provenance.category == ProvenanceCategory::Failure
    }
}

/// Bibliographic record returned to callers
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BibjsonRecord {
    #[serde(default)]
    pub identifier: Vec<Identifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// License history; `None` means no license field at all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<Vec<LicenseRecord>>,
}

impl BibjsonRecord {
    /// A record for `identifier` with no license field
    pub fn for_identifier(identifier: Identifier) -> Self {
        Self {
            identifier: vec![identifier],
            ..Default::default()
        }
    }

    pub fn has_license(&self) -> bool {
        self.license.as_ref().is_some_and(|l| !l.is_empty())
    }

    /// Whether any entry is an actual license rather than a failure record
    pub fn is_licensed(&self) -> bool {
        self.licenses().iter().any(|l| !l.is_failure())
    }

    pub fn add_license(&mut self, license: LicenseRecord) {
        self.license.get_or_insert_with(Vec::new).push(license);
    }

    /// All license entries (empty when there is no license field)
    pub fn licenses(&self) -> &[LicenseRecord] {
        self.license.as_deref().unwrap_or(&[])
    }

    /// Most recently dated license in each provenance category
    pub fn latest_by_category(&self) -> Vec<&LicenseRecord> {
        let mut latest: Vec<&LicenseRecord> = Vec::new();
        for license in self.licenses() {
            let date = license.provenance.parsed_date();
            match latest
                .iter_mut()
                .find(|l| l.provenance.category == license.provenance.category)
            {
                Some(slot) => {
                    if date > slot.provenance.parsed_date() {
                        *slot = license;
                    }
                }
                None => latest.push(license),
            }
        }
        latest
    }

    /// Ensure `identifier` is listed, matching by canonical form
    pub fn ensure_identifier(&mut self, identifier: &Identifier) {
        if !self.identifier.iter().any(|i| i == identifier) {
            self.identifier.push(identifier.clone());
        }
    }
}

/// Where a work is hosted
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Provider {
    /// Provider URLs, most specific first
    #[serde(default)]
    pub url: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
}

impl Provider {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: vec![url.into()],
            doi: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.url.is_empty() && self.doi.is_none()
    }
}

/// The value stored in the cache under a canonical identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub identifier: Identifier,
    /// Handed to the background workers and not finished yet
    #[serde(default)]
    pub queued: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bibjson: Option<BibjsonRecord>,
    /// Permanent failure recorded for this identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CacheEntry {
    pub fn new(identifier: Identifier) -> Self {
        Self {
            identifier,
            queued: false,
            provider: None,
            bibjson: None,
            error: None,
        }
    }

    /// Marker written while an identifier waits for the workers
    pub fn queued(identifier: Identifier) -> Self {
        Self {
            queued: true,
            ..Self::new(identifier)
        }
    }

    pub fn key(&self) -> &str {
        &self.identifier.canonical
    }

    /// The bibjson record with this entry's identifier guaranteed present
    pub fn bibjson_for_caller(&self) -> BibjsonRecord {
        let mut bibjson = self
            .bibjson
            .clone()
            .unwrap_or_else(|| BibjsonRecord::for_identifier(self.identifier.clone()));
        bibjson.ensure_identifier(&self.identifier);
        bibjson
    }
}
