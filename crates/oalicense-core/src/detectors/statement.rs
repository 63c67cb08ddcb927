//! License detection by statement matching
//!
//! Page text and statements are compared after collapsing whitespace and
//! lower-casing. When the raw text does not match, markup is stripped from
//! both sides and the comparison is repeated.

use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::record::{LicenseRecord, Provenance, ProvenanceCategory};

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref MARKUP: Regex = Regex::new(r"(?s)<!--.*?-->|<[^>]*>").unwrap();
}

/// A license statement a publisher prints on its pages, and what it means
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseStatement {
    pub statement: String,
    /// License code, e.g. `cc-by`
    #[serde(rename = "type")]
    pub license_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_access: Option<bool>,
}

impl LicenseStatement {
    pub fn new(statement: impl Into<String>, license_type: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            license_type: license_type.into(),
            version: None,
            url: None,
            open_access: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_open_access(mut self, open_access: bool) -> Self {
        self.open_access = Some(open_access);
        self
    }
}

/// Collapse runs of whitespace to one space and lower-case
pub fn normalise_text(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").to_lowercase()
}

fn strip_markup(text: &str) -> String {
    normalise_text(&MARKUP.replace_all(text, " "))
}

/// The first statement found in `content`, if any
///
/// Statements that are empty after normalisation never match.
pub fn match_statement<'a>(
    content: &str,
    statements: &'a [LicenseStatement],
) -> Option<&'a LicenseStatement> {
    let content = normalise_text(content);
    if content.trim().is_empty() {
        return None;
    }
    let stripped = strip_markup(&content);

    statements.iter().find(|candidate| {
        let statement = normalise_text(&candidate.statement);
        if statement.trim().is_empty() {
            return false;
        }
        if content.contains(&statement) {
            return true;
        }
        let statement = strip_markup(&statement);
        let statement = statement.trim();
        !statement.is_empty() && stripped.contains(statement)
    })
}

/// Page-level license detector driven by a list of statements
#[derive(Debug, Clone)]
pub struct StatementMatcher {
    name: String,
    statements: Vec<LicenseStatement>,
    #[cfg(feature = "native")]
    client: reqwest::Client,
}

impl StatementMatcher {
    pub fn new(name: impl Into<String>, statements: Vec<LicenseStatement>) -> Self {
        Self {
            name: name.into(),
            statements,
            #[cfg(feature = "native")]
            client: reqwest::Client::new(),
        }
    }

    /// Fetch pages with `client` instead of a default one
    #[cfg(feature = "native")]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn statements(&self) -> &[LicenseStatement] {
        &self.statements
    }

    /// License described by `content`, fetched from `source`
    pub fn license_for(&self, content: &str, source: &str) -> Option<LicenseRecord> {
        let matched = match_statement(content, &self.statements)?;

        let provenance = Provenance::new(
            Utc::now(),
            super::AGENT,
            source,
            ProvenanceCategory::PageScrape,
        )
        .with_description(format!(
            "license determined from {} by matching the statement \"{}\"",
            source, matched.statement
        ))
        .with_handler(&self.name, "0.1");

        let mut license = LicenseRecord::new(&matched.license_type, provenance);
        license.version = matched.version.clone();
        license.url = matched.url.clone();
        license.open_access = matched.open_access;
        Some(license)
    }
}

#[cfg(feature = "native")]
#[async_trait::async_trait]
impl crate::registry::Detector for StatementMatcher {
    type Output = LicenseRecord;

    fn name(&self) -> &str {
        &self.name
    }

    async fn detect(
        &self,
        entry: &crate::record::CacheEntry,
    ) -> Result<Option<LicenseRecord>, crate::error::DetectorFault> {
        let Some(url) = entry.provider.as_ref().and_then(|p| p.url.first()) else {
            return Ok(None);
        };
        let content = super::fetch_text(&self.client, url).await?;
        Ok(self.license_for(&content, url))
    }
}
