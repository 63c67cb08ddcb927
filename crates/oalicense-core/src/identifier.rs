//! Identifier type detection, validation and canonicalisation
//!
//! Raw identifiers arrive as free text, optionally with an asserted type.
//! [`normalize`] turns them into an [`Identifier`] whose `canonical` form is
//! the cache key and the equality key for the work it names.

use std::fmt;
use std::hash::{Hash, Hasher};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

lazy_static! {
    // Optional resolver/scheme prefix followed by 10.<registrant>/<suffix>
    static ref DOI_REGEX: Regex = Regex::new(
        r"(?i)^(?:https?://(?:dx\.)?doi\.org/|(?:https?://)?hdl\.handle\.net/|info:doi:|doi:)?(?P<doi>10\.[^\s/]+/\S+)$"
    ).unwrap();

    // Exactly eight digits, optionally in canonical `pmid:` form
    static ref PMID_REGEX: Regex = Regex::new(r"(?i)^(?:pmid:)?(?P<pmid>\d{8})$").unwrap();
}

/// Types of identifier the pipeline understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierType {
    /// Digital Object Identifier
    Doi,
    /// PubMed identifier
    Pmid,
    /// Not (yet) determined
    #[default]
    Unknown,
}

impl IdentifierType {
    /// Types that take part in structural detection, in priority order
    pub fn detectable() -> &'static [IdentifierType] {
        &[IdentifierType::Doi, IdentifierType::Pmid]
    }

    /// Parse a type name as supplied by a client ("doi", "PMID", ...)
    pub fn parse(value: &str) -> Option<IdentifierType> {
        match value.trim().to_ascii_lowercase().as_str() {
            "doi" => Some(IdentifierType::Doi),
            "pmid" => Some(IdentifierType::Pmid),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierType::Doi => "doi",
            IdentifierType::Pmid => "pmid",
            IdentifierType::Unknown => "unknown",
        }
    }

    /// Canonical form of `raw` if it structurally matches this type
    fn canonical_form(&self, raw: &str) -> Option<String> {
        match self {
            IdentifierType::Doi => DOI_REGEX
                .captures(raw)
                .and_then(|cap| cap.name("doi"))
                .map(|m| format!("doi:{}", m.as_str().to_lowercase())),
            IdentifierType::Pmid => PMID_REGEX
                .captures(raw)
                .and_then(|cap| cap.name("pmid"))
                .map(|m| format!("pmid:{}", m.as_str())),
            IdentifierType::Unknown => None,
        }
    }
}

impl fmt::Display for IdentifierType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalised identifier
///
/// Equality and hashing use `canonical` only: two identifiers with the same
/// canonical form refer to the same work regardless of how they were written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identifier {
    /// The identifier as supplied by the client
    #[serde(rename = "id")]
    pub raw: String,
    /// Detected or asserted type
    #[serde(rename = "type", default)]
    pub identifier_type: IdentifierType,
    /// Canonical form, e.g. `doi:10.1371/journal.pone.0000001` or `pmid:12345678`
    pub canonical: String,
}

impl Identifier {
    /// An identifier whose type could not be determined
    pub fn undetermined(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let canonical = raw.trim().to_string();
        Self {
            raw,
            identifier_type: IdentifierType::Unknown,
            canonical,
        }
    }

    pub fn is_known(&self) -> bool {
        self.identifier_type != IdentifierType::Unknown
    }

    /// The canonical value without its type prefix
    pub fn value(&self) -> &str {
        match self.canonical.split_once(':') {
            Some((_, value)) if self.is_known() => value,
            _ => &self.canonical,
        }
    }

    /// A URL that dereferences to the work, if the type has a resolver
    pub fn resolver_url(&self) -> Option<String> {
        match self.identifier_type {
            IdentifierType::Doi => Some(format!("https://doi.org/{}", self.value())),
            IdentifierType::Pmid => {
                Some(format!("https://pubmed.ncbi.nlm.nih.gov/{}/", self.value()))
            }
            IdentifierType::Unknown => None,
        }
    }
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for Identifier {}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

/// An identifier as submitted in a batch: a bare string or `{"id", "type"}`
///
/// Any other JSON value still deserializes, as a malformed request carrying
/// the reason, so one bad element does not reject the whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RequestedIdentifierRepr")]
pub struct RequestedIdentifier {
    pub id: String,
    /// Type name asserted by the client, if any
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub asserted_type: Option<String>,
    /// Why the submitted value is not a usable identifier
    #[serde(skip)]
    pub malformed: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RequestedIdentifierRepr {
    Bare(String),
    Object {
        id: String,
        #[serde(rename = "type", default)]
        asserted_type: Option<String>,
    },
    Invalid(serde_json::Value),
}

impl From<RequestedIdentifierRepr> for RequestedIdentifier {
    fn from(repr: RequestedIdentifierRepr) -> Self {
        match repr {
            RequestedIdentifierRepr::Bare(id) => Self::new(id),
            RequestedIdentifierRepr::Object { id, asserted_type } => Self {
                id,
                asserted_type,
                malformed: None,
            },
            RequestedIdentifierRepr::Invalid(value) => {
                let reason = match &value {
                    serde_json::Value::Object(fields) if !fields.contains_key("id") => {
                        "identifier object does not contain an 'id' field"
                    }
                    _ => "identifier must be a string or an object with a string 'id' field",
                };
                Self::malformed(value.to_string(), reason)
            }
        }
    }
}

impl RequestedIdentifier {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            asserted_type: None,
            malformed: None,
        }
    }

    pub fn with_type(id: impl Into<String>, asserted_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            asserted_type: Some(asserted_type.into()),
            malformed: None,
        }
    }

    /// A submitted value that could not be read as an identifier
    pub fn malformed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            asserted_type: None,
            malformed: Some(reason.into()),
        }
    }
}

impl From<&str> for RequestedIdentifier {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Normalise a raw identifier
///
/// With an asserted type the raw value must satisfy that type's structure or
/// a [`ValidationError`] is returned. Without one, each detectable type is
/// tried in priority order and the first match wins; no match yields an
/// identifier of type [`IdentifierType::Unknown`], which is not an error here.
pub fn normalize(
    raw: &str,
    asserted: Option<IdentifierType>,
) -> Result<Identifier, ValidationError> {
    let trimmed = raw.trim();

    match asserted {
        Some(id_type) if id_type != IdentifierType::Unknown => {
            let canonical = id_type
                .canonical_form(trimmed)
                .ok_or_else(|| ValidationError {
                    asserted: id_type,
                    value: raw.to_string(),
                })?;
            Ok(Identifier {
                raw: raw.to_string(),
                identifier_type: id_type,
                canonical,
            })
        }
        _ => Ok(detect(raw)),
    }
}

/// Structural type detection without an asserted type
pub fn detect(raw: &str) -> Identifier {
    let trimmed = raw.trim();
    IdentifierType::detectable()
        .iter()
        .find_map(|id_type| {
            id_type.canonical_form(trimmed).map(|canonical| Identifier {
                raw: raw.to_string(),
                identifier_type: *id_type,
                canonical,
            })
        })
        .unwrap_or_else(|| Identifier::undetermined(raw))
}
