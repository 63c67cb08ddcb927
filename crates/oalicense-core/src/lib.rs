//! OA License Core - License lookups for scholarly identifiers
//!
//! This crate answers "what license is this work published under?" for batches
//! of DOIs and PubMed identifiers:
//!
//! - **Identifier**: Type detection, validation and canonical forms (`doi:10.x/y`, `pmid:12345678`)
//! - **Record**: Bibjson records, licenses and their provenance
//! - **Cache**: JSON cache over a byte backend (in-memory or SQLite) with content-based staleness
//! - **Registry**: Pluggable provider and license detectors keyed by type and provider URL
//! - **Pipeline**: Per-identifier resolution (normalise → cache → provider → license → store)
//! - **Dispatch**: Background worker pool for detector work
//! - **Result**: Per-batch report partitioned into results, processing and errors
//! - **Detectors**: DOI dereference and license statement matching
//! - **Config**: Immutable configuration for expiry, staleness and detection
//!
//! # Lookup flow
//!
//! ```text
//! lookup ─┬─ fresh in cache ──────────────────────────→ results
//!         ├─ queued / recorded error ─────────────────→ processing / errors
//!         └─ miss or stale ─→ dispatch ─→ processing
//!                              │
//!                 worker: provider → license → store ─→ cache
//! ```
//!
//! Every finished detection is cached so the next poll can answer it: a
//! license, a `failed-to-obtain-license` entry when nothing was found, or a
//! recorded error (expiring with the queued marker) when a detector failed.

pub mod cache;
pub mod config;
pub mod detectors;
pub mod dispatch;
pub mod error;
pub mod identifier;
pub mod pipeline;
pub mod record;
pub mod registry;
pub mod result;

pub use cache::{is_stale, CacheBackend, CacheLookup, CacheStore, InMemoryBackend};
#[cfg(feature = "sqlite")]
pub use cache::SqliteBackend;
pub use config::{CacheConfig, DetectionConfig, LicenseConfig, NoProviderPolicy, ServerConfig};
pub use dispatch::{Completion, Dispatcher, Stage, WorkItem, WorkerPool};
pub use error::{
    CacheError, ConfigError, DetectorFault, DispatchError, LicenseError, RegistryError, Result,
    ValidationError,
};
pub use identifier::{normalize, Identifier, IdentifierType, RequestedIdentifier};
pub use pipeline::{CacheCheck, Resolver};
pub use record::{
    BibjsonRecord, CacheEntry, LicenseRecord, Provenance, ProvenanceCategory, Provider,
    FAILED_TO_OBTAIN_LICENSE,
};
pub use registry::{DetectionScope, Detector, DetectorRegistry, LicenseDetector, ProviderDetector};
pub use result::{ErrorEntry, Outcome, ProcessingEntry, ResultSet};
