//! Per-batch result aggregation

use serde::{Deserialize, Serialize};

use crate::identifier::Identifier;
use crate::record::BibjsonRecord;

/// Final or interim classification of one requested identifier
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Answered; the record may carry no license
    Resolved(BibjsonRecord),
    /// Handed to the background workers
    Processing,
    /// Failed with a reason the caller can report or retry on
    Errored(String),
}

impl Outcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Outcome::Resolved(_))
    }
}

/// An identifier still waiting for detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingEntry {
    pub identifier: Identifier,
}

/// An identifier that failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub identifier: Identifier,
    pub error: String,
}

/// Report for one batch request
///
/// Every requested identifier lands in exactly one of `results`,
/// `processing` or `errors`. Duplicates in the request are classified
/// independently.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultSet {
    pub requested: usize,
    pub results: Vec<BibjsonRecord>,
    pub processing: Vec<ProcessingEntry>,
    pub errors: Vec<ErrorEntry>,
}

impl ResultSet {
    /// Empty report for a batch of `requested` identifiers
    pub fn new(requested: usize) -> Self {
        Self {
            requested,
            ..Default::default()
        }
    }

    /// Classify one identifier
    ///
    /// A resolved record is guaranteed to list `identifier` (matched by
    /// canonical form) so callers can tell which request it answers.
    pub fn add_outcome(&mut self, identifier: Identifier, outcome: Outcome) {
        match outcome {
            Outcome::Resolved(mut record) => {
                record.ensure_identifier(&identifier);
                self.results.push(record);
            }
            Outcome::Processing => self.processing.push(ProcessingEntry { identifier }),
            Outcome::Errored(error) => self.errors.push(ErrorEntry { identifier, error }),
        }
    }

    /// Number of identifiers classified so far
    pub fn classified(&self) -> usize {
        self.results.len() + self.processing.len() + self.errors.len()
    }

    /// Whether every requested identifier has been classified
    pub fn is_complete(&self) -> bool {
        self.classified() == self.requested
    }

    /// JSON form returned by the batch endpoint
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
