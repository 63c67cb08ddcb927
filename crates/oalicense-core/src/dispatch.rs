//! Background detection workers
//!
//! The synchronous lookup hands cache misses to a [`Dispatcher`] as
//! [`WorkItem`]s and reports them as `processing`. [`WorkerPool`] is the
//! in-process dispatcher: it advances each item through the detection stages
//! on the tokio runtime, at most `workers` identifiers at a time, and reports
//! every finished identifier as a [`Completion`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Semaphore};

use crate::error::DispatchError;
use crate::identifier::Identifier;
use crate::pipeline::Resolver;
use crate::record::CacheEntry;
use crate::result::Outcome;

/// Detection stage a work item is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    DetectProvider,
    DetectLicense,
    Store,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::DetectProvider => f.write_str("provider detection"),
            Stage::DetectLicense => f.write_str("license detection"),
            Stage::Store => f.write_str("store"),
        }
    }
}

/// One identifier in flight, together with the stage it has reached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub entry: CacheEntry,
    pub stage: Stage,
}

impl WorkItem {
    /// A fresh item starting at provider detection
    pub fn new(identifier: Identifier) -> Self {
        Self {
            entry: CacheEntry::queued(identifier),
            stage: Stage::DetectProvider,
        }
    }

    pub fn at(entry: CacheEntry, stage: Stage) -> Self {
        Self { entry, stage }
    }

    pub fn key(&self) -> &str {
        self.entry.key()
    }
}

/// Final outcome of one dispatched identifier
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub identifier: Identifier,
    pub outcome: Outcome,
}

/// Accepts work for asynchronous detection
pub trait Dispatcher: Send + Sync {
    /// Queue `item`; must not block on the detection itself
    fn dispatch(&self, item: WorkItem) -> Result<(), DispatchError>;
}

/// Bounded pool of detection workers on the current tokio runtime
#[derive(Clone)]
pub struct WorkerPool {
    sender: mpsc::UnboundedSender<WorkItem>,
}

impl WorkerPool {
    /// Start the pool
    ///
    /// Must be called from within a tokio runtime. The pool runs until every
    /// handle is dropped; items already accepted are still finished.
    pub fn spawn(
        resolver: Arc<Resolver>,
        workers: usize,
    ) -> (Self, mpsc::UnboundedReceiver<Completion>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (completions, completion_receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_pool(resolver, workers.max(1), receiver, completions));
        tracing::info!("worker pool started with {} workers", workers.max(1));
        (Self { sender }, completion_receiver)
    }

    /// Whether the pool still accepts work
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }
}

impl Dispatcher for WorkerPool {
    fn dispatch(&self, item: WorkItem) -> Result<(), DispatchError> {
        tracing::debug!("dispatching {} at {}", item.key(), item.stage);
        self.sender.send(item).map_err(|_| DispatchError::Closed)
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("open", &self.is_open())
            .finish()
    }
}

async fn run_pool(
    resolver: Arc<Resolver>,
    workers: usize,
    mut receiver: mpsc::UnboundedReceiver<WorkItem>,
    completions: mpsc::UnboundedSender<Completion>,
) {
    let permits = Arc::new(Semaphore::new(workers));

    while let Some(item) = receiver.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let resolver = resolver.clone();
        let completions = completions.clone();

        tokio::spawn(async move {
            let identifier = item.entry.identifier.clone();
            let job = tokio::spawn({
                let resolver = resolver.clone();
                async move { resolver.run(item).await }
            });

            // A panicking detector must not leave the queued marker behind
            let outcome = match job.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!("detection for {} aborted: {}", identifier, e);
                    let error = format!("detection aborted: {}", e);
                    resolver.record_failure(&identifier, &error);
                    Outcome::Errored(error)
                }
            };
            drop(permit);

            if completions.send(Completion { identifier, outcome }).is_err() {
                tracing::debug!("completion receiver dropped");
            }
        });
    }

    tracing::info!("worker pool stopped");
}
