//! Publication phase.
//!
//! Each captured edition contributes two uploads (artifact and thumbnail),
//! located on disk purely from the edition ID. Uploads share one bounded pool
//! and a failure never cancels its siblings. Results flow back to a single
//! recorder loop, which owns the ledger outright.

use std::{
    fmt, io,
    num::NonZeroUsize,
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use bytes::Bytes;
use futures::{StreamExt, pin_mut};
use metrics::{counter, histogram};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::{
    application::{
        error::ErrorClass,
        ports::{ContentStore, UploadError, UploadRequest},
    },
    config::PublishSettings,
    domain::{
        edition::{AssetKind, ContentId, EditionId},
        ledger::{LedgerError, PublicationLedger},
    },
};

use super::{
    METRIC_UPLOAD_FAILED_TOTAL, METRIC_UPLOAD_MS, METRIC_UPLOAD_TOTAL,
    batch::CapturedBatch,
    layout::BuildLayout,
    pool::{BoundedPool, CancelSignal},
};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("content store is missing required configuration: {}", .missing.join(", "))]
    MissingCredentials { missing: Vec<&'static str> },
    #[error("publication cancelled after {} upload failure(s)", .failures.len())]
    Cancelled { failures: Vec<PublishFailure> },
}

impl PublishError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PublishError::MissingCredentials { .. } => ErrorClass::Configuration,
            PublishError::Cancelled { .. } => ErrorClass::Cancelled,
        }
    }

    /// Upload failures observed before the error, ordered by edition.
    pub fn failures(&self) -> &[PublishFailure] {
        match self {
            PublishError::MissingCredentials { .. } => &[],
            PublishError::Cancelled { failures } => failures,
        }
    }
}

#[derive(Debug, Error)]
pub enum PublishFailureCause {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("upload timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl PublishFailureCause {
    pub fn class(&self) -> ErrorClass {
        match self {
            PublishFailureCause::Read { .. } | PublishFailureCause::Timeout(_) => {
                ErrorClass::Transient
            }
            PublishFailureCause::Upload(err) => err.class(),
            PublishFailureCause::Ledger(_) => ErrorClass::Invariant,
        }
    }
}

/// One upload that did not end up in the ledger.
#[derive(Debug)]
pub struct PublishFailure {
    pub id: EditionId,
    pub kind: AssetKind,
    pub cause: PublishFailureCause,
}

impl PublishFailure {
    pub fn class(&self) -> ErrorClass {
        self.cause.class()
    }
}

impl fmt::Display for PublishFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "edition {} {}: {}", self.id, self.kind, self.cause)
    }
}

impl std::error::Error for PublishFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

#[derive(Debug)]
pub struct PublishReport {
    ledger: PublicationLedger,
    failures: Vec<PublishFailure>,
}

impl PublishReport {
    pub fn ledger(&self) -> &PublicationLedger {
        &self.ledger
    }

    /// Failures ordered by edition, artifact before thumbnail.
    pub fn failures(&self) -> &[PublishFailure] {
        &self.failures
    }

    pub fn into_parts(self) -> (PublicationLedger, Vec<PublishFailure>) {
        (self.ledger, self.failures)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PublishOptions {
    pub concurrency: NonZeroUsize,
    pub timeout: Duration,
}

impl From<&PublishSettings> for PublishOptions {
    fn from(settings: &PublishSettings) -> Self {
        Self {
            concurrency: settings.concurrency,
            timeout: settings.timeout,
        }
    }
}

#[derive(Clone)]
pub struct PublicationOrchestrator {
    store: Arc<dyn ContentStore>,
    layout: BuildLayout,
    options: PublishOptions,
    cancel: CancelSignal,
}

impl PublicationOrchestrator {
    pub fn new(store: Arc<dyn ContentStore>, layout: BuildLayout, options: PublishOptions) -> Self {
        Self {
            store,
            layout,
            options,
            cancel: CancelSignal::never(),
        }
    }

    pub fn with_cancel_signal(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn publish(&self, batch: &CapturedBatch) -> Result<PublishReport, PublishError> {
        let missing = self.store.missing_configuration();
        if !missing.is_empty() {
            error!(
                target = "pressrun::build::publish",
                missing = %missing.join(", "),
                "Content store is not configured; no uploads attempted"
            );
            return Err(PublishError::MissingCredentials { missing });
        }

        let started = Instant::now();
        let mut ledger = PublicationLedger::with_capacity(batch.len());
        let mut failures = Vec::new();
        let mut cancelled = false;

        let items: Vec<(EditionId, AssetKind)> = batch
            .editions()
            .iter()
            .flat_map(|edition| {
                let id = edition.id();
                AssetKind::ALL.map(move |kind| (id, kind))
            })
            .collect();
        let pool = BoundedPool::new(self.options.concurrency);
        let uploads = pool.run_all(items, move |(id, kind)| async move {
            let outcome = self.cancel.guard(self.upload_asset(id, kind)).await;
            (id, kind, outcome)
        });
        pin_mut!(uploads);

        while let Some((id, kind, outcome)) = uploads.next().await {
            match outcome {
                None => cancelled = true,
                Some(outcome) => record_outcome(&mut ledger, &mut failures, id, kind, outcome),
            }
        }

        failures.sort_by_key(|failure| (failure.id, failure.kind));
        if cancelled {
            warn!(
                target = "pressrun::build::publish",
                published = ledger.published(),
                failures = failures.len(),
                "Publication cancelled"
            );
            return Err(PublishError::Cancelled { failures });
        }

        info!(
            target = "pressrun::build::publish",
            published = ledger.published(),
            editions = ledger.capacity(),
            failures = failures.len(),
            concurrency = pool.limit(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Publication finished"
        );
        Ok(PublishReport { ledger, failures })
    }

    async fn upload_asset(
        &self,
        id: EditionId,
        kind: AssetKind,
    ) -> Result<ContentId, PublishFailureCause> {
        let path = self.layout.path_for(id, kind);
        let payload = fs::read(&path)
            .await
            .map_err(|source| PublishFailureCause::Read {
                path: path.clone(),
                source,
            })?;

        let request = UploadRequest {
            file_name: BuildLayout::file_name(id, kind),
            content_type: mime_guess::from_path(&path)
                .first_or_octet_stream()
                .to_string(),
            payload: Bytes::from(payload),
        };

        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.options.timeout, self.store.upload(request))
            .await
        {
            Ok(Ok(content_id)) => Ok(content_id),
            Ok(Err(err)) => Err(PublishFailureCause::Upload(err)),
            Err(_elapsed) => Err(PublishFailureCause::Timeout(self.options.timeout)),
        };

        histogram!(METRIC_UPLOAD_MS, "kind" => kind.as_str())
            .record(started.elapsed().as_secs_f64() * 1000.0);
        counter!(METRIC_UPLOAD_TOTAL, "kind" => kind.as_str()).increment(1);
        if outcome.is_err() {
            counter!(METRIC_UPLOAD_FAILED_TOTAL, "kind" => kind.as_str()).increment(1);
        }
        outcome
    }
}

/// Fold one upload outcome into the ledger. The ledger refuses to overwrite
/// an identifier, which surfaces as an invariant failure of that item.
fn record_outcome(
    ledger: &mut PublicationLedger,
    failures: &mut Vec<PublishFailure>,
    id: EditionId,
    kind: AssetKind,
    outcome: Result<ContentId, PublishFailureCause>,
) {
    match outcome {
        Ok(content_id) => {
            debug!(
                target = "pressrun::build::publish",
                edition = %id,
                kind = kind.as_str(),
                content_id = %content_id,
                "Upload recorded"
            );
            if let Err(err) = ledger.record(id, kind, content_id) {
                error!(
                    target = "pressrun::build::publish",
                    edition = %id,
                    kind = kind.as_str(),
                    error = %err,
                    "Refusing to overwrite a recorded content id"
                );
                failures.push(PublishFailure {
                    id,
                    kind,
                    cause: err.into(),
                });
            }
        }
        Err(cause) => {
            warn!(
                target = "pressrun::build::publish",
                edition = %id,
                kind = kind.as_str(),
                class = cause.class().as_str(),
                error = %cause,
                "Upload failed"
            );
            failures.push(PublishFailure { id, kind, cause });
        }
    }
}
