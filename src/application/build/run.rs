use std::{num::NonZeroU32, time::Instant};

use pressrun_api_types::{PublicationManifest, PublishedEdition};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::{
    application::error::ErrorClass,
    config::Settings,
    domain::{edition::Edition, ledger::PublicationLedger},
};

use super::{
    batch::{BatchError, BatchOrchestrator, CaptureOptions},
    layout::BuildLayout,
    publish::{PublicationOrchestrator, PublishError, PublishFailure, PublishOptions},
};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error("{published} of {total} editions fully published; {} upload failure(s)", .failures.len())]
    Incomplete {
        total: u32,
        published: usize,
        failures: Vec<PublishFailure>,
    },
}

impl BuildError {
    pub fn class(&self) -> ErrorClass {
        match self {
            BuildError::Batch(err) => err.class(),
            BuildError::Publish(err) => err.class(),
            BuildError::Incomplete { failures, .. } => {
                let has = |class: ErrorClass| failures.iter().any(|failure| failure.class() == class);
                if has(ErrorClass::Invariant) {
                    ErrorClass::Invariant
                } else if has(ErrorClass::Configuration) {
                    ErrorClass::Configuration
                } else {
                    ErrorClass::Transient
                }
            }
        }
    }

    /// Human-readable failure lines, one per failed work item.
    pub fn failures(&self) -> Vec<String> {
        match self {
            BuildError::Incomplete { failures, .. } if !failures.is_empty() => {
                failures.iter().map(ToString::to_string).collect()
            }
            BuildError::Publish(err) if !err.failures().is_empty() => err
                .failures()
                .iter()
                .map(ToString::to_string)
                .chain(std::iter::once(err.to_string()))
                .collect(),
            other => vec![other.to_string()],
        }
    }
}

/// Everything fixed for a run before it starts.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub editions: NonZeroU32,
    pub layout: BuildLayout,
    pub capture: CaptureOptions,
    pub publish: PublishOptions,
}

impl BuildPlan {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            editions: settings.project.editions,
            layout: BuildLayout::new(
                settings.output.artifacts_dir.clone(),
                settings.output.thumbnails_dir.clone(),
            ),
            capture: CaptureOptions::from(&settings.capture),
            publish: PublishOptions::from(&settings.publish),
        }
    }
}

/// A successful run: every edition published.
#[derive(Debug)]
pub struct BuildOutcome {
    run_id: Uuid,
    finished_at: OffsetDateTime,
    editions: Vec<Edition>,
    ledger: PublicationLedger,
}

impl BuildOutcome {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn editions(&self) -> &[Edition] {
        &self.editions
    }

    pub fn ledger(&self) -> &PublicationLedger {
        &self.ledger
    }

    pub fn manifest(&self) -> PublicationManifest {
        let editions = self
            .editions
            .iter()
            .filter_map(|edition| {
                let publication = self.ledger.publication(edition.id())?;
                Some(PublishedEdition {
                    id: edition.id().get(),
                    seed: edition.seed().to_string(),
                    hash: edition.hash().to_string(),
                    artifact_cid: publication.artifact.into_inner(),
                    thumbnail_cid: publication.thumbnail.into_inner(),
                })
            })
            .collect();

        PublicationManifest {
            run_id: self.run_id.to_string(),
            generated_at: self.finished_at,
            editions,
        }
    }
}

/// Sequences generation, capture and publication for one run.
pub struct BuildSequence {
    editions: NonZeroU32,
    batch: BatchOrchestrator,
    publisher: PublicationOrchestrator,
}

impl BuildSequence {
    pub fn new(
        editions: NonZeroU32,
        batch: BatchOrchestrator,
        publisher: PublicationOrchestrator,
    ) -> Self {
        Self {
            editions,
            batch,
            publisher,
        }
    }

    pub fn editions(&self) -> NonZeroU32 {
        self.editions
    }

    pub async fn run(&self) -> Result<BuildOutcome, BuildError> {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "build_sequence",
            run_id = %run_id,
            editions = self.editions.get()
        );

        async move {
            let started = Instant::now();
            info!(target = "pressrun::build", "Build sequence started");

            let captured = self.batch.run(self.editions).await?;
            let report = self.publisher.publish(&captured).await?;
            let (ledger, failures) = report.into_parts();

            if !failures.is_empty() || !ledger.is_complete() {
                warn!(
                    target = "pressrun::build",
                    published = ledger.published(),
                    missing = ?ledger.missing(),
                    failures = failures.len(),
                    "Build sequence incomplete"
                );
                return Err(BuildError::Incomplete {
                    total: self.editions.get(),
                    published: ledger.published(),
                    failures,
                });
            }

            info!(
                target = "pressrun::build",
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Build sequence complete"
            );
            Ok(BuildOutcome {
                run_id,
                finished_at: OffsetDateTime::now_utc(),
                editions: captured.into_editions(),
                ledger,
            })
        }
        .instrument(span)
        .await
    }
}
