//! Generation and capture phases.
//!
//! Generation persists one artifact document per edition, all editions at
//! once. Capture then renders every persisted artifact into a thumbnail with
//! at most `concurrency` renders in flight. Both phases are fail-fast: the
//! first failing edition aborts its phase and in-flight siblings are dropped.

use std::{
    io,
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use futures::future;
use metrics::{counter, histogram};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::{
    application::{
        artifact::{ArtifactError, ArtifactGenerator},
        error::ErrorClass,
        ports::{RenderEngine, RenderError, Viewport},
    },
    config::CaptureSettings,
    domain::{
        edition::{AssetKind, Edition, EditionId, EditionSet, EditionStage},
        error::DomainError,
        seed::Seed,
    },
};

use super::{
    METRIC_RENDER_MS, METRIC_RENDER_TOTAL,
    layout::{BuildLayout, write_atomically},
    pool::{BoundedPool, CancelSignal},
};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("failed to prepare output directories: {0}")]
    Prepare(#[source] io::Error),
    #[error("failed to generate artifact of edition {id}: {source}")]
    Artifact {
        id: EditionId,
        #[source]
        source: ArtifactError,
    },
    #[error("failed to write {kind} of edition {id} to {}: {source}", .path.display())]
    Persist {
        id: EditionId,
        kind: AssetKind,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read artifact of edition {id} from {}: {source}", .path.display())]
    Read {
        id: EditionId,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("edition {id} has no persisted artifact to capture")]
    NotGenerated { id: EditionId },
    #[error("render of edition {id} failed: {source}")]
    Render {
        id: EditionId,
        #[source]
        source: RenderError,
    },
    #[error("render of edition {id} timed out after {timeout:?}")]
    RenderTimeout { id: EditionId, timeout: Duration },
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("batch cancelled")]
    Cancelled,
}

impl BatchError {
    pub fn class(&self) -> ErrorClass {
        match self {
            BatchError::Prepare(_) => ErrorClass::Configuration,
            BatchError::Artifact { source, .. } => source.class(),
            BatchError::Render { source, .. } => source.class(),
            BatchError::Persist { .. } | BatchError::Read { .. } | BatchError::RenderTimeout { .. } => {
                ErrorClass::Transient
            }
            BatchError::NotGenerated { .. } | BatchError::Domain(DomainError::Invariant { .. }) => {
                ErrorClass::Invariant
            }
            BatchError::Domain(_) => ErrorClass::Configuration,
            BatchError::Cancelled => ErrorClass::Cancelled,
        }
    }

    /// The edition the failure belongs to, when it belongs to one.
    pub fn edition(&self) -> Option<EditionId> {
        match self {
            BatchError::Artifact { id, .. }
            | BatchError::Persist { id, .. }
            | BatchError::Read { id, .. }
            | BatchError::NotGenerated { id }
            | BatchError::Render { id, .. }
            | BatchError::RenderTimeout { id, .. } => Some(*id),
            BatchError::Prepare(_) | BatchError::Domain(_) | BatchError::Cancelled => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CaptureOptions {
    pub concurrency: NonZeroUsize,
    pub timeout: Duration,
    pub viewport: Viewport,
}

impl From<&CaptureSettings> for CaptureOptions {
    fn from(settings: &CaptureSettings) -> Self {
        Self {
            concurrency: settings.concurrency,
            timeout: settings.timeout,
            viewport: Viewport {
                width: settings.width.get(),
                height: settings.height.get(),
            },
        }
    }
}

/// Every edition of a run with its artifact persisted.
#[derive(Debug)]
pub struct GeneratedBatch {
    editions: Vec<Edition>,
}

impl GeneratedBatch {
    pub fn editions(&self) -> &[Edition] {
        &self.editions
    }

    pub fn len(&self) -> usize {
        self.editions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.editions.is_empty()
    }
}

/// Every edition of a run with both files persisted. The only input the
/// publication phase accepts.
#[derive(Debug)]
pub struct CapturedBatch {
    editions: Vec<Edition>,
}

impl CapturedBatch {
    pub fn editions(&self) -> &[Edition] {
        &self.editions
    }

    pub fn len(&self) -> usize {
        self.editions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.editions.is_empty()
    }

    pub fn into_editions(self) -> Vec<Edition> {
        self.editions
    }
}

#[derive(Clone)]
pub struct BatchOrchestrator {
    generator: ArtifactGenerator,
    renderer: Arc<dyn RenderEngine>,
    layout: BuildLayout,
    options: CaptureOptions,
    cancel: CancelSignal,
}

impl BatchOrchestrator {
    pub fn new(
        generator: ArtifactGenerator,
        renderer: Arc<dyn RenderEngine>,
        layout: BuildLayout,
        options: CaptureOptions,
    ) -> Self {
        Self {
            generator,
            renderer,
            layout,
            options,
            cancel: CancelSignal::never(),
        }
    }

    pub fn with_cancel_signal(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Generate and capture `count` editions with fresh seeds.
    pub async fn run(&self, count: NonZeroU32) -> Result<CapturedBatch, BatchError> {
        let editions = EditionSet::new(count.get())?;
        let generated = self.generate(editions).await?;
        self.capture(generated).await
    }

    /// Generate and capture one edition per seed, in seed order.
    pub async fn run_with_seeds(&self, seeds: Vec<Seed>) -> Result<CapturedBatch, BatchError> {
        let editions = EditionSet::from_seeds(seeds)?;
        let generated = self.generate(editions).await?;
        self.capture(generated).await
    }

    pub async fn generate(&self, editions: EditionSet) -> Result<GeneratedBatch, BatchError> {
        self.layout.prepare().await.map_err(BatchError::Prepare)?;

        let started = Instant::now();
        let mut editions = editions.into_vec();
        let work = editions
            .iter_mut()
            .map(|edition| self.generate_edition(edition));
        let outcome = self.cancel.guard(future::try_join_all(work)).await;
        match outcome {
            None => return Err(BatchError::Cancelled),
            Some(result) => {
                result?;
            }
        }

        info!(
            target = "pressrun::build::generate",
            editions = editions.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Generated artifacts"
        );
        Ok(GeneratedBatch { editions })
    }

    async fn generate_edition(&self, edition: &mut Edition) -> Result<(), BatchError> {
        let id = edition.id();
        let document = self
            .generator
            .build(edition.hash(), id)
            .map_err(|source| BatchError::Artifact { id, source })?;

        let path = self.layout.artifact_path(id);
        write_atomically(&path, &document)
            .await
            .map_err(|source| BatchError::Persist {
                id,
                kind: AssetKind::Artifact,
                path: path.clone(),
                source,
            })?;
        edition.mark_generated()?;

        debug!(
            target = "pressrun::build::generate",
            edition = %id,
            hash = %edition.hash(),
            path = %path.display(),
            "Artifact persisted"
        );
        Ok(())
    }

    pub async fn capture(&self, batch: GeneratedBatch) -> Result<CapturedBatch, BatchError> {
        let started = Instant::now();
        let pool = BoundedPool::new(self.options.concurrency);

        let mut editions = pool
            .try_run(batch.editions, move |mut edition| async move {
                self.capture_edition(&mut edition).await?;
                Ok::<_, BatchError>(edition)
            })
            .await
            .inspect_err(|err| {
                warn!(
                    target = "pressrun::build::capture",
                    edition = ?err.edition(),
                    class = err.class().as_str(),
                    error = %err,
                    "Capture phase aborted"
                );
            })?;
        editions.sort_by_key(Edition::id);

        info!(
            target = "pressrun::build::capture",
            editions = editions.len(),
            concurrency = pool.limit(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Captured thumbnails"
        );
        Ok(CapturedBatch { editions })
    }

    /// Render one generated edition into its thumbnail file.
    pub async fn capture_edition(&self, edition: &mut Edition) -> Result<(), BatchError> {
        let id = edition.id();
        if edition.stage() != EditionStage::Generated {
            return Err(BatchError::NotGenerated { id });
        }

        let artifact_path = self.layout.artifact_path(id);
        let document = match fs::read(&artifact_path).await {
            Ok(document) => document,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(BatchError::NotGenerated { id });
            }
            Err(source) => {
                return Err(BatchError::Read {
                    id,
                    path: artifact_path,
                    source,
                });
            }
        };

        let timeout = self.options.timeout;
        let started = Instant::now();
        let render = tokio::time::timeout(
            timeout,
            self.renderer.render(&document, self.options.viewport),
        );
        let outcome = match self.cancel.guard(render).await {
            None => return Err(BatchError::Cancelled),
            Some(Err(_elapsed)) => Err(BatchError::RenderTimeout { id, timeout }),
            Some(Ok(Err(source))) => Err(BatchError::Render { id, source }),
            Some(Ok(Ok(image))) => Ok(image),
        };
        histogram!(METRIC_RENDER_MS).record(started.elapsed().as_secs_f64() * 1000.0);
        counter!(
            METRIC_RENDER_TOTAL,
            "result" => if outcome.is_ok() { "ok" } else { "error" }
        )
        .increment(1);
        let image = outcome?;

        let size = imagesize::blob_size(&image).map_err(|err| BatchError::Render {
            id,
            source: RenderError::InvalidOutput(err.to_string()),
        })?;
        let viewport = self.options.viewport;
        if size.width != viewport.width as usize || size.height != viewport.height as usize {
            debug!(
                target = "pressrun::build::capture",
                edition = %id,
                width = size.width,
                height = size.height,
                expected_width = viewport.width,
                expected_height = viewport.height,
                "Thumbnail size differs from viewport"
            );
        }

        let thumbnail_path = self.layout.thumbnail_path(id);
        write_atomically(&thumbnail_path, &image)
            .await
            .map_err(|source| BatchError::Persist {
                id,
                kind: AssetKind::Thumbnail,
                path: thumbnail_path.clone(),
                source,
            })?;
        edition.mark_captured()?;

        debug!(
            target = "pressrun::build::capture",
            edition = %id,
            bytes = image.len(),
            path = %thumbnail_path.display(),
            "Thumbnail persisted"
        );
        Ok(())
    }
}
