#![allow(dead_code)]

use std::{
    fs,
    num::{NonZeroU32, NonZeroUsize},
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use pressrun::{
    application::{
        artifact::{ArtifactGenerator, ProjectBundle},
        build::{
            BatchOrchestrator, BuildLayout, BuildSequence, CaptureOptions, PublicationOrchestrator,
            PublishOptions,
        },
        ports::{ContentStore, RenderEngine, RenderError, UploadError, UploadRequest, Viewport},
    },
    domain::edition::ContentId,
};
use tempfile::TempDir;

/// A valid 1x1 RGBA PNG.
pub const ONE_PIXEL_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
    0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE,
    0x42, 0x60, 0x82,
];

pub fn write_bundle(dir: &Path) {
    fs::create_dir_all(dir).expect("bundle dir");
    fs::write(
        dir.join("project-data.json"),
        r#"{"name":"Test Project","artist":"Test Artist"}"#,
    )
    .expect("project data");
    fs::write(dir.join("style.css"), "body { margin: 0; }").expect("stylesheet");
    fs::write(
        dir.join("hash-seeded-random.js"),
        "class HashSeededRandom { constructor(hash) { this.hash = hash; } }",
    )
    .expect("prng");
    fs::write(dir.join("main.js"), "new HashSeededRandom(TOKEN_DATA.tokenHash);").expect("main");
}

/// Tracks how many calls overlap.
#[derive(Debug, Default)]
pub struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl Gauge {
    fn enter(&self) -> GaugeGuard<'_> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        GaugeGuard(self)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

struct GaugeGuard<'a>(&'a Gauge);

impl Drop for GaugeGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Render engine that answers every document with a 1x1 PNG.
#[derive(Debug, Default)]
pub struct FakeRenderer {
    pub gauge: Gauge,
    delay: Duration,
    fail_edition: Option<u32>,
    hang: bool,
}

impl FakeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_on(mut self, edition: u32) -> Self {
        self.fail_edition = Some(edition);
        self
    }

    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }
}

#[async_trait]
impl RenderEngine for FakeRenderer {
    async fn render(&self, document: &[u8], _viewport: Viewport) -> Result<Bytes, RenderError> {
        let _guard = self.gauge.enter();
        if self.hang {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(self.delay).await;

        if let Some(edition) = self.fail_edition {
            let marker = format!("\"tokenID\":{edition},");
            if String::from_utf8_lossy(document).contains(&marker) {
                return Err(RenderError::Engine {
                    exit_code: Some(1),
                    stderr: format!("cannot render edition {edition}"),
                });
            }
        }
        Ok(Bytes::from_static(ONE_PIXEL_PNG))
    }
}

/// Content store that answers `content-id-<payload length>`.
#[derive(Debug, Default)]
pub struct FakeStore {
    pub gauge: Gauge,
    delay: Duration,
    fail_file: Option<String>,
    missing: Vec<&'static str>,
    uploaded: Mutex<Vec<String>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_on(mut self, file_name: &str) -> Self {
        self.fail_file = Some(file_name.to_string());
        self
    }

    pub fn missing(mut self, keys: Vec<&'static str>) -> Self {
        self.missing = keys;
        self
    }

    pub fn uploaded(&self) -> Vec<String> {
        let mut names = self.uploaded.lock().expect("uploaded lock").clone();
        names.sort();
        names
    }
}

#[async_trait]
impl ContentStore for FakeStore {
    fn missing_configuration(&self) -> Vec<&'static str> {
        self.missing.clone()
    }

    async fn upload(&self, request: UploadRequest) -> Result<ContentId, UploadError> {
        let _guard = self.gauge.enter();
        tokio::time::sleep(self.delay).await;

        if self.fail_file.as_deref() == Some(request.file_name.as_str()) {
            return Err(UploadError::Rejected {
                status: 503,
                body: "gateway unavailable".to_string(),
            });
        }

        self.uploaded
            .lock()
            .expect("uploaded lock")
            .push(request.file_name.clone());
        ContentId::new(format!("content-id-{}", request.payload.len()))
            .map_err(|err| UploadError::InvalidResponse(err.to_string()))
    }
}

pub fn cap(value: usize) -> NonZeroUsize {
    NonZeroUsize::new(value).expect("non-zero cap")
}

pub fn editions(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value).expect("non-zero edition count")
}

/// A temporary build-steps tree with a loaded bundle.
pub struct Harness {
    pub dir: TempDir,
    pub layout: BuildLayout,
    pub generator: ArtifactGenerator,
    pub capture: CaptureOptions,
    pub publish: PublishOptions,
}

impl Harness {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let bundle_dir = dir.path().join("01-project-bundle");
        write_bundle(&bundle_dir);

        let generator =
            ArtifactGenerator::new(ProjectBundle::load(&bundle_dir).expect("bundle loads"));
        let layout = BuildLayout::new(
            dir.path().join("02-animation-files"),
            dir.path().join("03-thumbnail-images"),
        );

        Self {
            dir,
            layout,
            generator,
            capture: CaptureOptions {
                concurrency: cap(2),
                timeout: Duration::from_secs(5),
                viewport: Viewport::square(1),
            },
            publish: PublishOptions {
                concurrency: cap(4),
                timeout: Duration::from_secs(5),
            },
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.path().join("04-publications.json")
    }

    pub fn batch(&self, renderer: Arc<FakeRenderer>) -> BatchOrchestrator {
        BatchOrchestrator::new(
            self.generator.clone(),
            renderer,
            self.layout.clone(),
            self.capture,
        )
    }

    pub fn publisher(&self, store: Arc<FakeStore>) -> PublicationOrchestrator {
        PublicationOrchestrator::new(store, self.layout.clone(), self.publish)
    }

    pub fn sequence(
        &self,
        count: u32,
        renderer: Arc<FakeRenderer>,
        store: Arc<FakeStore>,
    ) -> BuildSequence {
        BuildSequence::new(
            editions(count),
            self.batch(renderer),
            self.publisher(store),
        )
    }
}
