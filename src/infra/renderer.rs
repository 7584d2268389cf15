//! Headless browser screenshots as the render engine.

use std::{
    io::{self, ErrorKind},
    path::PathBuf,
    process::Stdio,
    time::Instant,
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{fs, process::Command};
use tracing::{debug, warn};
use url::Url;

use crate::{
    application::ports::{RenderEngine, RenderError, Viewport},
    config::CaptureSettings,
};

const DOCUMENT_FILE: &str = "edition.html";
const SCREENSHOT_FILE: &str = "screenshot.png";

/// Spawns a Chromium-compatible binary in headless screenshot mode, one
/// process per render. The process is killed if the render future is dropped.
#[derive(Debug, Clone)]
pub struct BrowserRenderer {
    browser_path: PathBuf,
    sandbox: bool,
}

impl BrowserRenderer {
    pub fn new(browser_path: impl Into<PathBuf>, sandbox: bool) -> Self {
        Self {
            browser_path: browser_path.into(),
            sandbox,
        }
    }

    pub fn from_settings(settings: &CaptureSettings) -> Self {
        Self::new(settings.browser_path.clone(), settings.sandbox)
    }
}

#[async_trait]
impl RenderEngine for BrowserRenderer {
    async fn render(&self, document: &[u8], viewport: Viewport) -> Result<Bytes, RenderError> {
        let started_at = Instant::now();
        let workdir = tempfile::Builder::new()
            .prefix("pressrun-capture-")
            .tempdir()?;
        let document_path = workdir.path().join(DOCUMENT_FILE);
        let screenshot_path = workdir.path().join(SCREENSHOT_FILE);
        fs::write(&document_path, document).await?;

        let document_url = Url::from_file_path(&document_path).map_err(|()| {
            RenderError::Io(io::Error::new(
                ErrorKind::InvalidInput,
                format!("`{}` is not an absolute path", document_path.display()),
            ))
        })?;

        let mut command = Command::new(&self.browser_path);
        command
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--hide-scrollbars");
        if !self.sandbox {
            command.arg("--no-sandbox");
        }
        command
            .arg(format!("--screenshot={}", screenshot_path.display()))
            .arg(format!("--window-size={},{}", viewport.width, viewport.height))
            .arg(document_url.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = command.output().await.map_err(|err| {
            warn!(
                target = "pressrun::infra::renderer",
                browser = %self.browser_path.display(),
                error = %err,
                "Failed to spawn browser"
            );
            if err.kind() == ErrorKind::NotFound {
                RenderError::Unavailable(err)
            } else {
                RenderError::Io(err)
            }
        })?;

        if !output.status.success() {
            let exit_code = output.status.code();
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            warn!(
                target = "pressrun::infra::renderer",
                exit_code = exit_code.map(i64::from).unwrap_or(-1),
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                stderr = %stderr,
                "Browser screenshot failed"
            );
            return Err(RenderError::Engine { exit_code, stderr });
        }

        let image = match fs::read(&screenshot_path).await {
            Ok(image) => image,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(RenderError::InvalidOutput(
                    "browser exited without writing a screenshot".to_string(),
                ));
            }
            Err(err) => return Err(RenderError::Io(err)),
        };

        debug!(
            target = "pressrun::infra::renderer",
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            bytes = image.len(),
            "Browser screenshot captured"
        );
        Ok(Bytes::from(image))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::{fs, os::unix::fs::PermissionsExt, path::Path};
    use tempfile::TempDir;

    const ONE_PIXEL_PNG: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
        0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
        0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
        0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
    ];

    fn make_executable(path: &Path) {
        let mut perms = fs::metadata(path).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).expect("set perms");
    }

    fn write_script(dir: &Path, body: &str) -> PathBuf {
        let script_path = dir.join("fake-chromium");
        fs::write(&script_path, body).expect("write script");
        make_executable(&script_path);
        script_path
    }

    #[tokio::test]
    async fn captures_screenshot_with_valid_browser() {
        let dir = TempDir::new().expect("temp dir");
        let fixture = dir.path().join("fixture.png");
        fs::write(&fixture, ONE_PIXEL_PNG).expect("fixture");
        let args_path = dir.path().join("args.log");
        let script = format!(
            r#"#!/bin/sh
set -eu
echo "$@" > "{args_file}"
out=""
for arg in "$@"; do
  case "$arg" in
    --screenshot=*) out="${{arg#--screenshot=}}" ;;
  esac
done
if [ -z "$out" ]; then
  echo "missing --screenshot" >&2
  exit 2
fi
cp "{fixture}" "$out"
"#,
            args_file = args_path.display(),
            fixture = fixture.display()
        );
        let script_path = write_script(dir.path(), &script);

        let renderer = BrowserRenderer::new(script_path, false);
        let image = renderer
            .render(b"<html></html>", Viewport::square(1080))
            .await
            .expect("screenshot captured");
        assert_eq!(image.as_ref(), ONE_PIXEL_PNG);

        let args = fs::read_to_string(&args_path).expect("read args");
        assert!(args.contains("--headless"), "missing --headless: {args}");
        assert!(args.contains("--no-sandbox"), "missing --no-sandbox: {args}");
        assert!(
            args.contains("--window-size=1080,1080"),
            "missing window size: {args}"
        );
        assert!(args.contains("file://"), "missing document url: {args}");
    }

    #[tokio::test]
    async fn surfaces_browser_errors() {
        let dir = TempDir::new().expect("temp dir");
        let script_path = write_script(
            dir.path(),
            r#"#!/bin/sh
echo "boom" >&2
exit 42
"#,
        );

        let err = BrowserRenderer::new(script_path, true)
            .render(b"<html></html>", Viewport::square(8))
            .await
            .expect_err("expected browser failure");
        match err {
            RenderError::Engine { exit_code, stderr } => {
                assert_eq!(exit_code, Some(42));
                assert!(stderr.contains("boom"), "stderr did not propagate: {stderr}");
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[tokio::test]
    async fn silent_exit_without_screenshot_is_invalid_output() {
        let dir = TempDir::new().expect("temp dir");
        let script_path = write_script(dir.path(), "#!/bin/sh\nexit 0\n");

        let err = BrowserRenderer::new(script_path, true)
            .render(b"<html></html>", Viewport::square(8))
            .await
            .expect_err("no screenshot written");
        assert!(matches!(err, RenderError::InvalidOutput(_)));
    }

    #[tokio::test]
    async fn missing_browser_is_a_configuration_error() {
        let dir = TempDir::new().expect("temp dir");
        let err = BrowserRenderer::new(dir.path().join("does-not-exist"), true)
            .render(b"<html></html>", Viewport::square(8))
            .await
            .expect_err("browser is missing");
        assert!(matches!(err, RenderError::Unavailable(_)));
        assert_eq!(
            err.class(),
            crate::application::error::ErrorClass::Configuration
        );
    }
}
