use std::path::Path;

use pressrun_api_types::PublicationManifest;
use tracing::info;

use crate::application::build::layout::write_atomically;

use super::error::InfraError;

/// Persist the manifest as pretty-printed JSON, replacing any previous one.
pub async fn write_manifest(path: &Path, manifest: &PublicationManifest) -> Result<(), InfraError> {
    let mut json = serde_json::to_vec_pretty(manifest)
        .map_err(|err| InfraError::configuration(format!("failed to encode manifest: {err}")))?;
    json.push(b'\n');

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    write_atomically(path, &json).await?;

    info!(
        target = "pressrun::infra::manifest",
        path = %path.display(),
        editions = manifest.editions.len(),
        run_id = %manifest.run_id,
        "Publication manifest written"
    );
    Ok(())
}
