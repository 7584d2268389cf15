//! Self-contained edition documents built from the static project bundle.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use askama::Template;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::{
    edition::EditionId,
    seed::{EditionHash, Seed, derive_hash},
};

use super::error::ErrorClass;

pub const PROJECT_DATA_FILE: &str = "project-data.json";
pub const STYLESHEET_FILE: &str = "style.css";
pub const HASH_SEEDED_RANDOM_FILE: &str = "hash-seeded-random.js";
pub const PROJECT_BUNDLE_FILE: &str = "main.js";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("bundle resource `{resource}` could not be read from {path}: {source}")]
    MissingBundleResource {
        resource: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("bundle resource `{resource}` is malformed: {message}")]
    MalformedBundleResource {
        resource: &'static str,
        message: String,
    },
    #[error("failed to encode token data: {0}")]
    TokenData(#[from] serde_json::Error),
    #[error("failed to render artifact document: {0}")]
    Template(#[from] askama::Error),
}

impl ArtifactError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ArtifactError::MissingBundleResource { .. }
            | ArtifactError::MalformedBundleResource { .. } => ErrorClass::Configuration,
            ArtifactError::TokenData(_) | ArtifactError::Template(_) => ErrorClass::Invariant,
        }
    }
}

/// Identity fields read from `project-data.json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectMetadata {
    pub name: String,
    pub artist: String,
}

/// Static inputs shared by every edition of a run.
#[derive(Debug, Clone)]
pub struct ProjectBundle {
    metadata: ProjectMetadata,
    stylesheet: String,
    hash_seeded_random: String,
    payload: String,
}

impl ProjectBundle {
    pub fn new(
        metadata: ProjectMetadata,
        stylesheet: impl Into<String>,
        hash_seeded_random: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            metadata,
            stylesheet: stylesheet.into(),
            hash_seeded_random: hash_seeded_random.into(),
            payload: payload.into(),
        }
    }

    /// Read every bundle resource from `dir`. Any missing file fails the load.
    pub fn load(dir: &Path) -> Result<Self, ArtifactError> {
        let raw_metadata = read_resource(dir, PROJECT_DATA_FILE)?;
        let metadata: ProjectMetadata = serde_json::from_str(&raw_metadata).map_err(|err| {
            ArtifactError::MalformedBundleResource {
                resource: PROJECT_DATA_FILE,
                message: err.to_string(),
            }
        })?;
        let stylesheet = read_resource(dir, STYLESHEET_FILE)?;
        let hash_seeded_random = read_resource(dir, HASH_SEEDED_RANDOM_FILE)?;
        let payload = read_resource(dir, PROJECT_BUNDLE_FILE)?;

        debug!(
            target = "pressrun::artifact",
            bundle_dir = %dir.display(),
            project = %metadata.name,
            "Loaded project bundle"
        );

        Ok(Self {
            metadata,
            stylesheet,
            hash_seeded_random,
            payload,
        })
    }

    pub fn metadata(&self) -> &ProjectMetadata {
        &self.metadata
    }
}

fn read_resource(dir: &Path, resource: &'static str) -> Result<String, ArtifactError> {
    let path = dir.join(resource);
    fs::read_to_string(&path).map_err(|source| ArtifactError::MissingBundleResource {
        resource,
        path,
        source,
    })
}

#[derive(Serialize)]
struct Placeholder {
    placeholder: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenData<'a> {
    token_hash: &'a str,
    #[serde(rename = "tokenID")]
    token_id: Option<u32>,
    project_name: &'a str,
    artist_name: &'a str,
    properties: Placeholder,
    to_data: Placeholder,
}

#[derive(Template)]
#[template(
    ext = "html",
    source = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{{ title }}</title>
<style>{{ stylesheet|safe }}</style>
</head>
<body>
<script id="token-data">const TOKEN_DATA = {{ token_data|safe }};</script>
<script id="hash-seeded-random">{{ hash_seeded_random|safe }}</script>
<script id="project-bundle">{{ payload|safe }}</script>
</body>
</html>
"#
)]
struct ArtifactDocument<'a> {
    title: &'a str,
    stylesheet: &'a str,
    token_data: &'a str,
    hash_seeded_random: &'a str,
    payload: &'a str,
}

/// Builds edition documents. Cheap to clone; the bundle is shared.
#[derive(Debug, Clone)]
pub struct ArtifactGenerator {
    bundle: Arc<ProjectBundle>,
}

impl ArtifactGenerator {
    pub fn new(bundle: ProjectBundle) -> Self {
        Self {
            bundle: Arc::new(bundle),
        }
    }

    /// The persisted document of edition `id`.
    pub fn build(&self, hash: &EditionHash, id: EditionId) -> Result<Vec<u8>, ArtifactError> {
        self.document(hash, Some(id)).map(String::into_bytes)
    }

    /// A live preview for an arbitrary seed, not tied to any edition.
    pub fn preview(&self, seed: &Seed) -> Result<String, ArtifactError> {
        self.document(&derive_hash(seed), None)
    }

    fn document(&self, hash: &EditionHash, id: Option<EditionId>) -> Result<String, ArtifactError> {
        let metadata = &self.bundle.metadata;
        let token_data = TokenData {
            token_hash: hash.as_str(),
            token_id: id.map(EditionId::get),
            project_name: &metadata.name,
            artist_name: &metadata.artist,
            properties: Placeholder {
                placeholder: "property placeholder",
            },
            to_data: Placeholder {
                placeholder: "toData placeholder",
            },
        };
        // `</` inside the literal would terminate the surrounding script element.
        let token_data = serde_json::to_string(&token_data)?.replace("</", "<\\/");

        let document = ArtifactDocument {
            title: &metadata.name,
            stylesheet: &self.bundle.stylesheet,
            token_data: &token_data,
            hash_seeded_random: &self.bundle.hash_seeded_random,
            payload: &self.bundle.payload,
        };
        Ok(document.render()?)
    }
}
