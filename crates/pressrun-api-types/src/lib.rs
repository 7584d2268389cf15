//! Wire types shared by the pressrun build trigger and the publication manifest.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Content identifiers recorded for one fully published edition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedEdition {
    pub id: u32,
    pub seed: String,
    pub hash: String,
    pub artifact_cid: String,
    pub thumbnail_cid: String,
}

/// Edition ID to content identifier mapping written at the end of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationManifest {
    pub run_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
    pub editions: Vec<PublishedEdition>,
}

/// Body returned by `POST /build-sequence`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSequenceResponse {
    pub result: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<PublicationManifest>,
}

impl BuildSequenceResponse {
    pub fn complete(manifest: PublicationManifest) -> Self {
        Self {
            result: "Build sequence complete!".to_string(),
            errors: Vec::new(),
            manifest: Some(manifest),
        }
    }

    pub fn failed(result: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            result: result.into(),
            errors,
            manifest: None,
        }
    }
}
