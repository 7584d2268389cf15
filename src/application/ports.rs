//! Collaborators the build sequence drives but does not implement.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::domain::edition::ContentId;

use super::error::ErrorClass;

/// Raster dimensions requested from the render engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const fn square(side: u32) -> Self {
        Self {
            width: side,
            height: side,
        }
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render engine unavailable: {0}")]
    Unavailable(std::io::Error),
    #[error("render engine failed (exit {exit_code:?}): {stderr}")]
    Engine {
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("render engine produced no usable image: {0}")]
    InvalidOutput(String),
    #[error("render i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    pub fn class(&self) -> ErrorClass {
        match self {
            RenderError::Unavailable(_) => ErrorClass::Configuration,
            RenderError::Engine { .. } | RenderError::InvalidOutput(_) | RenderError::Io(_) => {
                ErrorClass::Transient
            }
        }
    }
}

/// Turns a renderable document into a raster image.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    async fn render(&self, document: &[u8], viewport: Viewport) -> Result<Bytes, RenderError>;
}

/// A named payload bound for the content-addressed storage service.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_name: String,
    pub content_type: String,
    pub payload: Bytes,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("storage service is not configured: missing {0}")]
    NotConfigured(&'static str),
    #[error("storage service rejected upload (status {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("storage transport error: {0}")]
    Transport(String),
    #[error("storage response could not be understood: {0}")]
    InvalidResponse(String),
}

impl UploadError {
    pub fn class(&self) -> ErrorClass {
        match self {
            UploadError::NotConfigured(_) => ErrorClass::Configuration,
            UploadError::Rejected { .. }
            | UploadError::Transport(_)
            | UploadError::InvalidResponse(_) => ErrorClass::Transient,
        }
    }
}

/// Content-addressed storage: uploads bytes into the configured destination
/// group and returns the identifier of exactly those bytes.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Configuration keys that must be set before any upload may start.
    fn missing_configuration(&self) -> Vec<&'static str> {
        Vec::new()
    }

    async fn upload(&self, request: UploadRequest) -> Result<ContentId, UploadError>;
}
