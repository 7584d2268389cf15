//! Content-addressed storage behind an HTTP upload gateway.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::{
    Client, Url,
    multipart::{Form, Part},
};
use serde::Deserialize;
use tracing::debug;

use crate::{
    application::ports::{ContentStore, UploadError, UploadRequest},
    config::PublishSettings,
    domain::edition::ContentId,
};

use super::error::InfraError;

const FILES_PATH: &str = "v3/files";
const NETWORK: &str = "public";

#[derive(Debug, Deserialize)]
struct UploadResponse {
    data: UploadedFile,
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    cid: String,
}

/// Posts each file as multipart form data to `<gateway>/v3/files` and reads
/// the content identifier from `data.cid`.
#[derive(Clone)]
pub struct GatewayContentStore {
    client: Client,
    endpoint: Option<Url>,
    token: Option<String>,
    group_id: Option<String>,
}

impl GatewayContentStore {
    pub fn new(settings: &PublishSettings) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(concat!("pressrun/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| InfraError::http(err.to_string()))?;
        let endpoint = settings
            .gateway_url
            .as_ref()
            .map(files_endpoint)
            .transpose()?;

        Ok(Self {
            client,
            endpoint,
            token: settings.token.clone(),
            group_id: settings.group_id.clone(),
        })
    }

    pub fn endpoint(&self) -> Option<&Url> {
        self.endpoint.as_ref()
    }
}

fn files_endpoint(gateway: &Url) -> Result<Url, InfraError> {
    let mut base = gateway.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(FILES_PATH)
        .map_err(|err| InfraError::configuration(format!("invalid gateway url: {err}")))
}

#[async_trait]
impl ContentStore for GatewayContentStore {
    fn missing_configuration(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.endpoint.is_none() {
            missing.push("publish.gateway_url");
        }
        if self.token.is_none() {
            missing.push("publish.token");
        }
        if self.group_id.is_none() {
            missing.push("publish.group_id");
        }
        missing
    }

    async fn upload(&self, request: UploadRequest) -> Result<ContentId, UploadError> {
        let endpoint = self
            .endpoint
            .as_ref()
            .ok_or(UploadError::NotConfigured("publish.gateway_url"))?;
        let token = self
            .token
            .as_deref()
            .ok_or(UploadError::NotConfigured("publish.token"))?;
        let group_id = self
            .group_id
            .as_deref()
            .ok_or(UploadError::NotConfigured("publish.group_id"))?;

        let started_at = Instant::now();
        let bytes = request.payload.len();
        let part = Part::bytes(request.payload.to_vec())
            .file_name(request.file_name.clone())
            .mime_str(&request.content_type)
            .map_err(|err| UploadError::Transport(err.to_string()))?;
        let form = Form::new()
            .text("network", NETWORK)
            .text("name", request.file_name.clone())
            .text("group_id", group_id.to_string())
            .part("file", part);

        let response = self
            .client
            .post(endpoint.clone())
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .map_err(|err| UploadError::Transport(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| UploadError::Transport(err.to_string()))?;
        if !status.is_success() {
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: UploadResponse = serde_json::from_str(&body)
            .map_err(|err| UploadError::InvalidResponse(format!("{err}: {body}")))?;
        let content_id = ContentId::new(parsed.data.cid)
            .map_err(|err| UploadError::InvalidResponse(err.to_string()))?;

        debug!(
            target = "pressrun::infra::gateway",
            file = %request.file_name,
            bytes,
            content_id = %content_id,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Upload accepted"
        );
        Ok(content_id)
    }
}
