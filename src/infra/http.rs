//! HTTP trigger for build sequences and the seed preview endpoint.

use std::{path::PathBuf, sync::Arc, time::Instant};

use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State},
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use pressrun_api_types::BuildSequenceResponse;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    application::{artifact::ArtifactGenerator, build::BuildSequence, error::AppError},
    domain::seed::Seed,
};

use super::manifest::write_manifest;

const RESULT_ALREADY_RUNNING: &str = "Build sequence already running.";
const RESULT_ERROR: &str = "Build sequence error.";

#[derive(Clone)]
pub struct HttpState {
    sequence: Arc<BuildSequence>,
    generator: ArtifactGenerator,
    manifest_path: Option<PathBuf>,
    build_lock: Arc<Mutex<()>>,
}

impl HttpState {
    pub fn new(
        sequence: Arc<BuildSequence>,
        generator: ArtifactGenerator,
        manifest_path: Option<PathBuf>,
    ) -> Self {
        Self {
            sequence,
            generator,
            manifest_path,
            build_lock: Arc::new(Mutex::new(())),
        }
    }
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/iframe", get(iframe))
        .route("/build-sequence", post(build_sequence))
        .layer(middleware::from_fn(log_responses))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct IframeQuery {
    #[serde(rename = "seedString")]
    seed_string: Option<String>,
}

async fn iframe(
    State(state): State<HttpState>,
    Query(query): Query<IframeQuery>,
) -> Result<Html<String>, AppError> {
    let seed = match query.seed_string.as_deref().map(Seed::parse) {
        Some(Ok(seed)) => seed,
        _ => Seed::default_seed(),
    };
    let document = state.generator.preview(&seed)?;
    Ok(Html(document))
}

async fn build_sequence(State(state): State<HttpState>) -> Response {
    let Ok(guard) = state.build_lock.clone().try_lock_owned() else {
        warn!(
            target = "pressrun::http::build",
            "Build sequence rejected; another run is in progress"
        );
        return (
            StatusCode::CONFLICT,
            Json(BuildSequenceResponse::failed(
                RESULT_ALREADY_RUNNING,
                Vec::new(),
            )),
        )
            .into_response();
    };

    info!(target = "pressrun::http::build", "Build sequence initiated");

    // Runs detached so a dropped connection does not abort a run mid-way.
    let HttpState {
        sequence,
        manifest_path,
        ..
    } = state;
    let run = tokio::spawn(async move {
        let _guard = guard;
        let outcome = sequence.run().await?;
        let manifest = outcome.manifest();
        if let Some(path) = manifest_path.as_deref() {
            write_manifest(path, &manifest).await?;
        }
        Ok::<_, AppError>(manifest)
    });

    let outcome = match run.await {
        Ok(outcome) => outcome,
        Err(err) => Err(AppError::unexpected(format!("build task failed: {err}"))),
    };

    match outcome {
        Ok(manifest) => {
            info!(
                target = "pressrun::http::build",
                run_id = %manifest.run_id,
                editions = manifest.editions.len(),
                "Build sequence complete"
            );
            Json(BuildSequenceResponse::complete(manifest)).into_response()
        }
        Err(err) => {
            let errors = match &err {
                AppError::Build(build) => build.failures(),
                other => vec![other.to_string()],
            };
            error!(
                target = "pressrun::http::build",
                class = err.class().as_str(),
                error = %err,
                "Error during build sequence"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(BuildSequenceResponse::failed(RESULT_ERROR, errors)),
            )
                .into_response()
        }
    }
}

async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = Uuid::new_v4();
    let start = Instant::now();

    let response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = start.elapsed().as_millis() as u64;

    if status.is_server_error() {
        error!(
            target = "pressrun::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            elapsed_ms,
            request_id = %request_id,
            "Request failed"
        );
    } else if status.is_client_error() {
        warn!(
            target = "pressrun::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            elapsed_ms,
            request_id = %request_id,
            "Request rejected"
        );
    } else {
        info!(
            target = "pressrun::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            elapsed_ms,
            request_id = %request_id,
            "Request served"
        );
    }

    response
}
