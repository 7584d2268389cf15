use std::{process, sync::Arc};

use pressrun::{
    application::{
        artifact::{ArtifactGenerator, ProjectBundle},
        build::{
            BatchOrchestrator, BuildPlan, BuildSequence, CancelSignal, PublicationOrchestrator,
            cancellation,
        },
        error::AppError,
        ports::{ContentStore, RenderEngine},
    },
    config,
    domain::seed::Seed,
    infra::{
        error::InfraError, gateway::GatewayContentStore, http, manifest::write_manifest,
        renderer::BrowserRenderer, telemetry,
    },
};
use tokio::io::AsyncWriteExt;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(class = error.class().as_str(), error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(class = error.class().as_str(), error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Build(config::BuildArgs::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Build(_) => run_build(settings).await,
        config::Command::Preview(args) => run_preview(settings, args).await,
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

fn assemble_sequence(
    settings: &config::Settings,
    cancel: CancelSignal,
) -> Result<(BuildSequence, ArtifactGenerator), AppError> {
    let bundle = ProjectBundle::load(&settings.project.bundle_dir)?;
    let generator = ArtifactGenerator::new(bundle);
    let plan = BuildPlan::from_settings(settings);

    let renderer: Arc<dyn RenderEngine> =
        Arc::new(BrowserRenderer::from_settings(&settings.capture));
    let store: Arc<dyn ContentStore> = Arc::new(GatewayContentStore::new(&settings.publish)?);

    let batch = BatchOrchestrator::new(
        generator.clone(),
        renderer,
        plan.layout.clone(),
        plan.capture,
    )
    .with_cancel_signal(cancel.clone());
    let publisher = PublicationOrchestrator::new(store, plan.layout, plan.publish)
        .with_cancel_signal(cancel);

    Ok((BuildSequence::new(plan.editions, batch, publisher), generator))
}

async fn run_build(settings: config::Settings) -> Result<(), AppError> {
    let (handle, signal) = cancellation();
    let (sequence, _) = assemble_sequence(&settings, signal)?;

    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!(target = "pressrun::build", "Interrupt received; cancelling build");
            handle.cancel();
        }
    });

    let result = sequence.run().await;
    interrupt.abort();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(err) => {
            for failure in err.failures() {
                error!(target = "pressrun::build", failure = %failure, "Build failure");
            }
            return Err(err.into());
        }
    };

    let manifest = outcome.manifest();
    write_manifest(&settings.output.manifest_path, &manifest).await?;
    info!(
        target = "pressrun::build",
        run_id = %outcome.run_id(),
        editions = manifest.editions.len(),
        manifest = %settings.output.manifest_path.display(),
        "Build sequence complete!"
    );
    Ok(())
}

async fn run_preview(
    settings: config::Settings,
    args: config::PreviewArgs,
) -> Result<(), AppError> {
    let generator = ArtifactGenerator::new(ProjectBundle::load(&settings.project.bundle_dir)?);
    let seed = match args.seed.as_deref() {
        Some(raw) => Seed::parse(raw)?,
        None => Seed::default_seed(),
    };
    let document = generator.preview(&seed)?;

    match args.output {
        Some(path) => {
            tokio::fs::write(&path, document.as_bytes())
                .await
                .map_err(InfraError::from)?;
            info!(
                target = "pressrun::preview",
                seed = %seed,
                path = %path.display(),
                "Preview written"
            );
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout
                .write_all(document.as_bytes())
                .await
                .map_err(InfraError::from)?;
            stdout.flush().await.map_err(InfraError::from)?;
        }
    }
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let (handle, signal) = cancellation();
    let (sequence, generator) = assemble_sequence(&settings, signal)?;

    let state = http::HttpState::new(
        Arc::new(sequence),
        generator,
        Some(settings.output.manifest_path.clone()),
    );
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;
    info!(
        target = "pressrun::http",
        addr = %settings.server.addr,
        "App listening"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
            info!(target = "pressrun::http", "Shutdown requested; cancelling running builds");
            handle.cancel();
        })
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}
