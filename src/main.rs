use std::{process, sync::Arc};

use presswork::{
    application::{
        error::AppError,
        render::{BrowserSessionManager, RenderCoordinator, RenderLimits, TempResourceManager},
    },
    config,
    infra::{
        chrome::{ChromeEngine, ChromeEngineConfig},
        error::InfraError,
        http::{self, AppState},
        telemetry,
    },
};
use tokio::sync::Notify;
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
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let coordinator = build_coordinator(&settings.render)?;
    let state = AppState::new(Arc::new(coordinator), settings.render.max_pages.get());

    let body_limit = usize::try_from(settings.server.body_limit_bytes.get())
        .map_err(|_| AppError::validation("server.body_limit_bytes exceeds usize"))?;
    let router = http::build_router(state, body_limit);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "presswork::serve",
        addr = %settings.server.addr,
        max_sessions = settings.render.max_sessions.get(),
        max_concurrent_pages = settings.render.max_concurrent_pages.get(),
        "Listening"
    );

    let stop = Arc::new(Notify::new());
    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown({
        let stop = Arc::clone(&stop);
        async move { stop.notified().await }
    });
    let mut serve_task = tokio::spawn(async move { server.await });

    tokio::select! {
        joined = &mut serve_task => return server_outcome(joined),
        () = shutdown_signal() => {}
    }

    info!(
        target = "presswork::serve",
        grace_seconds = settings.server.graceful_shutdown.as_secs(),
        "Shutdown requested; draining in-flight renders"
    );
    stop.notify_one();

    match tokio::time::timeout(settings.server.graceful_shutdown, &mut serve_task).await {
        Ok(joined) => server_outcome(joined),
        Err(_) => {
            warn!(
                target = "presswork::serve",
                "Graceful shutdown deadline passed; aborting remaining connections"
            );
            serve_task.abort();
            Ok(())
        }
    }
}

fn build_coordinator(render: &config::RenderSettings) -> Result<RenderCoordinator, AppError> {
    let engine = ChromeEngine::new(ChromeEngineConfig {
        chrome_path: render.chrome_path.clone(),
        settle: render.settle,
        load_timeout: render.request_timeout,
        idle_timeout: render.request_timeout,
    });

    let artifacts = TempResourceManager::new(render.temp_dir.join("artifacts"))
        .map_err(|err| AppError::from(InfraError::configuration(err.to_string())))?;
    let sessions = BrowserSessionManager::new(Arc::new(engine), render.max_sessions);

    Ok(RenderCoordinator::new(
        sessions,
        artifacts,
        RenderLimits {
            max_concurrent_pages: render.max_concurrent_pages,
            request_timeout: render.request_timeout,
        },
    ))
}

fn server_outcome(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(AppError::unexpected(format!("server error: {err}"))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(
            target = "presswork::serve",
            error = %err,
            "failed to listen for shutdown signal"
        );
        std::future::pending::<()>().await;
    }
}
