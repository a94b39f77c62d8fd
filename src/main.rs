use std::{future::IntoFuture, net::SocketAddr, process, sync::Arc};

use farmgate::{
    application::{
        error::AppError,
        repos::{SettingsRepo, VisitorsRepo},
        settings::SettingsService,
        visitors::VisitorService,
    },
    cache::{SettingsCache, SettingsCacheConfig},
    config,
    infra::{
        backend::BackendClient,
        error::InfraError,
        http::{self, AppState, FixedWindowRateLimiter},
        telemetry,
    },
};
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{Dispatch, Level, debug, dispatcher, error, info, warn};
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
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let state = build_state(&settings)?;

    state.settings_cache.warmup().await;

    let limiter = state.visitor_limiter.clone();
    let purge_interval = settings.visitor_rate_limit.purge_interval;
    let purge_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(purge_interval);
        interval.tick().await; // Skip the first immediate tick
        loop {
            interval.tick().await;
            let removed = limiter.purge_expired();
            if removed > 0 {
                debug!(
                    target = "farmgate::rate_limit",
                    removed,
                    remaining = limiter.tracked_keys(),
                    "purged expired rate limit windows"
                );
            }
        }
    });

    let result = serve_http(&settings, state).await;

    purge_handle.abort();
    let _ = purge_handle.await;

    result
}

fn build_state(settings: &config::Settings) -> Result<AppState, AppError> {
    let backend = Arc::new(BackendClient::new(&settings.backend)?);
    if !backend.is_configured() {
        warn!(
            target = "farmgate::startup",
            "backend.url is not set; serving default settings and rejecting visitor routes"
        );
    }

    let settings_repo: Arc<dyn SettingsRepo> = backend.clone();
    let visitors_repo: Arc<dyn VisitorsRepo> = backend;

    let settings_cache = Arc::new(SettingsCache::new(
        settings_repo.clone(),
        SettingsCacheConfig::from(&settings.settings_cache),
    ));
    let settings_service = Arc::new(SettingsService::new(
        settings_repo,
        settings_cache.clone(),
    ));
    let visitor_service = Arc::new(VisitorService::new(
        visitors_repo,
        settings_cache.clone(),
    ));
    let visitor_limiter = Arc::new(FixedWindowRateLimiter::from(&settings.visitor_rate_limit));

    Ok(AppState {
        settings_cache,
        settings: settings_service,
        visitors: visitor_service,
        visitor_limiter,
        vapid_fallback: settings.push.vapid_public_key.clone(),
        started_at: OffsetDateTime::now_utc(),
    })
}

async fn serve_http(settings: &config::Settings, state: AppState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;
    info!(
        target = "farmgate::startup",
        addr = %settings.server.addr,
        "listening"
    );

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let mut server_rx = shutdown_rx.clone();
    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = server_rx.wait_for(|stop| *stop).await;
    })
    .into_future();

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let grace = settings.server.graceful_shutdown;
    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = async {
            let _ = shutdown_rx.wait_for(|stop| *stop).await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(
                target = "farmgate::shutdown",
                grace_seconds = grace.as_secs(),
                "graceful shutdown timed out; dropping open connections"
            );
        }
    }

    info!(target = "farmgate::shutdown", "server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target = "farmgate::shutdown", error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(target = "farmgate::shutdown", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!(target = "farmgate::shutdown", "shutdown signal received");
}
