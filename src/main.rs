use std::{process, sync::Arc, time::Duration};

use figflag::{
    application::{
        error::AppError,
        public::PublicSnapshotService,
        repos::{ConfigsRepo, EnvironmentsRepo, FlagsRepo, HealthRepo, ProjectsRepo},
        snapshot::SnapshotBuilder,
    },
    cache::{CacheBackend, CacheConfig, FreshnessCache, MemoryCache},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
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

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match cli_args.command {
        None | Some(config::Command::Serve(_)) => run_serve(settings).await,
        Some(config::Command::Migrate(_)) => run_migrate(settings).await,
    }
}

async fn connect(settings: &config::Settings) -> Result<PostgresRepositories, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;

    Ok(PostgresRepositories::new(pool))
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let repositories = connect(&settings).await?;
    PostgresRepositories::run_migrations(repositories.pool())
        .await
        .map_err(|err| InfraError::migration(err.to_string()))?;
    info!("database migrations applied");
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = Arc::new(connect(&settings).await?);

    if settings.database.run_migrations {
        PostgresRepositories::run_migrations(repositories.pool())
            .await
            .map_err(|err| InfraError::migration(err.to_string()))?;
        info!("database migrations applied");
    }

    let cache_config = CacheConfig::from(&settings.cache);
    let cache: Arc<dyn FreshnessCache> = match cache_config.backend {
        CacheBackend::Memory => Arc::new(MemoryCache::new(&cache_config)),
        CacheBackend::Postgres => repositories.clone(),
    };

    let purge_handle = (cache_config.backend == CacheBackend::Postgres)
        .then(|| spawn_cache_purge(repositories.clone(), cache_config.ttl()));

    let projects: Arc<dyn ProjectsRepo> = repositories.clone();
    let environments: Arc<dyn EnvironmentsRepo> = repositories.clone();
    let flags: Arc<dyn FlagsRepo> = repositories.clone();
    let configs: Arc<dyn ConfigsRepo> = repositories.clone();
    let health: Arc<dyn HealthRepo> = repositories.clone();

    let builder = SnapshotBuilder::new(environments.clone(), flags, configs);
    let snapshots = Arc::new(PublicSnapshotService::new(
        projects,
        environments,
        builder,
        cache,
        cache_config,
    ));

    let state = HttpState { snapshots, health };
    let result = serve_http(&settings, state).await;

    if let Some(handle) = purge_handle {
        handle.abort();
        let _ = handle.await;
    }

    result
}

/// Expired `public_cache` rows are invisible to readers; this only reclaims space.
fn spawn_cache_purge(
    repositories: Arc<PostgresRepositories>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            match repositories.purge_expired_cache().await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "purged expired snapshot cache rows"),
                Err(err) => warn!(error = %err, "failed to purge expired snapshot cache rows"),
            }
        }
    })
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state, &settings.cors);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;
    info!(addr = %settings.server.addr, "listening");

    let draining = Arc::new(Notify::new());
    let signal = {
        let draining = draining.clone();
        async move {
            shutdown_signal().await;
            info!("shutdown requested; draining connections");
            draining.notify_one();
        }
    };

    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(signal)
        .into_future();
    let grace = settings.server.graceful_shutdown;

    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))
        }
        _ = async {
            draining.notified().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(grace_seconds = grace.as_secs(), "graceful shutdown timed out");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
