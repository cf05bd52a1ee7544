use std::{future::IntoFuture, process, sync::Arc};

use readthrough::{
    application::{
        articles::ArticleService,
        error::AppError,
        pages::{PageService, PageSettings},
        repos::ArticlesRepo,
    },
    cache::{CacheManager, Invalidator, KeySpace, KeyValueStore, MemoryStore},
    config::{self, CacheBackend, Settings},
    infra::{
        db::{PostgresKvStore, PostgresRepositories},
        error::InfraError,
        http::{self, AppState, WebhookState},
        telemetry,
        upstream::HttpUpstream,
    },
};
use tokio::sync::oneshot;
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
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_migrate(settings: Settings) -> Result<(), AppError> {
    if init_repositories(&settings).await?.is_none() {
        return Err(InfraError::configuration("database url is not configured").into());
    }
    info!(target = "readthrough::migrate", "Migrations applied");
    Ok(())
}

async fn run_serve(settings: Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let state = build_state(&settings, repositories)?;
    serve_http(&settings, state).await
}

/// Connect and migrate when a database is configured.
async fn init_repositories(settings: &Settings) -> Result<Option<PostgresRepositories>, AppError> {
    let Some(database_url) = settings.database.url.as_deref() else {
        return Ok(None);
    };

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    let repositories = PostgresRepositories::new(pool, &settings.database.table);
    repositories.verify_articles_table().await.map_err(|err| {
        AppError::from(InfraError::configuration(format!(
            "articles table `{}` is not usable ({err}); migrations only create `articles`, \
             any other table must already exist with the same columns",
            settings.database.table
        )))
    })?;

    Ok(Some(repositories))
}

fn build_state(
    settings: &Settings,
    repositories: Option<PostgresRepositories>,
) -> Result<AppState, AppError> {
    let store: Arc<dyn KeyValueStore> = match (settings.cache.backend, repositories.as_ref()) {
        (CacheBackend::Postgres, Some(db)) => Arc::new(PostgresKvStore::new(db.pool().clone())),
        (CacheBackend::Postgres, None) => {
            return Err(InfraError::configuration(
                "postgres cache backend requires a database connection",
            )
            .into());
        }
        (CacheBackend::Memory, _) => Arc::new(MemoryStore::new()),
    };

    let cache = Arc::new(CacheManager::with_system_clock(
        store.clone(),
        settings.cache.ttl_minutes,
    ));
    let invalidator = Arc::new(Invalidator::new(store));
    let keys = KeySpace::articles(settings.database.table.clone());

    let articles = repositories.as_ref().map(|db| {
        let repo: Arc<dyn ArticlesRepo> = Arc::new(db.clone());
        Arc::new(ArticleService::new(
            repo,
            cache.clone(),
            invalidator.clone(),
            keys.clone(),
            settings.cache.ttl_minutes,
        ))
    });

    let pages = match settings.upstream.url.clone() {
        Some(upstream) => {
            let client = HttpUpstream::new(settings.upstream.timeout)?;
            let page_settings = PageSettings {
                upstream,
                cache_enabled: settings.upstream.cache_enabled,
                ttl_minutes: settings.upstream.ttl_minutes,
                rewrite_selector: settings.upstream.rewrite_selector.clone(),
                rewrite_text: settings.upstream.rewrite_text.clone(),
            };
            Some(Arc::new(PageService::new(
                Arc::new(client),
                cache.clone(),
                page_settings,
            )?))
        }
        None => None,
    };

    if settings.webhook.token.is_none() {
        warn!("webhook token is not configured; /inform will reject every notification");
    }
    let webhook = Arc::new(WebhookState::new(
        settings.webhook.token.clone(),
        invalidator,
        keys,
    ));

    Ok(AppState {
        articles,
        pages,
        webhook,
        db: repositories,
    })
}

async fn serve_http(settings: &Settings, state: AppState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "listening");

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = stop_rx.await;
        })
        .into_future();
    let mut handle = tokio::spawn(server);

    tokio::select! {
        joined = &mut handle => return server_result(joined),
        () = shutdown_signal() => {}
    }

    info!(
        grace_seconds = settings.server.graceful_shutdown.as_secs(),
        "shutdown requested; draining connections"
    );
    let _ = stop_tx.send(());

    match tokio::time::timeout(settings.server.graceful_shutdown, handle).await {
        Ok(joined) => server_result(joined),
        Err(_) => {
            warn!("graceful shutdown timed out; exiting with requests in flight");
            Ok(())
        }
    }
}

fn server_result(
    joined: Result<Result<(), std::io::Error>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match joined {
        Ok(result) => result.map_err(|err| AppError::unexpected(format!("server error: {err}"))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
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
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
