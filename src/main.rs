use std::{process, sync::Arc, time::Duration};

use tokio::sync::Notify;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use yatube::{
    application::{
        cache::FeedCache,
        directory::{CreateGroupCommand, DirectoryService},
        error::AppError,
        feed::FeedService,
        follow::FollowService,
        pagination::Paginator,
        posting::PostingService,
        sessions::SessionService,
    },
    config::{self, GroupsCommand, UsersCommand},
    infra::{
        cache::{MemoryFeedCache, NoopFeedCache},
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState, SessionCookie},
        telemetry,
        uploads::UploadStorage,
    },
};

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

    telemetry::init(&settings.logging)?;

    match cli_args.command {
        None | Some(config::Command::Serve(_)) => run_serve(settings).await,
        Some(config::Command::Users(args)) => run_users(settings, args.command).await,
        Some(config::Command::Groups(args)) => run_groups(settings, args.command).await,
    }
}

async fn connect(settings: &config::Settings) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let pool =
        PostgresRepositories::connect(database_url, settings.database.max_connections.get())
            .await
            .map_err(InfraError::database)?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(InfraError::from)?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_http_state(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<HttpState, AppError> {
    let directory = &settings.uploads.directory;
    let uploads = UploadStorage::new(directory.clone()).map_err(|source| InfraError::Uploads {
        path: directory.display().to_string(),
        source,
    })?;
    let uploads = Arc::new(uploads);

    let cache: Arc<dyn FeedCache> = if settings.feed.index_cache_enabled {
        Arc::new(MemoryFeedCache::new())
    } else {
        Arc::new(NoopFeedCache)
    };

    let feed = FeedService::new(
        repositories.clone(),
        repositories.clone(),
        repositories.clone(),
        repositories.clone(),
        repositories.clone(),
        cache,
        Paginator::new(settings.feed.page_size.get()),
        settings.feed.index_cache_ttl,
    );
    let follows = FollowService::new(repositories.clone(), repositories.clone());
    let posting = PostingService::new(
        repositories.clone(),
        repositories.clone(),
        repositories.clone(),
        repositories.clone(),
        uploads.clone(),
    );
    let sessions = SessionService::new(repositories.clone(), repositories.clone());

    let max_request_bytes = usize::try_from(settings.uploads.max_request_bytes.get())
        .map_err(|_| InfraError::configuration("uploads.max_request_bytes exceeds usize"))?;

    Ok(HttpState {
        feed: Arc::new(feed),
        follows: Arc::new(follows),
        posting: Arc::new(posting),
        sessions: Arc::new(sessions),
        health: repositories,
        uploads,
        session_cookie: SessionCookie {
            name: settings.session.cookie_name.clone(),
            secure: settings.session.secure_cookie,
        },
        max_request_bytes,
    })
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = connect(&settings).await?;
    let state = build_http_state(repositories, &settings)?;
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;
    info!(addr = %settings.server.addr, "yatube listening");

    let stop = Arc::new(Notify::new());
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown({
            let stop = Arc::clone(&stop);
            async move { stop.notified().await }
        })
        .into_future();
    let mut server = tokio::spawn(server);

    tokio::select! {
        joined = &mut server => return server_result(joined),
        _ = shutdown_signal() => {}
    }

    info!(
        grace_seconds = settings.server.graceful_shutdown.as_secs(),
        "shutdown requested; draining connections"
    );
    stop.notify_one();
    drain(server, settings.server.graceful_shutdown).await
}

async fn drain(
    server: tokio::task::JoinHandle<std::io::Result<()>>,
    grace: Duration,
) -> Result<(), AppError> {
    match tokio::time::timeout(grace, server).await {
        Ok(joined) => server_result(joined),
        Err(_) => {
            warn!("graceful shutdown window elapsed; exiting");
            Ok(())
        }
    }
}

fn server_result(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(InfraError::from(err).into()),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

async fn run_users(settings: config::Settings, command: UsersCommand) -> Result<(), AppError> {
    let repositories = connect(&settings).await?;

    match command {
        UsersCommand::Create {
            username,
            display_name,
        } => {
            let directory = DirectoryService::new(repositories.clone(), repositories);
            let user = directory
                .create_user(&username, display_name.as_deref())
                .await?;
            println!("created user {} (id {})", user.username, user.id);
        }
        UsersCommand::IssueSession { username } => {
            let sessions = SessionService::new(repositories.clone(), repositories);
            let issued = sessions.issue(&username).await?;
            println!("{}", issued.token);
        }
    }
    Ok(())
}

async fn run_groups(settings: config::Settings, command: GroupsCommand) -> Result<(), AppError> {
    let repositories = connect(&settings).await?;
    let directory = DirectoryService::new(repositories.clone(), repositories);

    match command {
        GroupsCommand::Create {
            slug,
            title,
            description,
        } => {
            let group = directory
                .create_group(CreateGroupCommand {
                    slug,
                    title,
                    description,
                })
                .await?;
            println!("created group {} at /group/{}/", group.title, group.slug);
        }
    }
    Ok(())
}
