use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use quiz_persistence::{ProfileRepository, connection::connect_and_migrate};
use quiz_server::{
    auth::AuthService,
    config::Config,
    create_routes,
    finalization::PlayerProfileStore,
    lobby_manager::{LobbyManager, ManagerOptions},
    questions::{PoolQuestionProvider, QuestionProvider},
    websocket::ConnectionManager,
};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Quiz Arena server...");

    let config = Config::from_env();
    let connection_manager = Arc::new(ConnectionManager::with_session_limit(
        config.max_sessions_per_identity,
    ));

    info!("Loading questions from {}", config.questions_path);
    let questions: Arc<dyn QuestionProvider> =
        match PoolQuestionProvider::load(&config.questions_path).await {
            Ok(provider) if !provider.is_empty() => Arc::new(provider),
            Ok(_) => {
                error!("Question bank '{}' is empty", config.questions_path);
                std::process::exit(1);
            }
            Err(e) => {
                error!("Failed to load question bank: {:#}", e);
                error!("Set QUESTIONS_PATH to a JSON array of questions.");
                std::process::exit(1);
            }
        };

    let db = match connect_and_migrate(&config.database_url).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to connect to database and run migrations: {}", e);
            std::process::exit(1);
        }
    };
    let profile_repository = Arc::new(ProfileRepository::new(db));
    let profile_store: Arc<dyn PlayerProfileStore> = profile_repository.clone();

    let auth_service = Arc::new(AuthService::from_config(&config));
    if auth_service.is_dev_mode() {
        warn!("Starting in development authentication mode - token signatures are not checked");
    }

    let lobby_manager = LobbyManager::new(
        connection_manager.clone(),
        questions,
        profile_store,
        ManagerOptions::from_config(&config),
    );

    let routes = create_routes(
        connection_manager.clone(),
        lobby_manager.clone(),
        auth_service,
        profile_repository,
    );

    let cleanup_connection_manager = connection_manager.clone();
    let cleanup_lobby_manager = lobby_manager.clone();
    let connection_timeout = config.connection_timeout();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            cleanup_connection_manager
                .cleanup_inactive_connections(connection_timeout)
                .await;
            let removed = cleanup_lobby_manager.cleanup_idle_lobbies().await;
            if removed > 0 {
                info!("Closed {} idle lobbies", removed);
            }
        }
    });

    let host: IpAddr = match config.host.parse() {
        Ok(host) => host,
        Err(e) => {
            error!("Invalid HOST '{}': {}", config.host, e);
            std::process::exit(1);
        }
    };
    info!("Server starting on {}:{}", host, config.port);

    let (addr, server) =
        warp::serve(routes).bind_with_graceful_shutdown((host, config.port), shutdown_signal());

    info!(
        "Server started successfully on {}. Press Ctrl+C to stop.",
        addr
    );
    server.await;
    info!("Server shutdown complete.");
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use signal::unix::{SignalKind, signal};

        match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => {
                        info!("Received SIGINT, shutting down gracefully...");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down gracefully...");
                    }
                }
                return;
            }
            _ => warn!("Could not install unix signal handlers, falling back to Ctrl+C"),
        }
    }

    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, shutting down gracefully...");
}
