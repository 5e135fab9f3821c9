use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use warp::Filter;
use warp::http::StatusCode;

use crate::auth::AuthService;
use crate::lobby_manager::LobbyManager;
use crate::websocket::ConnectionManager;
use quiz_persistence::{PlayerProfile, ProfileRepository};
use quiz_types::{ErrorKind, LobbyError, LobbyId, NestedStats, PlayerId};

pub mod auth;
pub mod config;
pub mod finalization;
pub mod lobby_manager;
pub mod questions;
pub mod round_timer;
pub mod websocket;

const DEFAULT_HISTORY_LIMIT: u64 = 20;
const MAX_HISTORY_LIMIT: u64 = 100;

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<u64>,
}

#[derive(Serialize)]
struct PlayerStatsResponse {
    player: PlayerProfile,
    stats: NestedStats,
}

pub fn create_routes(
    connection_manager: Arc<ConnectionManager>,
    lobby_manager: Arc<LobbyManager>,
    auth_service: Arc<AuthService>,
    profile_repository: Arc<ProfileRepository>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let connection_manager_filter = warp::any().map({
        let connection_manager = connection_manager.clone();
        move || connection_manager.clone()
    });

    let lobby_manager_filter = warp::any().map({
        let lobby_manager = lobby_manager.clone();
        move || lobby_manager.clone()
    });

    let auth_filter = warp::any().map({
        let auth_service = auth_service.clone();
        move || auth_service.clone()
    });

    let profile_repository_filter = warp::any().map({
        let profile_repository = profile_repository.clone();
        move || profile_repository.clone()
    });

    let websocket = warp::path("ws")
        .and(warp::ws())
        .and(connection_manager_filter)
        .and(lobby_manager_filter.clone())
        .and(auth_filter.clone())
        .map(|ws: warp::ws::Ws, conn_mgr, lobby_mgr, auth| {
            ws.on_upgrade(move |socket| websocket::handle_connection(socket, conn_mgr, lobby_mgr, auth))
        });

    let health = warp::path("health")
        .and(warp::get())
        .map(|| warp::reply::with_status("OK", StatusCode::OK));

    let lobby_list = warp::path!("lobbies")
        .and(warp::get())
        .and(lobby_manager_filter.clone())
        .and_then(handle_lobby_list_request);

    let lobby_snapshot = warp::path!("lobbies" / String)
        .and(warp::get())
        .and(warp::header::optional::<String>("authorization"))
        .and(lobby_manager_filter)
        .and(auth_filter)
        .and_then(handle_lobby_snapshot_request);

    let player_stats = warp::path!("players" / String / "stats")
        .and(warp::get())
        .and(profile_repository_filter.clone())
        .and_then(handle_player_stats_request);

    let match_history = warp::path!("players" / String / "matches")
        .and(warp::get())
        .and(warp::query::<HistoryQuery>())
        .and(profile_repository_filter)
        .and_then(handle_match_history_request);

    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["content-type", "authorization"])
        .allow_methods(vec!["GET", "POST"]);

    websocket
        .or(health)
        .or(lobby_list)
        .or(lobby_snapshot)
        .or(player_stats)
        .or(match_history)
        .with(cors)
        .with(warp::log("quiz_arena"))
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict | ErrorKind::NotActive => StatusCode::CONFLICT,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthenticated | ErrorKind::Expired => StatusCode::UNAUTHORIZED,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_reply(error: &LobbyError) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(
        warp::reply::json(&serde_json::json!({
            "error": error.to_string(),
            "kind": error.kind(),
        })),
        status_for(error.kind()),
    )
}

fn parse_player_id(raw: &str) -> Result<PlayerId, LobbyError> {
    Uuid::parse_str(raw).map_err(|_| LobbyError::invalid_input("Invalid player ID format"))
}

async fn handle_lobby_list_request(
    lobby_manager: Arc<LobbyManager>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let lobbies = lobby_manager.public_lobbies().await;
    Ok(warp::reply::with_status(
        warp::reply::json(&lobbies),
        StatusCode::OK,
    ))
}

async fn handle_lobby_snapshot_request(
    lobby_id: String,
    auth_header: Option<String>,
    lobby_manager: Arc<LobbyManager>,
    auth_service: Arc<AuthService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let viewer = match auth_header {
        Some(auth_header) => {
            let token = auth_header.strip_prefix("Bearer ").unwrap_or(&auth_header);
            match auth_service.verify_token(token).await {
                Ok(identity) => Some(identity.id),
                Err(e) => return Ok(error_reply(&LobbyError::from(e))),
            }
        }
        None => None,
    };

    match lobby_manager.snapshot(&LobbyId::new(lobby_id), viewer).await {
        Ok(snapshot) => Ok(warp::reply::with_status(
            warp::reply::json(&snapshot),
            StatusCode::OK,
        )),
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn handle_player_stats_request(
    player_id: String,
    profile_repository: Arc<ProfileRepository>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let player_id = match parse_player_id(&player_id) {
        Ok(player_id) => player_id,
        Err(e) => return Ok(error_reply(&e)),
    };

    let player = match profile_repository.find_player(player_id).await {
        Ok(Some(player)) => player,
        Ok(None) => {
            return Ok(error_reply(&LobbyError::NotFound {
                what: "player".to_string(),
            }));
        }
        Err(err) => {
            tracing::error!("Failed to fetch player {}: {}", player_id, err);
            return Ok(error_reply(&LobbyError::Internal {
                reason: "failed to fetch player".to_string(),
            }));
        }
    };

    match profile_repository.leaderboard_stats(player_id).await {
        Ok(stats) => Ok(warp::reply::with_status(
            warp::reply::json(&PlayerStatsResponse {
                player,
                stats: stats.nested(),
            }),
            StatusCode::OK,
        )),
        Err(err) => {
            tracing::error!("Failed to fetch stats for {}: {}", player_id, err);
            Ok(error_reply(&LobbyError::Internal {
                reason: "failed to fetch statistics".to_string(),
            }))
        }
    }
}

async fn handle_match_history_request(
    player_id: String,
    query: HistoryQuery,
    profile_repository: Arc<ProfileRepository>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let player_id = match parse_player_id(&player_id) {
        Ok(player_id) => player_id,
        Err(e) => return Ok(error_reply(&e)),
    };
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    match profile_repository.match_history(player_id, limit).await {
        Ok(history) => Ok(warp::reply::with_status(
            warp::reply::json(&history),
            StatusCode::OK,
        )),
        Err(err) => {
            tracing::error!("Failed to fetch match history for {}: {}", player_id, err);
            Ok(error_reply(&LobbyError::Internal {
                reason: "failed to fetch match history".to_string(),
            }))
        }
    }
}
