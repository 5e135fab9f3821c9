use std::env;
use std::str::FromStr;
use std::time::Duration;

/// How bearer tokens are verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// Unsigned development tokens. Never use in production.
    Dev,
    /// HS256 tokens signed with a shared secret.
    SharedSecret { secret: String },
    /// RS256 tokens verified against a JWKS endpoint.
    Jwks { url: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub questions_path: String,
    pub max_players_per_lobby: usize,
    pub max_sessions_per_identity: usize,
    pub reveal_duration_seconds: u64,
    pub time_freeze_seconds: u64,
    pub finalize_max_attempts: u32,
    pub finalize_retry_base_ms: u64,
    pub lobby_idle_timeout_minutes: u64,
    pub connection_timeout_seconds: u64,
    pub auth_mode: AuthMode,
    pub auth_audience: Option<String>,
    pub auth_issuer: Option<String>,
}

fn parse_env<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Invalid {} value '{}', using default", name, raw);
                default
            }
        },
        Err(_) => default,
    }
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_env("PORT", 8080),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://quiz_arena.db?mode=rwc".to_string()),
            questions_path: env::var("QUESTIONS_PATH")
                .unwrap_or_else(|_| "./shared/questions.json".to_string()),
            max_players_per_lobby: parse_env("MAX_PLAYERS_PER_LOBBY", 8),
            max_sessions_per_identity: parse_env("MAX_SESSIONS_PER_IDENTITY", 3),
            reveal_duration_seconds: parse_env("REVEAL_DURATION_SECONDS", 5),
            time_freeze_seconds: parse_env("TIME_FREEZE_SECONDS", 10),
            finalize_max_attempts: parse_env("FINALIZE_MAX_ATTEMPTS", 3),
            finalize_retry_base_ms: parse_env("FINALIZE_RETRY_BASE_MS", 250),
            lobby_idle_timeout_minutes: parse_env("LOBBY_IDLE_TIMEOUT_MINUTES", 30),
            connection_timeout_seconds: parse_env("CONNECTION_TIMEOUT_SECONDS", 300),
            auth_mode: Self::auth_mode_from_env(),
            auth_audience: optional_env("AUTH_AUDIENCE"),
            auth_issuer: optional_env("AUTH_ISSUER"),
        }
    }

    fn auth_mode_from_env() -> AuthMode {
        let mode = env::var("AUTH_MODE").unwrap_or_else(|_| "dev".to_string());
        match mode.as_str() {
            "secret" => match optional_env("AUTH_JWT_SECRET") {
                Some(secret) => AuthMode::SharedSecret { secret },
                None => {
                    tracing::warn!("AUTH_MODE=secret without AUTH_JWT_SECRET, using dev mode");
                    AuthMode::Dev
                }
            },
            "jwks" => match optional_env("AUTH_JWKS_URL") {
                Some(url) => AuthMode::Jwks { url },
                None => {
                    tracing::warn!("AUTH_MODE=jwks without AUTH_JWKS_URL, using dev mode");
                    AuthMode::Dev
                }
            },
            "dev" => AuthMode::Dev,
            other => {
                tracing::warn!("Unknown AUTH_MODE '{}', using dev mode", other);
                AuthMode::Dev
            }
        }
    }

    pub fn reveal_duration(&self) -> Duration {
        Duration::from_secs(self.reveal_duration_seconds)
    }

    pub fn time_freeze(&self) -> Duration {
        Duration::from_secs(self.time_freeze_seconds)
    }

    pub fn finalize_retry_base(&self) -> Duration {
        Duration::from_millis(self.finalize_retry_base_ms)
    }

    pub fn lobby_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.lobby_idle_timeout_minutes * 60)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_seconds)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_uses_default_when_unset() {
        assert_eq!(parse_env("QUIZ_ARENA_TEST_UNSET_VARIABLE", 42u32), 42);
    }

    #[test]
    fn test_durations() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            database_url: "sqlite::memory:".to_string(),
            questions_path: "questions.json".to_string(),
            max_players_per_lobby: 8,
            max_sessions_per_identity: 3,
            reveal_duration_seconds: 5,
            time_freeze_seconds: 10,
            finalize_max_attempts: 3,
            finalize_retry_base_ms: 250,
            lobby_idle_timeout_minutes: 30,
            connection_timeout_seconds: 300,
            auth_mode: AuthMode::Dev,
            auth_audience: None,
            auth_issuer: None,
        };

        assert_eq!(config.reveal_duration(), Duration::from_secs(5));
        assert_eq!(config.finalize_retry_base(), Duration::from_millis(250));
        assert_eq!(config.lobby_idle_timeout(), Duration::from_secs(1800));
    }
}
