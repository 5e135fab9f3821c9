use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::{AuthMode, Config};
use quiz_types::{Identity, LobbyError, Restrictions, Role};

const JWKS_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Claims understood by the server. Restriction flags are optional and
/// default to unrestricted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub sub: String,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub exp: Option<u64>,
    #[serde(default)]
    pub email_verified: bool,
    pub role: Option<String>,
    #[serde(default)]
    pub chat_ban: bool,
    #[serde(default)]
    pub game_ban: bool,
}

impl IdentityClaims {
    fn into_identity(self) -> Result<Identity, AuthError> {
        let id = Uuid::parse_str(&self.sub).map_err(|_| {
            tracing::warn!("Token subject is not a valid player id: {}", self.sub);
            AuthError::InvalidToken
        })?;
        let role = match self.role.as_deref() {
            Some("admin") => Role::Admin,
            Some("moderator") => Role::Moderator,
            _ => Role::Player,
        };

        Ok(Identity {
            id,
            display_name: self.name.unwrap_or_else(|| "Player".to_string()),
            profile_picture: self.picture,
            verified: self.email_verified,
            role,
            restrictions: Restrictions {
                chat_ban: self.chat_ban,
                game_ban: self.game_ban,
            },
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwksKey {
    pub kty: String,
    #[serde(rename = "use")]
    pub use_field: Option<String>,
    pub x5c: Option<Vec<String>>,
    pub n: Option<String>,
    pub e: Option<String>,
    pub kid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwksResponse {
    pub keys: Vec<JwksKey>,
}

pub struct AuthService {
    client: Client,
    jwks_cache: Arc<RwLock<HashMap<String, (DecodingKey, SystemTime)>>>,
    mode: AuthMode,
    audience: Option<String>,
    issuer: Option<String>,
}

impl AuthService {
    pub fn new(mode: AuthMode, audience: Option<String>, issuer: Option<String>) -> Self {
        Self {
            client: Client::new(),
            jwks_cache: Arc::new(RwLock::new(HashMap::new())),
            mode,
            audience,
            issuer,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.auth_mode.clone(),
            config.auth_audience.clone(),
            config.auth_issuer.clone(),
        )
    }

    pub fn new_dev_mode() -> Self {
        Self::new(AuthMode::Dev, None, None)
    }

    pub fn is_dev_mode(&self) -> bool {
        self.mode == AuthMode::Dev
    }

    /// Resolves a bearer token to a verified identity.
    pub async fn verify_token(&self, token: &str) -> Result<Identity, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::InvalidToken);
        }

        let claims = match &self.mode {
            AuthMode::Dev => self.decode_dev_token(token)?,
            AuthMode::SharedSecret { secret } => {
                let key = DecodingKey::from_secret(secret.as_bytes());
                self.decode_verified(token, &key, Algorithm::HS256)?
            }
            AuthMode::Jwks { url } => {
                let header = decode_header(token).map_err(|e| {
                    tracing::warn!("Failed to decode JWT header: {:?}", e);
                    AuthError::InvalidToken
                })?;
                let kid = header.kid.ok_or_else(|| {
                    tracing::warn!("JWT header missing 'kid' field");
                    AuthError::InvalidToken
                })?;
                let key = self.get_decoding_key(url, &kid).await?;
                self.decode_verified(token, &key, Algorithm::RS256)?
            }
        };

        claims.into_identity()
    }

    fn decode_verified(
        &self,
        token: &str,
        key: &DecodingKey,
        algorithm: Algorithm,
    ) -> Result<IdentityClaims, AuthError> {
        let mut validation = Validation::new(algorithm);
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }

        let data = decode::<IdentityClaims>(token, key, &validation).map_err(|e| {
            tracing::warn!("JWT validation failed: {:?}", e);
            AuthError::from(e)
        })?;
        Ok(data.claims)
    }

    async fn get_decoding_key(&self, jwks_url: &str, kid: &str) -> Result<DecodingKey, AuthError> {
        {
            let cache = self.jwks_cache.read().await;
            if let Some((key, cached_at)) = cache.get(kid) {
                let age = cached_at.elapsed().unwrap_or(JWKS_CACHE_TTL);
                if age < JWKS_CACHE_TTL {
                    tracing::debug!("Using cached decoding key for kid '{}'", kid);
                    return Ok(key.clone());
                }
            }
        }

        tracing::debug!("Fetching JWKS from {}", jwks_url);
        let response = self.client.get(jwks_url).send().await.map_err(|e| {
            tracing::warn!("Failed to fetch JWKS: {:?}", e);
            AuthError::JwksFetchError
        })?;
        if !response.status().is_success() {
            tracing::warn!("JWKS fetch returned status: {}", response.status());
            return Err(AuthError::JwksFetchError);
        }
        let jwks: JwksResponse = response.json().await.map_err(|e| {
            tracing::warn!("Failed to parse JWKS JSON: {:?}", e);
            AuthError::JwksFetchError
        })?;

        let jwks_key = jwks.keys.iter().find(|key| key.kid == kid).ok_or_else(|| {
            tracing::warn!("Key with kid '{}' not found in JWKS", kid);
            AuthError::KeyNotFound
        })?;

        let decoding_key = if let (Some(n), Some(e)) = (&jwks_key.n, &jwks_key.e) {
            DecodingKey::from_rsa_components(n, e).map_err(|e| {
                tracing::warn!("Failed to create decoding key from RSA components: {:?}", e);
                AuthError::InvalidKey
            })?
        } else if let Some(cert) = jwks_key.x5c.as_ref().and_then(|chain| chain.first()) {
            let cert_der = base64::engine::general_purpose::STANDARD
                .decode(cert)
                .map_err(|e| {
                    tracing::warn!("Failed to decode x5c certificate: {:?}", e);
                    AuthError::InvalidKey
                })?;
            DecodingKey::from_rsa_der(&cert_der)
        } else {
            tracing::warn!("JWKS key has neither n,e components nor x5c certificate");
            return Err(AuthError::InvalidKey);
        };

        {
            let mut cache = self.jwks_cache.write().await;
            cache.insert(kid.to_string(), (decoding_key.clone(), SystemTime::now()));
        }

        Ok(decoding_key)
    }

    /// Development tokens come in three shapes: an unsigned JWT, a JSON
    /// claims object, or `player_id:display_name[:flags]` where flags is a
    /// comma separated list of `chat_ban` and `game_ban`.
    fn decode_dev_token(&self, token: &str) -> Result<IdentityClaims, AuthError> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() == 3 {
            let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
                .decode(parts[1].trim_end_matches('='))
                .map_err(|e| {
                    tracing::warn!("Failed to decode JWT payload in dev mode: {:?}", e);
                    AuthError::InvalidToken
                })?;
            let claims: IdentityClaims = serde_json::from_slice(&payload).map_err(|e| {
                tracing::warn!("Failed to parse JWT claims in dev mode: {:?}", e);
                AuthError::InvalidToken
            })?;

            if let Some(exp) = claims.exp {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|elapsed| elapsed.as_secs())
                    .unwrap_or_default();
                if exp < now {
                    return Err(AuthError::TokenExpired);
                }
            }
            return Ok(claims);
        }

        if token.starts_with('{') && token.ends_with('}') {
            return serde_json::from_str(token).map_err(|_| AuthError::InvalidToken);
        }

        let segments: Vec<&str> = token.splitn(3, ':').collect();
        if segments.len() < 2 || segments[1].trim().is_empty() {
            return Err(AuthError::InvalidToken);
        }
        let flags: Vec<&str> = segments
            .get(2)
            .map(|flags| flags.split(',').map(str::trim).collect())
            .unwrap_or_default();

        Ok(IdentityClaims {
            sub: segments[0].to_string(),
            name: Some(segments[1].to_string()),
            picture: None,
            exp: None,
            email_verified: true,
            role: None,
            chat_ban: flags.contains(&"chat_ban"),
            game_ban: flags.contains(&"game_ban"),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
    #[error("Failed to fetch JWKS")]
    JwksFetchError,
    #[error("Key not found")]
    KeyNotFound,
    #[error("Invalid key")]
    InvalidKey,
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(error: jsonwebtoken::errors::Error) -> Self {
        match error.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        }
    }
}

impl From<AuthError> for LobbyError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::TokenExpired => LobbyError::Expired,
            _ => LobbyError::Unauthenticated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    fn claims(sub: &str, exp: u64) -> IdentityClaims {
        IdentityClaims {
            sub: sub.to_string(),
            name: Some("Alice".to_string()),
            picture: None,
            exp: Some(exp),
            email_verified: true,
            role: Some("moderator".to_string()),
            chat_ban: true,
            game_ban: false,
        }
    }

    fn secret_service() -> AuthService {
        AuthService::new(
            AuthMode::SharedSecret {
                secret: "test-secret".to_string(),
            },
            None,
            None,
        )
    }

    #[tokio::test]
    async fn test_dev_string_token() {
        let auth_service = AuthService::new_dev_mode();
        let id = Uuid::new_v4();

        let identity = auth_service
            .verify_token(&format!("{}:Alice", id))
            .await
            .unwrap();
        assert_eq!(identity.id, id);
        assert_eq!(identity.display_name, "Alice");
        assert!(!identity.restrictions.chat_ban);

        let banned = auth_service
            .verify_token(&format!("{}:Mallory:chat_ban,game_ban", id))
            .await
            .unwrap();
        assert!(banned.restrictions.chat_ban);
        assert!(banned.restrictions.game_ban);
    }

    #[tokio::test]
    async fn test_dev_json_token() {
        let auth_service = AuthService::new_dev_mode();
        let id = Uuid::new_v4();
        let token = format!(r#"{{"sub":"{}","name":"Bob"}}"#, id);

        let identity = auth_service.verify_token(&token).await.unwrap();
        assert_eq!(identity.id, id);
        assert_eq!(identity.display_name, "Bob");
    }

    #[tokio::test]
    async fn test_dev_jwt_expiry_is_checked() {
        let auth_service = AuthService::new_dev_mode();
        let token = encode(
            &Header::default(),
            &claims(&Uuid::new_v4().to_string(), now_secs() - 3600),
            &EncodingKey::from_secret(b"ignored"),
        )
        .unwrap();

        let result = auth_service.verify_token(&token).await;
        assert!(matches!(result, Err(AuthError::TokenExpired)));
    }

    #[tokio::test]
    async fn test_invalid_dev_tokens() {
        let auth_service = AuthService::new_dev_mode();
        assert!(matches!(
            auth_service.verify_token("").await,
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            auth_service.verify_token("not-a-uuid:Alice").await,
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            auth_service.verify_token("just-one-part").await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_shared_secret_token() {
        let auth_service = secret_service();
        let id = Uuid::new_v4();
        let token = encode(
            &Header::default(),
            &claims(&id.to_string(), now_secs() + 3600),
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        let identity = auth_service.verify_token(&token).await.unwrap();
        assert_eq!(identity.id, id);
        assert_eq!(identity.role, Role::Moderator);
        assert!(identity.restrictions.chat_ban);
    }

    #[tokio::test]
    async fn test_shared_secret_rejects_bad_signature_and_expiry() {
        let auth_service = secret_service();
        let id = Uuid::new_v4().to_string();

        let forged = encode(
            &Header::default(),
            &claims(&id, now_secs() + 3600),
            &EncodingKey::from_secret(b"wrong-secret"),
        )
        .unwrap();
        assert!(matches!(
            auth_service.verify_token(&forged).await,
            Err(AuthError::InvalidToken)
        ));

        let expired = encode(
            &Header::default(),
            &claims(&id, now_secs() - 3600),
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert!(matches!(
            auth_service.verify_token(&expired).await,
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn test_auth_errors_map_to_lobby_errors() {
        assert_eq!(
            LobbyError::from(AuthError::TokenExpired),
            LobbyError::Expired
        );
        assert_eq!(
            LobbyError::from(AuthError::InvalidToken),
            LobbyError::Unauthenticated
        );
    }
}
