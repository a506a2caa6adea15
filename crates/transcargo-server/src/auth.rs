//! Bearer tokens, roles and the request extractors built on them.
//!
//! A token is `base64url(claims_json) "." base64url(hmac_sha256(claims_json))`
//! keyed by `SECRET_KEY`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::{AUTHORIZATION, USER_AGENT};
use axum::http::request::Parts;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::ApiError;
use crate::state::AppState;
use transcargo_core::{AppConfig, Error, Result};
use transcargo_privacy::RequestContext;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Manager,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Manager => "manager",
            Role::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    /// Expiry, unix seconds.
    pub exp: i64,
}

pub struct TokenSigner {
    key: Vec<u8>,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: &str, ttl_minutes: i64) -> Self {
        Self {
            key: secret.as_bytes().to_vec(),
            ttl: Duration::minutes(ttl_minutes.max(1)),
        }
    }

    pub fn issue(&self, sub: &str, role: Role) -> Result<(String, Claims)> {
        self.issue_at(sub, role, Utc::now())
    }

    pub fn issue_at(&self, sub: &str, role: Role, now: DateTime<Utc>) -> Result<(String, Claims)> {
        let claims = Claims {
            sub: sub.to_string(),
            role,
            exp: (now + self.ttl).timestamp(),
        };
        let payload = serde_json::to_vec(&claims)?;
        let signature = self.mac()?.chain_update(&payload).finalize().into_bytes();
        let token = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(signature)
        );
        Ok((token, claims))
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        let invalid = || Error::Unauthorized("invalid token".into());
        let (payload, signature) = token.split_once('.').ok_or_else(invalid)?;
        let payload = URL_SAFE_NO_PAD.decode(payload).map_err(|_| invalid())?;
        let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| invalid())?;
        self.mac()?
            .chain_update(&payload)
            .verify_slice(&signature)
            .map_err(|_| invalid())?;

        let claims: Claims = serde_json::from_slice(&payload).map_err(|_| invalid())?;
        if claims.exp <= Utc::now().timestamp() {
            return Err(Error::Unauthorized("token expired".into()));
        }
        Ok(claims)
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.key).map_err(|e| Error::Internal(e.to_string()))
    }
}

/// Constant-time string comparison.
pub fn secrets_match(expected: &str, given: &str) -> bool {
    let a = expected.as_bytes();
    let b = given.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Role for a login attempt. Every account shares the admin password.
pub fn resolve_role(config: &AppConfig, username: &str, password: &str) -> Option<Role> {
    if !secrets_match(&config.admin_password, password) {
        return None;
    }
    if username == config.admin_username {
        Some(Role::Admin)
    } else if config.manager_users.iter().any(|u| u == username) {
        Some(Role::Manager)
    } else if config.viewer_users.iter().any(|u| u == username) {
        Some(Role::Viewer)
    } else {
        None
    }
}

// ---------------------------------------------------------------
// Extractors
// ---------------------------------------------------------------

/// Caller address and user agent, for audit entries and consent records.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    fn from_parts(parts: &Parts) -> Self {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };
        let ip = header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .or_else(|| header("x-real-ip").map(str::to_string))
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            });
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Self { ip, user_agent }
    }

    pub fn context(&self, actor: impl Into<String>) -> RequestContext {
        RequestContext::new(actor, self.ip.clone(), self.user_agent.clone())
    }
}

impl<S: Send + Sync> FromRequestParts<S> for ClientInfo {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}

/// An authenticated staff member.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub sub: String,
    pub role: Role,
    pub ctx: RequestContext,
}

impl AuthUser {
    pub fn require(&self, role: Role) -> std::result::Result<(), ApiError> {
        if self.role >= role {
            Ok(())
        } else {
            Err(Error::Forbidden(format!("{} role required", role.as_str())).into())
        }
    }
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| Error::Unauthorized("bearer token required".into()))?;
        let claims = state.tokens.verify(token.trim())?;
        let ctx = ClientInfo::from_parts(parts).context(claims.sub.clone());
        Ok(Self {
            sub: claims.sub,
            role: claims.role,
            ctx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_roundtrip_and_tamper() {
        let signer = TokenSigner::new("secret", 30);
        let (token, claims) = signer.issue("alice", Role::Manager).unwrap();
        assert_eq!(signer.verify(&token).unwrap(), claims);

        let (payload, signature) = token.split_once('.').unwrap();
        let forged = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&Claims {
                role: Role::Admin,
                ..claims.clone()
            })
            .unwrap(),
        );
        assert!(signer.verify(&format!("{}.{}", forged, signature)).is_err());
        assert!(signer.verify(payload).is_err());
        assert!(TokenSigner::new("other", 30).verify(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let signer = TokenSigner::new("secret", 30);
        let (token, _) = signer
            .issue_at("alice", Role::Admin, Utc::now() - Duration::hours(1))
            .unwrap();
        match signer.verify(&token) {
            Err(Error::Unauthorized(msg)) => assert_eq!(msg, "token expired"),
            other => panic!("expected expiry, got {:?}", other),
        }
    }

    #[test]
    fn test_role_resolution() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = AppConfig::new(transcargo_core::DataPaths::new(dir.path()).unwrap());
        config.admin_password = "pw".into();
        config.manager_users = vec!["maria".into()];
        config.viewer_users = vec!["victor".into()];

        assert_eq!(resolve_role(&config, "admin", "pw"), Some(Role::Admin));
        assert_eq!(resolve_role(&config, "maria", "pw"), Some(Role::Manager));
        assert_eq!(resolve_role(&config, "victor", "pw"), Some(Role::Viewer));
        assert_eq!(resolve_role(&config, "admin", "nope"), None);
        assert_eq!(resolve_role(&config, "mallory", "pw"), None);
        assert!(Role::Viewer < Role::Manager && Role::Manager < Role::Admin);
    }

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match("abc", "abc"));
        assert!(!secrets_match("abc", "abd"));
        assert!(!secrets_match("abc", "ab"));
    }
}
