// Authentication: Telegram Mini App initData verification and request extractors.
//
// The Mini App sends its raw initData string as `Authorization: tma <initData>`.
// When a bot token is configured (and local mode is off) every player-scoped
// request must carry valid initData whose user id matches the path identity.

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    Json,
};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// initData older than this is rejected.
pub const MAX_INIT_DATA_AGE_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    Missing,
    #[error("Malformed initData: {0}")]
    Malformed(String),
    #[error("initData signature mismatch")]
    BadSignature,
    #[error("initData expired")]
    Expired,
}

/// The `user` field of initData.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl TelegramUser {
    pub fn identity(&self) -> String {
        self.id.to_string()
    }

    /// "First Last", falling back to the username.
    pub fn display_name(&self) -> Option<String> {
        let full = match &self.last_name {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name.clone(),
        };
        let full = full.trim();
        if !full.is_empty() {
            return Some(full.to_string());
        }
        self.username.clone().filter(|u| !u.is_empty())
    }
}

/// Parsed initData fields we use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitData {
    pub user: Option<TelegramUser>,
    pub auth_date: Option<i64>,
}

fn parse_pairs(init_data: &str) -> Result<Vec<(String, String)>, AuthError> {
    serde_urlencoded::from_str(init_data).map_err(|e| AuthError::Malformed(e.to_string()))
}

fn fields_of(pairs: &[(String, String)]) -> Result<InitData, AuthError> {
    let field = |name: &str| pairs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str());
    let user = field("user")
        .map(serde_json::from_str::<TelegramUser>)
        .transpose()
        .map_err(|e| AuthError::Malformed(format!("user: {e}")))?;
    let auth_date = field("auth_date")
        .map(str::parse::<i64>)
        .transpose()
        .map_err(|e| AuthError::Malformed(format!("auth_date: {e}")))?;
    Ok(InitData { user, auth_date })
}

/// Read initData without checking its signature. Only for unenforced mode.
pub fn parse_init_data(init_data: &str) -> Result<InitData, AuthError> {
    fields_of(&parse_pairs(init_data)?)
}

/// Sorted `key=value` lines of every field except `hash`.
fn data_check_string(pairs: &[(String, String)]) -> String {
    let mut lines: Vec<String> = pairs
        .iter()
        .filter(|(k, _)| k != "hash")
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    lines.sort();
    lines.join("\n")
}

fn init_data_mac(bot_token: &str, check_string: &str) -> Result<HmacSha256, AuthError> {
    let mut secret = HmacSha256::new_from_slice(b"WebAppData")
        .map_err(|e| AuthError::Malformed(e.to_string()))?;
    secret.update(bot_token.as_bytes());
    let secret = secret.finalize().into_bytes();

    let mut mac =
        HmacSha256::new_from_slice(&secret).map_err(|e| AuthError::Malformed(e.to_string()))?;
    mac.update(check_string.as_bytes());
    Ok(mac)
}

/// Hex signature Telegram would attach to these fields.
pub fn sign_init_data(pairs: &[(String, String)], bot_token: &str) -> Result<String, AuthError> {
    let mac = init_data_mac(bot_token, &data_check_string(pairs))?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a raw initData string against the bot token.
pub fn verify_init_data(init_data: &str, bot_token: &str) -> Result<InitData, AuthError> {
    let pairs = parse_pairs(init_data)?;
    let hash = pairs
        .iter()
        .find(|(k, _)| k == "hash")
        .map(|(_, v)| v.as_str())
        .ok_or_else(|| AuthError::Malformed("missing hash".into()))?;
    let expected = hex::decode(hash).map_err(|_| AuthError::BadSignature)?;

    let mac = init_data_mac(bot_token, &data_check_string(&pairs))?;
    mac.verify_slice(&expected)
        .map_err(|_| AuthError::BadSignature)?;

    let data = fields_of(&pairs)?;
    if let Some(auth_date) = data.auth_date {
        if chrono::Utc::now().timestamp() - auth_date > MAX_INIT_DATA_AGE_SECS {
            return Err(AuthError::Expired);
        }
    }
    Ok(data)
}

// ── Axum extractor: PlayerAuth ───────────────────────────────────────

/// Bot token shared with the extractors through request extensions.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub bot_token: Option<Arc<str>>,
}

impl AuthConfig {
    pub fn new(bot_token: Option<String>) -> Self {
        Self {
            bot_token: bot_token.filter(|t| !t.is_empty()).map(Arc::from),
        }
    }

    /// The token to verify against, or `None` when checks are off.
    fn enforced_token(&self) -> Option<&str> {
        if crate::config::is_local_mode() {
            return None;
        }
        self.bot_token.as_deref()
    }
}

/// The Telegram user behind a player-scoped request.
///
/// `verified` is false when checks are off; `user` is then whatever the
/// client sent, if anything.
#[derive(Debug, Clone)]
pub struct PlayerAuth {
    pub user: Option<TelegramUser>,
    pub verified: bool,
}

impl PlayerAuth {
    /// Reject a verified user acting on someone else's profile.
    pub fn check_identity(&self, identity: &str) -> Result<(), (StatusCode, Json<serde_json::Value>)> {
        match &self.user {
            Some(user) if self.verified && user.identity() != identity => Err((
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({"error": "initData user does not match profile"})),
            )),
            _ => Ok(()),
        }
    }

    pub fn display_name(&self) -> Option<String> {
        self.user.as_ref().and_then(TelegramUser::display_name)
    }
}

fn raw_init_data(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("tma "))
}

impl<S> FromRequestParts<S> for PlayerAuth
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let config = parts.extensions.get::<AuthConfig>().cloned().unwrap_or_default();
        let raw = raw_init_data(parts);

        let Some(token) = config.enforced_token() else {
            let user = raw
                .and_then(|r| parse_init_data(r).ok())
                .and_then(|d| d.user);
            return Ok(PlayerAuth {
                user,
                verified: false,
            });
        };

        let unauthorized = |e: AuthError| {
            tracing::debug!("Rejected initData: {e}");
            (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({"error": e.to_string()})),
            )
        };
        let raw = raw.ok_or_else(|| unauthorized(AuthError::Missing))?;
        let data = verify_init_data(raw, token).map_err(unauthorized)?;
        let user = data
            .user
            .ok_or_else(|| unauthorized(AuthError::Malformed("missing user".into())))?;
        Ok(PlayerAuth {
            user: Some(user),
            verified: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "123456:TEST-TOKEN";

    fn signed(fields: &[(&str, &str)], token: &str) -> String {
        let mut pairs: Vec<(String, String)> = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let hash = sign_init_data(&pairs, token).unwrap();
        pairs.push(("hash".into(), hash));
        serde_urlencoded::to_string(&pairs).unwrap()
    }

    fn now() -> String {
        chrono::Utc::now().timestamp().to_string()
    }

    const USER: &str = r#"{"id":42,"first_name":"Ann","last_name":"Lee","username":"annlee"}"#;

    #[test]
    fn test_valid_init_data_verifies() {
        let raw = signed(&[("query_id", "AAH"), ("user", USER), ("auth_date", now().as_str())], TOKEN);
        let data = verify_init_data(&raw, TOKEN).unwrap();
        let user = data.user.unwrap();
        assert_eq!(user.id, 42);
        assert_eq!(user.display_name().as_deref(), Some("Ann Lee"));
    }

    #[test]
    fn test_field_order_does_not_matter() {
        let auth_date = now();
        let raw = signed(&[("user", USER), ("auth_date", auth_date.as_str())], TOKEN);
        // Reorder the encoded pairs
        let mut parts: Vec<&str> = raw.split('&').collect();
        parts.reverse();
        assert!(verify_init_data(&parts.join("&"), TOKEN).is_ok());
    }

    #[test]
    fn test_wrong_token_is_rejected() {
        let raw = signed(&[("user", USER), ("auth_date", now().as_str())], TOKEN);
        assert_eq!(
            verify_init_data(&raw, "999:OTHER").unwrap_err(),
            AuthError::BadSignature
        );
    }

    #[test]
    fn test_tampered_field_is_rejected() {
        let raw = signed(&[("user", USER), ("auth_date", now().as_str())], TOKEN);
        let tampered = raw.replace("42", "43");
        assert_eq!(
            verify_init_data(&tampered, TOKEN).unwrap_err(),
            AuthError::BadSignature
        );
    }

    #[test]
    fn test_missing_hash_is_malformed() {
        let raw = serde_urlencoded::to_string([("user", USER)]).unwrap();
        assert!(matches!(
            verify_init_data(&raw, TOKEN).unwrap_err(),
            AuthError::Malformed(_)
        ));
    }

    #[test]
    fn test_stale_init_data_expires() {
        let old = (chrono::Utc::now().timestamp() - MAX_INIT_DATA_AGE_SECS - 60).to_string();
        let raw = signed(&[("user", USER), ("auth_date", old.as_str())], TOKEN);
        assert_eq!(verify_init_data(&raw, TOKEN).unwrap_err(), AuthError::Expired);
    }

    #[test]
    fn test_display_name_fallbacks() {
        let user: TelegramUser =
            serde_json::from_str(r#"{"id":1,"first_name":"","username":"nick"}"#).unwrap();
        assert_eq!(user.display_name().as_deref(), Some("nick"));

        let user: TelegramUser = serde_json::from_str(r#"{"id":1,"first_name":"Bo"}"#).unwrap();
        assert_eq!(user.display_name().as_deref(), Some("Bo"));

        let user: TelegramUser = serde_json::from_str(r#"{"id":1}"#).unwrap();
        assert_eq!(user.display_name(), None);
    }

    #[test]
    fn test_check_identity() {
        let user: TelegramUser = serde_json::from_str(USER).unwrap();
        let verified = PlayerAuth {
            user: Some(user.clone()),
            verified: true,
        };
        assert!(verified.check_identity("42").is_ok());
        assert_eq!(
            verified.check_identity("7").unwrap_err().0,
            StatusCode::FORBIDDEN
        );

        let unverified = PlayerAuth {
            user: Some(user),
            verified: false,
        };
        assert!(unverified.check_identity("7").is_ok());
    }

    #[test]
    fn test_empty_token_disables_checks() {
        assert!(AuthConfig::new(Some(String::new())).bot_token.is_none());
        assert!(AuthConfig::new(Some(TOKEN.into())).bot_token.is_some());
    }
}
