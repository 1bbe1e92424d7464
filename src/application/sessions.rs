//! Opaque session tokens mapping a browser to a user.
//!
//! A token looks like `ys_<prefix>_<secret>`. The prefix is stored in clear
//! and locates the session row; only a SHA-256 digest of the secret is kept.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{CreateSessionParams, RepoError, SessionsRepo, UsersRepo};
use crate::domain::entities::SessionRecord;
use crate::domain::viewer::Viewer;

const TOKEN_PREFIX: &str = "ys";
const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("user `{0}` not found")]
    UnknownUser(String),
}

#[derive(Debug, Error)]
pub enum SessionAuthError {
    #[error("malformed session token")]
    Malformed,
    #[error("invalid session token")]
    Invalid,
    #[error("revoked session token")]
    Revoked,
    #[error(transparent)]
    Store(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct SessionIssued {
    pub record: SessionRecord,
    pub token: String,
}

#[derive(Clone)]
pub struct SessionService {
    sessions: Arc<dyn SessionsRepo>,
    users: Arc<dyn UsersRepo>,
}

impl SessionService {
    pub fn new(sessions: Arc<dyn SessionsRepo>, users: Arc<dyn UsersRepo>) -> Self {
        Self { sessions, users }
    }

    /// Mint a new token for `username`. The clear-text token is only ever returned here.
    pub async fn issue(&self, username: &str) -> Result<SessionIssued, SessionError> {
        let user = self
            .users
            .find_by_username(username)
            .await?
            .ok_or_else(|| SessionError::UnknownUser(username.to_string()))?;

        let prefix = generate_prefix();
        let secret = generate_secret();
        let token = format!("{TOKEN_PREFIX}_{prefix}_{secret}");

        let record = self
            .sessions
            .create_session(CreateSessionParams {
                user_id: user.id,
                prefix,
                hashed_secret: hash_secret(&secret),
            })
            .await?;

        Ok(SessionIssued { record, token })
    }

    pub async fn authenticate(&self, token: &str) -> Result<Viewer, SessionAuthError> {
        let parsed = parse_token(token.trim()).ok_or(SessionAuthError::Malformed)?;
        let record = self
            .sessions
            .find_by_prefix(&parsed.prefix)
            .await?
            .ok_or(SessionAuthError::Invalid)?;

        if let Some(revoked_at) = record.revoked_at
            && revoked_at <= OffsetDateTime::now_utc()
        {
            return Err(SessionAuthError::Revoked);
        }

        let hashed_input = hash_secret(&parsed.secret);
        if record.hashed_secret.ct_eq(&hashed_input).unwrap_u8() == 0 {
            return Err(SessionAuthError::Invalid);
        }

        Ok(Viewer::new(record.user_id, record.username))
    }
}

fn hash_secret(secret: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().to_vec()
}

fn generate_prefix() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

fn generate_secret() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

struct ParsedToken {
    prefix: String,
    secret: String,
}

fn parse_token(token: &str) -> Option<ParsedToken> {
    let mut parts = token.splitn(3, '_');
    if parts.next()? != TOKEN_PREFIX {
        return None;
    }
    let prefix = parts.next()?;
    let secret = parts.next()?;
    if secret.len() < MIN_SECRET_LEN || prefix.is_empty() {
        return None;
    }
    Some(ParsedToken {
        prefix: prefix.to_string(),
        secret: secret.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_token_splits_prefix_and_secret() {
        let secret = "a".repeat(MIN_SECRET_LEN);
        let parsed = parse_token(&format!("ys_abc123_{secret}")).expect("token");
        assert_eq!(parsed.prefix, "abc123");
        assert_eq!(parsed.secret, secret);
    }

    #[test]
    fn parse_token_rejects_foreign_or_short_tokens() {
        let secret = "a".repeat(MIN_SECRET_LEN);
        assert!(parse_token(&format!("sk_abc_{secret}")).is_none());
        assert!(parse_token("ys_abc_short").is_none());
        assert!(parse_token(&format!("ys__{secret}")).is_none());
        assert!(parse_token("garbage").is_none());
    }

    #[test]
    fn generated_parts_have_expected_shape() {
        assert_eq!(generate_prefix().len(), 12);
        assert!(generate_secret().len() >= MIN_SECRET_LEN);
        assert_eq!(hash_secret("x").len(), 32);
    }
}
