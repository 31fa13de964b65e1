//! # Authentication
//!
//! Stateless JWT sessions and argon2 password hashes.
//!
//! - Tokens are HS256 with claims `{userId, iat, exp}`
//! - Handlers ask for a [`CurrentUser`], [`ContentManager`] or [`Admin`] to
//!   require a login, or for a [`Caller`] when a login is optional
//! - A token whose user no longer exists is treated like an invalid one
use std::sync::Arc;

use anyhow::anyhow;
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use axum::{extract::FromRequestParts, http::request::Parts};
use bank::models::{Role, User};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, state::State, utils::bearer_token};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: Uuid,
    pub iat: i64,
    pub exp: i64,
}

pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    /// Seconds.
    ttl: i64,
}

impl TokenKeys {
    pub fn new(secret: &str, ttl: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, user_id: Uuid) -> Result<String, AppError> {
        let iat = Utc::now().timestamp();
        self.sign(&Claims {
            user_id,
            iat,
            exp: iat + self.ttl,
        })
    }

    fn sign(&self, claims: &Claims) -> Result<String, AppError> {
        jsonwebtoken::encode(&Header::default(), claims, &self.encoding)
            .map_err(|e| AppError::Internal(anyhow!("JWT signing failed: {e}")))
    }

    /// `None` for a bad signature, a malformed token or an expired one.
    pub fn verify(&self, token: &str) -> Option<Claims> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .ok()
    }
}

pub struct Passwords {
    argon2: Argon2<'static>,
}

impl Passwords {
    pub fn new(memory_kib: u32) -> anyhow::Result<Self> {
        let params = Params::new(memory_kib, Params::DEFAULT_T_COST, Params::DEFAULT_P_COST, None)
            .map_err(|e| anyhow!("Invalid argon2 parameters: {e}"))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        let salt = SaltString::encode_b64(&salt)
            .map_err(|e| AppError::Internal(anyhow!("Salt encoding failed: {e}")))?;

        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Internal(anyhow!("Password hashing failed: {e}")))
    }

    /// Malformed stored hashes never match.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        PasswordHash::new(hash)
            .map(|parsed| {
                self.argon2
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }
}

/// Who is calling, when logging in is optional.
#[derive(Debug, Clone)]
pub enum Caller {
    Anonymous,
    Invalid,
    User(User),
}

impl Caller {
    pub fn user(self) -> Option<User> {
        match self {
            Caller::User(user) => Some(user),
            _ => None,
        }
    }

    pub fn require(self) -> Result<User, AppError> {
        match self {
            Caller::User(user) => Ok(user),
            Caller::Anonymous => Err(AppError::Unauthorized(
                "No token, authorization denied".to_string(),
            )),
            Caller::Invalid => Err(AppError::Unauthorized("Token is not valid".to_string())),
        }
    }
}

impl FromRequestParts<Arc<State>> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<State>) -> Result<Self, AppError> {
        let Some(token) = bearer_token(&parts.headers) else {
            return Ok(Caller::Anonymous);
        };
        let Some(claims) = state.tokens.verify(token) else {
            return Ok(Caller::Invalid);
        };

        Ok(match state.store.user_by_id(claims.user_id).await? {
            Some(user) => Caller::User(user),
            None => Caller::Invalid,
        })
    }
}

pub struct CurrentUser(pub User);

impl FromRequestParts<Arc<State>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<State>) -> Result<Self, AppError> {
        Caller::from_request_parts(parts, state)
            .await?
            .require()
            .map(CurrentUser)
    }
}

/// A repetitor or an admin.
pub struct ContentManager(pub User);

impl FromRequestParts<Arc<State>> for ContentManager {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<State>) -> Result<Self, AppError> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.role.can_manage_content() {
            return Err(AppError::Forbidden(
                "Access denied. Repetitor or admin only.".to_string(),
            ));
        }
        Ok(ContentManager(user))
    }
}

pub struct Admin(pub User);

impl FromRequestParts<Arc<State>> for Admin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<State>) -> Result<Self, AppError> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if user.role != Role::Admin {
            return Err(AppError::Forbidden("Access denied. Admin only.".to_string()));
        }
        Ok(Admin(user))
    }
}

/// Creators may edit their own content, admins anything.
pub fn ensure_owner_or_admin(user: &User, owner: Uuid) -> Result<(), AppError> {
    if user.id == owner || user.role == Role::Admin {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "You can only modify content you created".to_string(),
        ))
    }
}
