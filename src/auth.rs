use argon2::Argon2;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use once_cell::sync::Lazy;
use password_hash::rand_core::OsRng;
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use rocket::State;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::config::AuthConfig;
use crate::error::AppError;
use crate::models::{AuthResponse, LoginRequest, RegisterRequest, User, UserResponse};
use crate::store::{Repository, SharedRepository};

/// A real Argon2 hash used as a timing decoy so logins for unknown emails
/// cost the same as logins with a wrong password.
static DUMMY_HASH: Lazy<Option<String>> = Lazy::new(|| hash_password("dummy-never-matches").ok());

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub sid: Uuid,
    pub exp: usize,
}

/// Signing material and session lifetime, managed as Rocket state.
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    session_ttl: Duration,
}

impl TokenKeys {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            session_ttl: Duration::hours(config.session_ttl_hours),
        }
    }
}

/// The authenticated caller, resolved from a bearer token whose session is still active.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub session_id: Uuid,
}

#[derive(Debug)]
pub enum AuthError {
    Missing,
    Invalid,
    Revoked,
    Unavailable,
}

fn bearer_token(header: Option<&str>) -> Option<&str> {
    header?.strip_prefix("Bearer ").map(str::trim).filter(|t| !t.is_empty())
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CurrentUser {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let keys = match request.guard::<&State<TokenKeys>>().await {
            Outcome::Success(keys) => keys,
            _ => return Outcome::Error((Status::InternalServerError, AuthError::Unavailable)),
        };
        let repo = match request.guard::<&State<SharedRepository>>().await {
            Outcome::Success(repo) => repo,
            _ => return Outcome::Error((Status::InternalServerError, AuthError::Unavailable)),
        };

        let header = request.headers().get_one("Authorization");
        if header.is_none() {
            return Outcome::Error((Status::Unauthorized, AuthError::Missing));
        }

        let Some(token) = bearer_token(header) else {
            return Outcome::Error((Status::Unauthorized, AuthError::Invalid));
        };
        let claims = match validate_token(keys, token) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!(error = %e, "rejected bearer token");
                return Outcome::Error((Status::Unauthorized, AuthError::Invalid));
            }
        };

        match repo.get_active_session(&claims.sid, &claims.sub).await {
            Ok(Some(session)) => {
                let current_user = CurrentUser {
                    id: session.user_id,
                    session_id: session.id,
                };
                request.local_cache(|| Some(current_user.clone()));
                Outcome::Success(current_user)
            }
            Ok(None) => Outcome::Error((Status::Unauthorized, AuthError::Revoked)),
            Err(e) => {
                tracing::error!(error = ?e, "session lookup failed");
                Outcome::Error((Status::InternalServerError, AuthError::Unavailable))
            }
        }
    }
}

pub fn generate_token(keys: &TokenKeys, user_id: Uuid, session_id: Uuid, expires_at: chrono::DateTime<Utc>) -> Result<String, AppError> {
    let claims = Claims {
        sub: user_id,
        sid: session_id,
        exp: expires_at.timestamp() as usize,
    };

    Ok(encode(&Header::default(), &claims, &keys.encoding)?)
}

pub fn validate_token(keys: &TokenKeys, token: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(token, &keys.decoding, &Validation::default())?;
    Ok(token_data.claims)
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::password_hash("Failed to hash password", e))?;
    Ok(hash.to_string())
}

pub fn verify_password(user: &User, password: &str) -> Result<(), AppError> {
    let parsed = PasswordHash::new(&user.password_hash).map_err(|e| AppError::password_hash("Failed to parse stored password hash", e))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AppError::InvalidCredentials)
}

fn dummy_verify(password: &str) {
    if let Some(hash) = DUMMY_HASH.as_deref()
        && let Ok(parsed) = PasswordHash::new(hash)
    {
        let _ = Argon2::default().verify_password(password.as_bytes(), &parsed);
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

async fn issue_session(repo: &dyn Repository, keys: &TokenKeys, user: &User) -> Result<AuthResponse, AppError> {
    let expires_at = Utc::now() + keys.session_ttl;
    let session = repo.create_session(&user.id, expires_at).await?;
    let token = generate_token(keys, user.id, session.id, session.expires_at)?;

    Ok(AuthResponse {
        user: UserResponse::from(user),
        token,
    })
}

pub async fn register(repo: &dyn Repository, keys: &TokenKeys, mut request: RegisterRequest) -> Result<AuthResponse, AppError> {
    request.email = normalize_email(&request.email);
    request.name = request.name.trim().to_string();
    request.validate()?;
    let email = request.email;

    if repo.get_user_by_email(&email).await?.is_some() {
        return Err(AppError::UserAlreadyExists(email));
    }

    let password_hash = hash_password(&request.password)?;
    let user = repo.create_user(&request.name, &email, &password_hash).await?;
    tracing::info!(user_id = %user.id, "user registered");

    issue_session(repo, keys, &user).await
}

pub async fn login(repo: &dyn Repository, keys: &TokenKeys, mut request: LoginRequest) -> Result<AuthResponse, AppError> {
    request.email = normalize_email(&request.email);
    request.validate()?;

    let Some(user) = repo.get_user_by_email(&request.email).await? else {
        dummy_verify(&request.password);
        return Err(AppError::InvalidCredentials);
    };

    verify_password(&user, &request.password)?;
    tracing::info!(user_id = %user.id, "user logged in");

    issue_session(repo, keys, &user).await
}

pub async fn logout(repo: &dyn Repository, current_user: &CurrentUser) -> Result<(), AppError> {
    repo.delete_session(&current_user.session_id).await?;
    tracing::info!(user_id = %current_user.id, session_id = %current_user.session_id, "session closed");
    Ok(())
}
