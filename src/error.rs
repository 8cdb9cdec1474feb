use rocket::http::{ContentType, Status};
use rocket::response::Responder;
use rocket::{Request, Response};
use serde::Serialize;
use std::io::Cursor;
use thiserror::Error;
use tracing::error;
use validator::ValidationErrors;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Validation error: {0}")]
    InvalidInput(#[from] ValidationErrors),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Unauthorized")]
    Token {
        #[source]
        source: jsonwebtoken::errors::Error,
    },
    #[error("Forbidden")]
    Forbidden,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("User {0} already exists")]
    UserAlreadyExists(String),
    #[error("Internal server error")]
    Db {
        message: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("Internal server error")]
    Migration { message: String },
    #[error("Internal server error")]
    PasswordHash { message: String },
    #[error("Internal server error")]
    Configuration { message: String },
}

/// JSON body of every error response.
#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub message: String,
}

impl AppError {
    pub fn db(message: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Db {
            message: message.into(),
            source,
        }
    }

    pub fn password_hash(message: impl Into<String>, source: password_hash::Error) -> Self {
        Self::PasswordHash {
            message: format!("{}: {}", message.into(), source),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<&AppError> for Status {
    fn from(e: &AppError) -> Self {
        match e {
            AppError::Validation(_) => Status::BadRequest,
            AppError::InvalidInput(_) => Status::BadRequest,
            AppError::BadRequest(_) => Status::BadRequest,
            AppError::InvalidCredentials => Status::Unauthorized,
            AppError::Token { .. } => Status::Unauthorized,
            AppError::Forbidden => Status::Forbidden,
            AppError::NotFound(_) => Status::NotFound,
            AppError::UserAlreadyExists(_) => Status::Conflict,
            AppError::Db { .. } => Status::InternalServerError,
            AppError::Migration { .. } => Status::InternalServerError,
            AppError::PasswordHash { .. } => Status::InternalServerError,
            AppError::Configuration { .. } => Status::InternalServerError,
        }
    }
}

impl<'r> Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &Request<'_>) -> rocket::response::Result<'static> {
        let request_id = crate::middleware::RequestId::of(req);

        let user_id = req
            .local_cache(|| None::<crate::auth::CurrentUser>)
            .as_ref()
            .map(|u| u.id.to_string())
            .unwrap_or_else(|| "anonymous".to_string());

        error!(
            error = ?self,
            request_id = %request_id,
            user_id = %user_id,
            method = %req.method(),
            uri = %req.uri(),
            "request failed"
        );

        let status = Status::from(&self);
        let body = serde_json::to_string(&ErrorBody { message: self.to_string() }).map_err(|_| Status::InternalServerError)?;

        Response::build()
            .status(status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("Resource not found".to_string()),
            _ => AppError::db("Database error", e),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        AppError::Token { source: e }
    }
}

impl From<password_hash::Error> for AppError {
    fn from(e: password_hash::Error) -> Self {
        AppError::password_hash("Password hashing failed", e)
    }
}

impl From<figment::Error> for AppError {
    fn from(e: figment::Error) -> Self {
        AppError::Configuration {
            message: format!("Invalid configuration: {}", e),
        }
    }
}

impl From<rocket_cors::Error> for AppError {
    fn from(e: rocket_cors::Error) -> Self {
        AppError::Configuration {
            message: format!("Invalid CORS configuration: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_http_status() {
        assert_eq!(Status::from(&AppError::validation("bad month")), Status::BadRequest);
        assert_eq!(Status::from(&AppError::BadRequest("bad id".into())), Status::BadRequest);
        assert_eq!(Status::from(&AppError::InvalidCredentials), Status::Unauthorized);
        assert_eq!(Status::from(&AppError::Forbidden), Status::Forbidden);
        assert_eq!(Status::from(&AppError::NotFound("expense".into())), Status::NotFound);
        assert_eq!(Status::from(&AppError::UserAlreadyExists("a@b.c".into())), Status::Conflict);
        assert_eq!(Status::from(&AppError::from(sqlx::Error::PoolTimedOut)), Status::InternalServerError);
    }

    #[test]
    fn row_not_found_becomes_not_found() {
        assert!(matches!(AppError::from(sqlx::Error::RowNotFound), AppError::NotFound(_)));
    }

    #[test]
    fn internal_errors_do_not_leak_their_source() {
        let err = AppError::db("insert expense", sqlx::Error::PoolTimedOut);
        assert_eq!(err.to_string(), "Internal server error");
    }
}
