mod auth;
mod config;
mod db;
mod error;
mod json;
mod middleware;
mod models;
mod routes;
mod service;
mod store;
mod summary;

#[cfg(test)]
pub mod test_utils;

pub use config::Config;
pub use error::AppError;

use crate::auth::TokenKeys;
use crate::db::stage_db;
use crate::middleware::RequestLogger;
#[cfg(test)]
use crate::store::SharedRepository;
use rocket::figment::Figment;
use rocket::http::Method;
use rocket::{Build, Rocket};
use rocket_cors::{AllowedHeaders, AllowedOrigins, Cors, CorsOptions};
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(log_level: &str, json_format: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_line_number(true);

    if json_format {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn build_cors(cors_config: &config::CorsConfig) -> Result<Cors, AppError> {
    let is_wildcard = cors_config.allowed_origins.iter().any(|origin| origin == "*");

    let allowed_origins = if is_wildcard {
        AllowedOrigins::all()
    } else {
        AllowedOrigins::some_exact(&cors_config.allowed_origins.iter().map(String::as_str).collect::<Vec<_>>())
    };

    let cors = CorsOptions::default()
        .allowed_origins(allowed_origins)
        .allowed_methods(
            vec![Method::Get, Method::Post, Method::Delete, Method::Options]
                .into_iter()
                .map(From::from)
                .collect(),
        )
        .allowed_headers(AllowedHeaders::some(&["Content-Type", "Authorization", "Accept"]))
        .to_cors()?;

    Ok(cors)
}

fn rocket_figment(config: &Config) -> Figment {
    rocket::Config::figment()
        .merge(("port", config.server.port))
        .merge(("address", config.server.address.clone()))
}

fn base_rocket(config: &Config) -> Result<Rocket<Build>, AppError> {
    let cors = build_cors(&config.cors)?;

    Ok(rocket::custom(rocket_figment(config))
        .attach(RequestLogger)
        .attach(cors)
        .manage(TokenKeys::from_config(&config.auth))
        .mount("/api", routes::get_routes())
        .register("/", routes::get_catchers()))
}

/// Production instance: Postgres repository staged at ignite time.
pub fn build_rocket(config: Config) -> Result<Rocket<Build>, AppError> {
    Ok(base_rocket(&config)?.attach(stage_db(config.database)))
}

/// Instance backed by an in-memory repository.
#[cfg(test)]
pub(crate) fn build_rocket_with_repository(config: Config, repository: SharedRepository) -> Result<Rocket<Build>, AppError> {
    Ok(base_rocket(&config)?.manage(repository))
}
