use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: u64,
    pub run_migrations: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub address: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Lifetime of a login session and of the token that references it.
    pub session_ttl_hours: i64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json_format: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CorsConfig {
    /// `["*"]` allows every origin.
    pub allowed_origins: Vec<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/expenses".to_string(),
            max_connections: 5,
            acquire_timeout: 5,
            run_migrations: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            address: "127.0.0.1".to_string(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "dev-secret-change-in-production".to_string(),
            session_ttl_hours: 24 * 7,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
        }
    }
}

impl Config {
    /// Load configuration from multiple sources in priority order:
    /// 1. built-in defaults
    /// 2. Expenses.toml
    /// 3. environment variables prefixed with EXPENSES_ (e.g. EXPENSES_AUTH_JWT_SECRET)
    /// 4. DATABASE_URL and JWT_SECRET for compatibility with plain deployments
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment(Toml::file("Expenses.toml")).extract()
    }

    fn figment(file: figment::providers::Data<Toml>) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(file)
            .merge(Env::prefixed("EXPENSES_").split("__"))
            .merge(Env::raw().only(&["DATABASE_URL"]).map(|_| "database.url".into()))
            .merge(Env::raw().only(&["JWT_SECRET"]).map(|_| "auth.jwt_secret".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_extracted_without_any_file() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load()?;
            assert_eq!(config.server.port, 8000);
            assert_eq!(config.auth.session_ttl_hours, 168);
            assert!(config.database.run_migrations);
            Ok(())
        });
    }

    #[test]
    fn toml_file_and_env_are_layered() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "Expenses.toml",
                r#"
                [server]
                port = 9000

                [logging]
                level = "debug"
                "#,
            )?;
            jail.set_env("EXPENSES_LOGGING__JSON_FORMAT", "true");
            jail.set_env("DATABASE_URL", "postgres://db/expenses_test");

            let config = Config::load()?;
            assert_eq!(config.server.port, 9000);
            assert_eq!(config.logging.level, "debug");
            assert!(config.logging.json_format);
            assert_eq!(config.database.url, "postgres://db/expenses_test");
            Ok(())
        });
    }

    #[test]
    fn jwt_secret_env_overrides_default() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("JWT_SECRET", "from-env");
            let config = Config::load()?;
            assert_eq!(config.auth.jwt_secret, "from-env");
            Ok(())
        });
    }
}
