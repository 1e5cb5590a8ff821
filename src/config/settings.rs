use std::env;
use std::path::PathBuf;
use crate::error::AppError;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppSettings {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub security: SecurityConfig,
    pub uploads: UploadConfig,
    pub azure: Option<AzureConfig>,
    pub bootstrap: BootstrapConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    pub name: String,
    pub environment: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub run_migrations: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    pub ttl_minutes: i64,
    pub cleanup_interval_secs: u64,
    pub secure_cookie: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Secret used to sign media share links.
    pub token_secret: String,
    pub share_link_hours: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    pub dir: PathBuf,
    pub max_bytes: usize,
    /// Ceiling on all file parts of one multipart submission.
    pub max_total_bytes: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AzureConfig {
    pub account_name: String,
    /// Base64 encoded storage account key.
    pub account_key: String,
    pub blob_endpoint: String,
    pub sas_max_hours: i64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BootstrapConfig {
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl AppSettings {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from any key lookup. `from_env` passes the process
    /// environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // App config
        let app_name = var_or("APP_NAME", "Client Portal");
        let environment = var_or("ENVIRONMENT", "development");

        // Database config
        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| AppError::Configuration("DATABASE_URL must be set".to_string()))?;
        let max_connections = var_or("DATABASE_MAX_CONNECTIONS", "10")
            .parse::<u32>()
            .map_err(|_| AppError::Configuration("DATABASE_MAX_CONNECTIONS must be a valid number".to_string()))?;
        let run_migrations = parse_bool(&var_or("RUN_MIGRATIONS", "true"), "RUN_MIGRATIONS")?;

        // Server config
        let server_host = var_or("SERVER_HOST", "0.0.0.0");
        let server_port = var_or("SERVER_PORT", "8080")
            .parse::<u16>()
            .map_err(|_| AppError::Configuration("SERVER_PORT must be a valid port number".to_string()))?;
        let server_url = lookup("SERVER_URL")
            .unwrap_or_else(|| format!("http://{}:{}", server_host, server_port));

        // Sessions
        let ttl_minutes = var_or("SESSION_TTL_MINUTES", "120")
            .parse::<i64>()
            .map_err(|_| AppError::Configuration("SESSION_TTL_MINUTES must be a valid number".to_string()))?;
        if ttl_minutes <= 0 {
            return Err(AppError::Configuration("SESSION_TTL_MINUTES must be positive".to_string()));
        }
        let cleanup_interval_secs = var_or("SESSION_CLEANUP_INTERVAL_SECS", "300")
            .parse::<u64>()
            .map_err(|_| AppError::Configuration("SESSION_CLEANUP_INTERVAL_SECS must be a valid number".to_string()))?;
        let secure_cookie = parse_bool(
            &var_or("SESSION_COOKIE_SECURE", if environment == "production" { "true" } else { "false" }),
            "SESSION_COOKIE_SECURE",
        )?;

        // Security
        let token_secret = lookup("TOKEN_SECRET")
            .ok_or_else(|| AppError::Configuration("TOKEN_SECRET must be set".to_string()))?;
        if token_secret.len() < 32 {
            return Err(AppError::Configuration("TOKEN_SECRET must be at least 32 characters long".to_string()));
        }
        let share_link_hours = var_or("SHARE_LINK_HOURS", "72")
            .parse::<i64>()
            .map_err(|_| AppError::Configuration("SHARE_LINK_HOURS must be a valid number".to_string()))?;

        // Uploads
        let upload_dir = PathBuf::from(var_or("UPLOAD_DIR", "./uploads"));
        let upload_max_bytes = var_or("UPLOAD_MAX_BYTES", "10485760")
            .parse::<usize>()
            .map_err(|_| AppError::Configuration("UPLOAD_MAX_BYTES must be a valid number".to_string()))?;
        let upload_max_total_bytes = match lookup("UPLOAD_MAX_TOTAL_BYTES") {
            Some(value) => value
                .parse::<usize>()
                .map_err(|_| AppError::Configuration("UPLOAD_MAX_TOTAL_BYTES must be a valid number".to_string()))?,
            None => upload_max_bytes.saturating_mul(4),
        };
        if upload_max_total_bytes < upload_max_bytes {
            return Err(AppError::Configuration(
                "UPLOAD_MAX_TOTAL_BYTES must not be smaller than UPLOAD_MAX_BYTES".to_string(),
            ));
        }

        // Azure is optional; both account and key must be present together
        let azure = match (lookup("AZURE_STORAGE_ACCOUNT"), lookup("AZURE_STORAGE_KEY")) {
            (Some(account_name), Some(account_key)) => {
                let blob_endpoint = lookup("AZURE_BLOB_ENDPOINT")
                    .unwrap_or_else(|| format!("https://{}.blob.core.windows.net", account_name));
                let sas_max_hours = var_or("AZURE_SAS_MAX_HOURS", "168")
                    .parse::<i64>()
                    .map_err(|_| AppError::Configuration("AZURE_SAS_MAX_HOURS must be a valid number".to_string()))?;
                Some(AzureConfig {
                    account_name,
                    account_key,
                    blob_endpoint: blob_endpoint.trim_end_matches('/').to_string(),
                    sas_max_hours,
                })
            }
            (None, None) => None,
            _ => {
                return Err(AppError::Configuration(
                    "AZURE_STORAGE_ACCOUNT and AZURE_STORAGE_KEY must be set together".to_string(),
                ));
            }
        };

        let bootstrap = BootstrapConfig {
            admin_email: lookup("ADMIN_EMAIL").filter(|v| !v.trim().is_empty()),
            admin_password: lookup("ADMIN_PASSWORD").filter(|v| !v.is_empty()),
        };

        Ok(Self {
            app: AppConfig {
                name: app_name,
                environment,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections,
                run_migrations,
            },
            server: ServerConfig {
                host: server_host,
                port: server_port,
                url: server_url,
            },
            session: SessionConfig {
                ttl_minutes,
                cleanup_interval_secs,
                secure_cookie,
            },
            security: SecurityConfig {
                token_secret,
                share_link_hours,
            },
            uploads: UploadConfig {
                dir: upload_dir,
                max_bytes: upload_max_bytes,
                max_total_bytes: upload_max_total_bytes,
            },
            azure,
            bootstrap,
        })
    }
}

fn parse_bool(value: &str, key: &str) -> Result<bool, AppError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::Configuration(format!("{} must be true or false", key))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_defaults_applied() {
        let settings = AppSettings::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/portal"),
            ("TOKEN_SECRET", SECRET),
        ]))
        .unwrap();

        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.session.ttl_minutes, 120);
        assert!(!settings.session.secure_cookie);
        assert!(settings.azure.is_none());
        assert_eq!(settings.uploads.max_bytes, 10 * 1024 * 1024);
        assert_eq!(settings.uploads.max_total_bytes, 40 * 1024 * 1024);
    }

    #[test]
    fn test_upload_total_below_single_file_is_rejected() {
        let result = AppSettings::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/portal"),
            ("TOKEN_SECRET", SECRET),
            ("UPLOAD_MAX_BYTES", "2048"),
            ("UPLOAD_MAX_TOTAL_BYTES", "1024"),
        ]));
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }

    #[test]
    fn test_missing_database_url_is_rejected() {
        let result = AppSettings::from_lookup(lookup_from(&[("TOKEN_SECRET", SECRET)]));
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }

    #[test]
    fn test_short_token_secret_is_rejected() {
        let result = AppSettings::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/portal"),
            ("TOKEN_SECRET", "short"),
        ]));
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }

    #[test]
    fn test_azure_requires_account_and_key() {
        let result = AppSettings::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/portal"),
            ("TOKEN_SECRET", SECRET),
            ("AZURE_STORAGE_ACCOUNT", "acme"),
        ]));
        assert!(result.is_err());

        let settings = AppSettings::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/portal"),
            ("TOKEN_SECRET", SECRET),
            ("AZURE_STORAGE_ACCOUNT", "acme"),
            ("AZURE_STORAGE_KEY", "a2V5"),
        ]))
        .unwrap();
        let azure = settings.azure.unwrap();
        assert_eq!(azure.blob_endpoint, "https://acme.blob.core.windows.net");
        assert_eq!(azure.sas_max_hours, 168);
    }

    #[test]
    fn test_production_defaults_to_secure_cookie() {
        let settings = AppSettings::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/portal"),
            ("TOKEN_SECRET", SECRET),
            ("ENVIRONMENT", "production"),
        ]))
        .unwrap();
        assert!(settings.session.secure_cookie);
    }
}
