/// Configuration management for Aquanode
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub tenancy: TenancyConfig,
    pub external: ExternalConfig,
    pub email: Option<EmailConfig>,
    pub ingest: IngestConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

/// Multi-tenancy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenancyConfig {
    /// State-level tenant used for collaborator calls (signing, id generation)
    pub state_tenant_id: String,
}

/// External collaborator endpoints. A `None` host means the collaborator is
/// not deployed; callers take their documented fallback path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalConfig {
    pub signing_authority_host: Option<String>,
    pub role_registry_host: Option<String>,
    pub id_generator_host: Option<String>,
    /// Bound on every outbound collaborator request, in seconds
    pub request_timeout_secs: u64,
}

/// Email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_url: String,
    pub from_address: String,
}

/// Telemetry ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Capacity of the inbound message channel
    pub channel_capacity: usize,
    /// Telemetry older than this is purged by the retention job; 0 disables
    pub retention_days: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("AQUA_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("AQUA_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| AppError::Validation("Invalid port number".to_string()))?;
        let version = env::var("AQUA_VERSION").unwrap_or_else(|_| "0.1.0".to_string());

        let data_directory: PathBuf = env::var("AQUA_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("AQUA_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("aquanode.sqlite"));

        let jwt_secret = env::var("AQUA_JWT_SECRET")
            .map_err(|_| AppError::Validation("JWT secret required".to_string()))?;

        let state_tenant_id =
            env::var("AQUA_STATE_TENANT_ID").unwrap_or_else(|_| "aq".to_string());

        let external = ExternalConfig {
            signing_authority_host: env::var("AQUA_ENC_SERVICE_HOST").ok(),
            role_registry_host: env::var("AQUA_ROLE_REGISTRY_HOST").ok(),
            id_generator_host: env::var("AQUA_IDGEN_HOST").ok(),
            request_timeout_secs: env::var("AQUA_EXTERNAL_TIMEOUT_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
        };

        let email = if let Ok(smtp_url) = env::var("AQUA_EMAIL_SMTP_URL") {
            Some(EmailConfig {
                smtp_url,
                from_address: env::var("AQUA_EMAIL_FROM_ADDRESS")
                    .unwrap_or_else(|_| format!("noreply@{}", hostname)),
            })
        } else {
            None
        };

        let ingest = IngestConfig {
            channel_capacity: env::var("AQUA_INGEST_CHANNEL_CAPACITY")
                .unwrap_or_else(|_| "1024".to_string())
                .parse()
                .unwrap_or(1024),
            retention_days: env::var("AQUA_TELEMETRY_RETENTION_DAYS")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .unwrap_or(0),
        };

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            storage: StorageConfig {
                data_directory,
                database,
            },
            auth: AuthConfig { jwt_secret },
            tenancy: TenancyConfig { state_tenant_id },
            external,
            email,
            ingest,
            logging: LoggingConfig { level: log_level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.service.hostname.is_empty() {
            return Err(AppError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.auth.jwt_secret.len() < 32 {
            return Err(AppError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        Ok(())
    }
}
