/// Application context and dependency injection
use crate::{
    config::ServerConfig,
    credential::CredentialStore,
    db,
    devices::DeviceManager,
    error::AppResult,
    external::{self, HttpIdGenerator, HttpRoleRegistry, HttpSigningAuthority},
    ingest::{InboundMessage, MessageBus, OutboundMessage, TelemetryIngestor},
    mailer::Mailer,
    telemetry::{DeviceRegistry, TelemetryQueryEngine},
    token::TokenService,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Receivers handed to the background tasks at startup
pub struct IngestChannels {
    pub inbound_rx: mpsc::Receiver<InboundMessage>,
    pub outbound_rx: mpsc::Receiver<OutboundMessage>,
}

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub credentials: Arc<CredentialStore>,
    pub tokens: Arc<TokenService>,
    pub devices: Arc<DeviceManager>,
    pub ingestor: Arc<TelemetryIngestor>,
    pub query: Arc<TelemetryQueryEngine>,
    pub registry: Arc<DeviceRegistry>,
    pub mailer: Arc<Mailer>,
    pub bus: MessageBus,
    /// Handle for bus adapters injecting inbound messages
    pub ingest_tx: mpsc::Sender<InboundMessage>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> AppResult<(Self, IngestChannels)> {
        config.validate()?;

        // Initialize database
        let db = db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        // One outbound HTTP client shared by every collaborator
        let client = external::build_client(&config.external)?;
        let tenant_id = config.tenancy.state_tenant_id.clone();

        let signer = Arc::new(HttpSigningAuthority::new(
            client.clone(),
            config.external.signing_authority_host.clone(),
            tenant_id.clone(),
        ));
        let roles = Arc::new(HttpRoleRegistry::new(
            client.clone(),
            config.external.role_registry_host.clone(),
        ));
        let ids = Arc::new(HttpIdGenerator::new(
            client,
            config.external.id_generator_host.clone(),
        ));

        let credentials = Arc::new(CredentialStore::new(
            db.clone(),
            signer,
            roles,
            ids,
            tenant_id,
        ));
        let tokens = Arc::new(TokenService::new(config.auth.jwt_secret.clone()));
        let devices = Arc::new(DeviceManager::new(db.clone()));
        let ingestor = Arc::new(TelemetryIngestor::new(db.clone()));
        let query = Arc::new(TelemetryQueryEngine::new(db.clone()));
        let registry = Arc::new(DeviceRegistry::new(db.clone()));
        let mailer = Arc::new(Mailer::new(config.email.clone())?);

        let capacity = config.ingest.channel_capacity;
        let (bus, outbound_rx) = MessageBus::channel(capacity);
        let (ingest_tx, inbound_rx) = mpsc::channel(capacity);

        Ok((
            Self {
                config: Arc::new(config),
                db,
                credentials,
                tokens,
                devices,
                ingestor,
                query,
                registry,
                mailer,
                bus,
                ingest_tx,
            },
            IngestChannels {
                inbound_rx,
                outbound_rx,
            },
        ))
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
