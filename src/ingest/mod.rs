/// Telemetry ingestion
///
/// Inbound device messages arrive as (topic, payload) pairs on an abstract
/// message bus modeled as a tokio channel, so the normalization logic is
/// broker-agnostic and testable with synthetic messages. A message either
/// becomes a stored record or is dropped with a logged reason; the listener
/// loop never propagates an error.
use crate::{
    db::models::TelemetryRecord,
    error::{AppError, AppResult},
    metrics,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::mpsc;

const TELEMETRY_COLUMNS: &str =
    "id, device_id, data_type, payload, timestamp, tenant_id, source, metadata, created_at";

/// Origin of a telemetry record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Source {
    Mqtt,
    Rest,
    Webhook,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Mqtt => "MQTT",
            Source::Rest => "REST",
            Source::Webhook => "WEBHOOK",
        }
    }
}

/// Raw inbound message from the bus
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: String,
    /// Which transport delivered the message
    pub source: Source,
}

/// Outbound message to the bus
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: String,
}

/// A telemetry record ready to persist
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTelemetry {
    pub device_id: String,
    pub data_type: Option<String>,
    pub payload: String,
    /// Defaults to ingest time when absent
    pub timestamp: Option<DateTime<Utc>>,
    pub tenant_id: Option<String>,
    pub source: Option<String>,
    pub metadata: Option<String>,
}

/// Handle for publishing to the message bus
#[derive(Clone)]
pub struct MessageBus {
    outbound_tx: mpsc::Sender<OutboundMessage>,
}

impl MessageBus {
    /// Create a bus handle plus the receiver a transport adapter drains
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutboundMessage>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        (Self { outbound_tx }, outbound_rx)
    }

    /// Topic a device's data is published on
    pub fn data_topic(device_id: &str) -> String {
        format!("iot/devices/{}/data", device_id)
    }

    /// Topic a device receives commands on
    pub fn command_topic(device_id: &str) -> String {
        format!("iot/devices/{}/command", device_id)
    }

    pub async fn publish(&self, topic: String, payload: String) -> AppResult<()> {
        self.outbound_tx
            .send(OutboundMessage { topic, payload })
            .await
            .map_err(|_| AppError::ServiceUnavailable("message bus closed".to_string()))
    }

    pub async fn publish_command(&self, device_id: &str, payload: String) -> AppResult<()> {
        self.publish(Self::command_topic(device_id), payload).await
    }
}

/// Telemetry ingestion service
pub struct TelemetryIngestor {
    db: SqlitePool,
}

impl TelemetryIngestor {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Extract the device id from a topic such as `iot/devices/{id}/data`.
    /// Falls back to the last segment for non-standard topics.
    pub fn extract_device_id(topic: &str) -> Option<String> {
        if topic.is_empty() {
            return None;
        }

        let parts: Vec<&str> = topic.split('/').collect();

        let candidate = if parts.len() >= 3 && parts[1] == "devices" {
            parts[2]
        } else {
            parts[parts.len() - 1]
        };

        if candidate.is_empty() {
            None
        } else {
            Some(candidate.to_string())
        }
    }

    /// Normalize one bus message into a stored record
    pub async fn ingest_message(&self, message: &InboundMessage) -> AppResult<TelemetryRecord> {
        let device_id = Self::extract_device_id(&message.topic).ok_or_else(|| {
            AppError::Validation(format!(
                "Could not extract device ID from topic: {}",
                message.topic
            ))
        })?;

        // Embedded timestamp and tenant win over ingest-time defaults
        let embedded = serde_json::from_str::<serde_json::Value>(&message.payload).ok();
        let timestamp = embedded
            .as_ref()
            .and_then(|v| v.get("timestamp"))
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        let tenant_id = embedded
            .as_ref()
            .and_then(|v| v.get("tenantId"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        self.ingest(&NewTelemetry {
            device_id,
            data_type: Some("TELEMETRY".to_string()),
            payload: message.payload.clone(),
            timestamp,
            tenant_id,
            source: Some(message.source.as_str().to_string()),
            metadata: None,
        })
        .await
    }

    /// Persist one record
    pub async fn ingest(&self, record: &NewTelemetry) -> AppResult<TelemetryRecord> {
        if record.device_id.is_empty() {
            return Err(AppError::Validation("Device ID is required".to_string()));
        }

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO iot_data (device_id, data_type, payload, timestamp, tenant_id,
                                   source, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&record.device_id)
        .bind(&record.data_type)
        .bind(&record.payload)
        .bind(record.timestamp.unwrap_or(now))
        .bind(&record.tenant_id)
        .bind(&record.source)
        .bind(&record.metadata)
        .bind(now)
        .execute(&self.db)
        .await?;

        metrics::TELEMETRY_INGESTED_TOTAL
            .with_label_values(&[record.source.as_deref().unwrap_or("UNKNOWN")])
            .inc();

        self.get_record(result.last_insert_rowid()).await
    }

    /// Persist a batch atomically: any failure rolls the whole batch back
    pub async fn ingest_bulk(&self, records: &[NewTelemetry]) -> AppResult<Vec<TelemetryRecord>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        let mut ids = Vec::with_capacity(records.len());

        for record in records {
            if record.device_id.is_empty() {
                return Err(AppError::Validation("Device ID is required".to_string()));
            }

            let result = sqlx::query(
                "INSERT INTO iot_data (device_id, data_type, payload, timestamp, tenant_id,
                                       source, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .bind(&record.device_id)
            .bind(&record.data_type)
            .bind(&record.payload)
            .bind(record.timestamp.unwrap_or(now))
            .bind(&record.tenant_id)
            .bind(&record.source)
            .bind(&record.metadata)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            ids.push(result.last_insert_rowid());
        }

        tx.commit().await?;

        tracing::info!("Saved bulk telemetry: {} records", ids.len());

        let mut stored = Vec::with_capacity(ids.len());
        for id in ids {
            stored.push(self.get_record(id).await?);
        }
        Ok(stored)
    }

    /// Bus listener loop. Runs until the channel closes; a bad message is
    /// dropped and logged, never allowed to kill the task.
    pub async fn run(&self, mut inbound_rx: mpsc::Receiver<InboundMessage>) {
        tracing::info!("Telemetry listener started");

        while let Some(message) = inbound_rx.recv().await {
            tracing::debug!("Received message from topic: {}", message.topic);

            match self.ingest_message(&message).await {
                Ok(record) => {
                    tracing::info!(
                        "Processed telemetry for device: {} (record {})",
                        record.device_id,
                        record.id
                    );
                }
                Err(e) => {
                    metrics::TELEMETRY_DROPPED_TOTAL
                        .with_label_values(&[drop_reason(&e)])
                        .inc();
                    tracing::warn!("Dropped message from topic {}: {}", message.topic, e);
                }
            }
        }

        tracing::info!("Telemetry listener stopped: channel closed");
    }

    async fn get_record(&self, id: i64) -> AppResult<TelemetryRecord> {
        sqlx::query_as::<_, TelemetryRecord>(&format!(
            "SELECT {} FROM iot_data WHERE id = ?1",
            TELEMETRY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Telemetry record not found".to_string()))
    }
}

fn drop_reason(e: &AppError) -> &'static str {
    match e {
        AppError::Validation(_) => "invalid_message",
        AppError::Database(_) => "storage",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    const CREATE_DATA_TABLE: &str = r#"
        CREATE TABLE iot_data (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            device_id TEXT NOT NULL,
            data_type TEXT,
            payload TEXT NOT NULL,
            timestamp DATETIME NOT NULL,
            tenant_id TEXT,
            source TEXT,
            metadata TEXT,
            created_at DATETIME NOT NULL
        )
    "#;

    async fn test_ingestor() -> TelemetryIngestor {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        sqlx::query(CREATE_DATA_TABLE).execute(&pool).await.unwrap();
        TelemetryIngestor::new(pool)
    }

    #[test]
    fn device_id_from_standard_topic() {
        assert_eq!(
            TelemetryIngestor::extract_device_id("iot/devices/sensor-42/data"),
            Some("sensor-42".to_string())
        );
    }

    #[test]
    fn device_id_falls_back_to_last_segment() {
        assert_eq!(
            TelemetryIngestor::extract_device_id("telemetry/tank-7"),
            Some("tank-7".to_string())
        );
        assert_eq!(
            TelemetryIngestor::extract_device_id("sensor-9"),
            Some("sensor-9".to_string())
        );
    }

    #[test]
    fn unusable_topics_yield_none() {
        assert_eq!(TelemetryIngestor::extract_device_id(""), None);
        assert_eq!(TelemetryIngestor::extract_device_id("iot/data/"), None);
    }

    #[tokio::test]
    async fn message_is_normalized_and_stored() {
        let ingestor = test_ingestor().await;

        let record = ingestor
            .ingest_message(&InboundMessage {
                topic: "iot/devices/sensor-42/data".to_string(),
                payload: r#"{"level": 81.5}"#.to_string(),
                source: Source::Mqtt,
            })
            .await
            .unwrap();

        assert_eq!(record.device_id, "sensor-42");
        assert_eq!(record.data_type.as_deref(), Some("TELEMETRY"));
        assert_eq!(record.source.as_deref(), Some("MQTT"));
        assert_eq!(record.payload, r#"{"level": 81.5}"#);
    }

    #[tokio::test]
    async fn embedded_timestamp_and_tenant_are_used() {
        let ingestor = test_ingestor().await;

        let record = ingestor
            .ingest_message(&InboundMessage {
                topic: "iot/devices/sensor-42/data".to_string(),
                payload: r#"{"level": 10, "timestamp": "2026-08-01T10:30:00Z", "tenantId": "aq.mysuru"}"#
                    .to_string(),
                source: Source::Mqtt,
            })
            .await
            .unwrap();

        assert_eq!(
            record.timestamp,
            DateTime::parse_from_rfc3339("2026-08-01T10:30:00Z").unwrap()
        );
        assert_eq!(record.tenant_id.as_deref(), Some("aq.mysuru"));
    }

    #[tokio::test]
    async fn non_json_payload_defaults_to_ingest_time() {
        let ingestor = test_ingestor().await;
        let before = Utc::now();

        let record = ingestor
            .ingest_message(&InboundMessage {
                topic: "iot/devices/sensor-42/data".to_string(),
                payload: "42.7".to_string(),
                source: Source::Mqtt,
            })
            .await
            .unwrap();

        assert!(record.timestamp >= before);
        assert!(record.tenant_id.is_none());
    }

    #[tokio::test]
    async fn listener_survives_bad_messages() {
        let ingestor = std::sync::Arc::new(test_ingestor().await);
        let (tx, rx) = mpsc::channel(8);

        let listener = {
            let ingestor = ingestor.clone();
            tokio::spawn(async move { ingestor.run(rx).await })
        };

        // Empty topic is dropped; the next message still lands
        tx.send(InboundMessage {
            topic: "".to_string(),
            payload: "noise".to_string(),
            source: Source::Mqtt,
        })
        .await
        .unwrap();
        tx.send(InboundMessage {
            topic: "iot/devices/sensor-1/data".to_string(),
            payload: "1".to_string(),
            source: Source::Mqtt,
        })
        .await
        .unwrap();
        drop(tx);

        listener.await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM iot_data")
            .fetch_one(&ingestor.db)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn bulk_ingest_rejects_all_on_failure() {
        let ingestor = test_ingestor().await;

        let good = NewTelemetry {
            device_id: "sensor-1".to_string(),
            data_type: Some("TELEMETRY".to_string()),
            payload: "1".to_string(),
            timestamp: None,
            tenant_id: None,
            source: Some(Source::Rest.as_str().to_string()),
            metadata: None,
        };
        let bad = NewTelemetry {
            device_id: "".to_string(),
            ..good.clone()
        };

        assert!(ingestor.ingest_bulk(&[good.clone(), bad]).await.is_err());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM iot_data")
            .fetch_one(&ingestor.db)
            .await
            .unwrap();
        assert_eq!(count, 0, "failed batch must not leave partial rows");

        let stored = ingestor.ingest_bulk(&[good.clone(), good]).await.unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn bus_publish_reaches_the_transport() {
        let (bus, mut outbound_rx) = MessageBus::channel(4);

        bus.publish_command("sensor-42", "FLUSH".to_string())
            .await
            .unwrap();

        let msg = outbound_rx.recv().await.unwrap();
        assert_eq!(msg.topic, "iot/devices/sensor-42/command");
        assert_eq!(msg.payload, "FLUSH");
        assert_eq!(MessageBus::data_topic("sensor-42"), "iot/devices/sensor-42/data");
    }
}
