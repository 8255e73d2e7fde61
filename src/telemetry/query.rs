/// Telemetry query engine
///
/// Search filters form a priority chain rather than a combinable set: the
/// first matching branch wins, and a request with no filter at all is an
/// error rather than a full-table scan.
use crate::{
    db::models::TelemetryRecord,
    error::{AppError, AppResult},
};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

pub const DEFAULT_PAGE_SIZE: i64 = 10;

const TELEMETRY_COLUMNS: &str =
    "id, device_id, data_type, payload, timestamp, tenant_id, source, metadata, created_at";

/// Search parameters. `page` is zero-based.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub device_id: Option<String>,
    pub tenant_id: Option<String>,
    pub data_type: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub page: i64,
    pub size: i64,
}

/// Telemetry query service
pub struct TelemetryQueryEngine {
    db: SqlitePool,
}

impl TelemetryQueryEngine {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Run the priority-chain search
    pub async fn search(&self, filter: &SearchFilter) -> AppResult<Vec<TelemetryRecord>> {
        let size = if filter.size > 0 {
            filter.size
        } else {
            DEFAULT_PAGE_SIZE
        };
        let offset = filter.page.max(0) * size;

        if let (Some(device_id), Some(start), Some(end)) =
            (&filter.device_id, filter.start, filter.end)
        {
            return Ok(sqlx::query_as::<_, TelemetryRecord>(&format!(
                "SELECT {} FROM iot_data
                 WHERE device_id = ?1 AND timestamp >= ?2 AND timestamp <= ?3
                 ORDER BY timestamp DESC",
                TELEMETRY_COLUMNS
            ))
            .bind(device_id)
            .bind(start)
            .bind(end)
            .fetch_all(&self.db)
            .await?);
        }

        if let Some(device_id) = &filter.device_id {
            return Ok(sqlx::query_as::<_, TelemetryRecord>(&format!(
                "SELECT {} FROM iot_data WHERE device_id = ?1
                 ORDER BY timestamp DESC LIMIT ?2 OFFSET ?3",
                TELEMETRY_COLUMNS
            ))
            .bind(device_id)
            .bind(size)
            .bind(offset)
            .fetch_all(&self.db)
            .await?);
        }

        if let Some(tenant_id) = &filter.tenant_id {
            return Ok(sqlx::query_as::<_, TelemetryRecord>(&format!(
                "SELECT {} FROM iot_data WHERE tenant_id = ?1
                 ORDER BY timestamp DESC LIMIT ?2 OFFSET ?3",
                TELEMETRY_COLUMNS
            ))
            .bind(tenant_id)
            .bind(size)
            .bind(offset)
            .fetch_all(&self.db)
            .await?);
        }

        if let Some(data_type) = &filter.data_type {
            return Ok(sqlx::query_as::<_, TelemetryRecord>(&format!(
                "SELECT {} FROM iot_data WHERE data_type = ?1 ORDER BY timestamp DESC",
                TELEMETRY_COLUMNS
            ))
            .bind(data_type)
            .fetch_all(&self.db)
            .await?);
        }

        Err(AppError::MissingFilter)
    }

    /// The n most recent records for a device, newest first
    pub async fn latest(&self, device_id: &str, limit: i64) -> AppResult<Vec<TelemetryRecord>> {
        Ok(sqlx::query_as::<_, TelemetryRecord>(&format!(
            "SELECT {} FROM iot_data WHERE device_id = ?1 ORDER BY timestamp DESC LIMIT ?2",
            TELEMETRY_COLUMNS
        ))
        .bind(device_id)
        .bind(limit.max(0))
        .fetch_all(&self.db)
        .await?)
    }

    /// Count of records for a device at or after the cutoff
    pub async fn count_since(&self, device_id: &str, since: DateTime<Utc>) -> AppResult<i64> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM iot_data WHERE device_id = ?1 AND timestamp >= ?2",
        )
        .bind(device_id)
        .bind(since)
        .fetch_one(&self.db)
        .await?)
    }

    /// Delete records older than the cutoff; used by the retention job
    pub async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM iot_data WHERE timestamp < ?1")
            .bind(cutoff)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }
}
