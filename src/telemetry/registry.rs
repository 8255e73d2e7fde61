/// Tenant-scoped device catalog
use crate::{
    db::models::DeviceRegistration,
    error::{AppError, AppResult},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use validator::Validate;

const REGISTRATION_COLUMNS: &str = "id, device_id, device_name, device_type, location, status, \
     tenant_id, metadata, created_at, updated_at, created_by, updated_by";

const VALID_STATUSES: [&str; 3] = ["ACTIVE", "INACTIVE", "MAINTENANCE"];

/// Device registration request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDeviceRequest {
    #[validate(length(min = 1, message = "Device ID is required"))]
    pub device_id: String,
    #[validate(length(min = 1, message = "Device name is required"))]
    pub device_name: String,
    pub device_type: Option<String>,
    pub location: Option<String>,
    pub status: Option<String>,
    pub tenant_id: Option<String>,
    pub metadata: Option<String>,
    pub created_by: Option<String>,
}

/// Device update request; absent fields keep their value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDeviceRequest {
    pub device_name: Option<String>,
    pub device_type: Option<String>,
    pub location: Option<String>,
    pub status: Option<String>,
    pub metadata: Option<String>,
    pub updated_by: Option<String>,
}

/// Device catalog service
pub struct DeviceRegistry {
    db: SqlitePool,
}

impl DeviceRegistry {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Register a new device; device ids are unique across the catalog
    pub async fn register(&self, req: &RegisterDeviceRequest) -> AppResult<DeviceRegistration> {
        let status = match &req.status {
            Some(s) => validate_status(s)?.to_string(),
            None => "ACTIVE".to_string(),
        };

        let exists: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM iot_devices WHERE device_id = ?1")
                .bind(&req.device_id)
                .fetch_one(&self.db)
                .await?;
        if exists > 0 {
            return Err(AppError::Conflict(format!(
                "Device with ID {} already exists",
                req.device_id
            )));
        }

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO iot_devices (device_id, device_name, device_type, location, status,
                                      tenant_id, metadata, created_at, updated_at, created_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, ?9)",
        )
        .bind(&req.device_id)
        .bind(&req.device_name)
        .bind(&req.device_type)
        .bind(&req.location)
        .bind(&status)
        .bind(&req.tenant_id)
        .bind(&req.metadata)
        .bind(now)
        .bind(&req.created_by)
        .execute(&self.db)
        .await?;

        tracing::info!("Registered new device: {}", req.device_id);
        self.get_by_row_id(result.last_insert_rowid()).await
    }

    /// Update device attributes
    pub async fn update(
        &self,
        device_id: &str,
        req: &UpdateDeviceRequest,
    ) -> AppResult<DeviceRegistration> {
        let existing = self.get(device_id).await?;

        let status = match &req.status {
            Some(s) => validate_status(s)?.to_string(),
            None => existing.status.clone(),
        };

        sqlx::query(
            "UPDATE iot_devices
             SET device_name = ?1, device_type = ?2, location = ?3, status = ?4,
                 metadata = ?5, updated_by = ?6, updated_at = ?7
             WHERE device_id = ?8",
        )
        .bind(req.device_name.as_ref().unwrap_or(&existing.device_name))
        .bind(req.device_type.as_ref().or(existing.device_type.as_ref()))
        .bind(req.location.as_ref().or(existing.location.as_ref()))
        .bind(&status)
        .bind(req.metadata.as_ref().or(existing.metadata.as_ref()))
        .bind(req.updated_by.as_ref().or(existing.updated_by.as_ref()))
        .bind(Utc::now())
        .bind(device_id)
        .execute(&self.db)
        .await?;

        tracing::info!("Updated device: {}", device_id);
        self.get(device_id).await
    }

    /// Update only the status field
    pub async fn update_status(&self, device_id: &str, status: &str) -> AppResult<DeviceRegistration> {
        validate_status(status)?;
        self.get(device_id).await?;

        sqlx::query("UPDATE iot_devices SET status = ?1, updated_at = ?2 WHERE device_id = ?3")
            .bind(status)
            .bind(Utc::now())
            .bind(device_id)
            .execute(&self.db)
            .await?;

        tracing::info!("Updated device status: {} to {}", device_id, status);
        self.get(device_id).await
    }

    /// Get a device by its catalog id
    pub async fn get(&self, device_id: &str) -> AppResult<DeviceRegistration> {
        sqlx::query_as::<_, DeviceRegistration>(&format!(
            "SELECT {} FROM iot_devices WHERE device_id = ?1",
            REGISTRATION_COLUMNS
        ))
        .bind(device_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Device not found: {}", device_id)))
    }

    /// List devices, optionally narrowed by tenant, type, or status
    pub async fn list(
        &self,
        tenant_id: Option<&str>,
        device_type: Option<&str>,
        status: Option<&str>,
    ) -> AppResult<Vec<DeviceRegistration>> {
        let base = format!("SELECT {} FROM iot_devices", REGISTRATION_COLUMNS);

        let rows = if let Some(tenant_id) = tenant_id {
            sqlx::query_as::<_, DeviceRegistration>(&format!(
                "{} WHERE tenant_id = ?1 ORDER BY id",
                base
            ))
            .bind(tenant_id)
            .fetch_all(&self.db)
            .await?
        } else if let Some(device_type) = device_type {
            sqlx::query_as::<_, DeviceRegistration>(&format!(
                "{} WHERE device_type = ?1 ORDER BY id",
                base
            ))
            .bind(device_type)
            .fetch_all(&self.db)
            .await?
        } else if let Some(status) = status {
            sqlx::query_as::<_, DeviceRegistration>(&format!(
                "{} WHERE status = ?1 ORDER BY id",
                base
            ))
            .bind(status)
            .fetch_all(&self.db)
            .await?
        } else {
            sqlx::query_as::<_, DeviceRegistration>(&format!("{} ORDER BY id", base))
                .fetch_all(&self.db)
                .await?
        };

        Ok(rows)
    }

    /// Remove a device from the catalog
    pub async fn delete(&self, device_id: &str) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM iot_devices WHERE device_id = ?1")
            .bind(device_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Device not found: {}", device_id)));
        }

        tracing::info!("Deleted device: {}", device_id);
        Ok(())
    }

    async fn get_by_row_id(&self, id: i64) -> AppResult<DeviceRegistration> {
        sqlx::query_as::<_, DeviceRegistration>(&format!(
            "SELECT {} FROM iot_devices WHERE id = ?1",
            REGISTRATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Device not found".to_string()))
    }
}

fn validate_status(status: &str) -> AppResult<&str> {
    if VALID_STATUSES.contains(&status) {
        Ok(status)
    } else {
        Err(AppError::Validation(format!(
            "Invalid device status: {}",
            status
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_registry() -> DeviceRegistry {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        sqlx::query(
            r#"
            CREATE TABLE iot_devices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                device_id TEXT NOT NULL UNIQUE,
                device_name TEXT NOT NULL,
                device_type TEXT,
                location TEXT,
                status TEXT NOT NULL DEFAULT 'ACTIVE',
                tenant_id TEXT,
                metadata TEXT,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL,
                created_by TEXT,
                updated_by TEXT
            )
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();
        DeviceRegistry::new(pool)
    }

    fn request(device_id: &str, tenant: &str) -> RegisterDeviceRequest {
        RegisterDeviceRequest {
            device_id: device_id.to_string(),
            device_name: format!("{} sensor", device_id),
            device_type: Some("level-sensor".to_string()),
            location: Some("rooftop".to_string()),
            status: None,
            tenant_id: Some(tenant.to_string()),
            metadata: None,
            created_by: Some("admin@example.com".to_string()),
        }
    }

    #[tokio::test]
    async fn register_defaults_to_active() {
        let registry = test_registry().await;

        let device = registry.register(&request("sensor-1", "aq")).await.unwrap();
        assert_eq!(device.status, "ACTIVE");
        assert_eq!(device.device_id, "sensor-1");
    }

    #[tokio::test]
    async fn duplicate_device_id_conflicts() {
        let registry = test_registry().await;

        registry.register(&request("sensor-1", "aq")).await.unwrap();
        assert!(matches!(
            registry.register(&request("sensor-1", "aq")).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn update_patches_fields_and_bumps_updated_at() {
        let registry = test_registry().await;

        let created = registry.register(&request("sensor-1", "aq")).await.unwrap();
        let updated = registry
            .update(
                "sensor-1",
                &UpdateDeviceRequest {
                    location: Some("basement".to_string()),
                    updated_by: Some("ops@example.com".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.location.as_deref(), Some("basement"));
        assert_eq!(updated.device_name, created.device_name);
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn status_transitions_are_validated() {
        let registry = test_registry().await;

        registry.register(&request("sensor-1", "aq")).await.unwrap();

        let device = registry
            .update_status("sensor-1", "MAINTENANCE")
            .await
            .unwrap();
        assert_eq!(device.status, "MAINTENANCE");

        assert!(matches!(
            registry.update_status("sensor-1", "BROKEN").await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn list_narrows_by_tenant_type_and_status() {
        let registry = test_registry().await;

        registry.register(&request("sensor-1", "aq.mysuru")).await.unwrap();
        registry.register(&request("sensor-2", "aq.mysuru")).await.unwrap();
        let mut other = request("pump-1", "aq.hubli");
        other.device_type = Some("pump".to_string());
        registry.register(&other).await.unwrap();
        registry.update_status("pump-1", "INACTIVE").await.unwrap();

        assert_eq!(
            registry.list(Some("aq.mysuru"), None, None).await.unwrap().len(),
            2
        );
        assert_eq!(registry.list(None, Some("pump"), None).await.unwrap().len(), 1);
        assert_eq!(
            registry.list(None, None, Some("INACTIVE")).await.unwrap().len(),
            1
        );
        assert_eq!(registry.list(None, None, None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn delete_missing_device_is_not_found() {
        let registry = test_registry().await;

        assert!(matches!(
            registry.delete("ghost").await,
            Err(AppError::NotFound(_))
        ));

        registry.register(&request("sensor-1", "aq")).await.unwrap();
        registry.delete("sensor-1").await.unwrap();
        assert!(matches!(
            registry.get("sensor-1").await,
            Err(AppError::NotFound(_))
        ));
    }
}
