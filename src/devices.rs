/// Per-user device records
///
/// Two invariants live here: at most one device per user carries the
/// primary flag, and a user always keeps at least one device. Primary-flag
/// maintenance clears siblings and sets the new flag inside a single
/// transaction so concurrent requests cannot observe a dual-primary state.
use crate::{
    db::models::UserDevice,
    error::{AppError, AppResult},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

const DEVICE_COLUMNS: &str = "id, user_id, device_id, saviour, device_sim_no, house_type, \
     sensor_type, os, browser, is_primary, status, created_at, updated_at";

/// Add/update payload for a user device
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceParams {
    pub device_id: Option<String>,
    pub saviour: Option<String>,
    pub device_sim_no: Option<String>,
    pub house_type: Option<String>,
    pub sensor_type: Option<String>,
    pub os: Option<String>,
    pub browser: Option<String>,
    pub is_primary: Option<bool>,
    pub status: Option<String>,
}

/// Device record service
pub struct DeviceManager {
    db: SqlitePool,
}

impl DeviceManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// List devices for a user
    pub async fn list_devices(&self, user_id: i64) -> AppResult<Vec<UserDevice>> {
        Ok(sqlx::query_as::<_, UserDevice>(&format!(
            "SELECT {} FROM user_devices WHERE user_id = ?1 ORDER BY id",
            DEVICE_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.db)
        .await?)
    }

    /// Get one device belonging to a user
    pub async fn get_device(&self, user_id: i64, device_row_id: i64) -> AppResult<UserDevice> {
        sqlx::query_as::<_, UserDevice>(&format!(
            "SELECT {} FROM user_devices WHERE user_id = ?1 AND id = ?2",
            DEVICE_COLUMNS
        ))
        .bind(user_id)
        .bind(device_row_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Device not found for this user".to_string()))
    }

    /// Add a device to a user
    ///
    /// When the new device is primary, siblings lose the flag in the same
    /// transaction.
    pub async fn add_device(&self, user_id: i64, params: &DeviceParams) -> AppResult<UserDevice> {
        let device_id = params
            .device_id
            .clone()
            .or_else(|| params.device_sim_no.clone())
            .ok_or_else(|| AppError::Validation("Device ID is required".to_string()))?;

        let is_primary = params.is_primary.unwrap_or(false);
        let status = params.status.clone().unwrap_or_else(|| "active".to_string());
        let now = Utc::now();

        let mut tx = self.db.begin().await?;

        if is_primary {
            sqlx::query(
                "UPDATE user_devices SET is_primary = 0, updated_at = ?1 WHERE user_id = ?2",
            )
            .bind(now)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        }

        let result = sqlx::query(
            "INSERT INTO user_devices (user_id, device_id, saviour, device_sim_no, house_type,
                                       sensor_type, os, browser, is_primary, status,
                                       created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
        )
        .bind(user_id)
        .bind(&device_id)
        .bind(&params.saviour)
        .bind(&params.device_sim_no)
        .bind(&params.house_type)
        .bind(&params.sensor_type)
        .bind(&params.os)
        .bind(&params.browser)
        .bind(is_primary)
        .bind(&status)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict(format!(
                "Device {} already exists for this user",
                device_id
            )),
            _ => AppError::Database(e),
        })?;

        tx.commit().await?;

        let device = self.get_device(user_id, result.last_insert_rowid()).await?;
        tracing::info!(
            "Device added successfully with ID: {} for user ID: {}",
            device.id,
            user_id
        );
        Ok(device)
    }

    /// Update a device's attributes
    pub async fn update_device(
        &self,
        user_id: i64,
        device_row_id: i64,
        params: &DeviceParams,
    ) -> AppResult<UserDevice> {
        let device = self.get_device(user_id, device_row_id).await?;
        let now = Utc::now();

        let mut tx = self.db.begin().await?;

        if params.is_primary == Some(true) {
            sqlx::query(
                "UPDATE user_devices SET is_primary = 0, updated_at = ?1
                 WHERE user_id = ?2 AND id != ?3",
            )
            .bind(now)
            .bind(user_id)
            .bind(device_row_id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "UPDATE user_devices
             SET saviour = ?1, device_sim_no = ?2, house_type = ?3, sensor_type = ?4,
                 os = ?5, browser = ?6, is_primary = ?7, status = ?8, updated_at = ?9
             WHERE id = ?10",
        )
        .bind(params.saviour.as_ref().or(device.saviour.as_ref()))
        .bind(params.device_sim_no.as_ref().or(device.device_sim_no.as_ref()))
        .bind(params.house_type.as_ref().or(device.house_type.as_ref()))
        .bind(params.sensor_type.as_ref().or(device.sensor_type.as_ref()))
        .bind(params.os.as_ref().or(device.os.as_ref()))
        .bind(params.browser.as_ref().or(device.browser.as_ref()))
        .bind(params.is_primary.unwrap_or(device.is_primary))
        .bind(params.status.as_ref().unwrap_or(&device.status))
        .bind(now)
        .bind(device_row_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!("Device updated successfully with ID: {}", device_row_id);
        self.get_device(user_id, device_row_id).await
    }

    /// Delete a device, refusing to remove the user's last one
    pub async fn delete_device(&self, user_id: i64, device_row_id: i64) -> AppResult<()> {
        let count = self.count_devices(user_id).await?;
        if count <= 1 {
            return Err(AppError::Validation(
                "Cannot delete the last device. User must have at least one device.".to_string(),
            ));
        }

        self.get_device(user_id, device_row_id).await?;

        sqlx::query("DELETE FROM user_devices WHERE user_id = ?1 AND id = ?2")
            .bind(user_id)
            .bind(device_row_id)
            .execute(&self.db)
            .await?;

        tracing::info!(
            "Device deleted successfully with ID: {} for user ID: {}",
            device_row_id,
            user_id
        );
        Ok(())
    }

    /// Count devices for a user
    pub async fn count_devices(&self, user_id: i64) -> AppResult<i64> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM user_devices WHERE user_id = ?1")
                .bind(user_id)
                .fetch_one(&self.db)
                .await?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    const CREATE_DEVICES_TABLE: &str = r#"
        CREATE TABLE user_devices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            device_id TEXT NOT NULL,
            saviour TEXT,
            device_sim_no TEXT,
            house_type TEXT,
            sensor_type TEXT,
            os TEXT,
            browser TEXT,
            is_primary BOOLEAN NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'active',
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            UNIQUE (user_id, device_id)
        )
    "#;

    async fn test_manager() -> DeviceManager {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        sqlx::query(CREATE_DEVICES_TABLE)
            .execute(&pool)
            .await
            .unwrap();
        DeviceManager::new(pool)
    }

    fn params(device_id: &str, is_primary: bool) -> DeviceParams {
        DeviceParams {
            device_id: Some(device_id.to_string()),
            is_primary: Some(is_primary),
            ..Default::default()
        }
    }

    async fn primary_count(mgr: &DeviceManager, user_id: i64) -> i64 {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM user_devices WHERE user_id = ?1 AND is_primary = 1",
        )
        .bind(user_id)
        .fetch_one(&mgr.db)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn at_most_one_primary_after_adds() {
        let mgr = test_manager().await;

        let first = mgr.add_device(1, &params("dev-a", true)).await.unwrap();
        assert!(first.is_primary);

        let second = mgr.add_device(1, &params("dev-b", true)).await.unwrap();
        assert!(second.is_primary);

        assert_eq!(primary_count(&mgr, 1).await, 1);
        let first = mgr.get_device(1, first.id).await.unwrap();
        assert!(!first.is_primary);
    }

    #[tokio::test]
    async fn update_to_primary_clears_siblings() {
        let mgr = test_manager().await;

        let first = mgr.add_device(1, &params("dev-a", true)).await.unwrap();
        let second = mgr.add_device(1, &params("dev-b", false)).await.unwrap();

        let updated = mgr
            .update_device(
                1,
                second.id,
                &DeviceParams {
                    is_primary: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.is_primary);

        assert_eq!(primary_count(&mgr, 1).await, 1);
        assert!(!mgr.get_device(1, first.id).await.unwrap().is_primary);
    }

    #[tokio::test]
    async fn update_patches_only_provided_fields() {
        let mgr = test_manager().await;

        let device = mgr
            .add_device(
                1,
                &DeviceParams {
                    device_id: Some("dev-a".to_string()),
                    sensor_type: Some("ultrasonic".to_string()),
                    status: Some("active".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let updated = mgr
            .update_device(
                1,
                device.id,
                &DeviceParams {
                    house_type: Some("villa".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.house_type.as_deref(), Some("villa"));
        assert_eq!(updated.sensor_type.as_deref(), Some("ultrasonic"));
        assert_eq!(updated.status, "active");
    }

    #[tokio::test]
    async fn last_device_cannot_be_deleted() {
        let mgr = test_manager().await;

        let only = mgr.add_device(1, &params("dev-a", true)).await.unwrap();

        assert!(matches!(
            mgr.delete_device(1, only.id).await,
            Err(AppError::Validation(_))
        ));
        assert_eq!(mgr.count_devices(1).await.unwrap(), 1);

        // With a second device the delete goes through
        mgr.add_device(1, &params("dev-b", false)).await.unwrap();
        mgr.delete_device(1, only.id).await.unwrap();
        assert_eq!(mgr.count_devices(1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_device_is_not_found() {
        let mgr = test_manager().await;

        mgr.add_device(1, &params("dev-a", true)).await.unwrap();
        mgr.add_device(1, &params("dev-b", false)).await.unwrap();

        assert!(matches!(
            mgr.delete_device(1, 999).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            mgr.get_device(2, 1).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_primary_adds_leave_one_primary() {
        // File-backed database so both tasks get real connections
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.sqlite");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(
                sqlx::sqlite::SqliteConnectOptions::new()
                    .filename(&path)
                    .create_if_missing(true)
                    .busy_timeout(std::time::Duration::from_secs(5)),
            )
            .await
            .unwrap();
        sqlx::query(CREATE_DEVICES_TABLE)
            .execute(&pool)
            .await
            .unwrap();

        let mgr = std::sync::Arc::new(DeviceManager::new(pool));

        let a = {
            let mgr = mgr.clone();
            tokio::spawn(async move { mgr.add_device(1, &params("dev-a", true)).await })
        };
        let b = {
            let mgr = mgr.clone();
            tokio::spawn(async move { mgr.add_device(1, &params("dev-b", true)).await })
        };

        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(primary_count(&mgr, 1).await, 1);
        assert_eq!(mgr.count_devices(1).await.unwrap(), 2);
    }
}
