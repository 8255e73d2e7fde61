/// Database row models
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// User account record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: i64,
    /// Human-readable code like USER-2026-000001
    pub user_code: Option<String>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    /// Encoded PasswordCredential; never serialized out
    #[serde(skip_serializing)]
    pub password: String,
    pub role: String,
    pub access_level: String,
    pub status: String,
    pub no_of_sec_users: i64,
    pub address: Option<String>,
    /// JSON blob with structured address fields
    pub address_details: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Password reset token record. One unused token per email; expires
/// 15 minutes after creation.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PasswordResetToken {
    pub id: i64,
    pub email: String,
    pub otp: i64,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

/// Per-user device record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDevice {
    pub id: i64,
    pub user_id: i64,
    pub device_id: String,
    pub saviour: Option<String>,
    pub device_sim_no: Option<String>,
    pub house_type: Option<String>,
    pub sensor_type: Option<String>,
    pub os: Option<String>,
    pub browser: Option<String>,
    pub is_primary: bool,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored telemetry record. Immutable once written.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    pub id: i64,
    pub device_id: String,
    pub data_type: Option<String>,
    pub payload: String,
    pub timestamp: DateTime<Utc>,
    pub tenant_id: Option<String>,
    pub source: Option<String>,
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Tenant-scoped device catalog entry
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRegistration {
    pub id: i64,
    pub device_id: String,
    pub device_name: String,
    pub device_type: Option<String>,
    pub location: Option<String>,
    pub status: String,
    pub tenant_id: Option<String>,
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
}
