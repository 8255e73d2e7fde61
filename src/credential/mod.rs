/// Credential and account management
///
/// Owns user records, the dual-mode password lifecycle, and OTP-based
/// password resets.

mod password;
mod store;

pub use password::PasswordCredential;
pub use store::CredentialStore;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Self-service registration request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 10, max = 10, message = "Phone must be 10 digits"))]
    pub phone: Option<String>,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    /// Defaults to "user" when omitted
    pub role: Option<String>,
}

/// Admin/user-initiated account creation. The initial password is generated
/// server-side and delivered by the welcome mail.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    pub phone: Option<String>,
    pub no_of_sec_users: Option<i64>,
    pub address: Option<String>,
    pub address_details: Option<serde_json::Value>,
    /// First device, created together with the account
    #[validate(length(min = 1, message = "Device ID is required"))]
    pub device: String,
    pub saviour: Option<String>,
    pub device_sim_no: Option<String>,
    pub house_type: Option<String>,
    pub sensor_type: Option<String>,
}

/// Login request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Forgot-password request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

/// Reset-password request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    pub otp: i64,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}
