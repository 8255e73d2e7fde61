/// Authentication endpoints
use crate::{
    context::AppContext,
    credential::{ForgotPasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest},
    db::models::Account,
    error::{AppError, AppResult},
    metrics,
};
use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;
use validator::Validate;

/// Build auth routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    success: bool,
    message: String,
    token: String,
    user: Account,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterResponse {
    success: bool,
    message: String,
    user: Account,
}

async fn login(
    State(ctx): State<AppContext>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    req.validate().map_err(AppError::from_validation)?;

    tracing::info!("Login attempt for email: {}", req.email);

    let account = match ctx.credentials.verify_login(&req.email, &req.password).await {
        Ok(account) => {
            metrics::LOGIN_ATTEMPTS_TOTAL
                .with_label_values(&["success"])
                .inc();
            account
        }
        Err(e) => {
            let outcome = match &e {
                AppError::AccountInactive => "inactive",
                AppError::ServiceUnavailable(_) => "unavailable",
                _ => "invalid",
            };
            metrics::LOGIN_ATTEMPTS_TOTAL
                .with_label_values(&[outcome])
                .inc();
            return Err(e);
        }
    };

    let token = ctx.tokens.issue(&account)?;

    Ok(Json(LoginResponse {
        success: true,
        message: "Login successful".to_string(),
        token,
        user: account,
    }))
}

async fn register(
    State(ctx): State<AppContext>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<Json<RegisterResponse>> {
    req.validate().map_err(AppError::from_validation)?;

    tracing::info!("Registration request for email: {}", req.email);

    let account = ctx.credentials.create_account(&req).await?;

    // Welcome mail is fire-and-forget; a failure never unwinds the account
    if ctx.mailer.is_configured() {
        if let Err(e) = ctx
            .mailer
            .send_welcome_email(&account.email, &account.name, None, None)
            .await
        {
            tracing::warn!("Failed to send welcome email: {}", e);
        }
    }

    Ok(Json(RegisterResponse {
        success: true,
        message: "Registration successful".to_string(),
        user: account,
    }))
}

async fn forgot_password(
    State(ctx): State<AppContext>,
    Json(req): Json<ForgotPasswordRequest>,
) -> AppResult<Json<serde_json::Value>> {
    req.validate().map_err(AppError::from_validation)?;

    let account = ctx.credentials.get_account_by_email(&req.email).await?;
    let otp = ctx.credentials.start_password_reset(&req.email).await?;

    if ctx.mailer.is_configured() {
        if let Err(e) = ctx
            .mailer
            .send_reset_otp_email(&account.email, &account.name, otp)
            .await
        {
            tracing::warn!("Failed to send password reset email: {}", e);
        }
    } else {
        tracing::warn!("Email not configured, reset OTP generated but not sent");
    }

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Password reset OTP sent"
    })))
}

async fn reset_password(
    State(ctx): State<AppContext>,
    Json(req): Json<ResetPasswordRequest>,
) -> AppResult<Json<serde_json::Value>> {
    req.validate().map_err(AppError::from_validation)?;

    ctx.credentials
        .complete_password_reset(&req.email, req.otp, &req.new_password)
        .await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Password reset successful"
    })))
}
