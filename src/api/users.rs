/// User and device management endpoints
use crate::{
    auth::AuthContext,
    authz::{self, Capability, ResourceOwner, Role},
    context::AppContext,
    credential::CreateUserRequest,
    db::models::{Account, UserDevice},
    devices::DeviceParams,
    error::{AppError, AppResult},
};
use axum::{
    extract::{Path, State},
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;
use validator::Validate;

/// Build user management routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id", get(get_user).delete(delete_user))
        .route("/users/:id/status", patch(update_user_status))
        .route("/users/:id/devices", get(list_devices).post(add_device))
        .route(
            "/users/:id/devices/:device_id",
            patch(update_device).delete(remove_device),
        )
}

/// Fetch the target account and check the requester's rights on it
async fn authorize_on_account(
    ctx: &AppContext,
    auth: &AuthContext,
    target_id: i64,
    capability: Capability,
) -> AppResult<Account> {
    let target = ctx.credentials.get_account(target_id).await?;
    let owner = ResourceOwner {
        id: target.id,
        role: Role::from_str(&target.role)?,
    };
    authz::authorize(&auth.claims, owner, capability)?;
    Ok(target)
}

async fn list_users(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> AppResult<Json<Vec<Account>>> {
    let scope = authz::listing_scope(&auth.claims);
    let accounts = ctx.credentials.list_accounts(scope).await?;
    Ok(Json(accounts))
}

async fn create_user(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<CreateUserRequest>,
) -> AppResult<Json<Account>> {
    req.validate().map_err(AppError::from_validation)?;

    let (account, initial_password) = ctx
        .credentials
        .create_managed_account(&auth.claims, &req)
        .await?;

    // The generated password only ever leaves the system in this mail
    if ctx.mailer.is_configured() {
        if let Err(e) = ctx
            .mailer
            .send_welcome_email(
                &account.email,
                &account.name,
                Some(&initial_password),
                Some(&req.device),
            )
            .await
        {
            tracing::warn!("Failed to send welcome email: {}", e);
        }
    }

    Ok(Json(account))
}

async fn get_user(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<i64>,
) -> AppResult<Json<Account>> {
    let account = authorize_on_account(&ctx, &auth, id, Capability::ViewAccount).await?;
    Ok(Json(account))
}

#[derive(Debug, Deserialize)]
struct UpdateStatusRequest {
    status: String,
}

async fn update_user_status(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<i64>,
    Json(req): Json<UpdateStatusRequest>,
) -> AppResult<Json<Account>> {
    authorize_on_account(&ctx, &auth, id, Capability::ManageAccount).await?;
    let account = ctx.credentials.update_status(id, &req.status).await?;
    Ok(Json(account))
}

async fn delete_user(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    authorize_on_account(&ctx, &auth, id, Capability::ManageAccount).await?;
    ctx.credentials.delete_account(id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "User deleted"
    })))
}

async fn list_devices(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<i64>,
) -> AppResult<Json<Vec<UserDevice>>> {
    authorize_on_account(&ctx, &auth, id, Capability::ViewAccount).await?;
    let devices = ctx.devices.list_devices(id).await?;
    Ok(Json(devices))
}

async fn add_device(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<i64>,
    Json(params): Json<DeviceParams>,
) -> AppResult<Json<UserDevice>> {
    authorize_on_account(&ctx, &auth, id, Capability::ManageDevice).await?;
    let device = ctx.devices.add_device(id, &params).await?;
    Ok(Json(device))
}

async fn update_device(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path((id, device_id)): Path<(i64, i64)>,
    Json(params): Json<DeviceParams>,
) -> AppResult<Json<UserDevice>> {
    authorize_on_account(&ctx, &auth, id, Capability::ManageDevice).await?;
    let device = ctx.devices.update_device(id, device_id, &params).await?;
    Ok(Json(device))
}

async fn remove_device(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path((id, device_id)): Path<(i64, i64)>,
) -> AppResult<Json<serde_json::Value>> {
    authorize_on_account(&ctx, &auth, id, Capability::ManageDevice).await?;
    ctx.devices.delete_device(id, device_id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Device deleted"
    })))
}
