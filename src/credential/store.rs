/// Credential store implementation using runtime queries
use crate::{
    authz::{ListingScope, Role},
    credential::{CreateUserRequest, PasswordCredential, RegisterRequest},
    db::models::{Account, PasswordResetToken},
    error::{AppError, AppResult},
    external::{IdGenerator, IdKind, RoleRegistry, SigningAuthority},
    token::Claims,
};
use chrono::Utc;
use rand::Rng;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Minutes until a reset OTP expires
const OTP_TTL_MINUTES: i64 = 15;

const ACCOUNT_COLUMNS: &str = "id, user_code, name, email, phone, password, role, access_level, \
     status, no_of_sec_users, address, address_details, last_login_at, created_at, updated_at";

/// Credential store service
pub struct CredentialStore {
    db: SqlitePool,
    signer: Arc<dyn SigningAuthority>,
    roles: Arc<dyn RoleRegistry>,
    ids: Arc<dyn IdGenerator>,
    tenant_id: String,
}

impl CredentialStore {
    pub fn new(
        db: SqlitePool,
        signer: Arc<dyn SigningAuthority>,
        roles: Arc<dyn RoleRegistry>,
        ids: Arc<dyn IdGenerator>,
        tenant_id: String,
    ) -> Self {
        Self {
            db,
            signer,
            roles,
            ids,
            tenant_id,
        }
    }

    /// Authenticate by email and password
    ///
    /// The failure is uniform for unknown email and wrong password. Signed
    /// credentials fail closed when the signing authority is unreachable:
    /// the caller sees `ServiceUnavailable` rather than a silent rejection.
    pub async fn verify_login(&self, email: &str, password: &str) -> AppResult<Account> {
        let account = match self.get_account_by_email(email).await {
            Ok(account) => account,
            Err(AppError::NotFound(_)) => {
                tracing::warn!("Login attempt for unknown email: {}", email);
                return Err(AppError::InvalidCredentials);
            }
            Err(e) => return Err(e),
        };

        let valid = match PasswordCredential::decode(&account.password) {
            PasswordCredential::Legacy { hash } => {
                PasswordCredential::verify_legacy(password, &hash)?
            }
            PasswordCredential::Signed { signature } => {
                self.signer.verify(password, &signature).await.map_err(|e| {
                    tracing::warn!(
                        "Signature verification unavailable during login for {}: {}",
                        email,
                        e
                    );
                    AppError::ServiceUnavailable("signing authority unreachable".to_string())
                })?
            }
        };

        if !valid {
            tracing::warn!("Invalid password for email: {}", email);
            return Err(AppError::InvalidCredentials);
        }

        if account.status != "active" {
            tracing::warn!("Inactive user login attempt: {}", email);
            return Err(AppError::AccountInactive);
        }

        let now = Utc::now();
        sqlx::query("UPDATE users SET last_login_at = ?1, updated_at = ?1 WHERE id = ?2")
            .bind(now)
            .bind(account.id)
            .execute(&self.db)
            .await?;

        tracing::info!("Login successful for user: {}", account.email);
        self.get_account(account.id).await
    }

    /// Start a password reset: invalidate prior tokens for the email and
    /// issue a fresh 6-digit OTP valid for 15 minutes.
    ///
    /// Returns the OTP so the caller can dispatch the reset mail.
    pub async fn start_password_reset(&self, email: &str) -> AppResult<i64> {
        // Account must exist; reset for an unknown email is a NotFound
        self.get_account_by_email(email).await?;

        let otp = generate_otp();
        let now = Utc::now();
        let expires_at = now + chrono::Duration::minutes(OTP_TTL_MINUTES);

        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM password_reset_tokens WHERE email = ?1")
            .bind(email)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO password_reset_tokens (email, otp, expires_at, used, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(email)
        .bind(otp)
        .bind(expires_at)
        .bind(false)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!("Password reset requested for email: {}", email);
        Ok(otp)
    }

    /// Complete a password reset with the OTP
    ///
    /// The token-used flag and the new credential commit in one transaction.
    pub async fn complete_password_reset(
        &self,
        email: &str,
        otp: i64,
        new_password: &str,
    ) -> AppResult<()> {
        let token = sqlx::query_as::<_, PasswordResetToken>(
            "SELECT id, email, otp, expires_at, used, created_at
             FROM password_reset_tokens
             WHERE email = ?1 AND otp = ?2 AND used = 0",
        )
        .bind(email)
        .bind(otp)
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::InvalidOtp)?;

        if Utc::now() > token.expires_at {
            tracing::warn!("Expired OTP used for email: {}", email);
            return Err(AppError::Expired(
                "OTP has expired. Please request a new one.".to_string(),
            ));
        }

        let account = self.get_account_by_email(email).await?;
        let credential = self.preferred_credential(new_password).await?;

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        sqlx::query("UPDATE users SET password = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(credential.encode())
            .bind(now)
            .bind(account.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE password_reset_tokens SET used = 1 WHERE id = ?1")
            .bind(token.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!("Password reset successful for user: {}", email);
        Ok(())
    }

    /// Self-service registration
    pub async fn create_account(&self, req: &RegisterRequest) -> AppResult<Account> {
        if self.email_exists(&req.email).await? {
            return Err(AppError::DuplicateEmail);
        }

        let role = req.role.clone().unwrap_or_else(|| "user".to_string());
        self.validate_role(&role).await?;

        let credential = self.preferred_credential(&req.password).await?;
        let user_code = self.next_id(IdKind::User).await;

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO users (user_code, name, email, phone, password, role, access_level,
                                status, no_of_sec_users, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'limited', 'active', ?7, ?8, ?8)",
        )
        .bind(&user_code)
        .bind(&req.name)
        .bind(&req.email)
        .bind(&req.phone)
        .bind(credential.encode())
        .bind(&role)
        .bind(3i64)
        .bind(now)
        .execute(&self.db)
        .await?;

        let account = self.get_account(result.last_insert_rowid()).await?;
        tracing::info!("User registered successfully with ID: {}", account.id);
        Ok(account)
    }

    /// Creator-initiated account: admins create regular users, everyone else
    /// creates secondary users. The first device record is created in the
    /// same transaction with is_primary set.
    ///
    /// Returns the account plus the generated initial password for the
    /// welcome mail.
    pub async fn create_managed_account(
        &self,
        creator: &Claims,
        req: &CreateUserRequest,
    ) -> AppResult<(Account, String)> {
        if self.email_exists(&req.email).await? {
            return Err(AppError::DuplicateEmail);
        }

        let role = match creator.role {
            Role::Admin => Role::User,
            _ => Role::SecondaryUser,
        };

        let initial_password = generate_simple_password(10);
        let credential = self.preferred_credential(&initial_password).await?;
        let user_code = self.next_id(IdKind::User).await;
        let address_details = req
            .address_details
            .as_ref()
            .map(|v| v.to_string());

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let result = sqlx::query(
            "INSERT INTO users (user_code, name, email, phone, password, role, access_level,
                                status, no_of_sec_users, address, address_details,
                                created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'limited', 'active', ?7, ?8, ?9, ?10, ?10)",
        )
        .bind(&user_code)
        .bind(&req.name)
        .bind(&req.email)
        .bind(&req.phone)
        .bind(credential.encode())
        .bind(role.as_str())
        .bind(req.no_of_sec_users.unwrap_or(0))
        .bind(&req.address)
        .bind(&address_details)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let user_id = result.last_insert_rowid();

        sqlx::query(
            "INSERT INTO user_devices (user_id, device_id, saviour, device_sim_no, house_type,
                                       sensor_type, is_primary, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, 'active', ?7, ?7)",
        )
        .bind(user_id)
        .bind(&req.device)
        .bind(&req.saviour)
        .bind(&req.device_sim_no)
        .bind(&req.house_type)
        .bind(&req.sensor_type)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let account = self.get_account(user_id).await?;
        tracing::info!("User created successfully with ID: {}", account.id);
        Ok((account, initial_password))
    }

    /// Get account by id
    pub async fn get_account(&self, id: i64) -> AppResult<Account> {
        sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM users WHERE id = ?1",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Account not found".to_string()))
    }

    /// Get account by email
    pub async fn get_account_by_email(&self, email: &str) -> AppResult<Account> {
        sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM users WHERE email = ?1",
            ACCOUNT_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Account not found".to_string()))
    }

    /// List accounts visible to the given scope, ordered by id
    pub async fn list_accounts(&self, scope: ListingScope) -> AppResult<Vec<Account>> {
        let query = match scope {
            ListingScope::AllNonAdmin => format!(
                "SELECT {} FROM users WHERE role != 'admin' ORDER BY id",
                ACCOUNT_COLUMNS
            ),
            ListingScope::SecondaryOnly => format!(
                "SELECT {} FROM users WHERE role = 'secondary_user' ORDER BY id",
                ACCOUNT_COLUMNS
            ),
        };

        Ok(sqlx::query_as::<_, Account>(&query)
            .fetch_all(&self.db)
            .await?)
    }

    /// Update account status
    pub async fn update_status(&self, id: i64, status: &str) -> AppResult<Account> {
        if status != "active" && status != "inactive" {
            return Err(AppError::Validation(format!("Invalid status: {}", status)));
        }

        let result = sqlx::query("UPDATE users SET status = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(status)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Account not found".to_string()));
        }

        tracing::info!("User status updated successfully for user ID: {}", id);
        self.get_account(id).await
    }

    /// Delete an account together with its device records
    pub async fn delete_account(&self, id: i64) -> AppResult<()> {
        self.get_account(id).await?;

        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM user_devices WHERE user_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!("User deleted successfully with ID: {}", id);
        Ok(())
    }

    /// Delete used or expired reset tokens; returns how many were removed
    pub async fn cleanup_reset_tokens(&self) -> AppResult<u64> {
        let result =
            sqlx::query("DELETE FROM password_reset_tokens WHERE used = 1 OR expires_at < ?1")
                .bind(Utc::now())
                .execute(&self.db)
                .await?;

        Ok(result.rows_affected())
    }

    async fn email_exists(&self, email: &str) -> AppResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?1")
            .bind(email)
            .fetch_one(&self.db)
            .await?;

        Ok(count > 0)
    }

    /// Validate a role against the registry, falling back to the fixed
    /// default set when the registry is unreachable.
    async fn validate_role(&self, role: &str) -> AppResult<()> {
        let roles = match self.roles.list_roles(&self.tenant_id).await {
            Ok(roles) if !roles.is_empty() => roles,
            Ok(_) => crate::external::default_roles(),
            Err(e) => {
                tracing::warn!("Role registry unavailable, using default roles: {}", e);
                crate::external::default_roles()
            }
        };

        if roles.iter().any(|r| r.code.eq_ignore_ascii_case(role)) {
            Ok(())
        } else {
            Err(AppError::InvalidRole(role.to_string()))
        }
    }

    /// Encode a plaintext password in the preferred mode: signed when the
    /// authority is reachable, legacy argon2 hash otherwise.
    async fn preferred_credential(&self, plaintext: &str) -> AppResult<PasswordCredential> {
        match self.signer.sign(plaintext).await {
            Ok(signature) => Ok(PasswordCredential::Signed { signature }),
            Err(e) => {
                tracing::warn!("Signing authority unavailable, storing legacy hash: {}", e);
                PasswordCredential::hash_legacy(plaintext)
            }
        }
    }

    /// Human-readable id from the generator, with a local fallback
    async fn next_id(&self, kind: IdKind) -> String {
        match self.ids.generate(&self.tenant_id, kind).await {
            Ok(id) => id,
            Err(e) => {
                let fallback = crate::external::local_fallback_id(kind);
                tracing::warn!("Id generator unavailable ({}), using fallback: {}", e, fallback);
                fallback
            }
        }
    }
}

/// Uniform 6-digit OTP
fn generate_otp() -> i64 {
    rand::thread_rng().gen_range(100_000..=999_999)
}

/// Random alphanumeric password for managed accounts
fn generate_simple_password(length: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ\
                             abcdefghijklmnopqrstuvwxyz\
                             0123456789";
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}
