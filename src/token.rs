/// Session token issuance and validation
///
/// Tokens are stateless HS256 JWTs; there is no revocation list, so a token
/// stays valid until its natural expiry.
use crate::{
    authz::{AccessLevel, Role},
    db::models::Account,
    error::{AppError, AppResult},
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Fixed lifetime of an issued token
pub const TOKEN_TTL_SECS: i64 = 24 * 3600;

/// Claims carried by a session token
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    /// Account id
    pub sub: i64,
    pub email: String,
    pub role: Role,
    pub access_level: AccessLevel,
    pub iat: i64,
    pub exp: i64,
}

/// Token service holding the process-wide signing secret
pub struct TokenService {
    secret: String,
}

impl TokenService {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    /// Issue a token for an authenticated account
    pub fn issue(&self, account: &Account) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: account.id,
            email: account.email.clone(),
            role: Role::from_str(&account.role)?,
            access_level: AccessLevel::from_str(&account.access_level)?,
            iat: now,
            exp: now + TOKEN_TTL_SECS,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Failed to generate token: {}", e)))
    }

    /// Verify signature and expiry, then return the claims.
    ///
    /// An expired token is a distinct outcome from a malformed one.
    pub fn extract_claims(&self, token: &str) -> AppResult<Claims> {
        let decoding_key = DecodingKey::from_secret(self.secret.as_bytes());
        let validation = Validation::new(Algorithm::HS256);

        decode::<Claims>(token, &decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    AppError::Expired("token has expired".to_string())
                }
                _ => {
                    tracing::warn!("Token verification failed: {}", e);
                    AppError::InvalidCredentials
                }
            })
    }
}
