/// Authentication extractors
use crate::{
    api::middleware::extract_bearer_token,
    context::AppContext,
    error::AppError,
    token::Claims,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Authenticated request context - validates the bearer token and exposes
/// the verified claims
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub claims: Claims,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or(AppError::InvalidCredentials)?;

        // Signature is verified before any claim is trusted
        let claims = state.tokens.extract_claims(&token)?;

        Ok(AuthContext { claims })
    }
}
