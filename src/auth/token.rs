use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use tracing::{debug, instrument};

use super::types::ActorClaims;
use crate::shared::AppError;

/// Configuration for JWT token operations
#[derive(Clone)]
pub struct TokenConfig {
    secret: String,
}

impl TokenConfig {
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Signs the given claims. Tokens are issued by the identity service; this is used by
    /// operational tooling and tests.
    #[instrument(skip(self, claims))]
    pub fn create_token(&self, claims: &ActorClaims) -> Result<String, AppError> {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(self.secret.as_ref()),
        )
        .map_err(|e| {
            debug!(error = %e, "Failed to encode JWT token");
            AppError::JwtError(e.to_string())
        })
    }

    /// Validates a JWT token and returns the claims if valid
    #[instrument(skip(self, token))]
    pub fn validate_token(&self, token: &str) -> Result<ActorClaims, AppError> {
        debug!("Decoding and validating JWT token");

        decode::<ActorClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_ref()),
            &Validation::default(),
        )
        .map(|data| {
            debug!(
                actor = %data.claims.sub,
                role = %data.claims.role,
                exp = data.claims.exp,
                "JWT token decoded successfully"
            );
            data.claims
        })
        .map_err(|e| {
            debug!(error = %e, "Failed to decode JWT token");
            AppError::JwtError(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use uuid::Uuid;

    #[test]
    fn test_create_and_validate_token() {
        let config = TokenConfig::with_secret("secret");
        let actor = Uuid::new_v4();
        let claims = ActorClaims::new(actor, Role::Admin, 1);

        let token = config.create_token(&claims).unwrap();
        assert!(!token.is_empty());

        let validated = config.validate_token(&token).unwrap();
        assert_eq!(validated.actor_id().unwrap(), actor);
        assert_eq!(validated.role, Role::Admin);
        assert!(validated.exp > validated.iat);
    }

    #[test]
    fn test_invalid_token() {
        let config = TokenConfig::with_secret("secret");
        let result = config.validate_token("invalid.token.here");
        assert!(matches!(result, Err(AppError::JwtError(_))));
    }

    #[test]
    fn test_token_with_different_secret() {
        let issuer = TokenConfig::with_secret("one");
        let other = TokenConfig::with_secret("two");
        let token = issuer
            .create_token(&ActorClaims::new(Uuid::new_v4(), Role::User, 1))
            .unwrap();

        assert!(issuer.validate_token(&token).is_ok());
        assert!(other.validate_token(&token).is_err());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let config = TokenConfig::with_secret("secret");
        let token = config
            .create_token(&ActorClaims::new(Uuid::new_v4(), Role::User, -2))
            .unwrap();
        assert!(config.validate_token(&token).is_err());
    }
}
