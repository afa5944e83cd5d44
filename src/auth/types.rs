use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::shared::AppError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Admin,
    User,
}

/// JWT claims identifying the actor behind a request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActorClaims {
    pub sub: String, // Actor id (UUID)
    pub role: Role,
    pub exp: usize, // Expiration timestamp (standard JWT claim)
    pub iat: usize, // Issued at timestamp (standard JWT claim)
}

impl ActorClaims {
    pub fn new(actor_id: Uuid, role: Role, expiration_days: i64) -> Self {
        let now = chrono::Utc::now();
        Self {
            sub: actor_id.to_string(),
            role,
            exp: (now + chrono::Duration::days(expiration_days)).timestamp() as usize,
            iat: now.timestamp() as usize,
        }
    }

    pub fn actor_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.sub)
            .map_err(|_| AppError::Unauthorized("Token subject is not a valid actor id".to_string()))
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
