// Identity collaborator: resolves the authenticated actor and role from a request

// Public API - what other modules can use
pub use middleware::{jwt_auth, require_admin};
pub use token::TokenConfig;
pub use types::{ActorClaims, Role};

// Internal modules
mod middleware;
mod token;
mod types;
