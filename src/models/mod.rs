pub mod api_key;
pub mod base;
pub mod oidc_client;
pub mod permission;
pub mod role;
pub mod user;
pub mod verification_token;

pub use api_key::{ApiKey, ApiKeyStatus, STALE_AFTER_DAYS};
pub use base::{EntityId, Model};
pub use oidc_client::{OidcClient, ValidationMode};
pub use permission::Permission;
pub use role::Role;
pub use user::User;
pub use verification_token::{TokenType, VerificationToken};
