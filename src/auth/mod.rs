//! Authentication Module
//! Mission: Account lifecycle, dual-token issuance with rotation, and
//! server-side sessions

pub mod api;
pub mod middleware;
pub mod models;
pub mod service;
pub mod sessions;
pub mod store;
pub mod tokens;

pub use api::AuthState;
pub use middleware::auth_middleware;
pub use service::AuthService;
pub use sessions::SessionStore;
pub use store::CredentialStore;
pub use tokens::TokenIssuer;
