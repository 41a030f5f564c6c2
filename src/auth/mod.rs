//! Session tokens and the middleware that enforces them.

pub mod jwt;
pub mod middleware;
pub mod models;

pub use jwt::JwtHandler;
pub use middleware::{auth_middleware, AuthError};
pub use models::Claims;
