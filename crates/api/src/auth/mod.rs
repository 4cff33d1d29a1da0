//! Authentication module for Tipline

pub mod jwt;
pub mod middleware;
#[cfg(test)]
mod middleware_tests;
pub mod password;

pub use jwt::{Claims, JwtError, JwtManager};
pub use middleware::{optional_auth, require_admin, require_auth, AuthError, AuthState, AuthUser, Viewer};
pub use password::{hash_password, validate_password_strength, verify_password};
