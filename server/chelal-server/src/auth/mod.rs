//! Authentication and role-based access control

pub mod password;
pub mod policy;
pub mod tokens;

pub use password::{hash_password, verify_password, MIN_PASSWORD_LENGTH};
pub use policy::{Policy, Predicate, RoleName};
pub use tokens::{JwtService, TokenClaims, TokenPair, TokenType};
