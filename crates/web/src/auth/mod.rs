//! Authentication: salted password hashes and bearer tokens.

pub mod password;
pub mod tokens;

pub use password::{hash_password, verify_password};
pub use tokens::{Claims, TokenService};
