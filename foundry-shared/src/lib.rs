//! # Foundry Shared Library
//!
//! Types, persistence and domain logic shared by the Foundry API server.
//!
//! ## Module Organization
//!
//! - `auth`: Password hashing, access tokens, sessions, OAuth and role checks
//! - `db`: Connection pool and migrations
//! - `mail`: Outgoing email seam (password reset, verification)
//! - `models`: Database models and their queries
//! - `overlay`: Dev-mode overlay state (component registry, popover placement)

pub mod auth;
pub mod db;
pub mod mail;
pub mod models;
pub mod overlay;

/// Current version of the Foundry shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
