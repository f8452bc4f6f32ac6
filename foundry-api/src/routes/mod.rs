/// API route handlers
///
/// - `health`: Health check endpoint
/// - `auth`: Email/password authentication and sessions
/// - `oauth`: OAuth sign-in
/// - `me`: Profile, preferences and own audit trail
/// - `admin`: User roles and the full audit trail
/// - `changes`: Dev-mode change requests

pub mod admin;
pub mod auth;
pub mod changes;
pub mod health;
pub mod me;
pub mod oauth;
