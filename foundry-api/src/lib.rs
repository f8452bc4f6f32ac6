//! # Foundry API Server Library
//!
//! HTTP layer of Foundry: authentication, preferences, admin tooling and the
//! dev-mode change request endpoints.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `audit`: Audit trail helpers for handlers
//! - `config`: Layered configuration
//! - `error`: Error handling and HTTP response mapping
//! - `extract`: Request extractors with JSON rejections
//! - `maintenance`: Periodic cleanup of expired rows
//! - `middleware`: Authentication and security headers
//! - `routes`: API route handlers
//! - `telemetry`: Logging setup

pub mod app;
pub mod audit;
pub mod config;
pub mod error;
pub mod extract;
pub mod maintenance;
pub mod middleware;
pub mod routes;
pub mod telemetry;
