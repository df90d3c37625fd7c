//! Onboard Core — transport-agnostic workflow engine for multi-step onboarding.
//!
//! This crate contains the workflow definition model, the engine that enforces
//! step ordering and idempotent resubmission, the profile stores that persist
//! per-subject progress, and the payment provider seam. It has **no HTTP
//! framework dependency** by default, making it suitable for use in:
//!
//! - HTTP servers (via `onboard-server`)
//! - CLI tools (via `onboard-cli`)
//!
//! # Feature Flags
//!
//! - `axum` — Enables `IntoResponse` impls on `ServerError` and `WorkflowError`.

pub mod db;
pub mod error;
pub mod models;
pub mod payment;
pub mod state;
pub mod store;
pub mod workflow;

// Convenience re-exports
pub use db::Database;
pub use error::{DefinitionError, ServerError, WorkflowError};
pub use state::{AppState, AppStateInner};
pub use workflow::WorkflowEngine;
