//! Role-based task assignment service.
//!
//! Admins assign tasks to users; users accept, decline, start and complete
//! them. Everything is served as JSON over HTTP and kept in a single JSON
//! document on disk.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod server;
pub mod sms;
pub mod stats;
pub mod store;
pub mod task;
pub mod user;

pub use config::Config;
pub use error::AppError;
pub use server::{router, AppState};
pub use store::TaskStore;
