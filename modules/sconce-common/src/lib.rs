//! Shared configuration and identity types for the Sconce backend.
//!
//! Keeps zero knowledge of the audit schema or the dispatcher — just the
//! pieces every module needs.

pub mod config;
pub mod principal;

pub use config::Config;
pub use principal::Principal;
