//! Shared configuration and errors for mediarelay.
//!
//! This crate provides:
//! - Layered configuration (files, `MEDIARELAY__*` environment, legacy variables)
//! - Process-level error types

pub mod config;
pub mod error;

pub use config::{
    AppConfig, DEFAULT_WORKER_POOL, DispatchConfig, LogConfig, MediaConfig, ObjectStoreConfig,
};
pub use error::AppError;
