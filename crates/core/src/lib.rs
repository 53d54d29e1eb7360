//! Core of mediarelay: the relay pipeline and the object store client.
//!
//! This crate has no knowledge of any concrete message network. The inbound
//! stream, the media fetcher and sender resolution are reached through the
//! traits in [`relay::ports`].
//!
//! # Modules
//!
//! - `relay` - Dispatch filter, bounded worker pool and relay worker
//! - `storage` - S3-compatible object store client (OpenDAL)

pub mod relay;
pub mod storage;
