//! Litgate Core Library
//!
//! A rate-limited caching gateway in front of a bibliographic API, with
//! open-access full-text detection and download.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`upstream`] - Bibliographic API client and the shared request limiter
//! - [`cache`] - Memory tier, persistent record tier, and on-disk ledgers
//! - [`metadata`] - Cache-aware search and metadata fetch
//! - [`resolver`] - Open-access source cascade
//! - [`download`] - Size-bounded, paced document downloads via external tools
//! - [`export`] - Citation rendering with its own cache tier
//! - [`gateway`] - The operation surface tying everything together

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod clock;
pub mod config;
pub mod download;
pub mod envelope;
pub mod export;
pub mod gateway;
pub mod http_client;
pub mod metadata;
pub mod resolver;
#[cfg(test)]
pub mod test_support;
pub mod upstream;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use config::{AbstractMode, ConfigError, FullTextMode, GatewayConfig};
pub use envelope::OperationResult;
pub use export::ExportFormat;
pub use gateway::{CacheTier, Gateway, GatewayBuilder, GatewayError};
pub use upstream::{ArticleSummary, RateLimiter, SearchQuery, SortOrder};
