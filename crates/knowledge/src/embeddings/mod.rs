//! Embedding providers for knowledge bases.
//!
//! The same provider must embed both the indexed chunks and the queries run
//! against them; [`EmbeddingConfig::validate_consistency`] enforces that.

pub mod config;
pub mod provider;
pub mod providers;

pub use config::EmbeddingConfig;
pub use provider::{create_provider, EmbeddingProvider};
