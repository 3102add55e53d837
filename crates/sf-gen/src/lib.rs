//! Skin generation pipeline.
//!
//! Ties the rest of the workspace together: validates a source image,
//! checks for duplicates, claims a pool account, authenticates it,
//! applies the texture through the official skin-change endpoint, reads
//! the signed result back from the session server, and persists it
//! under an obfuscated public id.

pub mod cache;
pub mod config;
pub mod download;
pub mod duplicate;
pub mod errors;
pub mod image;
pub mod pipeline;
pub mod texture;

pub use cache::SkinDataCache;
pub use config::GeneratorConfig;
pub use download::Downloader;
pub use duplicate::DuplicateDetector;
pub use errors::{ErrorCategory, GenerateError};
pub use image::{ImageError, ValidatedImage};
pub use pipeline::GenerationPipeline;
pub use texture::{ProfileResponse, SkinData};
