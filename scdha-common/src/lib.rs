//! # scDHA Common Library
//!
//! Shared code for the scDHA web services:
//! - Error types
//! - Configuration loading
//! - Storage layout, file naming and sanitizing
//! - Result artifact naming and the artifact manifest
//! - Time and id helpers

pub mod artifacts;
pub mod config;
pub mod error;
pub mod manifest;
pub mod storage;
pub mod time;
pub mod uuid_utils;

pub use artifacts::ArtifactSet;
pub use error::{Error, Result};
pub use storage::{ResultPrefix, SessionId, StorageLayout};
