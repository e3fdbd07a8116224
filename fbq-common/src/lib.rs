//! # FBQ Common Library
//!
//! Shared code for the feedback query client crates including:
//! - Error types
//! - Configuration loading (TOML file, environment, defaults)
//! - Server-Sent Events wire decoding
//! - Stream frame types (wire shape of the query stream)

pub mod config;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
