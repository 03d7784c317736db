//! mangashelf core library exports
//!
//! Catalog adapter for the Comick API plus a persistent query cache.

pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod provider;
pub mod shelf;

pub use error::{CatalogError, Result};
