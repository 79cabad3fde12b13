//! playsync library interface
//!
//! Resolves tracks from a source playlist catalog to the best-matching audio
//! asset on an external catalog, then drives a five-phase resumable pipeline
//! (fetch metadata → resolve match → download audio → fetch lyrics → embed
//! tags) with all intermediate state persisted in SQLite.

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod matcher;
pub mod pipeline;
pub mod services;
pub mod types;

pub use crate::error::{Error, Result};
