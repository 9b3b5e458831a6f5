//! corpusmill - versioned vertical-corpus builder.
//!
//! Turns collected records plus their linguistic annotation into the
//! line-oriented vertical format read by corpus query engines, synthesizes
//! document attributes, and packs finished documents into compressed,
//! versioned archives.

pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;
pub mod utils;

pub use error::{Error, Result};
