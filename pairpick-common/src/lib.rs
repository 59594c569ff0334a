//! # pairpick common library
//!
//! Shared code for the pairpick annotation service:
//! - Corpus and judgment data model
//! - Error taxonomy
//! - Configuration loading

pub mod config;
pub mod error;
pub mod models;

pub use error::{Error, Result};
pub use models::{Example, ExampleOutput, JudgmentRecord};
