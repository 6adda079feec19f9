//! # MOSS Common Library
//!
//! Shared code for the MOSS submission pipeline:
//! - Progress event types (`MossEvent` enum) and `EventBus`
//! - Supported-language registry
//! - Common error types

pub mod error;
pub mod events;
pub mod lang;

pub use error::{Error, Result};
pub use lang::MossLanguage;
