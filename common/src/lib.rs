//! Common types and utilities for the trading journal
//!
//! This library contains the shared types used across the journal engine:
//! the account and trade domain models, a unified approach to error
//! handling, and decimal aliases for money arithmetic.

pub mod error;
pub mod model;
pub mod decimal;

/// Re-export important types
pub use error::{Error, Result, ErrorExt};
pub use decimal::*;
