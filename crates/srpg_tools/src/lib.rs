//! # SRPG Development Tools
//!
//! Command-line tools for development:
//! - Content database and scenario validation
//! - Headless encounter simulation with optional replay recording

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod scenario;
pub mod simulate;
pub mod validate;
