//! Pipeline orchestration core for pressgang.
//!
//! This crate ties the record store, providers, sanitizer, and renderer
//! together: the generic stage executor, the five stage implementations,
//! the dependency-ordered batch driver, and manifest regeneration.

pub mod driver;
pub mod executor;
pub mod manifest;
pub mod stages;
