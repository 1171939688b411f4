//! Test utilities shared by unit and integration tests
//!
//! Counting collaborators, a scripted access prompt, a fully wired
//! `TestStack`, assertions and async helpers.

pub mod assertions;
pub mod async_helpers;
pub mod fixtures;

pub use assertions::*;
pub use async_helpers::*;
pub use fixtures::*;
