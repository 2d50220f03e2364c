//! CLI command implementations.

pub mod challenge;
pub mod discover;
pub mod verify;
