//! CLI command implementations.

pub mod effects;
pub mod params;
pub mod render;
