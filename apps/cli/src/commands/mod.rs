//! Command implementations for the Lumen CLI.

pub mod fetch;
pub mod normalize;
