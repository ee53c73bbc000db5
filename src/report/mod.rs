//! Report rendering.

pub mod renderer;

pub use renderer::*;
