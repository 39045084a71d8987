//! Core mirror module
//!
//! Resolves the source argument into a request and runs the mirror pass.

mod engine;
mod resolver;

pub use engine::*;
pub use resolver::*;
