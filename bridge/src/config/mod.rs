//! Configuration: data types, loading from disk and validation into runnable specs.

mod loader;
mod types;
mod validation;

pub use loader::*;
pub use types::*;
pub use validation::*;
