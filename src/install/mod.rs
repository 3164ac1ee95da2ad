//! Installation planning and execution

mod executor;
mod outcome;
mod plan;

pub use executor::*;
pub use outcome::*;
pub use plan::*;
