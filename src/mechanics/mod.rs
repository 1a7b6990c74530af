pub mod control;
pub mod convergence;

pub use control::*;
pub use convergence::*;
