pub mod fixer;
pub mod validation;

pub use fixer::*;
pub use validation::*;
