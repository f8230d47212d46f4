pub mod format;
pub mod front_matter;
pub mod parser;
pub mod patterns;

pub use format::*;
pub use front_matter::{is_front_matter, parse_front_matter};
pub use parser::*;
