pub mod orchestrator;
pub mod progress;
pub mod scan;

pub use orchestrator::*;
pub use progress::*;
pub use scan::*;
