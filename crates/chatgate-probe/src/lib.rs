pub mod cancel;
pub mod probe;
pub mod runner;

pub use cancel::*;
pub use probe::*;
pub use runner::*;
