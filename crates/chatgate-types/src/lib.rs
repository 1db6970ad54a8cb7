pub mod model;
pub mod probe;

pub use model::*;
pub use probe::*;
