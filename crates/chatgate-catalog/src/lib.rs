pub mod catalog;
pub mod classify;

pub use catalog::*;
pub use classify::*;
