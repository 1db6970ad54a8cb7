pub mod settings;
pub mod store;

pub use settings::*;
pub use store::*;
