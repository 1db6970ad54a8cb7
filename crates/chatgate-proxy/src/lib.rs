pub mod forward;
pub mod rewrite;

pub use forward::*;
pub use rewrite::*;
