pub mod json;
pub mod table;

pub use json::*;
pub use table::*;
