pub mod marketplace;
pub mod placeholder;

pub use marketplace::*;
pub use placeholder::*;
