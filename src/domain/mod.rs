pub mod aggregate;
pub mod models;
pub use aggregate::*;
pub use models::*;
