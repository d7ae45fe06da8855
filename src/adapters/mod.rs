pub mod attributors;
pub mod inbound;
pub mod reports;

pub use inbound::*;
