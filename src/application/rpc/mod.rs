pub mod client;
pub mod envelope;
pub use client::*;
pub use envelope::*;
