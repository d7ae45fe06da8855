pub mod error;
pub mod ports;
pub mod rpc;
pub mod use_cases;
pub use error::*;
pub use ports::*;
pub use rpc::*;
pub use use_cases::*;
