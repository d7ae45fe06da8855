pub mod attributor;
pub mod report;
pub mod transport;
pub use attributor::*;
pub use report::*;
pub use transport::*;
