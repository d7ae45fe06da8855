pub mod fixture_transport;
pub mod http_transport;

pub use fixture_transport::*;
pub use http_transport::*;
