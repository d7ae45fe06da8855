pub mod fetch_signatures;
pub mod resolve_transaction;
pub mod track_activity;
pub use fetch_signatures::*;
pub use resolve_transaction::*;
pub use track_activity::*;
