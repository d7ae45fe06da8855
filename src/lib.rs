//! Program Activity Tracker
//!
//! Polls a Solana JSON-RPC endpoint for a program's recent signatures, resolves
//! each transaction, attributes it to a project and ranks projects by total
//! contribution. Laid out in hexagonal style:
//!
//! - `domain`: Contributions, the per-project aggregate and run reports
//! - `application`: JSON-RPC client, ports (traits), use cases and error types
//! - `adapters`: Transports (HTTP, fixture), attributors and report emitters
//! - `infrastructure`: Configuration and logging

pub mod adapters;
pub mod application;
pub mod domain;
pub mod infrastructure;
