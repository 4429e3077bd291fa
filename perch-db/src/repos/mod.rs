//! Repository modules for database access

pub mod executions;
pub mod findings;
pub mod sessions;
