//! Core domain types
//!
//! Jobs and result rows as the client observes them. These are shared by the
//! client library (which fetches them) and the CLI (which prints them).

pub mod job;
pub mod rows;
