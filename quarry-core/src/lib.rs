//! Quarry Core
//!
//! Types shared by the quarry job client and its CLI.
//!
//! This crate contains:
//! - Domain types: jobs, their states and result rows
//! - DTOs: requests and pages exchanged with the job service
//! - Status codes used to report transport failures

pub mod domain;
pub mod dto;
pub mod status;
