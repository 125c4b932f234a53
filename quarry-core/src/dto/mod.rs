//! Request and response shapes exchanged with the job service

pub mod job;
