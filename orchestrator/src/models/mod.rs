//! Domain models

pub mod deployment;
pub mod environment;
pub mod records;
