//! Environment health monitoring

pub mod monitor;
pub mod probe;
