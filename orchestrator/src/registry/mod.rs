//! Registries of orchestrator-owned state

pub mod environments;
