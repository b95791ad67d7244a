//! Deployment Orchestrator Library
//!
//! Core modules for the deployment pipeline orchestrator.

pub mod app;
pub mod authn;
pub mod cache;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod health;
pub mod logs;
pub mod models;
pub mod orchestrator;
pub mod registry;
pub mod server;
pub mod storage;
pub mod utils;
pub mod workers;
