//! HTTP API models for the deployment orchestrator

pub mod models;
