//! Orchestrator unit tests

mod test_cache;
mod test_pipeline;
mod test_server;
