//! In-memory caches

pub mod jobs;
