//! Persistent state: settings, layout and the durable store

pub mod layout;
pub mod settings;
pub mod store;
