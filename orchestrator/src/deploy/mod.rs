//! Deployment pipeline

pub mod executor;
pub mod fsm;
pub mod notify;
pub mod pipeline;
pub mod work;
