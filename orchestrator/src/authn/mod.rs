//! Authorization collaborators

pub mod authorizer;
