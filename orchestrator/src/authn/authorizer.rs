//! Deployment authorization

use std::collections::HashSet;

use async_trait::async_trait;

use crate::models::environment::Environment;

/// Yes/no capability check consulted before a job is queued
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn can_deploy(&self, requestor_id: &str, environment: &Environment) -> bool;
}

/// Grants every request
#[derive(Debug, Default, Clone)]
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn can_deploy(&self, _requestor_id: &str, _environment: &Environment) -> bool {
        true
    }
}

/// Grants requests from a fixed set of requestors
#[derive(Debug, Default, Clone)]
pub struct AllowList {
    requestors: HashSet<String>,
}

impl AllowList {
    pub fn new<I, S>(requestors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            requestors: requestors.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Authorizer for AllowList {
    async fn can_deploy(&self, requestor_id: &str, _environment: &Environment) -> bool {
        self.requestors.contains(requestor_id)
    }
}
