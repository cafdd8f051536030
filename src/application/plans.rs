//! Plan limits consulted before a brand-new page is created.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::types::ResourceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitDecision {
    pub allowed: bool,
    /// `None` when the plan is unlimited.
    pub limit: Option<u64>,
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("plan lookup failed: {0}")]
    Lookup(String),
}

#[async_trait]
pub trait PlanLimiter: Send + Sync {
    async fn check_limit(
        &self,
        owner_id: &str,
        resource: ResourceKind,
        current: u64,
    ) -> Result<LimitDecision, PlanError>;
}

/// Same limit for every owner, read from configuration.
#[derive(Debug, Clone, Copy)]
pub struct ConfiguredPlanLimiter {
    published_pages: Option<u64>,
}

impl ConfiguredPlanLimiter {
    /// A negative limit means unlimited.
    pub fn new(published_pages: i64) -> Self {
        Self {
            published_pages: u64::try_from(published_pages).ok(),
        }
    }

    pub fn unlimited() -> Self {
        Self {
            published_pages: None,
        }
    }
}

#[async_trait]
impl PlanLimiter for ConfiguredPlanLimiter {
    async fn check_limit(
        &self,
        _owner_id: &str,
        resource: ResourceKind,
        current: u64,
    ) -> Result<LimitDecision, PlanError> {
        let limit = match resource {
            ResourceKind::PublishedPages => self.published_pages,
        };
        Ok(LimitDecision {
            allowed: limit.is_none_or(|limit| current < limit),
            limit,
        })
    }
}
