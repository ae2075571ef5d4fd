//! Opportunity Store and subscriber directory contracts.

use async_trait::async_trait;
use oppscout_core::{MissingFieldPatch, NewOpportunity, OpportunityRecord, SubscriberPreference};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write; another run (or item) got there first.
    #[error("uniqueness conflict on {constraint}")]
    Conflict { constraint: String },
    #[error("stored row could not be decoded: {0}")]
    Decode(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Relational store of opportunity records. The store assigns record identity.
#[async_trait]
pub trait OpportunityStore: Send + Sync {
    /// Exact-key lookup: `(source, source_native_id)` when the id is present, or normalized URL when non-empty.
    async fn find_existing(
        &self,
        source: &str,
        source_native_id: Option<&str>,
        normalized_url: &str,
    ) -> Result<Option<OpportunityRecord>, StoreError>;

    /// Insert in its own transaction.
    async fn insert(&self, opportunity: &NewOpportunity) -> Result<OpportunityRecord, StoreError>;

    /// Fill blank reward / deadline / skills. Populated fields are left untouched.
    ///
    /// `None` when the record is missing or the patch had nothing to fill; the row and its
    /// `updated_at` are then unchanged.
    async fn fill_missing(
        &self,
        id: Uuid,
        patch: &MissingFieldPatch,
    ) -> Result<Option<OpportunityRecord>, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<OpportunityRecord>, StoreError>;

    /// Open records, newest first.
    async fn list_open(&self, limit: usize) -> Result<Vec<OpportunityRecord>, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;
}

/// Read-only view over user-management's preference data.
#[async_trait]
pub trait SubscriberDirectory: Send + Sync {
    /// Subscribers with notifications enabled and a deliverable address.
    async fn notifiable_subscribers(&self) -> Result<Vec<SubscriberPreference>, StoreError>;
}
