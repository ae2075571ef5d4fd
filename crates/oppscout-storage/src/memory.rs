//! In-process store and directory with the same uniqueness rules as the Postgres schema.

use async_trait::async_trait;
use chrono::Utc;
use oppscout_core::{MissingFieldPatch, NewOpportunity, OpportunityRecord, SubscriberPreference};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::store::{OpportunityStore, StoreError, SubscriberDirectory};

#[derive(Debug, Default)]
pub struct MemoryOpportunityStore {
    records: Mutex<Vec<OpportunityRecord>>,
}

impl MemoryOpportunityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<OpportunityRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    pub async fn records(&self) -> Vec<OpportunityRecord> {
        self.records.lock().await.clone()
    }
}

fn same_native_key(record: &OpportunityRecord, source: &str, native_id: Option<&str>) -> bool {
    match (native_id, record.source_native_id.as_deref()) {
        (Some(wanted), Some(existing)) => record.source == source && existing == wanted,
        _ => false,
    }
}

fn same_url(record: &OpportunityRecord, normalized_url: &str) -> bool {
    !normalized_url.is_empty() && record.normalized_url == normalized_url
}

#[async_trait]
impl OpportunityStore for MemoryOpportunityStore {
    async fn find_existing(
        &self,
        source: &str,
        source_native_id: Option<&str>,
        normalized_url: &str,
    ) -> Result<Option<OpportunityRecord>, StoreError> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .find(|r| same_native_key(r, source, source_native_id) || same_url(r, normalized_url))
            .cloned())
    }

    async fn insert(&self, opportunity: &NewOpportunity) -> Result<OpportunityRecord, StoreError> {
        let mut records = self.records.lock().await;
        let native_id = opportunity.source_native_id.as_deref();
        if records
            .iter()
            .any(|r| same_native_key(r, &opportunity.source, native_id))
        {
            return Err(StoreError::Conflict {
                constraint: "opportunities_source_native_id_key".into(),
            });
        }
        if records
            .iter()
            .any(|r| same_url(r, &opportunity.normalized_url))
        {
            return Err(StoreError::Conflict {
                constraint: "opportunities_normalized_url_key".into(),
            });
        }
        let record = opportunity.clone().into_record(Uuid::new_v4(), Utc::now());
        records.push(record.clone());
        Ok(record)
    }

    async fn fill_missing(
        &self,
        id: Uuid,
        patch: &MissingFieldPatch,
    ) -> Result<Option<OpportunityRecord>, StoreError> {
        let mut records = self.records.lock().await;
        let Some(record) = records.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        if !record.apply_patch(patch) {
            return Ok(None);
        }
        record.updated_at = Utc::now();
        Ok(Some(record.clone()))
    }

    async fn get(&self, id: Uuid) -> Result<Option<OpportunityRecord>, StoreError> {
        Ok(self.records.lock().await.iter().find(|r| r.id == id).cloned())
    }

    async fn list_open(&self, limit: usize) -> Result<Vec<OpportunityRecord>, StoreError> {
        let mut open: Vec<OpportunityRecord> = self
            .records
            .lock()
            .await
            .iter()
            .filter(|r| r.is_open)
            .cloned()
            .collect();
        open.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        open.truncate(limit);
        Ok(open)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.records.lock().await.len() as u64)
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemorySubscriberDirectory {
    subscribers: Vec<SubscriberPreference>,
}

impl MemorySubscriberDirectory {
    pub fn new(subscribers: Vec<SubscriberPreference>) -> Self {
        Self { subscribers }
    }
}

#[async_trait]
impl SubscriberDirectory for MemorySubscriberDirectory {
    async fn notifiable_subscribers(&self) -> Result<Vec<SubscriberPreference>, StoreError> {
        Ok(self
            .subscribers
            .iter()
            .filter(|s| s.notifications_enabled)
            .filter(|s| s.email.as_deref().is_some_and(|e| !e.trim().is_empty()))
            .cloned()
            .collect())
    }
}
