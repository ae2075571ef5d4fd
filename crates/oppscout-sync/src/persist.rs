//! Persistence Gateway: one insert per item, then a best-effort index sync.

use std::sync::Arc;

use oppscout_core::{NewOpportunity, OpportunityRecord};
use oppscout_storage::OpportunityStore;
use tracing::{debug, warn};

use crate::similarity::{IndexMetadata, SimilarityIndex};

#[derive(Debug, Clone, PartialEq)]
pub enum PersistOutcome {
    Created(Box<OpportunityRecord>),
    /// A uniqueness constraint fired: an overlapping run or an earlier item won the race.
    Conflict,
    Failed(String),
}

pub struct PersistenceGateway {
    store: Arc<dyn OpportunityStore>,
    index: Arc<dyn SimilarityIndex>,
}

impl PersistenceGateway {
    pub fn new(store: Arc<dyn OpportunityStore>, index: Arc<dyn SimilarityIndex>) -> Self {
        Self { store, index }
    }

    pub async fn persist(&self, opportunity: &NewOpportunity) -> PersistOutcome {
        let record = match self.store.insert(opportunity).await {
            Ok(record) => record,
            Err(err) if err.is_conflict() => {
                debug!(title = %opportunity.title, error = %err, "insert conflict treated as duplicate");
                return PersistOutcome::Conflict;
            }
            Err(err) => {
                warn!(source = %opportunity.source, title = %opportunity.title, error = %err, "persist failed");
                return PersistOutcome::Failed(err.to_string());
            }
        };

        if let Err(err) = self
            .index
            .upsert(record.id, &record.dedup_blob(), &IndexMetadata::for_record(&record))
            .await
        {
            warn!(id = %record.id, error = %err, "similarity index out of sync");
        }
        PersistOutcome::Created(Box::new(record))
    }
}
