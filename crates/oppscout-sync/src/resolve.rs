//! Identity Resolver: exact key, freshness, then similarity.

use std::sync::Arc;

use chrono::NaiveDate;
use oppscout_core::text::{extract_deadline_at, is_fresh, normalize_url};
use oppscout_core::{Candidate, MissingFieldPatch};
use oppscout_storage::{OpportunityStore, StoreError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::similarity::{IndexFilter, SimilarityIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateTier {
    /// `(source, source_native_id)` or normalized URL.
    ExactKey,
    Similarity,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    New,
    Duplicate {
        existing_id: Uuid,
        tier: DuplicateTier,
        /// Missing fields were copied onto the existing record.
        merged: bool,
    },
    Stale,
}

pub struct IdentityResolver {
    store: Arc<dyn OpportunityStore>,
    index: Arc<dyn SimilarityIndex>,
    threshold: f64,
    top_k: usize,
    freshness_cutoff_year: i32,
    today: NaiveDate,
}

impl IdentityResolver {
    pub fn new(
        store: Arc<dyn OpportunityStore>,
        index: Arc<dyn SimilarityIndex>,
        threshold: f64,
        top_k: usize,
        freshness_cutoff_year: i32,
        today: NaiveDate,
    ) -> Self {
        Self {
            store,
            index,
            threshold,
            top_k: top_k.max(1),
            freshness_cutoff_year,
            today,
        }
    }

    /// Classify `candidate` against what is already stored.
    ///
    /// A stale deadline is replaced in place when a fresher one can be re-extracted from
    /// the text. Only exact-key lookups can fail the call; index trouble degrades to a miss.
    pub async fn resolve(&self, candidate: &mut Candidate) -> Result<Resolution, StoreError> {
        let normalized = normalize_url(&candidate.url);
        let existing = self
            .store
            .find_existing(
                &candidate.source,
                candidate.source_native_id.as_deref(),
                &normalized,
            )
            .await?;
        if let Some(existing) = existing {
            let merged = match MissingFieldPatch::between(&existing, candidate) {
                Some(patch) => match self.store.fill_missing(existing.id, &patch).await {
                    Ok(updated) => updated.is_some(),
                    Err(err) => {
                        warn!(id = %existing.id, error = %err, "could not merge missing fields");
                        false
                    }
                },
                None => false,
            };
            return Ok(Resolution::Duplicate {
                existing_id: existing.id,
                tier: DuplicateTier::ExactKey,
                merged,
            });
        }

        if let Some(deadline) = candidate.deadline {
            if !is_fresh(deadline, self.freshness_cutoff_year) {
                let refreshed = extract_deadline_at(&candidate.text_blob(), self.today)
                    .filter(|d| is_fresh(*d, self.freshness_cutoff_year));
                match refreshed {
                    Some(fresh) => candidate.deadline = Some(fresh),
                    None => {
                        debug!(title = %candidate.title, %deadline, "stale deadline");
                        return Ok(Resolution::Stale);
                    }
                }
            }
        }

        let blob = candidate.dedup_blob();
        match self
            .index
            .query(&blob, self.top_k, Some(&IndexFilter::open_only()))
            .await
        {
            Ok(hits) => {
                if let Some(top) = hits.first().filter(|hit| hit.score >= self.threshold) {
                    debug!(title = %candidate.title, existing = %top.id, score = top.score, "near duplicate");
                    return Ok(Resolution::Duplicate {
                        existing_id: top.id,
                        tier: DuplicateTier::Similarity,
                        merged: false,
                    });
                }
            }
            Err(err) => warn!(error = %err, "similarity lookup skipped"),
        }

        Ok(Resolution::New)
    }
}
