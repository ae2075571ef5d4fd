//! Ingestion pipeline: identity resolution, enrichment, persistence, and notification fan-out
//! over the source fetchers registered in `sources.yaml`.

use thiserror::Error;

pub mod classify;
pub mod config;
pub mod enrich;
pub mod notify;
pub mod persist;
pub mod pipeline;
pub mod resolve;
pub mod similarity;

pub use classify::{
    Classification, ClassificationService, HttpClassificationService, NullClassificationService,
};
pub use config::{load_source_registry, NotifierSettings, PipelineConfig, SimilarityBackend, SourceRegistry};
pub use enrich::{DnsHostResolver, EnrichOutcome, Enricher, FixedHostResolver, HostResolver};
pub use notify::{FanoutOutcome, HttpNotifier, LogNotifier, NotificationFanout, Notifier};
pub use persist::{PersistOutcome, PersistenceGateway};
pub use pipeline::{run_sync_once_from_env, PipelineDeps, RunPhase, RunSummary, SyncPipeline};
pub use resolve::{DuplicateTier, IdentityResolver, Resolution};
pub use similarity::{
    HttpSimilarityIndex, InMemorySimilarityIndex, IndexFilter, IndexMetadata, NullSimilarityIndex,
    SimilarHit, SimilarityIndex,
};

pub const CRATE_NAME: &str = "oppscout-sync";

/// Failure of an external collaborator (classifier, similarity index, notifier).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} is not configured")]
    Disabled(&'static str),
    #[error("{service} unavailable: {message}")]
    Unavailable {
        service: &'static str,
        message: String,
    },
    #[error("{service} returned HTTP {status}")]
    Status { service: &'static str, status: u16 },
    #[error("{service} sent a malformed response: {message}")]
    Malformed {
        service: &'static str,
        message: String,
    },
}

impl ServiceError {
    pub fn from_reqwest(service: &'static str, err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            ServiceError::Status {
                service,
                status: status.as_u16(),
            }
        } else if err.is_decode() {
            ServiceError::Malformed {
                service,
                message: err.to_string(),
            }
        } else {
            ServiceError::Unavailable {
                service,
                message: err.to_string(),
            }
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, ServiceError::Disabled(_))
    }
}

/// POST `body` as JSON and decode the JSON reply; non-2xx is a `Status` error.
pub(crate) async fn post_json<B, T>(
    client: &reqwest::Client,
    service: &'static str,
    url: &str,
    body: &B,
) -> Result<T, ServiceError>
where
    B: serde::Serialize + ?Sized,
    T: serde::de::DeserializeOwned,
{
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| ServiceError::from_reqwest(service, e))?;
    let status = response.status();
    if !status.is_success() {
        return Err(ServiceError::Status {
            service,
            status: status.as_u16(),
        });
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ServiceError::from_reqwest(service, e))?;
    serde_json::from_slice(&bytes).map_err(|e| ServiceError::Malformed {
        service,
        message: e.to_string(),
    })
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
