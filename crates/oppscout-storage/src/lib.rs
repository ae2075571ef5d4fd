//! Opportunity Store, subscriber directory, and the network plumbing source fetchers share.

pub mod http;
pub mod memory;
pub mod pg;
pub mod session;
pub mod store;

pub use http::{FetchError, HttpClientConfig, HttpFetcher, RetryPolicy};
pub use memory::{MemoryOpportunityStore, MemorySubscriberDirectory};
pub use pg::{PgOpportunityStore, PgSubscriberDirectory};
pub use session::{PageSession, SessionError, SessionPool, SessionPoolConfig};
pub use store::{OpportunityStore, StoreError, SubscriberDirectory};

pub const CRATE_NAME: &str = "oppscout-storage";
