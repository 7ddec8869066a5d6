//! Synchronization between the TMDb catalog and the local movie cache.

pub mod client;
pub mod enrich;
pub mod normalize;
pub mod sync;

pub use client::{
    CatalogClient, FetchError, HttpResponse, ReqwestTransport, RetryPolicy, Sleeper, ThreadSleeper, Transport,
};
pub use enrich::{EnrichmentView, resolve};
pub use normalize::{NormalizeError, normalize};
pub use sync::{CatalogSync, MovieDetail, RefreshReport, SyncError};
