//! Reconciles the remote catalog with the local `movies` table.
//!
//! Every operation that may meet an unknown movie goes through here, so the
//! rest of the application can read movies straight from the database.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use super::client::CatalogClient;
use super::enrich::{self, EnrichmentView};
use super::normalize::{self, normalize_payload};
use crate::database::{Database, DatabaseError};
use crate::models::{Movie, Page};
use crate::utils;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("movie {0} not found locally or in the catalog")]
    NotFound(i64),
    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),
}

/// Counts from writing one payload into the cache.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpsertCounts {
    pub created: u32,
    pub updated: u32,
    pub skipped: u32,
}

impl UpsertCounts {
    fn add(&mut self, other: UpsertCounts) {
        self.created += other.created;
        self.updated += other.updated;
        self.skipped += other.skipped;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageError {
    pub page: u32,
    pub error: String,
}

/// Summary of a batch refresh.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub pages_fetched: u32,
    pub added: u32,
    pub updated: u32,
    pub skipped: u32,
    pub page_errors: Vec<PageError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MovieDetail {
    pub movie: Movie,
    pub enrichment: EnrichmentView,
}

#[derive(Clone, Copy)]
pub struct CatalogSync<'a> {
    client: &'a CatalogClient,
    db: &'a Database,
}

impl<'a> CatalogSync<'a> {
    pub fn new(client: &'a CatalogClient, db: &'a Database) -> Self {
        Self { client, db }
    }

    pub fn db(&self) -> &'a Database {
        self.db
    }

    /// Normalize and upsert every record of `payload`. A record that cannot be
    /// normalized or written is logged and skipped.
    pub fn upsert_payload(&self, payload: &Value) -> UpsertCounts {
        let batch = normalize_payload(payload);
        let mut counts = UpsertCounts {
            skipped: batch.rejected.len() as u32,
            ..UpsertCounts::default()
        };
        for (index, e) in &batch.rejected {
            warn!(index, "Skipping malformed catalog record: {e}");
        }

        for movie in &batch.records {
            match self.db.upsert_movie(movie) {
                Ok((_, outcome)) if outcome.created() => counts.created += 1,
                Ok(_) => counts.updated += 1,
                Err(e) => {
                    warn!(tmdb_id = movie.tmdb_id, "Skipping movie due to DB error: {e}");
                    counts.skipped += 1;
                }
            }
        }
        counts
    }

    /// Local catalog listing, optionally filtered by title
    pub fn browse(&self, query: Option<&str>, page: Option<u32>, per_page: u32) -> Result<Page<Movie>, SyncError> {
        let query = query.map(str::trim).filter(|q| !q.is_empty());
        let total = self.db.count_movies(query)?;
        let number = utils::clamp_page(page, total, per_page);
        let offset = i64::from(number - 1) * i64::from(per_page);
        let items = self.db.search_movies(query, per_page, offset)?;
        Ok(Page::new(items, number, per_page, total))
    }

    /// Pull matches from the catalog into the cache, then answer from the
    /// cache so remote and previously cached hits come back together.
    pub fn search(&self, query: &str, page: Option<u32>, per_page: u32) -> Result<Page<Movie>, SyncError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Page::empty());
        }

        match self.client.search(query) {
            Ok(payload) => {
                let counts = self.upsert_payload(&payload);
                info!(query, created = counts.created, updated = counts.updated, "Search synced");
            }
            Err(e) => warn!(query, "Catalog search failed, using cached movies only: {e}"),
        }

        self.browse(Some(query), page, per_page)
    }

    /// The cached movie, fetching and storing it first on a cache miss
    pub fn ensure_movie(&self, tmdb_id: i64) -> Result<Movie, SyncError> {
        if let Some(movie) = self.db.get_movie_by_tmdb_id(tmdb_id)? {
            return Ok(movie);
        }

        let payload = match self.client.movie(tmdb_id) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(tmdb_id, "Could not fetch movie: {e}");
                return Err(SyncError::NotFound(tmdb_id));
            }
        };

        let fresh = match normalize::normalize(&payload) {
            Ok(movie) => movie,
            Err(e) => {
                warn!(tmdb_id, "Catalog returned an unusable record: {e}");
                return Err(SyncError::NotFound(tmdb_id));
            }
        };
        let (movie, _) = self.db.upsert_movie(&fresh)?;
        Ok(movie)
    }

    /// Detail view for a movie that must already be cached. Backfills an
    /// incomplete row and attaches enrichment; catalog failures only cost
    /// the extras.
    pub fn detail(&self, tmdb_id: i64) -> Result<MovieDetail, SyncError> {
        let mut movie = self
            .db
            .get_movie_by_tmdb_id(tmdb_id)?
            .ok_or(SyncError::NotFound(tmdb_id))?;

        if movie.is_incomplete() {
            movie = self.backfill(movie)?;
        }

        let enrichment = match self.client.movie_extended(tmdb_id) {
            Ok(payload) => enrich::resolve(&payload),
            Err(e) => {
                warn!(tmdb_id, "Skipping enrichment: {e}");
                EnrichmentView::default()
            }
        };

        Ok(MovieDetail { movie, enrichment })
    }

    fn backfill(&self, existing: Movie) -> Result<Movie, SyncError> {
        let payload = match self.client.movie(existing.tmdb_id) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(tmdb_id = existing.tmdb_id, "Backfill fetch failed: {e}");
                return Ok(existing);
            }
        };

        match normalize::normalize(&payload) {
            Ok(fresh) if fresh.tmdb_id == existing.tmdb_id => {
                let (stored, _) = self.db.upsert_movie(&fresh.or_existing(&existing))?;
                Ok(stored)
            }
            Ok(fresh) => {
                warn!(
                    tmdb_id = existing.tmdb_id,
                    returned = fresh.tmdb_id,
                    "Catalog answered with a different movie, keeping cached row"
                );
                Ok(existing)
            }
            Err(e) => {
                warn!(tmdb_id = existing.tmdb_id, "Backfill record unusable: {e}");
                Ok(existing)
            }
        }
    }

    /// Page through the popular listing and cache every movie on it.
    /// A failed page is recorded and the remaining pages still run.
    pub fn refresh(&self, pages: u32) -> RefreshReport {
        let mut report = RefreshReport::default();
        let mut totals = UpsertCounts::default();

        for page in 1..=pages {
            match self.client.popular(page) {
                Ok(payload) => {
                    let counts = self.upsert_payload(&payload);
                    info!(page, created = counts.created, updated = counts.updated, "Page done");
                    totals.add(counts);
                    report.pages_fetched += 1;
                }
                Err(e) => {
                    warn!(page, "Error fetching page: {e}");
                    report.page_errors.push(PageError {
                        page,
                        error: e.to_string(),
                    });
                }
            }
        }

        report.added = totals.created;
        report.updated = totals.updated;
        report.skipped = totals.skipped;
        info!(added = report.added, failed_pages = report.page_errors.len(), "Refresh finished");
        report
    }
}
