use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::utils;

/// Locally cached copy of one catalog movie.
///
/// Text fields are never NULL: the normalizer coerces missing values to an
/// empty string before anything reaches the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: Option<i64>,
    pub tmdb_id: i64,
    pub title: String,
    pub overview: String,
    pub poster_path: String,
    pub release_date: String, // loosely formatted, usually YYYY-MM-DD
    pub popularity: f64,
}

impl Movie {
    pub fn new(tmdb_id: i64) -> Self {
        Self {
            id: None,
            tmdb_id,
            title: String::new(),
            overview: String::new(),
            poster_path: String::new(),
            release_date: String::new(),
            popularity: 0.0,
        }
    }

    /// Fill every empty field of `self` from `existing`.
    pub fn or_existing(mut self, existing: &Movie) -> Self {
        fn keep(fresh: &mut String, old: &str) {
            if fresh.is_empty() {
                *fresh = old.to_string();
            }
        }
        keep(&mut self.title, &existing.title);
        keep(&mut self.overview, &existing.overview);
        keep(&mut self.poster_path, &existing.poster_path);
        keep(&mut self.release_date, &existing.release_date);
        if self.popularity == 0.0 {
            self.popularity = existing.popularity;
        }
        self
    }

    /// True when the detail view should try to backfill from the catalog.
    pub fn is_incomplete(&self) -> bool {
        self.overview.is_empty() || self.poster_path.is_empty()
    }
}

/// Outcome of a create-or-update keyed by an external id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Created,
    Updated,
}

impl UpsertOutcome {
    pub fn created(self) -> bool {
        self == UpsertOutcome::Created
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    #[default]
    Watched,
    Watchlist,
    Favorite,
}

impl EntryStatus {
    pub const ALL: [EntryStatus; 3] = [EntryStatus::Watched, EntryStatus::Watchlist, EntryStatus::Favorite];

    pub fn as_str(self) -> &'static str {
        match self {
            EntryStatus::Watched => "watched",
            EntryStatus::Watchlist => "watchlist",
            EntryStatus::Favorite => "favorite",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidStatus(pub String);

impl fmt::Display for InvalidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid status '{}'", self.0)
    }
}

impl std::error::Error for InvalidStatus {}

impl FromStr for EntryStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntryStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| InvalidStatus(s.to_string()))
    }
}

impl ToSql for EntryStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for EntryStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse().map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: Option<i64>,
    pub user_id: i64,
    pub movie_id: i64,
    pub status: EntryStatus,
    pub rating: Option<u8>,           // 1-10
    pub review: String,
    pub mood: String,                 // short tag, at most MAX_MOOD_LEN chars
    pub watched_date: Option<String>, // ISO 8601: YYYY-MM-DD
    pub created_at: String,
    pub updated_at: String,
}

impl JournalEntry {
    pub const MAX_MOOD_LEN: usize = 32;

    pub fn new(user_id: i64, movie_id: i64) -> Self {
        let now = utils::now_timestamp();
        Self {
            id: None,
            user_id,
            movie_id,
            status: EntryStatus::default(),
            rating: None,
            review: String::new(),
            mood: String::new(),
            watched_date: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn stars_to_fill(&self) -> u8 {
        utils::stars_to_fill(self.rating)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Option<i64>,
    pub entry_id: i64,
    pub user_id: i64,
    pub text: String,
    pub created_at: String,
}

impl Comment {
    pub fn new(entry_id: i64, user_id: i64, text: String) -> Self {
        Self {
            id: None,
            entry_id,
            user_id,
            text,
            created_at: utils::now_timestamp(),
        }
    }
}

/// A journal entry joined with the movie it is about.
#[derive(Debug, Clone, Serialize)]
pub struct JournalItem {
    pub entry: JournalEntry,
    pub movie: Movie,
}

/// One page of a listing plus the page numbers worth showing.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u32,
    pub total_pages: u32,
    pub total_items: u64,
    pub page_range: Vec<u32>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, number: u32, per_page: u32, total_items: u64) -> Self {
        let total_pages = utils::total_pages(total_items, per_page);
        Self {
            items,
            number,
            total_pages,
            total_items,
            page_range: utils::smart_page_range(number, total_pages),
        }
    }

    /// No listing at all, so no pager either
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            number: 1,
            total_pages: 1,
            total_items: 0,
            page_range: Vec::new(),
        }
    }
}
