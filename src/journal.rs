use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::catalog::{CatalogSync, EnrichmentView, SyncError};
use crate::database::DatabaseError;
use crate::models::{Comment, EntryStatus, JournalEntry, JournalItem, Movie, Page, User};
use crate::utils;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("{0}")]
    Invalid(String),
    #[error("movie {0} not found")]
    MovieNotFound(i64),
    #[error("journal entry {0} not found")]
    EntryNotFound(i64),
    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),
}

impl JournalError {
    /// HTTP-style status for a presentation layer.
    pub fn status_code(&self) -> u16 {
        match self {
            JournalError::Invalid(_) => 400,
            JournalError::MovieNotFound(_) | JournalError::EntryNotFound(_) => 404,
            JournalError::DatabaseError(_) => 500,
        }
    }
}

impl From<SyncError> for JournalError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::NotFound(id) => JournalError::MovieNotFound(id),
            SyncError::DatabaseError(e) => JournalError::DatabaseError(e),
        }
    }
}

/// Edits to an entry. `None` leaves a field alone; an empty rating or
/// watched date clears it.
#[derive(Debug, Default, Clone)]
pub struct EntryForm {
    pub status: Option<String>,
    pub rating: Option<String>,
    pub watched_date: Option<String>,
    pub mood: Option<String>,
    pub review: Option<String>,
}

impl EntryForm {
    fn apply(&self, entry: &JournalEntry) -> Result<JournalEntry, JournalError> {
        let mut updated = entry.clone();

        if let Some(status) = &self.status {
            updated.status = parse_status(status)?;
        }
        if let Some(rating) = &self.rating {
            let rating = rating.trim();
            updated.rating = if rating.is_empty() { None } else { Some(parse_rating(rating)?) };
        }
        if let Some(date) = &self.watched_date {
            let date = date.trim();
            updated.watched_date = if date.is_empty() {
                None
            } else {
                let parsed = utils::parse_date(date)
                    .map_err(|e| JournalError::Invalid(format!("invalid watched date '{date}': {e}")))?;
                Some(parsed.format("%Y-%m-%d").to_string())
            };
        }
        if let Some(mood) = &self.mood {
            let mood = mood.trim();
            if mood.chars().count() > JournalEntry::MAX_MOOD_LEN {
                return Err(JournalError::Invalid(format!(
                    "mood must be at most {} characters",
                    JournalEntry::MAX_MOOD_LEN
                )));
            }
            updated.mood = mood.to_string();
        }
        if let Some(review) = &self.review {
            updated.review = review.trim().to_string();
        }

        Ok(updated)
    }
}

fn parse_status(raw: &str) -> Result<EntryStatus, JournalError> {
    raw.trim()
        .parse()
        .map_err(|_| JournalError::Invalid("invalid status".to_string()))
}

fn parse_rating(raw: &str) -> Result<u8, JournalError> {
    let rating: i64 = raw
        .trim()
        .parse()
        .map_err(|_| JournalError::Invalid("invalid rating".to_string()))?;
    if !(1..=10).contains(&rating) {
        return Err(JournalError::Invalid("rating out of range".to_string()));
    }
    Ok(rating as u8)
}

/// Detail page data: the movie, its extras and the user's own entry.
#[derive(Debug, Clone, Serialize)]
pub struct DetailView {
    pub movie: Movie,
    pub enrichment: EnrichmentView,
    pub entry: Option<JournalEntry>,
    pub stars_to_fill: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryView {
    pub entry: JournalEntry,
    pub movie: Movie,
    pub comments: Vec<Comment>,
    pub stars_to_fill: u8,
}

/// Journal operations on behalf of one authenticated user.
pub struct Journal<'a> {
    sync: CatalogSync<'a>,
    user: User,
}

impl<'a> Journal<'a> {
    pub fn new(sync: CatalogSync<'a>, user: User) -> Self {
        Self { sync, user }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    fn save(&self, mut entry: JournalEntry) -> Result<JournalEntry, JournalError> {
        entry.updated_at = utils::now_timestamp();
        self.sync.db().update_entry(&entry)?;
        Ok(entry)
    }

    fn own_entry(&self, entry_id: i64) -> Result<JournalEntry, JournalError> {
        self.sync
            .db()
            .get_entry_for_user(entry_id, self.user.id)?
            .ok_or(JournalError::EntryNotFound(entry_id))
    }

    fn entry_for(&self, tmdb_id: i64) -> Result<(JournalEntry, bool), JournalError> {
        let movie = self.sync.ensure_movie(tmdb_id)?;
        let movie_id = movie.id.ok_or(DatabaseError::MissingId("movie"))?;
        Ok(self.sync.db().get_or_create_entry(self.user.id, movie_id)?)
    }

    /// Start journaling a movie. Returns the entry and whether it is new.
    pub fn add(&self, tmdb_id: i64) -> Result<(JournalEntry, bool), JournalError> {
        let (entry, created) = self.entry_for(tmdb_id)?;
        debug!(tmdb_id, created, user = %self.user.username, "Journal entry ready");
        Ok((entry, created))
    }

    pub fn set_status(&self, tmdb_id: i64, status: &str) -> Result<JournalEntry, JournalError> {
        let status = parse_status(status)?;
        let (mut entry, _) = self.entry_for(tmdb_id)?;
        entry.status = status;
        self.save(entry)
    }

    pub fn rate(&self, tmdb_id: i64, rating: &str) -> Result<JournalEntry, JournalError> {
        let rating = parse_rating(rating)?;
        let (mut entry, _) = self.entry_for(tmdb_id)?;
        entry.rating = Some(rating);
        self.save(entry)
    }

    /// Apply a form to one of the user's own entries
    pub fn edit(&self, entry_id: i64, form: &EntryForm) -> Result<JournalEntry, JournalError> {
        let entry = self.own_entry(entry_id)?;
        let updated = form.apply(&entry)?;
        self.save(updated)
    }

    pub fn comment(&self, entry_id: i64, text: &str) -> Result<Comment, JournalError> {
        let entry = self.own_entry(entry_id)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(JournalError::Invalid("comment must not be empty".to_string()));
        }
        let entry_id = entry.id.ok_or(DatabaseError::MissingId("journal entry"))?;
        let mut comment = Comment::new(entry_id, self.user.id, text.to_string());
        comment.id = Some(self.sync.db().insert_comment(&comment)?);
        Ok(comment)
    }

    pub fn entry(&self, entry_id: i64) -> Result<EntryView, JournalError> {
        let entry = self.own_entry(entry_id)?;
        let db = self.sync.db();
        let movie = db.get_movie(entry.movie_id)?;
        let comments = db.list_comments(entry_id)?;
        Ok(EntryView {
            stars_to_fill: entry.stars_to_fill(),
            entry,
            movie,
            comments,
        })
    }

    /// The user's entries, most recently updated first
    pub fn list(&self, page: Option<u32>, per_page: u32) -> Result<Page<JournalItem>, JournalError> {
        let db = self.sync.db();
        let total = db.count_entries_for_user(self.user.id)?;
        let number = utils::clamp_page(page, total, per_page);
        let offset = i64::from(number - 1) * i64::from(per_page);
        let items = db.list_entries_for_user(self.user.id, per_page, offset)?;
        Ok(Page::new(items, number, per_page, total))
    }

    pub fn detail(&self, tmdb_id: i64) -> Result<DetailView, JournalError> {
        let detail = self.sync.detail(tmdb_id)?;
        let movie_id = detail.movie.id.ok_or(DatabaseError::MissingId("movie"))?;
        let entry = self.sync.db().find_entry(self.user.id, movie_id)?;
        let stars_to_fill = utils::stars_to_fill(entry.as_ref().and_then(|e| e.rating));
        Ok(DetailView {
            movie: detail.movie,
            enrichment: detail.enrichment,
            entry,
            stars_to_fill,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::catalog::client::fakes::{ScriptedTransport, client};
    use crate::catalog::client::{CatalogClient, HttpResponse};
    use crate::database::Database;

    fn movie_transport() -> ScriptedTransport {
        ScriptedTransport::new(|url, _| {
            let id: i64 = url.rsplit('/').next().unwrap().parse().unwrap();
            Ok(HttpResponse::ok(json!({"id": id, "title": format!("Film {id}")}).to_string()))
        })
    }

    fn setup() -> (Database, CatalogClient) {
        let db = Database::open_in_memory().unwrap();
        let (client, _, _) = client(movie_transport());
        (db, client)
    }

    fn journal<'a>(db: &'a Database, client: &'a CatalogClient, name: &str) -> Journal<'a> {
        let user = db.get_or_create_user(name).unwrap();
        Journal::new(CatalogSync::new(client, db), user)
    }

    #[test]
    fn add_is_get_or_create() {
        let (db, client) = setup();
        let j = journal(&db, &client, "alice");

        let (entry, created) = j.add(10).unwrap();
        assert!(created);
        assert_eq!(entry.status, EntryStatus::Watched);
        assert_eq!(entry.rating, None);

        let (again, created) = j.add(10).unwrap();
        assert!(!created);
        assert_eq!(again.id, entry.id);
        assert_eq!(db.get_movie_by_tmdb_id(10).unwrap().unwrap().title, "Film 10");
    }

    #[test]
    fn invalid_status_is_rejected_before_any_lookup() {
        let db = Database::open_in_memory().unwrap();
        let (client, calls, _) = client(ScriptedTransport::failing());
        let j = journal(&db, &client, "alice");

        let err = j.set_status(1, "seen").unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn set_status_creates_entry_and_updates_it() {
        let (db, client) = setup();
        let j = journal(&db, &client, "alice");

        let entry = j.set_status(3, "favorite").unwrap();
        assert_eq!(entry.status, EntryStatus::Favorite);
        let entry = j.set_status(3, "watchlist").unwrap();
        assert_eq!(entry.status, EntryStatus::Watchlist);
        assert_eq!(db.count_entries_for_user(j.user().id).unwrap(), 1);
    }

    #[test]
    fn rating_is_validated() {
        let (db, client) = setup();
        let j = journal(&db, &client, "alice");

        assert!(matches!(j.rate(1, "ten"), Err(JournalError::Invalid(m)) if m == "invalid rating"));
        assert!(matches!(j.rate(1, "0"), Err(JournalError::Invalid(m)) if m == "rating out of range"));
        assert!(matches!(j.rate(1, "11"), Err(JournalError::Invalid(m)) if m == "rating out of range"));
        assert_eq!(j.rate(1, "7").unwrap().rating, Some(7));
    }

    #[test]
    fn unknown_movie_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let (client, _, _) = client(ScriptedTransport::failing());
        let j = journal(&db, &client, "alice");

        let err = j.rate(404, "5").unwrap_err();
        assert!(matches!(err, JournalError::MovieNotFound(404)));
        assert_eq!(err.status_code(), 404);
        assert_eq!(db.count_entries_for_user(j.user().id).unwrap(), 0);
    }

    #[test]
    fn edit_applies_only_given_fields() {
        let (db, client) = setup();
        let j = journal(&db, &client, "alice");
        let (entry, _) = j.add(5).unwrap();
        let id = entry.id.unwrap();

        let edited = j
            .edit(
                id,
                &EntryForm {
                    rating: Some("8".into()),
                    watched_date: Some("2024-03-01".into()),
                    mood: Some(" nostalgic ".into()),
                    ..EntryForm::default()
                },
            )
            .unwrap();
        assert_eq!(edited.rating, Some(8));
        assert_eq!(edited.watched_date.as_deref(), Some("2024-03-01"));
        assert_eq!(edited.mood, "nostalgic");
        assert_eq!(edited.status, EntryStatus::Watched);

        let cleared = j
            .edit(
                id,
                &EntryForm {
                    rating: Some(String::new()),
                    review: Some("  Rewatch soon.\n".into()),
                    ..EntryForm::default()
                },
            )
            .unwrap();
        assert_eq!(cleared.rating, None);
        assert_eq!(cleared.review, "Rewatch soon.");
        assert_eq!(cleared.mood, "nostalgic");
    }

    #[test]
    fn bad_form_leaves_entry_untouched() {
        let (db, client) = setup();
        let j = journal(&db, &client, "alice");
        let (entry, _) = j.add(5).unwrap();
        let id = entry.id.unwrap();

        let form = EntryForm {
            review: Some("should not be saved".into()),
            watched_date: Some("yesterday".into()),
            ..EntryForm::default()
        };
        assert!(matches!(j.edit(id, &form), Err(JournalError::Invalid(_))));

        let long_mood = EntryForm {
            mood: Some("x".repeat(33)),
            ..EntryForm::default()
        };
        assert!(matches!(j.edit(id, &long_mood), Err(JournalError::Invalid(_))));

        assert_eq!(j.entry(id).unwrap().entry.review, "");
    }

    #[test]
    fn other_users_entries_are_not_found() {
        let (db, client) = setup();
        let alice = journal(&db, &client, "alice");
        let bob = journal(&db, &client, "bob");
        let (entry, _) = alice.add(5).unwrap();
        let id = entry.id.unwrap();

        assert!(matches!(bob.edit(id, &EntryForm::default()), Err(JournalError::EntryNotFound(_))));
        assert!(matches!(bob.comment(id, "hi"), Err(JournalError::EntryNotFound(_))));
        assert!(matches!(bob.entry(id), Err(JournalError::EntryNotFound(_))));
    }

    #[test]
    fn comments_are_listed_in_creation_order() {
        let (db, client) = setup();
        let j = journal(&db, &client, "alice");
        let id = j.rate(5, "9").unwrap().id.unwrap();
        j.comment(id, "first").unwrap();
        j.comment(id, "second").unwrap();
        assert!(matches!(j.comment(id, "   "), Err(JournalError::Invalid(_))));

        let view = j.entry(id).unwrap();
        let texts: Vec<&str> = view.comments.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
        assert_eq!(view.stars_to_fill, 5);
        assert_eq!(view.movie.tmdb_id, 5);
    }

    #[test]
    fn list_is_most_recently_updated_first() {
        let (db, client) = setup();
        let j = journal(&db, &client, "alice");
        j.add(1).unwrap();
        j.add(2).unwrap();
        j.set_status(1, "favorite").unwrap();

        let page = j.list(None, 20).unwrap();
        let ids: Vec<i64> = page.items.iter().map(|item| item.movie.tmdb_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(page.total_items, 2);
        assert_eq!(page.page_range, vec![1]);
    }

    #[test]
    fn list_pages_past_the_first() {
        let (db, client) = setup();
        let j = journal(&db, &client, "alice");
        for tmdb_id in 1..=3 {
            j.add(tmdb_id).unwrap();
        }

        let page = j.list(Some(2), 2).unwrap();
        let ids: Vec<i64> = page.items.iter().map(|item| item.movie.tmdb_id).collect();
        assert_eq!(ids, vec![1]);
        assert_eq!(page.total_pages, 2);
    }

    #[test]
    fn detail_includes_own_entry_and_stars() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_movie(&Movie {
            title: "Complete".into(),
            overview: "Has everything".into(),
            poster_path: "/c.jpg".into(),
            ..Movie::new(8)
        })
        .unwrap();
        let transport = ScriptedTransport::new(|_, _| Ok(HttpResponse::ok(r#"{"id": 8, "runtime": 45}"#)));
        let (client, calls, _) = client(transport);
        let j = journal(&db, &client, "alice");

        let view = j.detail(8).unwrap();
        assert!(view.entry.is_none());
        assert_eq!(view.stars_to_fill, 0);

        j.rate(8, "7").unwrap();
        let view = j.detail(8).unwrap();
        assert_eq!(view.entry.unwrap().rating, Some(7));
        assert_eq!(view.stars_to_fill, 4);
        assert_eq!(view.enrichment.runtime_display.as_deref(), Some("45m"));
        // complete rows skip the backfill call, only enrichment hits the network
        assert_eq!(calls.borrow().len(), 2);
    }
}
