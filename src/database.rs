use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::PathBuf;
use thiserror::Error;

use crate::models::{Comment, JournalEntry, JournalItem, Movie, UpsertOutcome, User};
use crate::utils;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
    #[error("Failed to create database directory: {0}")]
    DirectoryError(String),
    #[error("Record has no id: {0}")]
    MissingId(&'static str),
}

const MOVIE_COLUMNS: &str = "id, tmdb_id, title, overview, poster_path, release_date, popularity";

const ENTRY_COLUMNS: &str = "id, user_id, movie_id, status, rating, review, mood, watched_date, created_at, updated_at";

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Create a new database connection and initialize the schema
    pub fn new(path: &str) -> Result<Self, DatabaseError> {
        let db_path = PathBuf::from(path);

        // Create parent directory if it doesn't exist
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DatabaseError::DirectoryError(e.to_string()))?;
            }
        }

        let conn = Connection::open(&db_path)?;
        Self::with_connection(conn)
    }

    /// Open a private in-memory database, mostly useful for tests
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, DatabaseError> {
        conn.pragma_update(None, "foreign_keys", true)?;
        let db = Database { conn };
        db.initialize_schema()?;
        Ok(db)
    }

    /// Initialize the database schema (tables and indexes)
    fn initialize_schema(&self) -> Result<(), DatabaseError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                username        TEXT NOT NULL UNIQUE,
                created_at      TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS movies (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                tmdb_id         INTEGER NOT NULL UNIQUE,
                title           TEXT NOT NULL DEFAULT '',
                overview        TEXT NOT NULL DEFAULT '',
                poster_path     TEXT NOT NULL DEFAULT '',
                release_date    TEXT NOT NULL DEFAULT '',
                popularity      REAL NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS journal_entries (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                movie_id        INTEGER NOT NULL REFERENCES movies(id) ON DELETE CASCADE,
                status          TEXT NOT NULL DEFAULT 'watched'
                                CHECK (status IN ('watched', 'watchlist', 'favorite')),
                rating          INTEGER CHECK (rating IS NULL OR rating BETWEEN 1 AND 10),
                review          TEXT NOT NULL DEFAULT '',
                mood            TEXT NOT NULL DEFAULT '',
                watched_date    TEXT,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL,
                UNIQUE (user_id, movie_id)
            );

            CREATE TABLE IF NOT EXISTS comments (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                entry_id        INTEGER NOT NULL REFERENCES journal_entries(id) ON DELETE CASCADE,
                user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                text            TEXT NOT NULL,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_movies_popularity ON movies(popularity);
            CREATE INDEX IF NOT EXISTS idx_movies_title ON movies(title);
            CREATE INDEX IF NOT EXISTS idx_entries_user_updated ON journal_entries(user_id, updated_at);
            CREATE INDEX IF NOT EXISTS idx_comments_entry ON comments(entry_id, created_at);",
        )?;
        Ok(())
    }

    fn immediate(&self) -> Result<Transaction<'_>, DatabaseError> {
        Ok(Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?)
    }

    // ---------------------------------------------------------------------
    // Users
    // ---------------------------------------------------------------------

    /// Fetch the user with this name, creating it on first use
    pub fn get_or_create_user(&self, username: &str) -> Result<User, DatabaseError> {
        let tx = self.immediate()?;
        tx.execute(
            "INSERT INTO users (username, created_at) VALUES (?1, ?2)
             ON CONFLICT(username) DO NOTHING",
            rusqlite::params![username, utils::now_timestamp()],
        )?;
        let user = tx.query_row(
            "SELECT id, username, created_at FROM users WHERE username = ?1",
            rusqlite::params![username],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        )?;
        tx.commit()?;
        Ok(user)
    }

    // ---------------------------------------------------------------------
    // Movies
    // ---------------------------------------------------------------------

    /// Helper function to map a row to a Movie
    fn row_to_movie(row: &rusqlite::Row) -> Result<Movie, rusqlite::Error> {
        Ok(Movie {
            id: Some(row.get(0)?),
            tmdb_id: row.get(1)?,
            title: row.get(2)?,
            overview: row.get(3)?,
            poster_path: row.get(4)?,
            release_date: row.get(5)?,
            popularity: row.get(6)?,
        })
    }

    /// Create the movie if its `tmdb_id` is unknown, otherwise overwrite every
    /// tracked field. Both the write and the created/updated decision happen
    /// inside one immediate transaction.
    pub fn upsert_movie(&self, movie: &Movie) -> Result<(Movie, UpsertOutcome), DatabaseError> {
        let tx = self.immediate()?;

        let existed: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM movies WHERE tmdb_id = ?1)",
            rusqlite::params![movie.tmdb_id],
            |row| row.get(0),
        )?;

        tx.execute(
            "INSERT INTO movies (tmdb_id, title, overview, poster_path, release_date, popularity)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(tmdb_id) DO UPDATE SET
                title = excluded.title,
                overview = excluded.overview,
                poster_path = excluded.poster_path,
                release_date = excluded.release_date,
                popularity = excluded.popularity",
            rusqlite::params![
                movie.tmdb_id,
                movie.title,
                movie.overview,
                movie.poster_path,
                movie.release_date,
                movie.popularity
            ],
        )?;

        let stored = tx.query_row(
            &format!("SELECT {MOVIE_COLUMNS} FROM movies WHERE tmdb_id = ?1"),
            rusqlite::params![movie.tmdb_id],
            Self::row_to_movie,
        )?;
        tx.commit()?;

        let outcome = if existed { UpsertOutcome::Updated } else { UpsertOutcome::Created };
        Ok((stored, outcome))
    }

    /// Get a movie by its external catalog id
    pub fn get_movie_by_tmdb_id(&self, tmdb_id: i64) -> Result<Option<Movie>, DatabaseError> {
        self.conn
            .query_row(
                &format!("SELECT {MOVIE_COLUMNS} FROM movies WHERE tmdb_id = ?1"),
                rusqlite::params![tmdb_id],
                Self::row_to_movie,
            )
            .optional()
            .map_err(DatabaseError::from)
    }

    /// Get a movie by its local row id
    pub fn get_movie(&self, id: i64) -> Result<Movie, DatabaseError> {
        self.conn
            .query_row(
                &format!("SELECT {MOVIE_COLUMNS} FROM movies WHERE id = ?1"),
                rusqlite::params![id],
                Self::row_to_movie,
            )
            .map_err(DatabaseError::from)
    }

    /// Movies ordered by popularity DESC, optionally filtered by a
    /// case-insensitive title substring
    pub fn search_movies(
        &self,
        title_filter: Option<&str>,
        limit: u32,
        offset: i64,
    ) -> Result<Vec<Movie>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MOVIE_COLUMNS} FROM movies
             WHERE ?1 IS NULL OR title LIKE ?1 ESCAPE '\\'
             ORDER BY popularity DESC, id ASC
             LIMIT ?2 OFFSET ?3"
        ))?;
        let pattern = title_filter.map(like_pattern);
        let movies = stmt
            .query_map(rusqlite::params![pattern, limit, offset], Self::row_to_movie)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(movies)
    }

    /// Count movies matching the same filter as `search_movies`
    pub fn count_movies(&self, title_filter: Option<&str>) -> Result<u64, DatabaseError> {
        let pattern = title_filter.map(like_pattern);
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM movies WHERE ?1 IS NULL OR title LIKE ?1 ESCAPE '\\'",
            rusqlite::params![pattern],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    // ---------------------------------------------------------------------
    // Journal entries
    // ---------------------------------------------------------------------

    /// Helper function to map a row to a JournalEntry
    fn row_to_entry(row: &rusqlite::Row) -> Result<JournalEntry, rusqlite::Error> {
        Ok(JournalEntry {
            id: Some(row.get(0)?),
            user_id: row.get(1)?,
            movie_id: row.get(2)?,
            status: row.get(3)?,
            rating: row.get(4)?,
            review: row.get(5)?,
            mood: row.get(6)?,
            watched_date: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    /// Get the entry for (user, movie), creating a default one if absent.
    /// Returns the entry and whether it was created by this call.
    pub fn get_or_create_entry(
        &self,
        user_id: i64,
        movie_id: i64,
    ) -> Result<(JournalEntry, bool), DatabaseError> {
        let fresh = JournalEntry::new(user_id, movie_id);
        let tx = self.immediate()?;
        let inserted = tx.execute(
            "INSERT INTO journal_entries (user_id, movie_id, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id, movie_id) DO NOTHING",
            rusqlite::params![
                fresh.user_id,
                fresh.movie_id,
                fresh.status,
                fresh.created_at,
                fresh.updated_at
            ],
        )?;
        let entry = tx.query_row(
            &format!("SELECT {ENTRY_COLUMNS} FROM journal_entries WHERE user_id = ?1 AND movie_id = ?2"),
            rusqlite::params![user_id, movie_id],
            Self::row_to_entry,
        )?;
        tx.commit()?;
        Ok((entry, inserted == 1))
    }

    /// Find the entry for (user, movie) without creating it
    pub fn find_entry(&self, user_id: i64, movie_id: i64) -> Result<Option<JournalEntry>, DatabaseError> {
        self.conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM journal_entries WHERE user_id = ?1 AND movie_id = ?2"),
                rusqlite::params![user_id, movie_id],
                Self::row_to_entry,
            )
            .optional()
            .map_err(DatabaseError::from)
    }

    /// Get an entry by id, only if it belongs to `user_id`
    pub fn get_entry_for_user(&self, id: i64, user_id: i64) -> Result<Option<JournalEntry>, DatabaseError> {
        self.conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM journal_entries WHERE id = ?1 AND user_id = ?2"),
                rusqlite::params![id, user_id],
                Self::row_to_entry,
            )
            .optional()
            .map_err(DatabaseError::from)
    }

    /// Update the mutable fields of an existing entry
    pub fn update_entry(&self, entry: &JournalEntry) -> Result<(), DatabaseError> {
        let id = entry.id.ok_or(DatabaseError::MissingId("journal entry"))?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE journal_entries SET status = ?1, rating = ?2, review = ?3, mood = ?4,
             watched_date = ?5, updated_at = ?6 WHERE id = ?7",
            rusqlite::params![
                entry.status,
                entry.rating,
                entry.review,
                entry.mood,
                entry.watched_date,
                entry.updated_at,
                id
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// A user's entries joined with their movies, most recently updated first
    pub fn list_entries_for_user(
        &self,
        user_id: i64,
        limit: u32,
        offset: i64,
    ) -> Result<Vec<JournalItem>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT e.id, e.user_id, e.movie_id, e.status, e.rating, e.review, e.mood,
                    e.watched_date, e.created_at, e.updated_at,
                    m.id, m.tmdb_id, m.title, m.overview, m.poster_path, m.release_date, m.popularity
             FROM journal_entries e JOIN movies m ON m.id = e.movie_id
             WHERE e.user_id = ?1
             ORDER BY e.updated_at DESC, e.id DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let items = stmt
            .query_map(rusqlite::params![user_id, limit, offset], |row| {
                Ok(JournalItem {
                    entry: Self::row_to_entry(row)?,
                    movie: Movie {
                        id: Some(row.get(10)?),
                        tmdb_id: row.get(11)?,
                        title: row.get(12)?,
                        overview: row.get(13)?,
                        poster_path: row.get(14)?,
                        release_date: row.get(15)?,
                        popularity: row.get(16)?,
                    },
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    pub fn count_entries_for_user(&self, user_id: i64) -> Result<u64, DatabaseError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM journal_entries WHERE user_id = ?1",
            rusqlite::params![user_id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    // ---------------------------------------------------------------------
    // Comments
    // ---------------------------------------------------------------------

    /// Insert a comment and return its ID
    pub fn insert_comment(&self, comment: &Comment) -> Result<i64, DatabaseError> {
        self.conn.execute(
            "INSERT INTO comments (entry_id, user_id, text, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![comment.entry_id, comment.user_id, comment.text, comment.created_at],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Comments on an entry, oldest first
    pub fn list_comments(&self, entry_id: i64) -> Result<Vec<Comment>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, entry_id, user_id, text, created_at
             FROM comments WHERE entry_id = ?1 ORDER BY created_at ASC, id ASC",
        )?;
        let comments = stmt
            .query_map(rusqlite::params![entry_id], |row| {
                Ok(Comment {
                    id: Some(row.get(0)?),
                    entry_id: row.get(1)?,
                    user_id: row.get(2)?,
                    text: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(comments)
    }
}

/// `%needle%` with LIKE wildcards in the needle escaped
fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn movie(tmdb_id: i64, title: &str, popularity: f64) -> Movie {
        Movie {
            title: title.to_string(),
            popularity,
            ..Movie::new(tmdb_id)
        }
    }

    #[test]
    fn upsert_twice_keeps_one_row_with_last_write() {
        let db = Database::open_in_memory().unwrap();

        let (first, outcome) = db.upsert_movie(&movie(550, "Fight Club", 10.0)).unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);

        let mut second_input = movie(550, "Fight Club (1999)", 12.5);
        second_input.overview = String::new();
        let (second, outcome) = db.upsert_movie(&second_input).unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(second.id, first.id);
        assert_eq!(second.title, "Fight Club (1999)");
        assert_eq!(second.popularity, 12.5);

        let (third, outcome) = db.upsert_movie(&second_input).unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(third, second);
        assert_eq!(db.count_movies(None).unwrap(), 1);
    }

    #[test]
    fn upsert_replaces_instead_of_merging() {
        let db = Database::open_in_memory().unwrap();
        let mut full = movie(1, "A", 1.0);
        full.overview = "Plot".into();
        db.upsert_movie(&full).unwrap();

        let (stored, _) = db.upsert_movie(&movie(1, "A", 1.0)).unwrap();
        assert_eq!(stored.overview, "");
    }

    #[test]
    fn search_filters_case_insensitively_and_orders_by_popularity() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_movie(&movie(1, "The Matrix", 5.0)).unwrap();
        db.upsert_movie(&movie(2, "Matrix Reloaded", 9.0)).unwrap();
        db.upsert_movie(&movie(3, "Amelie", 7.0)).unwrap();
        db.upsert_movie(&movie(4, "100% Wolf", 1.0)).unwrap();

        let titles: Vec<String> = db
            .search_movies(Some("matrix"), 20, 0)
            .unwrap()
            .into_iter()
            .map(|m| m.title)
            .collect();
        assert_eq!(titles, vec!["Matrix Reloaded", "The Matrix"]);

        assert_eq!(db.count_movies(Some("%")).unwrap(), 1);
        assert_eq!(db.count_movies(None).unwrap(), 4);

        let page_two = db.search_movies(None, 2, 2).unwrap();
        assert_eq!(page_two.len(), 2);
        assert_eq!(page_two[0].title, "The Matrix");
    }

    #[test]
    fn entry_get_or_create_is_unique_per_user_and_movie() {
        let db = Database::open_in_memory().unwrap();
        let alice = db.get_or_create_user("alice").unwrap();
        let bob = db.get_or_create_user("bob").unwrap();
        assert_eq!(db.get_or_create_user("alice").unwrap().id, alice.id);

        let (m, _) = db.upsert_movie(&movie(9, "Heat", 3.0)).unwrap();
        let movie_id = m.id.unwrap();

        let (entry, created) = db.get_or_create_entry(alice.id, movie_id).unwrap();
        assert!(created);
        let (again, created) = db.get_or_create_entry(alice.id, movie_id).unwrap();
        assert!(!created);
        assert_eq!(again.id, entry.id);

        let (bobs, created) = db.get_or_create_entry(bob.id, movie_id).unwrap();
        assert!(created);
        assert_ne!(bobs.id, entry.id);

        assert_eq!(db.count_entries_for_user(alice.id).unwrap(), 1);
        assert!(db.get_entry_for_user(entry.id.unwrap(), bob.id).unwrap().is_none());
    }

    #[test]
    fn rating_outside_range_violates_check_constraint() {
        let db = Database::open_in_memory().unwrap();
        let user = db.get_or_create_user("u").unwrap();
        let (m, _) = db.upsert_movie(&movie(1, "X", 0.0)).unwrap();
        let (mut entry, _) = db.get_or_create_entry(user.id, m.id.unwrap()).unwrap();

        entry.rating = Some(11);
        assert!(db.update_entry(&entry).is_err());
    }

    #[test]
    fn comments_come_back_oldest_first() {
        let db = Database::open_in_memory().unwrap();
        let user = db.get_or_create_user("u").unwrap();
        let (m, _) = db.upsert_movie(&movie(1, "X", 0.0)).unwrap();
        let (entry, _) = db.get_or_create_entry(user.id, m.id.unwrap()).unwrap();
        let entry_id = entry.id.unwrap();

        for text in ["first", "second", "third"] {
            db.insert_comment(&Comment::new(entry_id, user.id, text.to_string()))
                .unwrap();
        }

        let texts: Vec<String> = db
            .list_comments(entry_id)
            .unwrap()
            .into_iter()
            .map(|c| c.text)
            .collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[test]
    fn new_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("app.db");
        let db = Database::new(path.to_str().unwrap()).unwrap();
        db.upsert_movie(&movie(1, "X", 0.0)).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn failed_write_is_skipped_and_batch_continues() {
        use crate::catalog::CatalogSync;
        use crate::catalog::client::fakes::{ScriptedTransport, client};

        let db = Database::open_in_memory().unwrap();
        db.conn
            .execute_batch(
                "CREATE TRIGGER reject_two BEFORE INSERT ON movies
                 WHEN NEW.tmdb_id = 2
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();
        let (client, _, _) = client(ScriptedTransport::failing());

        let payload = serde_json::json!({"results": [
            {"id": 1, "title": "One"},
            {"id": 2, "title": "Two"},
            {"id": 3, "title": "Three"},
        ]});
        let counts = CatalogSync::new(&client, &db).upsert_payload(&payload);

        assert_eq!(counts.created, 2);
        assert_eq!(counts.skipped, 1);
        assert_eq!(db.count_movies(None).unwrap(), 2);
        assert!(db.get_movie_by_tmdb_id(2).unwrap().is_none());
        assert!(db.get_movie_by_tmdb_id(3).unwrap().is_some());
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
