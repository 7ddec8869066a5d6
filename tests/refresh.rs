//! End-to-end runs of the sync core against a file-backed database and a
//! scripted catalog.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use reeljournal::catalog::{FetchError, HttpResponse, RetryPolicy, Sleeper, Transport};
use reeljournal::{CatalogClient, CatalogSync, Database, Journal};
use serde_json::json;

/// Serves five pages of twenty popular movies, ids unique across pages.
struct PopularCatalog {
    requests: Rc<Cell<u32>>,
}

impl Transport for PopularCatalog {
    fn get(&self, url: &str, query: &[(&str, String)]) -> Result<HttpResponse, FetchError> {
        self.requests.set(self.requests.get() + 1);
        assert!(url.ends_with("/movie/popular"), "unexpected url {url}");
        let page: i64 = query
            .iter()
            .find(|(k, _)| *k == "page")
            .and_then(|(_, v)| v.parse().ok())
            .expect("page parameter");
        let results: Vec<_> = (1..=20)
            .map(|n| {
                let id = page * 1000 + n;
                json!({
                    "id": id,
                    "title": format!("Popular {id}"),
                    "overview": null,
                    "poster_path": null,
                    "release_date": "2024-01-01",
                    "popularity": 100.0 - n as f64
                })
            })
            .collect();
        Ok(HttpResponse::ok(json!({"page": page, "results": results}).to_string()))
    }
}

struct Unreachable;

impl Transport for Unreachable {
    fn get(&self, _url: &str, _query: &[(&str, String)]) -> Result<HttpResponse, FetchError> {
        Err(FetchError::Timeout("operation timed out".to_string()))
    }
}

#[derive(Clone, Default)]
struct CountingSleeper(Rc<Cell<u32>>);

impl Sleeper for CountingSleeper {
    fn sleep(&self, _duration: Duration) {
        self.0.set(self.0.get() + 1);
    }
}

fn client(transport: impl Transport + 'static, sleeper: CountingSleeper) -> CatalogClient {
    CatalogClient::new(Box::new(transport), "https://catalog.invalid/3", "test-key", "en-US")
        .with_retry_policy(RetryPolicy::new(3, Duration::from_secs(2)))
        .with_sleeper(Box::new(sleeper))
}

#[test]
fn second_refresh_adds_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("reeljournal.db");
    let db = Database::new(db_path.to_str().unwrap()).unwrap();

    let requests = Rc::new(Cell::new(0));
    let client = client(PopularCatalog { requests: Rc::clone(&requests) }, CountingSleeper::default());
    let sync = CatalogSync::new(&client, &db);

    let first = sync.refresh(5);
    assert_eq!(first.added, 100);
    assert!(first.page_errors.is_empty());

    let second = sync.refresh(5);
    assert_eq!(second.added, 0);
    assert_eq!(second.updated, 100);
    assert_eq!(requests.get(), 10);

    let stored = db.get_movie_by_tmdb_id(5020).unwrap().unwrap();
    assert_eq!(stored.overview, "");
    assert_eq!(stored.poster_path, "");
    assert_eq!(db.count_movies(None).unwrap(), 100);
}

#[test]
fn refresh_survives_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("reeljournal.db");
    let client = client(PopularCatalog { requests: Rc::default() }, CountingSleeper::default());

    {
        let db = Database::new(db_path.to_str().unwrap()).unwrap();
        assert_eq!(CatalogSync::new(&client, &db).refresh(2).added, 40);
    }

    let db = Database::new(db_path.to_str().unwrap()).unwrap();
    assert_eq!(CatalogSync::new(&client, &db).refresh(5).added, 60);
}

#[test]
fn unreachable_catalog_reports_every_page() {
    let db = Database::open_in_memory().unwrap();
    let sleeper = CountingSleeper::default();
    let client = client(Unreachable, sleeper.clone());

    let report = CatalogSync::new(&client, &db).refresh(5);
    assert_eq!(report.added, 0);
    assert_eq!(report.pages_fetched, 0);
    let pages: Vec<u32> = report.page_errors.iter().map(|e| e.page).collect();
    assert_eq!(pages, vec![1, 2, 3, 4, 5]);
    // two waits per page: between attempts 1-2 and 2-3
    assert_eq!(sleeper.0.get(), 10);
    assert_eq!(db.count_movies(None).unwrap(), 0);
}

#[test]
fn journal_on_unreachable_catalog_is_not_found() {
    let db = Database::open_in_memory().unwrap();
    let client = client(Unreachable, CountingSleeper::default());
    let user = db.get_or_create_user("viewer").unwrap();
    let journal = Journal::new(CatalogSync::new(&client, &db), user);

    let err = journal.set_status(603, "watchlist").unwrap_err();
    assert_eq!(err.status_code(), 404);
    assert_eq!(db.count_movies(None).unwrap(), 0);
}
