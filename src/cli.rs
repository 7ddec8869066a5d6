use clap::{Parser, Subcommand};
use serde::Serialize;
use thiserror::Error;

use crate::catalog::{CatalogSync, RefreshReport, SyncError};
use crate::config::Config;
use crate::database::DatabaseError;
use crate::journal::{DetailView, EntryForm, EntryView, Journal, JournalError};
use crate::models::{JournalEntry, JournalItem, Movie, Page};

#[derive(Parser)]
#[command(name = "reel")]
#[command(about = "Movie journal backed by a local copy of the TMDb catalog")]
#[command(version)]
pub struct Cli {
    /// Custom config file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Use development mode (uses separate dev config/database)
    #[arg(long)]
    pub dev: bool,

    /// Act as this user instead of the configured default_user
    #[arg(short, long)]
    pub user: Option<String>,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Cache the popular listing from TMDb (default page count from config)
    Refresh,
    /// List cached movies by popularity (default if no subcommand)
    Browse {
        /// Only titles containing this text
        #[arg(short, long)]
        query: Option<String>,
        #[arg(short, long)]
        page: Option<u32>,
    },
    /// Search TMDb, cache the matches, then list cached matches
    Search {
        query: String,
        #[arg(short, long)]
        page: Option<u32>,
    },
    /// Show a cached movie with genres, runtime, trailer and cast
    Show {
        tmdb_id: i64,
    },
    /// Add a movie to your journal
    Add {
        tmdb_id: i64,
    },
    /// Set the journal status of a movie (watched, watchlist, favorite)
    Status {
        tmdb_id: i64,
        status: String,
    },
    /// Rate a movie from 1 to 10
    Rate {
        tmdb_id: i64,
        rating: String,
    },
    /// Edit one of your journal entries
    Edit {
        entry_id: i64,
        #[arg(long)]
        status: Option<String>,
        /// 1-10, or "" to clear
        #[arg(long)]
        rating: Option<String>,
        /// YYYY-MM-DD, or "" to clear
        #[arg(long)]
        watched_date: Option<String>,
        #[arg(long)]
        mood: Option<String>,
        #[arg(long)]
        review: Option<String>,
    },
    /// Comment on one of your journal entries
    Comment {
        entry_id: i64,
        text: String,
    },
    /// Show one of your journal entries with its comments
    Entry {
        entry_id: i64,
    },
    /// List your journal, most recently updated first
    Journal {
        #[arg(short, long)]
        page: Option<u32>,
    },
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),
    #[error(transparent)]
    SyncError(#[from] SyncError),
    #[error(transparent)]
    JournalError(#[from] JournalError),
    #[error("Failed to render JSON: {0}")]
    OutputError(#[from] serde_json::Error),
}

/// Everything a command handler needs for one invocation.
pub struct Session<'a> {
    pub config: &'a Config,
    pub sync: CatalogSync<'a>,
    pub journal: Journal<'a>,
    pub json: bool,
}

impl Session<'_> {
    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce(&T)) -> Result<(), CliError> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            text(value);
        }
        Ok(())
    }
}

/// Dispatch one parsed command
pub fn run(command: Commands, session: &Session) -> Result<(), CliError> {
    match command {
        Commands::Refresh => handle_refresh(session),
        Commands::Browse { query, page } => handle_browse(query, page, session),
        Commands::Search { query, page } => handle_search(query, page, session),
        Commands::Show { tmdb_id } => handle_show(tmdb_id, session),
        Commands::Add { tmdb_id } => handle_add(tmdb_id, session),
        Commands::Status { tmdb_id, status } => handle_status(tmdb_id, status, session),
        Commands::Rate { tmdb_id, rating } => handle_rate(tmdb_id, rating, session),
        Commands::Edit {
            entry_id,
            status,
            rating,
            watched_date,
            mood,
            review,
        } => {
            let form = EntryForm {
                status,
                rating,
                watched_date,
                mood,
                review,
            };
            handle_edit(entry_id, form, session)
        }
        Commands::Comment { entry_id, text } => handle_comment(entry_id, text, session),
        Commands::Entry { entry_id } => handle_entry(entry_id, session),
        Commands::Journal { page } => handle_journal(page, session),
    }
}

/// Handle the refresh command
pub fn handle_refresh(session: &Session) -> Result<(), CliError> {
    let report = session.sync.refresh(session.config.refresh_pages);
    session.emit(&report, print_refresh)
}

/// Handle the browse command
pub fn handle_browse(query: Option<String>, page: Option<u32>, session: &Session) -> Result<(), CliError> {
    let movies = session
        .sync
        .browse(query.as_deref(), page, session.config.page_size)?;
    session.emit(&movies, print_movie_page)
}

/// Handle the search command
pub fn handle_search(query: String, page: Option<u32>, session: &Session) -> Result<(), CliError> {
    let movies = session.sync.search(&query, page, session.config.page_size)?;
    session.emit(&movies, print_movie_page)
}

/// Handle the show command
pub fn handle_show(tmdb_id: i64, session: &Session) -> Result<(), CliError> {
    let view = session.journal.detail(tmdb_id)?;
    session.emit(&view, print_detail)
}

/// Handle the add command
pub fn handle_add(tmdb_id: i64, session: &Session) -> Result<(), CliError> {
    let (entry, created) = session.journal.add(tmdb_id)?;
    session.emit(&entry, |entry| {
        let verb = if created { "Added to journal" } else { "Already in journal" };
        println!("{} (entry ID: {})", verb, entry.id.unwrap_or_default());
    })
}

/// Handle the status command
pub fn handle_status(tmdb_id: i64, status: String, session: &Session) -> Result<(), CliError> {
    let entry = session.journal.set_status(tmdb_id, &status)?;
    session.emit(&entry, |entry| println!("Status set to {}", entry.status))
}

/// Handle the rate command
pub fn handle_rate(tmdb_id: i64, rating: String, session: &Session) -> Result<(), CliError> {
    let entry = session.journal.rate(tmdb_id, &rating)?;
    session.emit(&entry, |entry| {
        println!(
            "Rated {}/10 {}",
            entry.rating.unwrap_or_default(),
            stars(entry.stars_to_fill())
        )
    })
}

/// Handle the edit command
pub fn handle_edit(entry_id: i64, form: EntryForm, session: &Session) -> Result<(), CliError> {
    let entry = session.journal.edit(entry_id, &form)?;
    session.emit(&entry, print_entry_fields)
}

/// Handle the comment command
pub fn handle_comment(entry_id: i64, text: String, session: &Session) -> Result<(), CliError> {
    let comment = session.journal.comment(entry_id, &text)?;
    session.emit(&comment, |comment| {
        println!("Comment added (ID: {})", comment.id.unwrap_or_default())
    })
}

/// Handle the entry command
pub fn handle_entry(entry_id: i64, session: &Session) -> Result<(), CliError> {
    let view = session.journal.entry(entry_id)?;
    session.emit(&view, print_entry_view)
}

/// Handle the journal command
pub fn handle_journal(page: Option<u32>, session: &Session) -> Result<(), CliError> {
    let items = session.journal.list(page, session.config.page_size)?;
    session.emit(&items, print_journal_page)
}

fn print_refresh(report: &RefreshReport) {
    for failure in &report.page_errors {
        eprintln!("Error fetching page {}: {}", failure.page, failure.error);
    }
    println!("Fetched {} page(s).", report.pages_fetched);
    if report.skipped > 0 {
        println!("Skipped {} malformed movie(s).", report.skipped);
    }
    println!("Added {} new movies.", report.added);
}

fn print_movie_page(page: &Page<Movie>) {
    if page.items.is_empty() {
        println!("No movies found.");
        return;
    }
    for movie in &page.items {
        println!("{}", movie_line(movie));
    }
    println!("{}", pager_line(page));
}

fn print_journal_page(page: &Page<JournalItem>) {
    if page.items.is_empty() {
        println!("Your journal is empty.");
        return;
    }
    for item in &page.items {
        println!(
            "#{:<5} {:<9} {:<7} {}",
            item.entry.id.unwrap_or_default(),
            item.entry.status,
            item.entry.rating.map(|r| format!("{r}/10")).unwrap_or_default(),
            movie_line(&item.movie)
        );
    }
    println!("{}", pager_line(page));
}

fn print_detail(view: &DetailView) {
    let movie = &view.movie;
    println!("{}", movie_line(movie));
    let extras = &view.enrichment;
    if !extras.genres.is_empty() {
        println!("Genres:  {}", extras.genres.join(", "));
    }
    if let Some(runtime) = &extras.runtime_display {
        println!("Runtime: {runtime}");
    }
    if let Some(trailer) = &extras.trailer_embed {
        println!("Trailer: {trailer}");
    }
    if !movie.overview.is_empty() {
        println!("\n{}\n", movie.overview);
    }
    for member in &extras.cast {
        if member.character.is_empty() {
            println!("  {}", member.name);
        } else {
            println!("  {} as {}", member.name, member.character);
        }
    }
    match &view.entry {
        Some(entry) => {
            println!("\nYour entry #{}: {} {}", entry.id.unwrap_or_default(), entry.status, stars(view.stars_to_fill));
        }
        None => println!("\nNot in your journal."),
    }
}

fn print_entry_fields(entry: &JournalEntry) {
    println!("Entry #{}", entry.id.unwrap_or_default());
    println!("  status:  {}", entry.status);
    if let Some(rating) = entry.rating {
        println!("  rating:  {rating}/10 {}", stars(entry.stars_to_fill()));
    }
    if let Some(date) = &entry.watched_date {
        println!("  watched: {date}");
    }
    if !entry.mood.is_empty() {
        println!("  mood:    {}", entry.mood);
    }
    if !entry.review.is_empty() {
        println!("  review:  {}", entry.review);
    }
}

fn print_entry_view(view: &EntryView) {
    println!("{}", movie_line(&view.movie));
    print_entry_fields(&view.entry);
    if !view.comments.is_empty() {
        println!("Comments:");
        for comment in &view.comments {
            println!("  [{}] {}", comment.created_at, comment.text);
        }
    }
}

fn movie_line(movie: &Movie) -> String {
    let year = movie.release_date.get(..4).unwrap_or("");
    if year.is_empty() {
        format!("{:>8}  {}", movie.tmdb_id, movie.title)
    } else {
        format!("{:>8}  {} ({})", movie.tmdb_id, movie.title, year)
    }
}

fn pager_line<T>(page: &Page<T>) -> String {
    let pages: Vec<String> = page
        .page_range
        .iter()
        .map(|&n| if n == page.number { format!("[{n}]") } else { n.to_string() })
        .collect();
    format!("Page {} of {} ({} total): {}", page.number, page.total_pages, page.total_items, pages.join(" "))
}

fn stars(filled: u8) -> String {
    let filled = usize::from(filled.min(5));
    format!("{}{}", "★".repeat(filled), "☆".repeat(5 - filled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_edit_flags() {
        let cli = Cli::try_parse_from([
            "reel", "--user", "sam", "edit", "4", "--rating", "", "--mood", "cozy",
        ])
        .unwrap();
        assert_eq!(cli.user.as_deref(), Some("sam"));
        match cli.command {
            Some(Commands::Edit { entry_id, rating, mood, status, .. }) => {
                assert_eq!(entry_id, 4);
                assert_eq!(rating.as_deref(), Some(""));
                assert_eq!(mood.as_deref(), Some("cozy"));
                assert!(status.is_none());
            }
            _ => panic!("expected edit"),
        }
    }

    #[test]
    fn movie_line_shows_year_when_known() {
        let mut movie = Movie::new(550);
        movie.title = "Fight Club".into();
        assert_eq!(movie_line(&movie), "     550  Fight Club");
        movie.release_date = "1999-10-15".into();
        assert_eq!(movie_line(&movie), "     550  Fight Club (1999)");
    }

    #[test]
    fn pager_marks_current_page() {
        let page: Page<()> = Page::new(Vec::new(), 3, 10, 95);
        assert_eq!(pager_line(&page), "Page 3 of 10 (95 total): 1 2 [3] 4 5 9 10");
    }

    #[test]
    fn stars_fill_from_the_left() {
        assert_eq!(stars(0), "☆☆☆☆☆");
        assert_eq!(stars(4), "★★★★☆");
        assert_eq!(stars(9), "★★★★★");
    }
}
