pub mod catalog;
pub mod cli;
pub mod config;
pub mod database;
pub mod journal;
pub mod models;
pub mod utils;

pub use catalog::{CatalogClient, CatalogSync};
pub use config::Config;
pub use database::Database;
pub use journal::Journal;
pub use models::{Comment, EntryStatus, JournalEntry, Movie};
pub use utils::Profile;
