use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

/// Profile mode for the application (dev or prod)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Dev,
    Prod,
}

impl Profile {
    fn app_name(self) -> &'static str {
        match self {
            Profile::Dev => "reeljournal-dev",
            Profile::Prod => "reeljournal",
        }
    }
}

/// Get the configuration directory path
/// If profile is Dev, uses "reeljournal-dev" instead of "reeljournal"
pub fn get_config_dir(profile: Profile) -> Option<PathBuf> {
    ProjectDirs::from("com", "reeljournal", profile.app_name())
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the data directory path (holds the SQLite database)
pub fn get_data_dir(profile: Profile) -> Option<PathBuf> {
    ProjectDirs::from("com", "reeljournal", profile.app_name())
        .map(|dirs| dirs.data_dir().to_path_buf())
}

/// Expand `~` in a path string to the user's home directory
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Parse a date string in ISO 8601 format (YYYY-MM-DD)
pub fn parse_date(date_str: &str) -> Result<chrono::NaiveDate, chrono::ParseError> {
    chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
}

/// Current UTC time as a sortable timestamp string.
///
/// Microsecond precision keeps `ORDER BY updated_at` stable for writes that
/// land within the same second.
pub fn now_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// Number of filled stars on a five-star scale for a 1-10 rating.
pub fn stars_to_fill(rating: Option<u8>) -> u8 {
    match rating {
        Some(r) if r > 0 => ((u16::from(r) + 1) / 2) as u8,
        _ => 0,
    }
}

/// Total page count for a listing; an empty listing still has one page.
pub fn total_pages(total_items: u64, per_page: u32) -> u32 {
    let per_page = u64::from(per_page.max(1));
    let pages = total_items.div_ceil(per_page).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Resolve a requested page number the forgiving way: missing or zero means
/// the first page, anything past the end means the last page.
pub fn clamp_page(requested: Option<u32>, total_items: u64, per_page: u32) -> u32 {
    let last = total_pages(total_items, per_page);
    requested.unwrap_or(1).clamp(1, last)
}

/// Page numbers to show in a pager: the first two, the last two, and a
/// window of two on each side of the current page.
pub fn smart_page_range(current: u32, total_pages: u32) -> Vec<u32> {
    (1..=total_pages)
        .filter(|&num| {
            num <= 2
                || num > total_pages.saturating_sub(2)
                || (num + 2 >= current && num <= current + 2)
        })
        .collect()
}
