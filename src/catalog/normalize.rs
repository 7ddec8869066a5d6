//! Canonical mapping from raw TMDb payloads to [`Movie`] rows.
//!
//! This is the only place that coerces external nulls: every optional text
//! field becomes `""` and popularity becomes `0.0`.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::models::Movie;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("record has no numeric id")]
    MissingId,
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Lenient view of one movie (or generic media) record.
#[derive(Debug, Default, Deserialize)]
struct RawRecord {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    overview: Option<String>,
    #[serde(default)]
    poster_path: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    popularity: Option<f64>,
}

/// Normalize a single raw record.
pub fn normalize(raw: &Value) -> Result<Movie, NormalizeError> {
    if !raw.is_object() {
        return Err(NormalizeError::NotAnObject);
    }
    let record = RawRecord::deserialize(raw)?;
    let tmdb_id = record.id.ok_or(NormalizeError::MissingId)?;

    let title = record
        .title
        .filter(|t| !t.is_empty())
        .or(record.name)
        .unwrap_or_default();

    Ok(Movie {
        title,
        overview: record.overview.unwrap_or_default(),
        poster_path: record.poster_path.unwrap_or_default(),
        release_date: record.release_date.unwrap_or_default(),
        popularity: record.popularity.unwrap_or_default(),
        ..Movie::new(tmdb_id)
    })
}

/// The two response shapes the catalog returns.
#[derive(Debug)]
pub enum Envelope<'a> {
    /// Paged listings and searches: `{"results": [...]}`
    Collection(&'a [Value]),
    /// Single-record endpoints: fields at the top level
    Single(&'a Value),
}

impl<'a> Envelope<'a> {
    pub fn of(payload: &'a Value) -> Self {
        match payload.get("results").and_then(Value::as_array) {
            Some(results) => Envelope::Collection(results.as_slice()),
            None => Envelope::Single(payload),
        }
    }

    pub fn raw_records(&self) -> &'a [Value] {
        match *self {
            Envelope::Collection(results) => results,
            Envelope::Single(record) => std::slice::from_ref(record),
        }
    }
}

/// Result of normalizing every record of a payload.
#[derive(Debug, Default)]
pub struct Normalized {
    pub records: Vec<Movie>,
    pub rejected: Vec<(usize, NormalizeError)>,
}

/// Normalize every record in `payload`, whichever envelope it uses.
/// Malformed records are collected in `rejected` with their position.
pub fn normalize_payload(payload: &Value) -> Normalized {
    let mut out = Normalized::default();
    for (index, raw) in Envelope::of(payload).raw_records().iter().enumerate() {
        match normalize(raw) {
            Ok(movie) => out.records.push(movie),
            Err(e) => out.rejected.push((index, e)),
        }
    }
    out
}
