//! Presentation extras derived from an extended movie payload
//! (`append_to_response=videos,credits`). Nothing here is persisted.

use serde::Serialize;
use serde_json::Value;

pub const MAX_CAST: usize = 8;

const TRAILER_SITE: &str = "YouTube";
const TRAILER_TYPE: &str = "Trailer";
const EMBED_BASE_URL: &str = "https://www.youtube.com/embed/";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnrichmentView {
    pub genres: Vec<String>,
    pub runtime: Option<u32>,
    pub runtime_display: Option<String>,
    pub trailer_embed: Option<String>,
    pub cast: Vec<CastMember>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CastMember {
    pub name: String,
    pub character: String,
    pub profile_path: String,
}

pub fn resolve(payload: &Value) -> EnrichmentView {
    let runtime = payload
        .get("runtime")
        .and_then(Value::as_i64)
        .filter(|&minutes| minutes > 0)
        .and_then(|minutes| u32::try_from(minutes).ok());

    EnrichmentView {
        genres: genres(payload),
        runtime,
        runtime_display: runtime.and_then(format_runtime),
        trailer_embed: select_trailer(array_at(payload, &["videos", "results"]))
            .map(|key| format!("{EMBED_BASE_URL}{key}")),
        cast: cast(array_at(payload, &["credits", "cast"])),
    }
}

/// `45` -> `"45m"`, `130` -> `"2h 10m"`, `0` -> nothing.
pub fn format_runtime(minutes: u32) -> Option<String> {
    if minutes == 0 {
        return None;
    }
    let (hours, mins) = (minutes / 60, minutes % 60);
    Some(if hours > 0 {
        format!("{hours}h {mins}m")
    } else {
        format!("{mins}m")
    })
}

/// Key of the best trailer: an official one if any, else the first one.
pub fn select_trailer(videos: &[Value]) -> Option<&str> {
    let trailers = || {
        videos.iter().filter(|v| {
            v.get("site").and_then(Value::as_str) == Some(TRAILER_SITE)
                && v.get("type").and_then(Value::as_str) == Some(TRAILER_TYPE)
                && video_key(v).is_some()
        })
    };

    trailers()
        .find(|v| v.get("official").and_then(Value::as_bool).unwrap_or(false))
        .or_else(|| trailers().next())
        .and_then(video_key)
}

fn video_key(video: &Value) -> Option<&str> {
    video.get("key").and_then(Value::as_str).filter(|k| !k.is_empty())
}

fn genres(payload: &Value) -> Vec<String> {
    array_at(payload, &["genres"])
        .iter()
        .filter_map(|g| g.get("name").and_then(Value::as_str))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn cast(members: &[Value]) -> Vec<CastMember> {
    members
        .iter()
        .take(MAX_CAST)
        .map(|m| CastMember {
            name: text(m, "name"),
            character: text(m, "character"),
            profile_path: text(m, "profile_path"),
        })
        .collect()
}

fn text(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// The array at `path`, or an empty slice if any step is missing or null.
fn array_at<'a>(value: &'a Value, path: &[&str]) -> &'a [Value] {
    path.iter()
        .try_fold(value, |v, key| v.get(*key))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}
