//! Adapter 1: the flat-playlist extractor (§4.2, §6 "Source-adapter
//! contracts"). Treated as authoritative when present.
//!
//! Invoked as `extractor --flat-playlist -J <url>`, producing a JSON
//! document following the extractor's standard playlist/entry schema. The
//! merge logic only depends on the named fields listed in §6; everything
//! else in each entry is opaque and ignored.

use discovery::DiscoveredEpisode;

use chrono::NaiveDate;
use serde_json::Value;
use slog::Logger;
use std::process::Command;

const EXTRACTOR_BIN: &str = "extractor";

/// Runs the extractor subprocess and parses its output. On any failure
/// (binary missing, non-zero exit, unparseable JSON) this logs and returns
/// an empty list -- adapters never fail the fan-out (§7 "Extractor-broken").
pub fn discover(log: &Logger, url: &str) -> Vec<DiscoveredEpisode> {
    match run(log, url) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(log, "Flat-playlist adapter failed"; "error" => e, "url" => url);
            Vec::new()
        }
    }
}

fn run(log: &Logger, url: &str) -> Result<Vec<DiscoveredEpisode>, String> {
    let output = Command::new(EXTRACTOR_BIN)
        .args(["--flat-playlist", "-J", url])
        .output()
        .map_err(|e| format!("failed to spawn {}: {}", EXTRACTOR_BIN, e))?;

    if !output.status.success() {
        return Err(format!(
            "{} exited with {}: {}",
            EXTRACTOR_BIN,
            output.status,
            String::from_utf8_lossy(&output.stderr)
        ));
    }

    let doc: Value =
        serde_json::from_slice(&output.stdout).map_err(|e| format!("invalid JSON: {}", e))?;

    let entries = doc
        .get("entries")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    info!(log, "Flat-playlist adapter parsed entries"; "count" => entries.len());
    Ok(entries.iter().filter_map(entry_to_episode).collect())
}

fn entry_to_episode(entry: &Value) -> Option<DiscoveredEpisode> {
    let url = entry
        .get("webpage_url")
        .or_else(|| entry.get("url"))
        .and_then(Value::as_str)?
        .to_owned();
    let title = entry.get("title").and_then(Value::as_str)?.to_owned();

    let mut ep = DiscoveredEpisode::from_source(url, title, "flat_playlist");
    ep.ext_id = entry.get("id").and_then(Value::as_str).map(str::to_owned);
    ep.duration_s = entry.get("duration").and_then(Value::as_f64).map(|d| d as i64);
    ep.description = entry
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_owned);
    ep.series = entry
        .get("series")
        .or_else(|| entry.get("playlist_title"))
        .and_then(Value::as_str)
        .map(str::to_owned);
    ep.uploader = entry
        .get("uploader")
        .and_then(Value::as_str)
        .map(str::to_owned);
    ep.is_series_episode = entry.get("episode").is_some() || entry.get("season").is_some();
    ep.published_at = entry
        .get("upload_date")
        .and_then(Value::as_str)
        .and_then(parse_upload_date);

    Some(ep)
}

fn parse_upload_date(s: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    NaiveDate::parse_from_str(s, "%Y%m%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| chrono::DateTime::from_naive_utc_and_offset(dt, chrono::Utc))
}

#[cfg(test)]
mod tests {
    use discovery::flat_playlist::entry_to_episode;
    use serde_json::json;

    #[test]
    fn test_entry_to_episode() {
        let entry = json!({
            "id": "abc123",
            "title": "Episode One",
            "webpage_url": "https://example.com/ep1",
            "duration": 123.4,
            "upload_date": "20230115",
            "uploader": "Vltava",
            "series": "My Series",
        });

        let ep = entry_to_episode(&entry).unwrap();
        assert_eq!("abc123", ep.ext_id.unwrap());
        assert_eq!("Episode One", ep.title);
        assert_eq!(Some(123), ep.duration_s);
        assert_eq!("Vltava", ep.uploader.unwrap());
        assert_eq!("My Series", ep.series.unwrap());
        assert!(ep.published_at.is_some());
    }

    #[test]
    fn test_entry_missing_url_is_skipped() {
        let entry = json!({ "id": "abc", "title": "No URL" });
        assert!(entry_to_episode(&entry).is_none());
    }
}
