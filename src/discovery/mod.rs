//! Discovery fan-out (C2, §4.2).
//!
//! For one program URL, up to four source adapters are attempted
//! concurrently; each is isolated behind its own timeout and never bubbles a
//! failure to its siblings (§5 "Parallelism inside discovery"). Results are
//! merged in source order into a single deduplicated list of
//! `DiscoveredEpisode`s.

pub mod catalog_api;
pub mod flat_playlist;
pub mod html_scrape;
pub mod pagination;

use http_client::HttpClient;
use rate_limiter::RateLimiter;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use slog::Logger;
use std::collections::HashSet;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

lazy_static! {
    static ref ROZHLAS_TRAILING_ID_RE: Regex = Regex::new(r"-\d{5,}$").unwrap();
}

/// One item surfaced by a source adapter, prior to deduplication or ingest.
/// `original` is an opaque carry-through of source-specific fields (§9
/// "Dynamic typing & duck typing") that the merge/dedupe/ingest logic never
/// inspects directly.
#[derive(Clone, Debug, Default)]
pub struct DiscoveredEpisode {
    pub url: String,
    pub title: String,
    pub ext_id: Option<String>,
    pub duration_s: Option<i64>,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub series: Option<String>,
    pub author: Option<String>,
    pub uploader: Option<String>,
    pub is_series_episode: bool,
    pub sources: HashSet<String>,
    /// Assigned by ingest's `assign_priorities` just before dedupe/upsert
    /// (§4.4 "Priority assignment"); zero until then.
    pub priority: i32,
}

impl DiscoveredEpisode {
    pub fn from_source(url: impl Into<String>, title: impl Into<String>, source: &str) -> Self {
        let mut sources = HashSet::new();
        sources.insert(source.to_owned());
        DiscoveredEpisode {
            url: url.into(),
            title: title.into(),
            sources,
            ..Default::default()
        }
    }
}

/// Rewrites a `rozhlas.cz` program URL to its `mujrozhlas.cz` equivalent,
/// stripping a trailing numeric suffix (5+ digits) from the first path
/// segment (§4.2 "Host normalization"). Non-rozhlas URLs pass through
/// unchanged.
pub fn normalize_rozhlas_url(raw: &str) -> String {
    let parsed = match url::Url::parse(raw) {
        Ok(u) => u,
        Err(_) => return raw.to_owned(),
    };

    let host = parsed.host_str().unwrap_or("");
    if !host.ends_with("rozhlas.cz") {
        return raw.to_owned();
    }

    let mut segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.collect())
        .unwrap_or_default();
    if segments.is_empty() {
        return raw.to_owned();
    }

    let first = segments[0];
    let stripped = ROZHLAS_TRAILING_ID_RE.replace(first, "").into_owned();
    segments[0] = &stripped;
    format!("https://www.mujrozhlas.cz/{}", segments.join("/"))
}

/// Merges adapter outputs in source-priority order (§4.2 "Merge"). Matching
/// key is `ext_id` first, then the normalized ("merge") URL. A later source
/// only fills *empty* fields of an earlier record and unions `sources`.
/// Output preserves the insertion order of the first source that contributed
/// each item.
pub fn merge_discovered(sources: Vec<Vec<DiscoveredEpisode>>) -> Vec<DiscoveredEpisode> {
    let mut merged: Vec<DiscoveredEpisode> = Vec::new();

    for batch in sources {
        for item in batch {
            let existing_idx = item
                .ext_id
                .as_deref()
                .and_then(|ext_id| {
                    merged
                        .iter()
                        .position(|m| m.ext_id.as_deref() == Some(ext_id))
                })
                .or_else(|| {
                    let key = crate::dedupe::norm_url(&item.url);
                    merged
                        .iter()
                        .position(|m| crate::dedupe::norm_url(&m.url) == key)
                });

            match existing_idx {
                Some(idx) => {
                    let target = &mut merged[idx];
                    fill_empty(&mut target.ext_id, item.ext_id);
                    fill_empty(&mut target.duration_s, item.duration_s);
                    fill_empty(&mut target.description, item.description);
                    fill_empty(&mut target.published_at, item.published_at);
                    fill_empty(&mut target.series, item.series);
                    fill_empty(&mut target.author, item.author);
                    fill_empty(&mut target.uploader, item.uploader);
                    if target.title.trim().is_empty() {
                        target.title = item.title;
                    }
                    target.is_series_episode = target.is_series_episode || item.is_series_episode;
                    target.sources.extend(item.sources);
                }
                None => merged.push(item),
            }
        }
    }

    merged
}

fn fill_empty<T>(target: &mut Option<T>, value: Option<T>) {
    if target.is_none() {
        *target = value;
    }
}

/// Per-source timeout applied to each adapter's invocation (§4.2, §5).
const SOURCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs the four source adapters concurrently for one program URL and
/// returns the merged, source-ordered list of discovered episodes. A source
/// that errors or exceeds its timeout contributes an empty result; it never
/// fails the whole fan-out (§4.2, §5, §7 "Extractor-broken").
pub fn discover_program(
    log: &Logger,
    client: Arc<dyn HttpClient>,
    limiter: Arc<RateLimiter>,
    program_url: &str,
) -> Vec<DiscoveredEpisode> {
    let normalized_url = normalize_rozhlas_url(program_url);
    let original_url = program_url.to_owned();

    let flat = spawn_source(log, "flat_playlist", {
        let url = normalized_url.clone();
        move |log| flat_playlist::discover(log, &url)
    });

    let ajax = spawn_source(log, "pagination", {
        let client = client.clone();
        let limiter = limiter.clone();
        let url = normalized_url.clone();
        move |log| pagination::discover(log, &*client, &limiter, &url)
    });

    let html = spawn_source(log, "html_scrape", {
        let client = client.clone();
        let limiter = limiter.clone();
        let url = normalized_url.clone();
        move |log| html_scrape::discover(log, &*client, &limiter, &url)
    });

    let rapi = spawn_source(log, "catalog_api", {
        let client = client.clone();
        let limiter = limiter.clone();
        move |log| catalog_api::discover(log, &*client, &limiter, &original_url)
    });

    merge_discovered(vec![
        flat.join().unwrap_or_default(),
        ajax.join().unwrap_or_default(),
        html.join().unwrap_or_default(),
        rapi.join().unwrap_or_default(),
    ])
}

/// Runs one adapter on a dedicated thread with a watchdog: if the adapter
/// doesn't report back within `SOURCE_TIMEOUT`, an empty result is returned
/// to the caller (the adapter thread is abandoned and finishes on its own).
fn spawn_source<F>(log: &Logger, name: &'static str, f: F) -> SourceHandle
where
    F: FnOnce(&Logger) -> Vec<DiscoveredEpisode> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let log = log.new(o!("source" => name));
    thread::Builder::new()
        .name(format!("discover-{}", name))
        .spawn(move || {
            let result = f(&log);
            let _ = tx.send(result);
        })
        .expect("failed to spawn discovery source thread");

    SourceHandle { rx }
}

struct SourceHandle {
    rx: mpsc::Receiver<Vec<DiscoveredEpisode>>,
}

impl SourceHandle {
    fn join(self) -> Option<Vec<DiscoveredEpisode>> {
        self.rx.recv_timeout(SOURCE_TIMEOUT).ok()
    }
}

#[cfg(test)]
mod tests {
    use discovery::*;

    #[test]
    fn test_normalize_rozhlas_url() {
        assert_eq!(
            "https://www.mujrozhlas.cz/show",
            normalize_rozhlas_url("https://plus.rozhlas.cz/show-9391766")
        );
        assert_eq!(
            "https://example.com/not-rozhlas",
            normalize_rozhlas_url("https://example.com/not-rozhlas")
        );
    }

    #[test]
    fn test_merge_fills_empty_fields_only() {
        let mut a = DiscoveredEpisode::from_source("https://x.example/ep", "Title A", "flat");
        a.duration_s = Some(100);

        let mut b = DiscoveredEpisode::from_source("https://x.example/ep", "Title B", "ajax");
        b.description = Some("desc".to_owned());
        b.duration_s = Some(999);

        let merged = merge_discovered(vec![vec![a], vec![b]]);
        assert_eq!(1, merged.len());
        assert_eq!("Title A", merged[0].title);
        assert_eq!(Some(100), merged[0].duration_s);
        assert_eq!(Some("desc".to_owned()), merged[0].description);
        assert_eq!(2, merged[0].sources.len());
    }

    #[test]
    fn test_merge_matches_by_ext_id_over_url() {
        let mut a = DiscoveredEpisode::from_source("https://x.example/a", "Title", "flat");
        a.ext_id = Some("EP1".to_owned());

        let mut b = DiscoveredEpisode::from_source("https://x.example/b", "Title", "rapi");
        b.ext_id = Some("EP1".to_owned());

        let merged = merge_discovered(vec![vec![a], vec![b]]);
        assert_eq!(1, merged.len());
    }
}
