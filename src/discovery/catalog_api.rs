//! Adapter 4: the catalog/RAPI JSON:API (§4.2, §6), specific to
//! `rozhlas.cz`-family hosts. Extracts a show UUID from the program page's
//! markup, then pages through `shows/{uuid}/episodes` until a short page.

use discovery::DiscoveredEpisode;
use http_client::HttpClient;
use rate_limiter::RateLimiter;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use slog::Logger;

const PAGE_LIMIT: usize = 50;
const MAX_PAGES: usize = 200;

lazy_static! {
    static ref SHOW_UUID_RE: Regex =
        Regex::new(r#"data-show-uuid="([0-9a-fA-F-]{36})""#).unwrap();
}

pub fn discover(
    log: &Logger,
    client: &dyn HttpClient,
    limiter: &RateLimiter,
    program_url: &str,
) -> Vec<DiscoveredEpisode> {
    let host = match url::Url::parse(program_url).ok().and_then(|u| u.host_str().map(str::to_owned)) {
        Some(h) if h.ends_with("rozhlas.cz") => h,
        _ => return Vec::new(),
    };

    let uuid = match extract_show_uuid(log, client, limiter, program_url) {
        Some(u) => u,
        None => {
            warn!(log, "Catalog API adapter found no show uuid");
            return Vec::new();
        }
    };

    let mut out = Vec::new();
    for page in 0..MAX_PAGES {
        let offset = page * PAGE_LIMIT;
        let api_url = format!(
            "https://api.{}/shows/{}/episodes?page[limit]={}&page[offset]={}",
            strip_www(&host),
            uuid,
            PAGE_LIMIT,
            offset
        );

        limiter.wait();
        let body = match client.get(log, &api_url) {
            Ok(res) if res.status < 400 => res.body,
            Ok(res) => {
                warn!(log, "Catalog API adapter got non-OK status"; "status" => res.status, "page" => page);
                break;
            }
            Err(e) => {
                warn!(log, "Catalog API adapter request failed"; "error" => e.to_string(), "page" => page);
                break;
            }
        };

        let doc: Value = match serde_json::from_slice(&body) {
            Ok(v) => v,
            Err(e) => {
                warn!(log, "Catalog API adapter got invalid JSON"; "error" => e.to_string());
                break;
            }
        };

        let entries = doc.get("data").and_then(Value::as_array).cloned().unwrap_or_default();
        let count = entries.len();
        for entry in &entries {
            if let Some(ep) = entry_to_episode(&host, entry) {
                out.push(ep);
            }
        }

        info!(log, "Catalog API adapter fetched page"; "page" => page, "entries" => count);
        if count < PAGE_LIMIT {
            break;
        }
    }

    out
}

/// Looks for a `data-show-uuid` attribute on the program page itself. This
/// is the web-facing equivalent of the RAPI client's `extract_show_uuid`.
fn extract_show_uuid(
    log: &Logger,
    client: &dyn HttpClient,
    limiter: &RateLimiter,
    program_url: &str,
) -> Option<String> {
    limiter.wait();
    let res = client.get(log, program_url).ok()?;
    if res.status >= 400 {
        return None;
    }
    let body = String::from_utf8_lossy(&res.body);
    SHOW_UUID_RE
        .captures(&body)
        .map(|c| c.get(1).unwrap().as_str().to_owned())
}

fn strip_www(host: &str) -> String {
    host.trim_start_matches("www.").to_owned()
}

fn entry_to_episode(host: &str, entry: &Value) -> Option<DiscoveredEpisode> {
    let id = entry.get("id").and_then(Value::as_str)?.to_owned();
    let attrs = entry.get("attributes")?;
    let title = attrs.get("title").and_then(Value::as_str)?.to_owned();

    let url = format!("https://{}/episode/{}", host, id);
    let mut ep = DiscoveredEpisode::from_source(url, title, "catalog_api");
    ep.ext_id = Some(id);
    ep.description = attrs.get("description").and_then(Value::as_str).map(str::to_owned);
    ep.duration_s = attrs.get("duration").and_then(Value::as_i64);
    ep.series = attrs
        .get("serial")
        .and_then(|s| s.get("title"))
        .and_then(Value::as_str)
        .map(str::to_owned);
    ep.is_series_episode = ep.series.is_some();
    ep.published_at = attrs
        .get("since")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Some(ep)
}

#[cfg(test)]
mod tests {
    use discovery::catalog_api::entry_to_episode;
    use serde_json::json;

    #[test]
    fn test_entry_to_episode() {
        let entry = json!({
            "id": "11111111-1111-1111-1111-111111111111",
            "attributes": {
                "title": "Episode Title",
                "description": "Desc",
                "duration": 1800,
                "since": "2023-01-15T10:00:00Z",
                "serial": { "title": "Series Name" },
            }
        });

        let ep = entry_to_episode("www.rozhlas.cz", &entry).unwrap();
        assert_eq!("Episode Title", ep.title);
        assert_eq!(Some(1800), ep.duration_s);
        assert_eq!("Series Name", ep.series.unwrap());
        assert!(ep.is_series_episode);
        assert_eq!(
            "https://www.rozhlas.cz/episode/11111111-1111-1111-1111-111111111111",
            ep.url
        );
    }
}
