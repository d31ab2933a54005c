//! Adapter 3: bare HTML scrape (§4.2, §6) -- the fallback when neither the
//! extractor nor the AJAX endpoint is available. Fetches the program page
//! and pulls out links that sit exactly one path segment below it, paired
//! with whatever heading text precedes them in document order.

use discovery::DiscoveredEpisode;
use http_client::HttpClient;
use rate_limiter::RateLimiter;

use lazy_static::lazy_static;
use regex::Regex;
use slog::Logger;

lazy_static! {
    static ref ANCHOR_RE: Regex =
        Regex::new(r#"(?is)<(h[1-6])[^>]*>(.*?)</h[1-6]>|<a[^>]+href="([^"]+)"[^>]*>(.*?)</a>"#)
            .unwrap();
    static ref TAG_RE: Regex = Regex::new(r"(?is)<[^>]+>").unwrap();
}

pub fn discover(
    log: &Logger,
    client: &dyn HttpClient,
    limiter: &RateLimiter,
    program_url: &str,
) -> Vec<DiscoveredEpisode> {
    limiter.wait();
    let body = match client.get(log, program_url) {
        Ok(res) if res.status < 400 => String::from_utf8_lossy(&res.body).into_owned(),
        Ok(res) => {
            warn!(log, "HTML scrape adapter got non-OK status"; "status" => res.status);
            return Vec::new();
        }
        Err(e) => {
            warn!(log, "HTML scrape adapter request failed"; "error" => e.to_string());
            return Vec::new();
        }
    };

    let program_path = url::Url::parse(program_url)
        .ok()
        .map(|u| u.path().trim_end_matches('/').to_owned())
        .unwrap_or_default();

    let mut out = Vec::new();
    let mut last_heading = String::new();

    for caps in ANCHOR_RE.captures_iter(&body) {
        if let Some(heading) = caps.get(2) {
            last_heading = clean_text(heading.as_str());
            continue;
        }

        let href = match caps.get(3) {
            Some(m) => m.as_str(),
            None => continue,
        };
        let link_text = clean_text(caps.get(4).map(|m| m.as_str()).unwrap_or(""));

        if !is_episode_path(&program_path, href) {
            continue;
        }

        let title = if link_text.is_empty() {
            last_heading.clone()
        } else {
            link_text
        };
        if title.is_empty() {
            continue;
        }

        let absolute = resolve(program_url, href);
        out.push(DiscoveredEpisode::from_source(absolute, title, "html_scrape"));
    }

    info!(log, "HTML scrape adapter parsed anchors"; "count" => out.len());
    out
}

/// An episode link sits exactly one path segment below the program's own
/// path (e.g. program `/show/x`, episode `/show/x/episode-title`).
fn is_episode_path(program_path: &str, href: &str) -> bool {
    let href_path = href.split('?').next().unwrap_or(href);
    let href_path = href_path.split('#').next().unwrap_or(href_path);
    if !href_path.starts_with(program_path) || href_path == program_path {
        return false;
    }
    let rest = href_path[program_path.len()..].trim_matches('/');
    !rest.is_empty() && !rest.contains('/')
}

fn resolve(base: &str, href: &str) -> String {
    match url::Url::parse(base).and_then(|b| b.join(href)) {
        Ok(u) => u.to_string(),
        Err(_) => href.to_owned(),
    }
}

fn clean_text(raw: &str) -> String {
    TAG_RE
        .replace_all(raw, "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use discovery::html_scrape::is_episode_path;

    #[test]
    fn test_is_episode_path_one_segment_below() {
        assert!(is_episode_path("/show/x", "/show/x/episode-title"));
        assert!(!is_episode_path("/show/x", "/show/x/season/episode-title"));
        assert!(!is_episode_path("/show/x", "/show/x"));
        assert!(!is_episode_path("/show/x", "/other/y"));
    }
}
