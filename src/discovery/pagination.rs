//! Adapter 2: AJAX pagination (§4.2, §6).
//!
//! Walks `?page=N&size=50` pages of a program's AJAX episode listing
//! fragment until a page returns fewer than 10 entries, extracting each
//! entry's link, uuid, title and duration via a handful of small regexes --
//! these listing fragments are partial HTML, not a stable JSON schema.

use discovery::DiscoveredEpisode;
use http_client::HttpClient;
use rate_limiter::RateLimiter;

use lazy_static::lazy_static;
use regex::Regex;
use slog::Logger;

const PAGE_SIZE: usize = 50;
const MIN_FULL_PAGE: usize = 10;
const MAX_PAGES: usize = 200;

lazy_static! {
    static ref AJAX_LINK_RE: Regex =
        Regex::new(r#"<a[^>]+class="[^"]*episode[^"]*"[^>]+href="([^"]+)""#).unwrap();
    static ref AJAX_UUID_RE: Regex = Regex::new(r#"data-uuid="([^"]+)""#).unwrap();
    static ref AJAX_TITLE_RE: Regex = Regex::new(r#"data-title="([^"]+)""#).unwrap();
    static ref AJAX_DURATION_RE: Regex = Regex::new(r#"data-duration="(\d+)""#).unwrap();
}

pub fn discover(
    log: &Logger,
    client: &dyn HttpClient,
    limiter: &RateLimiter,
    program_url: &str,
) -> Vec<DiscoveredEpisode> {
    let mut out = Vec::new();

    for page in 0..MAX_PAGES {
        let page_url = format!(
            "{}/ajax/more?page={}&size={}",
            program_url.trim_end_matches('/'),
            page,
            PAGE_SIZE
        );

        limiter.wait();
        let body = match client.get(log, &page_url) {
            Ok(res) if res.status < 400 => String::from_utf8_lossy(&res.body).into_owned(),
            Ok(res) => {
                warn!(log, "Pagination adapter got non-OK status"; "status" => res.status, "page" => page);
                break;
            }
            Err(e) => {
                warn!(log, "Pagination adapter request failed"; "error" => e.to_string(), "page" => page);
                break;
            }
        };

        let links: Vec<&str> = AJAX_LINK_RE
            .captures_iter(&body)
            .map(|c| c.get(1).unwrap().as_str())
            .collect();
        if links.is_empty() {
            break;
        }

        let uuids: Vec<&str> = AJAX_UUID_RE
            .captures_iter(&body)
            .map(|c| c.get(1).unwrap().as_str())
            .collect();
        let titles: Vec<&str> = AJAX_TITLE_RE
            .captures_iter(&body)
            .map(|c| c.get(1).unwrap().as_str())
            .collect();
        let durations: Vec<i64> = AJAX_DURATION_RE
            .captures_iter(&body)
            .filter_map(|c| c.get(1).unwrap().as_str().parse().ok())
            .collect();

        let count = links.len();
        for i in 0..count {
            let title = titles.get(i).copied().unwrap_or("").to_owned();
            let mut ep = DiscoveredEpisode::from_source(links[i].to_owned(), title, "pagination");
            ep.ext_id = uuids.get(i).map(|s| (*s).to_owned());
            ep.duration_s = durations.get(i).copied();
            out.push(ep);
        }

        info!(log, "Pagination adapter fetched page"; "page" => page, "entries" => count);
        if count < MIN_FULL_PAGE {
            break;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use discovery::pagination::{AJAX_DURATION_RE, AJAX_LINK_RE, AJAX_TITLE_RE, AJAX_UUID_RE};

    #[test]
    fn test_ajax_regexes_extract_fields() {
        let fragment = r#"<a class="episode-link" href="/show/ep-1" data-uuid="u1" data-title="Title One" data-duration="120"></a>"#;
        assert_eq!("/show/ep-1", AJAX_LINK_RE.captures(fragment).unwrap().get(1).unwrap().as_str());
        assert_eq!("u1", AJAX_UUID_RE.captures(fragment).unwrap().get(1).unwrap().as_str());
        assert_eq!(
            "Title One",
            AJAX_TITLE_RE.captures(fragment).unwrap().get(1).unwrap().as_str()
        );
        assert_eq!("120", AJAX_DURATION_RE.captures(fragment).unwrap().get(1).unwrap().as_str());
    }
}
