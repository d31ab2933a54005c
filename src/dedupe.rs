//! Content-aware deduplication (C3, §4.3).
//!
//! Three cascading tiers, evaluated in order per discovered entry: exact
//! external id, normalized URL with re-air-suffix stripping, and fuzzy title
//! comparison. Grounded on the ancestor Python implementation's `dedupe.py`,
//! re-expressed without its `SequenceMatcher` dependency: the specification
//! names a longest-common-subsequence ratio explicitly (§4.3), so that is
//! what's implemented here rather than Python's matching-blocks heuristic.

use discovery::DiscoveredEpisode;

use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    /// Matches a re-air marker: 7 or more trailing digits on the URL path.
    static ref REAIR_SUFFIX_RE: Regex = Regex::new(r"-\d{7,}$").unwrap();
}

const FUZZY_MATCH_THRESHOLD: f64 = 0.90;
const FUZZY_MIN_LEN: usize = 6;

/// One existing catalog episode's identity, as seen by the deduper -- it
/// never needs the full row, just the three keys it matches on.
#[derive(Clone, Debug)]
pub struct ExistingEpisodeKey {
    pub episode_id: i64,
    pub ext_id: Option<String>,
    pub url: Option<String>,
    pub normalized_title: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchReason {
    ExtId,
    UrlExact,
    UrlReair,
    TitleFuzzy,
    ExistingInDb,
}

impl MatchReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchReason::ExtId => "ext_id",
            MatchReason::UrlExact => "url_exact",
            MatchReason::UrlReair => "url_reair",
            MatchReason::TitleFuzzy => "title_fuzzy",
            MatchReason::ExistingInDb => "existing_in_db",
        }
    }
}

/// `target` is `Some(index into unique_entries)` for a within-batch match, or
/// `None` when the match was against a pre-existing database episode.
#[derive(Clone, Debug)]
pub struct DuplicateGroup {
    pub target: Option<usize>,
    pub existing_episode_id: Option<i64>,
    pub candidate: DiscoveredEpisode,
    pub reason: MatchReason,
}

pub struct DedupeResult {
    pub unique: Vec<DiscoveredEpisode>,
    pub duplicates: Vec<DuplicateGroup>,
}

/// Normalizes a URL for comparison: lowercases the host, trims a trailing
/// slash. Used as the "merge URL" in both discovery merge (§4.2) and dedupe
/// tier 2 (§4.3).
pub fn norm_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut u) => {
            let host = u.host_str().map(|h| h.to_lowercase());
            if let Some(h) = host {
                let _ = u.set_host(Some(&h));
            }
            let mut s = u.to_string();
            if s.ends_with('/') && u.path() != "/" {
                s.pop();
            }
            s
        }
        Err(_) => raw.trim_end_matches('/').to_lowercase(),
    }
}

/// Strips a trailing re-air marker (7+ digits) from the URL's path, after
/// normalizing it.
pub fn norm_url_strip_reair(raw: &str) -> String {
    let normalized = norm_url(raw);
    REAIR_SUFFIX_RE.replace(&normalized, "").into_owned()
}

fn strip_diacritics(s: &str) -> String {
    s.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Normalizes a title for fuzzy comparison: optionally strips a series
/// prefix, strips diacritics, lowercases, collapses whitespace.
pub fn norm_title(title: &str, series_prefix: Option<&str>) -> String {
    let mut t = title.to_string();
    if let Some(prefix) = series_prefix {
        for sep in &[": ", " -", " \u{2013}", " \u{2014}"] {
            let candidate = format!("{}{}", prefix, sep);
            if t.to_lowercase().starts_with(&candidate.to_lowercase()) {
                t = t[candidate.len()..].to_string();
                break;
            }
        }
    }
    let t = strip_diacritics(&t).to_lowercase();
    t.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Longest-common-subsequence length via the standard O(n*m) DP table.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let (n, m) = (a.len(), b.len());
    let mut dp = vec![0usize; m + 1];
    for i in 1..=n {
        let mut prev_diag = 0;
        for j in 1..=m {
            let tmp = dp[j];
            if a[i - 1] == b[j - 1] {
                dp[j] = prev_diag + 1;
            } else {
                dp[j] = dp[j].max(dp[j - 1]);
            }
            prev_diag = tmp;
        }
    }
    dp[m]
}

/// Ratio of the longest common subsequence to the combined length of both
/// strings, in `SequenceMatcher`-ratio style: `2*lcs / (len_a + len_b)`.
pub fn lcs_ratio(a: &str, b: &str) -> f64 {
    let ca: Vec<char> = a.chars().collect();
    let cb: Vec<char> = b.chars().collect();
    if ca.is_empty() || cb.is_empty() {
        return 0.0;
    }
    let lcs = lcs_len(&ca, &cb);
    (2 * lcs) as f64 / (ca.len() + cb.len()) as f64
}

/// Runs the three-tier dedupe over freshly discovered entries against the
/// current catalog state (§4.3, §8 "Dedupe completeness").
pub fn dedupe_discovered(
    entries: Vec<DiscoveredEpisode>,
    existing: &[ExistingEpisodeKey],
) -> DedupeResult {
    let mut unique: Vec<DiscoveredEpisode> = Vec::with_capacity(entries.len());
    let mut duplicates = Vec::new();

    for entry in entries {
        if let Some(reason) = find_existing_match(&entry, existing) {
            duplicates.push(DuplicateGroup {
                target: None,
                existing_episode_id: Some(reason.1),
                candidate: entry,
                reason: reason.0,
            });
            continue;
        }

        if let Some((idx, reason)) = find_unique_match(&entry, &unique) {
            duplicates.push(DuplicateGroup {
                target: Some(idx),
                existing_episode_id: None,
                candidate: entry,
                reason,
            });
            continue;
        }

        unique.push(entry);
    }

    DedupeResult { unique, duplicates }
}

fn find_existing_match(
    entry: &DiscoveredEpisode,
    existing: &[ExistingEpisodeKey],
) -> Option<(MatchReason, i64)> {
    if let Some(ext_id) = entry.ext_id.as_deref() {
        if let Some(e) = existing
            .iter()
            .find(|e| e.ext_id.as_deref() == Some(ext_id))
        {
            return Some((MatchReason::ExistingInDb, e.episode_id));
        }
    }

    let entry_url = norm_url(&entry.url);
    let entry_url_stripped = norm_url_strip_reair(&entry.url);
    if let Some(e) = existing.iter().find(|e| {
        e.url.as_deref().map(norm_url).as_deref() == Some(entry_url.as_str())
            || e.url
                .as_deref()
                .map(norm_url_strip_reair)
                .as_deref()
                == Some(entry_url_stripped.as_str())
    }) {
        return Some((MatchReason::ExistingInDb, e.episode_id));
    }

    let entry_title = norm_title(&entry.title, entry.series.as_deref());
    if entry_title.len() >= FUZZY_MIN_LEN {
        if let Some(e) = existing.iter().find(|e| {
            e.normalized_title
                .as_deref()
                .map(|t| lcs_ratio(t, &entry_title) > FUZZY_MATCH_THRESHOLD)
                .unwrap_or(false)
        }) {
            return Some((MatchReason::ExistingInDb, e.episode_id));
        }
    }

    None
}

fn find_unique_match(
    entry: &DiscoveredEpisode,
    unique: &[DiscoveredEpisode],
) -> Option<(usize, MatchReason)> {
    if let Some(ext_id) = entry.ext_id.as_deref() {
        if let Some(idx) = unique
            .iter()
            .position(|u| u.ext_id.as_deref() == Some(ext_id))
        {
            return Some((idx, MatchReason::ExtId));
        }
    }

    let entry_url = norm_url(&entry.url);
    let entry_url_stripped = norm_url_strip_reair(&entry.url);
    if let Some(idx) = unique.iter().position(|u| norm_url(&u.url) == entry_url) {
        return Some((idx, MatchReason::UrlExact));
    }
    if let Some(idx) = unique
        .iter()
        .position(|u| norm_url_strip_reair(&u.url) == entry_url_stripped)
    {
        return Some((idx, MatchReason::UrlReair));
    }

    let entry_title = norm_title(&entry.title, entry.series.as_deref());
    if entry_title.len() >= FUZZY_MIN_LEN {
        if let Some(idx) = unique.iter().position(|u| {
            let other_title = norm_title(&u.title, u.series.as_deref());
            other_title.len() >= FUZZY_MIN_LEN
                && lcs_ratio(&other_title, &entry_title) > FUZZY_MATCH_THRESHOLD
        }) {
            return Some((idx, MatchReason::TitleFuzzy));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use dedupe::*;
    use discovery::DiscoveredEpisode;

    fn entry(url: &str, title: &str) -> DiscoveredEpisode {
        DiscoveredEpisode {
            url: url.to_owned(),
            title: title.to_owned(),
            ext_id: None,
            duration_s: None,
            description: None,
            published_at: None,
            series: None,
            author: None,
            uploader: None,
            is_series_episode: false,
            sources: Default::default(),
            priority: 0,
        }
    }

    #[test]
    fn test_reair_suffix_dedupe() {
        let entries = vec![
            entry("https://x.example/show/slug", "Episode"),
            entry("https://x.example/show/slug-1234567", "Episode"),
        ];
        let result = dedupe_discovered(entries, &[]);
        assert_eq!(1, result.unique.len());
        assert_eq!(1, result.duplicates.len());
        assert_eq!(MatchReason::UrlReair, result.duplicates[0].reason);
    }

    #[test]
    fn test_fuzzy_title_dedupe() {
        let entries = vec![
            entry("https://x.example/a", "Pribeh c. 01"),
            entry("https://x.example/b", "P\u{159}\u{ed}b\u{11b}h \u{10d}. 01"),
        ];
        let result = dedupe_discovered(entries, &[]);
        assert_eq!(1, result.unique.len());
        assert_eq!(MatchReason::TitleFuzzy, result.duplicates[0].reason);
    }

    #[test]
    fn test_no_false_positive_on_distinct_titles() {
        let entries = vec![
            entry("https://x.example/a", "Episode One"),
            entry("https://x.example/b", "Episode Two Hundred"),
        ];
        let result = dedupe_discovered(entries, &[]);
        assert_eq!(2, result.unique.len());
        assert!(result.duplicates.is_empty());
    }

    #[test]
    fn test_lcs_ratio_identical() {
        assert_eq!(1.0, lcs_ratio("hello", "hello"));
    }

    #[test]
    fn test_norm_url_strip_reair() {
        assert_eq!(
            "https://x.example/show/slug",
            norm_url_strip_reair("https://X.Example/show/slug-1234567")
        );
        // Fewer than 7 digits is not a re-air marker.
        assert_eq!(
            "https://x.example/show/slug-12345",
            norm_url_strip_reair("https://x.example/show/slug-12345")
        );
    }
}
