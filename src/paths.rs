//! Library path construction (§6 "out-of-scope library-pather" boundary,
//! §7 "Filesystem layout"). `build_paths_for_episode` computes the target
//! path an episode's audio asset lands at once the tagger collaborator has
//! had its say; everything here is the sanitation/layout portion the
//! orchestrator owns, grounded on the ancestor codebase's `links.rs` slug
//! helper and the Python implementation's `pipelines/library.py`.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

const STEM_MAX_LENGTH: usize = 80;

/// Inputs needed to compute an episode's library path. Any field may be
/// empty; layout degrades gracefully rather than erroring (§4.6 "Build
/// target path").
#[derive(Clone, Debug, Default)]
pub struct LibraryPathInput<'a> {
    pub program: &'a str,
    pub station_code: &'a str,
    pub author: &'a str,
    pub year: Option<i32>,
    pub album: &'a str,
    pub title: &'a str,
    pub episode_number: Option<i32>,
    pub ext: &'a str,
}

/// Returns the relative path (no `library_dir` prefix) an episode's
/// primary asset should occupy: `{program} ({station_code})/{author} -
/// ({year}) {album}/{stem}.{ext}` (§7 "Persisted state").
pub fn build_paths_for_episode(input: &LibraryPathInput) -> String {
    let program_dir = directory_component(input);
    let album_dir = album_component(input);
    let stem = stem_component(input);

    let mut path = String::new();
    path.push_str(&program_dir);
    path.push('/');
    path.push_str(&album_dir);
    path.push('/');
    path.push_str(&stem);
    if !input.ext.is_empty() {
        path.push('.');
        path.push_str(&sanitize_component(input.ext));
    }
    path
}

fn directory_component(input: &LibraryPathInput) -> String {
    let program = sanitize_component(input.program);
    if input.station_code.is_empty() {
        program
    } else {
        format!("{} ({})", program, sanitize_component(input.station_code))
    }
}

fn album_component(input: &LibraryPathInput) -> String {
    let author = sanitize_component(input.author);
    let album = sanitize_component(input.album);

    match (author.is_empty(), input.year, album.is_empty()) {
        (false, Some(year), false) => format!("{} - ({}) {}", author, year, album),
        (false, None, false) => format!("{} - {}", author, album),
        (false, _, true) => author,
        (true, Some(year), false) => format!("({}) {}", year, album),
        (true, _, false) => album,
        (true, _, true) => "Unknown".to_owned(),
    }
}

fn stem_component(input: &LibraryPathInput) -> String {
    let album = sanitize_component(input.album);
    let title = sanitize_component(input.title);
    let numbered = match input.episode_number {
        Some(n) if !title.is_empty() => format!("{:02} {}", n, title),
        Some(n) => format!("{:02}", n),
        None if !title.is_empty() => title,
        None => "episode".to_owned(),
    };
    let raw = if album.is_empty() {
        numbered
    } else {
        format!("{} - {}", album, numbered)
    };
    cap_length(&raw, STEM_MAX_LENGTH)
}

/// Strips diacritics and path-reserved characters (§4.6 "Paths are
/// sanitized").
fn sanitize_component(raw: &str) -> String {
    let without_diacritics: String = raw.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    without_diacritics
        .chars()
        .map(|c| if is_reserved(c) { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_owned()
}

fn is_reserved(c: char) -> bool {
    matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0')
}

fn cap_length(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_owned();
    }

    let mut out = String::new();
    for part in s.split(' ') {
        let candidate_len = if out.is_empty() {
            part.chars().count()
        } else {
            out.chars().count() + 1 + part.chars().count()
        };
        if candidate_len > max {
            if out.is_empty() {
                return part.chars().take(max).collect();
            }
            return out;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(part);
    }
    out
}

#[cfg(test)]
mod tests {
    use paths::*;

    #[test]
    fn test_build_paths_full() {
        let input = LibraryPathInput {
            program: "Hajaja",
            station_code: "CRo3",
            author: "Karel Capek",
            year: Some(1936),
            album: "War with the Newts",
            title: "Druha kapitola",
            episode_number: Some(2),
            ext: "mp3",
        };
        assert_eq!(
            "Hajaja (CRo3)/Karel Capek - (1936) War with the Newts/War with the Newts - 02 Druha kapitola.mp3",
            build_paths_for_episode(&input)
        );
    }

    #[test]
    fn test_build_paths_degrades_on_empty_fields() {
        let input = LibraryPathInput {
            program: "Mystery Hour",
            station_code: "",
            author: "",
            year: None,
            album: "",
            title: "",
            episode_number: None,
            ext: "",
        };
        assert_eq!("Mystery Hour/Unknown/episode", build_paths_for_episode(&input));
    }

    #[test]
    fn test_sanitize_strips_diacritics_and_reserved_chars() {
        assert_eq!("Skola", sanitize_component("Škola?"));
        assert_eq!("a b", sanitize_component("a/b"));
    }

    #[test]
    fn test_stem_capped_at_80_chars() {
        let long_title = "x".repeat(200);
        let input = LibraryPathInput {
            program: "P",
            station_code: "",
            author: "",
            year: None,
            album: "",
            title: &long_title,
            episode_number: None,
            ext: "mp3",
        };
        let path = build_paths_for_episode(&input);
        let stem = path.split('/').last().unwrap().trim_end_matches(".mp3");
        assert!(stem.chars().count() <= 80);
    }
}
