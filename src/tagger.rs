//! The tagger collaborator (§2 "Out of scope": "audio tag rewriting, genre
//! taxonomy, and file-naming rules"; §2 C6 step 4 "Post-process audio").
//! The executor only depends on this trait's contract: given an episode's
//! context and the path a backend wrote audio to, write embedded tags, move
//! the file into its final library location, and report back where it
//! landed.

use errors::*;

use std::path::PathBuf;

/// The subset of episode/work context the tagger needs to write tags and
/// compute a final name; deliberately not the full `Episode`/`Work` model
/// rows, since the tagger is an external collaborator and shouldn't depend
/// on this crate's schema.
#[derive(Clone, Debug)]
pub struct TagContext {
    pub program: String,
    pub station_code: String,
    pub author: Option<String>,
    pub year: Option<i32>,
    pub album: Option<String>,
    pub title: String,
    pub episode_number: Option<i32>,
    /// The sanitized relative path this crate's own pathing (`paths::
    /// build_paths_for_episode`) computed, offered as a hint -- the tagger
    /// owns final naming and may deviate from it (§2 "file-naming rules").
    pub suggested_relative_path: String,
}

pub trait Tagger: Send + Sync {
    /// Writes tags into `audio_path`, possibly renaming/moving it, and
    /// returns the final on-disk path.
    fn tag_and_place(&self, ctx: &TagContext, audio_path: &PathBuf) -> Result<PathBuf>;
}

/// A no-op tagger used when no external tagger is configured: the file is
/// left exactly where the backend put it.
pub struct NoOpTagger;

impl Tagger for NoOpTagger {
    fn tag_and_place(&self, _ctx: &TagContext, audio_path: &PathBuf) -> Result<PathBuf> {
        Ok(audio_path.clone())
    }
}
