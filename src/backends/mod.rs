//! Download backend adapters (§6 "Source-adapter contracts", §2 C6). These
//! are thin, pluggable wrappers around external tools/services; the
//! executor only depends on the `DownloadBackend` trait, never on a
//! concrete backend.

pub mod extractor;
pub mod link_grabber;

use errors::*;

use slog::Logger;
use std::path::PathBuf;

/// Outcome of a completed download: where the file landed and its size.
/// The executor is responsible for moving/renaming per `build_paths_for_episode`
/// (§paths); a backend just reports what it produced.
pub struct DownloadOutcome {
    pub file_path: PathBuf,
    pub size_bytes: i64,
}

pub trait DownloadBackend: Send + Sync {
    fn download(&self, log: &Logger, url: &str, dest_dir: &PathBuf) -> Result<DownloadOutcome>;
}
