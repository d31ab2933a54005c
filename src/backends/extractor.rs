//! The extractor backend: shells out to the same `extractor` binary used by
//! discovery's flat-playlist adapter, this time to actually fetch media
//! into a per-episode scratch directory (§7 "Temporary download directories
//! are per-episode").

use backends::{DownloadBackend, DownloadOutcome};
use errors::*;

use slog::Logger;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

const EXTRACTOR_BIN: &str = "extractor";

pub struct ExtractorBackend;

impl ExtractorBackend {
    pub fn new() -> ExtractorBackend {
        ExtractorBackend
    }
}

impl DownloadBackend for ExtractorBackend {
    fn download(&self, log: &Logger, url: &str, dest_dir: &PathBuf) -> Result<DownloadOutcome> {
        fs::create_dir_all(dest_dir)?;

        info!(log, "Invoking extractor backend"; "url" => url, "dest_dir" => dest_dir.display().to_string());
        let output_template = dest_dir.join("%(id)s.%(ext)s");
        let status = Command::new(EXTRACTOR_BIN)
            .args(["-o", &output_template.to_string_lossy(), url])
            .status()
            .chain_err(|| format!("failed to spawn {}", EXTRACTOR_BIN))?;

        if !status.success() {
            bail!("{} exited with {}", EXTRACTOR_BIN, status);
        }

        let file_path = newest_file_in(dest_dir)?
            .ok_or_else(|| Error::from("extractor produced no output file"))?;
        let size_bytes = fs::metadata(&file_path)?.len() as i64;

        Ok(DownloadOutcome { file_path, size_bytes })
    }
}

fn newest_file_in(dir: &PathBuf) -> Result<Option<PathBuf>> {
    let mut newest: Option<(PathBuf, std::time::SystemTime)> = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if newest.as_ref().map(|(_, t)| modified > *t).unwrap_or(true) {
            newest = Some((entry.path(), modified));
        }
    }
    Ok(newest.map(|(p, _)| p))
}
