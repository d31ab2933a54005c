//! The link-grabber backend: a local REST adapter (§6 "Link-grabber") for
//! an alternate download agent. Field names are passed through unchanged --
//! this orchestrator doesn't interpret the package/link schema beyond what
//! it needs to poll for completion.

use backends::{DownloadBackend, DownloadOutcome};
use errors::*;

use serde_json::{json, Value};
use slog::Logger;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_secs(2);
const POLL_ATTEMPTS: u32 = 150;

pub struct LinkGrabberBackend {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl LinkGrabberBackend {
    pub fn new(host: &str, port: u16) -> Result<LinkGrabberBackend> {
        Ok(LinkGrabberBackend {
            base_url: format!("http://{}:{}", host, port),
            client: reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?,
        })
    }

    pub fn version(&self) -> Result<Value> {
        let res = self
            .client
            .get(format!("{}/jd/version", self.base_url))
            .send()?;
        Ok(res.json()?)
    }
}

impl DownloadBackend for LinkGrabberBackend {
    fn download(&self, log: &Logger, url: &str, dest_dir: &PathBuf) -> Result<DownloadOutcome> {
        let dest_dir_str = dest_dir.to_string_lossy().into_owned();

        info!(log, "Submitting link to link-grabber"; "url" => url);
        let add_body = json!({
            "links": url,
            "destinationFolder": dest_dir_str,
            "autostart": true,
        });
        self.client
            .post(format!("{}/linkgrabberv2/addLinks", self.base_url))
            .json(&add_body)
            .send()?
            .error_for_status()?;

        for attempt in 0..POLL_ATTEMPTS {
            thread::sleep(POLL_INTERVAL);

            let packages: Value = self
                .client
                .post(format!("{}/downloadsV2/queryPackages", self.base_url))
                .json(&json!({}))
                .send()?
                .json()?;

            if let Some(outcome) = completed_package(&packages, &dest_dir_str) {
                return Ok(outcome);
            }
            debug!(log, "Waiting on link-grabber download"; "attempt" => attempt);
        }

        bail!("link-grabber did not finish downloading {} in time", url)
    }
}

fn completed_package(packages: &Value, dest_dir: &str) -> Option<DownloadOutcome> {
    let arr = packages.as_array()?;
    let pkg = arr.iter().find(|p| {
        p.get("finished").and_then(Value::as_bool).unwrap_or(false)
            && p.get("saveTo")
                .and_then(Value::as_str)
                .map(|s| s.starts_with(dest_dir))
                .unwrap_or(false)
    })?;

    let file_path = pkg.get("saveTo").and_then(Value::as_str)?.into();
    let size_bytes = pkg.get("bytesTotal").and_then(Value::as_i64).unwrap_or(0);
    Some(DownloadOutcome { file_path, size_bytes })
}
