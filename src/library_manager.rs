//! Library-manager notification (§6 "Library-manager notification", §2 C6
//! step 5 "Notify library manager"), grounded on the Python
//! implementation's Audiobookshelf client. Fire-and-forget: a failed notify
//! is logged and swallowed, it never fails the download job.

use errors::*;

use serde_json::Value;
use slog::Logger;
use std::time::Duration;

pub struct LibraryManagerClient {
    base_url: String,
    api_key: String,
    client: reqwest::blocking::Client,
}

impl LibraryManagerClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<LibraryManagerClient> {
        Ok(LibraryManagerClient {
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
            client: reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()?,
        })
    }

    /// Triggers a library rescan. If no library id is configured, queries
    /// `GET /api/libraries` and uses the first one.
    pub fn trigger_library_scan(&self, log: &Logger, library_id: Option<&str>) -> Result<()> {
        let id = match library_id {
            Some(id) => id.to_owned(),
            None => self.first_library_id(log)?,
        };

        let url = format!("{}/api/libraries/{}/scan", self.base_url, id);
        info!(log, "Notifying library manager"; "url" => &url);
        self.client
            .post(&url)
            .bearer_auth(&self.api_key)
            .send()?
            .error_for_status()?;
        Ok(())
    }

    fn first_library_id(&self, log: &Logger) -> Result<String> {
        let url = format!("{}/api/libraries", self.base_url);
        let body: Value = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()?
            .json()?;

        let id = body
            .get("libraries")
            .and_then(Value::as_array)
            .and_then(|arr| arr.first())
            .and_then(|lib| lib.get("id"))
            .and_then(Value::as_str)
            .ok_or_else(|| Error::from("no libraries returned by library manager"))?
            .to_owned();

        debug!(log, "Resolved default library id"; "id" => &id);
        Ok(id)
    }
}
