//! A small pluggable HTTP client abstraction, grounded on the ancestor
//! codebase's `HttpRequester`/`URLFetcher` trait+factory+`PassThrough`
//! pattern, rebuilt on top of `reqwest::blocking` instead of raw
//! `hyper`+`tokio-core`.
//!
//! Every outbound call from the discovery and availability components goes
//! through this trait so tests can substitute canned responses without
//! touching the network (§4.2, §4.5).

use errors::*;

use slog::Logger;
use std::sync::Arc;
use std::time::Duration;

/// A "browser-grade" identity. Bare HTTP client identifiers get 403'd by the
/// upstream (§4.2 "Polite identity").
pub const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/115.0";

/// Outcome of a single HTTP call: status code, response body, and the final
/// URL after any redirects (reqwest follows redirects itself).
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub final_url: String,
}

pub trait HttpClient: Send + Sync {
    fn get(&self, log: &Logger, url: &str) -> Result<HttpResponse>;

    /// HEAD request used by the availability prober (§4.5). Implementations
    /// that can't distinguish HEAD from GET (e.g. test stubs) may just issue
    /// a GET.
    fn head(&self, log: &Logger, url: &str) -> Result<HttpResponse>;
}

#[derive(Clone)]
pub struct HttpClientLive {
    client: reqwest::blocking::Client,
}

impl HttpClientLive {
    pub fn new(timeout: Duration) -> Result<HttpClientLive> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(HttpClientLive { client })
    }
}

impl HttpClient for HttpClientLive {
    fn get(&self, log: &Logger, url: &str) -> Result<HttpResponse> {
        info!(log, "Executing HTTP GET"; "url" => url);
        let res = self.client.get(url).send()?;
        let final_url = res.url().to_string();
        let status = res.status().as_u16();
        let body = res.bytes()?.to_vec();
        Ok(HttpResponse {
            status,
            body,
            final_url,
        })
    }

    fn head(&self, log: &Logger, url: &str) -> Result<HttpResponse> {
        info!(log, "Executing HTTP HEAD"; "url" => url);
        let res = self.client.head(url).send()?;
        let final_url = res.url().to_string();
        let status = res.status().as_u16();
        Ok(HttpResponse {
            status,
            body: Vec::new(),
            final_url,
        })
    }
}

/// A fixed-response stub for tests, analogous to the ancestor's
/// `HttpRequesterPassThrough`.
#[derive(Clone)]
pub struct HttpClientStub {
    pub status: u16,
    pub body: Arc<Vec<u8>>,
}

impl HttpClientStub {
    pub fn ok(body: impl Into<Vec<u8>>) -> HttpClientStub {
        HttpClientStub {
            status: 200,
            body: Arc::new(body.into()),
        }
    }

    pub fn with_status(status: u16) -> HttpClientStub {
        HttpClientStub {
            status,
            body: Arc::new(Vec::new()),
        }
    }
}

impl HttpClient for HttpClientStub {
    fn get(&self, _log: &Logger, url: &str) -> Result<HttpResponse> {
        Ok(HttpResponse {
            status: self.status,
            body: (*self.body).clone(),
            final_url: url.to_owned(),
        })
    }

    fn head(&self, _log: &Logger, url: &str) -> Result<HttpResponse> {
        Ok(HttpResponse {
            status: self.status,
            body: Vec::new(),
            final_url: url.to_owned(),
        })
    }
}
