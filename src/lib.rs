#![recursion_limit = "128"]

extern crate chrono;
#[macro_use]
extern crate diesel;
#[macro_use]
extern crate diesel_migrations;
extern crate directories;
#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate lazy_static;
extern crate r2d2;
extern crate rand;
extern crate regex;
extern crate reqwest;
extern crate serde;
extern crate serde_json;
extern crate serde_yaml;
extern crate sha2;
#[macro_use]
extern crate slog;
extern crate slog_async;
extern crate slog_term;
extern crate unicode_normalization;
extern crate url;

pub mod backends;
pub mod config;
pub mod dedupe;
pub mod discovery;
pub mod error_helpers;
pub mod errors;
pub mod health;
pub mod http_client;
pub mod library_manager;
pub mod mediators;
pub mod model;
pub mod paths;
pub mod rate_limiter;
pub mod tagger;

// Hand-maintained: skip rustfmt.
#[cfg_attr(rustfmt, rustfmt_skip)]
pub mod schema;

#[cfg(test)]
pub mod test_data;
#[cfg(test)]
pub mod test_helpers;
