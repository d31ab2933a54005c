//! The application's data layer: models queried from and inserted into the
//! catalog database (§3).
//!
//! Simple helper functions are allowed, but they should be kept extremely
//! simple, with preference for any and all domain logic to be offloaded to a
//! mediator.
//!
//! Insertable models live in the `insertable` submodule. These are distinct
//! from queryable models so that we can take advantage of database defaults
//! (ID sequences, `created_at` defaults, and so on).

use schema;

use chrono::{DateTime, Utc};
use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql};
use diesel::pg::Pg;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use serde_json;
use std::fmt;
use std::io::Write;
use std::str::FromStr;

//
// Enums
//
// Stored as `Text` columns; the ancestor schema carries no native Postgres
// enum types, so these follow the same convention rather than introducing
// one just for this crate.
//

macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:expr),+ $(,)? }) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, AsExpression, FromSqlRow)]
        #[diesel(sql_type = Text)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant)),+,
                    other => Err(format!(concat!(stringify!($name), ": unrecognized value {:?}"), other)),
                }
            }
        }

        impl<DB> ToSql<Text, DB> for $name
        where
            DB: Backend,
            str: ToSql<Text, DB>,
        {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, DB>) -> serialize::Result {
                self.as_str().to_sql(out)
            }
        }

        impl FromSql<Text, Pg> for $name {
            fn from_sql(bytes: diesel::pg::PgValue) -> deserialize::Result<Self> {
                let s = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
                s.parse().map_err(|e: String| e.into())
            }
        }
    };
}

text_enum!(AvailabilityStatus {
    Unknown => "unknown",
    Available => "available",
    Unavailable => "unavailable",
    Gone => "gone",
});

text_enum!(AssetType {
    Audio => "audio",
    MetaJson => "meta_json",
    Webpage => "webpage",
    Cover => "cover",
    Transcript => "transcript",
    Subtitle => "subtitle",
    Other => "other",
});

/// The set of asset types that every Episode must eventually have (§3).
pub const REQUIRED_ASSET_TYPES: [AssetType; 3] =
    [AssetType::Audio, AssetType::MetaJson, AssetType::Webpage];

text_enum!(AssetStatus {
    Missing => "missing",
    Queued => "queued",
    Downloading => "downloading",
    Complete => "complete",
    Failed => "failed",
    Stale => "stale",
    Skipped => "skipped",
});

text_enum!(JobStatus {
    Pending => "pending",
    Running => "running",
    Success => "success",
    Error => "error",
    Skipped => "skipped",
    Watch => "watch",
});

text_enum!(CrawlTargetKind {
    Station => "station",
    Program => "program",
    Series => "series",
});

//
// Queryable models
//

#[derive(Clone, Debug, Queryable, Identifiable)]
#[diesel(table_name = schema::stations)]
pub struct Station {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub website: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Queryable, Identifiable, AsChangeset)]
#[diesel(table_name = schema::programs)]
pub struct Program {
    pub id: i64,
    pub station_id: i64,
    pub ext_id: Option<String>,
    pub name: String,
    pub url: Option<String>,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub channel_label: Option<String>,
    pub auto_crawl: bool,
    pub crawl_interval_hours: Option<i32>,
    pub last_crawled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Queryable, Identifiable, AsChangeset)]
#[diesel(table_name = schema::series)]
pub struct Series {
    pub id: i64,
    pub program_id: i64,
    pub ext_id: Option<String>,
    pub name: String,
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Queryable, Identifiable, AsChangeset)]
#[diesel(table_name = schema::works)]
pub struct Work {
    pub id: i64,
    pub series_id: i64,
    pub title: String,
    pub author: Option<String>,
    pub year: Option<i32>,
    pub asin: Option<String>,
    pub extra: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Queryable, Identifiable, AsChangeset)]
#[diesel(table_name = schema::episodes)]
pub struct Episode {
    pub id: i64,
    pub work_id: i64,
    pub ext_id: Option<String>,
    pub title: String,
    pub episode_number: Option<i32>,
    pub published_at: Option<DateTime<Utc>>,
    pub url: Option<String>,
    pub duration_ms: Option<i32>,
    pub summary: Option<String>,
    pub availability_status: AvailabilityStatus,
    pub first_seen_at: Option<DateTime<Utc>>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub auto_download: bool,
    pub priority: i32,
    pub discovery_source: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Queryable, Identifiable)]
#[diesel(table_name = schema::episode_aliases)]
pub struct EpisodeAlias {
    pub id: i64,
    pub episode_id: i64,
    pub url: Option<String>,
    pub ext_id: Option<String>,
    pub air_date: Option<DateTime<Utc>>,
    pub discovery_source: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Queryable, Identifiable, AsChangeset)]
#[diesel(table_name = schema::assets)]
pub struct Asset {
    pub id: i64,
    pub episode_id: i64,
    pub asset_type: AssetType,
    pub status: AssetStatus,
    pub source_url: Option<String>,
    pub file_path: Option<String>,
    pub size_bytes: Option<i64>,
    pub checksum: Option<String>,
    pub codec: Option<String>,
    pub container: Option<String>,
    pub bitrate: Option<i32>,
    pub channels: Option<i32>,
    pub sample_rate: Option<i32>,
    pub extra: Option<serde_json::Value>,
    pub first_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Queryable, Identifiable, AsChangeset)]
#[diesel(table_name = schema::download_jobs)]
pub struct DownloadJob {
    pub id: i64,
    pub episode_id: i64,
    pub asset_type: AssetType,
    pub status: JobStatus,
    pub reason: Option<String>,
    pub command: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Queryable, Identifiable, AsChangeset)]
#[diesel(table_name = schema::crawl_targets)]
pub struct CrawlTarget {
    pub id: i64,
    pub url: String,
    pub kind: CrawlTargetKind,
    pub name: Option<String>,
    pub active: bool,
    pub interval_hours: i32,
    pub last_crawled_at: Option<DateTime<Utc>>,
    pub next_crawl_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Queryable, Identifiable)]
#[diesel(table_name = schema::availability_log)]
pub struct AvailabilityLog {
    pub id: i64,
    pub episode_id: i64,
    pub checked_at: DateTime<Utc>,
    pub was_available: bool,
    pub http_status: Option<i32>,
}

//
// Insertable models
//

pub mod insertable {
    use model::{AssetStatus, AssetType, AvailabilityStatus, CrawlTargetKind, JobStatus};
    use schema;

    use chrono::{DateTime, Utc};

    #[derive(Clone, Debug, Insertable)]
    #[diesel(table_name = schema::stations)]
    pub struct Station {
        pub code: String,
        pub name: String,
        pub website: Option<String>,
    }

    #[derive(Clone, Debug, Insertable)]
    #[diesel(table_name = schema::programs)]
    pub struct Program {
        pub station_id: i64,
        pub ext_id: Option<String>,
        pub name: String,
        pub url: Option<String>,
        pub description: Option<String>,
        pub genre: Option<String>,
        pub channel_label: Option<String>,
    }

    #[derive(Clone, Debug, Insertable)]
    #[diesel(table_name = schema::series)]
    pub struct Series {
        pub program_id: i64,
        pub ext_id: Option<String>,
        pub name: String,
        pub url: Option<String>,
    }

    #[derive(Clone, Debug, Insertable)]
    #[diesel(table_name = schema::works)]
    pub struct Work {
        pub series_id: i64,
        pub title: String,
        pub author: Option<String>,
        pub year: Option<i32>,
    }

    #[derive(Clone, Debug, Insertable)]
    #[diesel(table_name = schema::episodes)]
    pub struct Episode {
        pub work_id: i64,
        pub ext_id: Option<String>,
        pub title: String,
        pub episode_number: Option<i32>,
        pub published_at: Option<DateTime<Utc>>,
        pub url: Option<String>,
        pub duration_ms: Option<i32>,
        pub summary: Option<String>,
        pub availability_status: AvailabilityStatus,
        pub first_seen_at: Option<DateTime<Utc>>,
        pub last_seen_at: Option<DateTime<Utc>>,
        pub last_checked_at: Option<DateTime<Utc>>,
        pub priority: i32,
        pub discovery_source: Option<String>,
    }

    #[derive(Clone, Debug, Insertable)]
    #[diesel(table_name = schema::episode_aliases)]
    pub struct EpisodeAlias {
        pub episode_id: i64,
        pub url: Option<String>,
        pub ext_id: Option<String>,
        pub air_date: Option<DateTime<Utc>>,
        pub discovery_source: Option<String>,
    }

    #[derive(Clone, Debug, Insertable)]
    #[diesel(table_name = schema::assets)]
    pub struct Asset {
        pub episode_id: i64,
        pub asset_type: AssetType,
        pub status: AssetStatus,
    }

    #[derive(Clone, Debug, Insertable)]
    #[diesel(table_name = schema::download_jobs)]
    pub struct DownloadJob {
        pub episode_id: i64,
        pub asset_type: AssetType,
        pub status: JobStatus,
        pub reason: Option<String>,
    }

    #[derive(Clone, Debug, Insertable)]
    #[diesel(table_name = schema::crawl_targets)]
    pub struct CrawlTarget {
        pub url: String,
        pub kind: CrawlTargetKind,
        pub name: Option<String>,
        pub active: bool,
        pub interval_hours: i32,
    }

    #[derive(Clone, Debug, Insertable)]
    #[diesel(table_name = schema::availability_log)]
    pub struct AvailabilityLog {
        pub episode_id: i64,
        pub checked_at: DateTime<Utc>,
        pub was_available: bool,
        pub http_status: Option<i32>,
    }
}

#[cfg(test)]
mod tests {
    use model::*;

    #[test]
    fn test_enum_round_trip() {
        for s in &["unknown", "available", "unavailable", "gone"] {
            let parsed: AvailabilityStatus = s.parse().unwrap();
            assert_eq!(*s, parsed.as_str());
        }
        assert!("bogus".parse::<AvailabilityStatus>().is_err());
    }

    #[test]
    fn test_required_asset_types() {
        assert_eq!(3, REQUIRED_ASSET_TYPES.len());
        assert!(REQUIRED_ASSET_TYPES.contains(&AssetType::Audio));
        assert!(REQUIRED_ASSET_TYPES.contains(&AssetType::MetaJson));
        assert!(REQUIRED_ASSET_TYPES.contains(&AssetType::Webpage));
    }
}
