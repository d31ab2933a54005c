//! Seed builders for the relational hierarchy (§3), grounded on the
//! ancestor's `test_data.rs` single-insert-helper shape -- here expanded to
//! one function per level since the domain model has more of them.

use model::{insertable, AssetStatus, AssetType, AvailabilityStatus};
use schema::{assets, episodes, programs, series, stations, works};

use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use rand::Rng;

pub fn insert_station(conn: &PgConnection) -> i64 {
    let mut rng = rand::thread_rng();
    diesel::insert_into(stations::table)
        .values(insertable::Station {
            code: format!("TEST{}", rng.gen::<u32>()),
            name: "Test Station".to_owned(),
            website: None,
        })
        .returning(stations::id)
        .get_result(conn)
        .unwrap()
}

pub fn insert_program(conn: &PgConnection, station_id: i64) -> i64 {
    diesel::insert_into(programs::table)
        .values(insertable::Program {
            station_id,
            ext_id: None,
            name: "Test Program".to_owned(),
            url: Some("https://example.com/show".to_owned()),
            description: None,
            genre: None,
            channel_label: None,
        })
        .returning(programs::id)
        .get_result(conn)
        .unwrap()
}

pub fn insert_series(conn: &PgConnection, program_id: i64) -> i64 {
    diesel::insert_into(series::table)
        .values(insertable::Series {
            program_id,
            ext_id: None,
            name: "Test Series".to_owned(),
            url: None,
        })
        .returning(series::id)
        .get_result(conn)
        .unwrap()
}

pub fn insert_work(conn: &PgConnection, series_id: i64) -> i64 {
    diesel::insert_into(works::table)
        .values(insertable::Work {
            series_id,
            title: "Test Work".to_owned(),
            author: Some("Test Author".to_owned()),
            year: Some(2020),
        })
        .returning(works::id)
        .get_result(conn)
        .unwrap()
}

pub fn insert_episode(conn: &PgConnection, work_id: i64) -> i64 {
    let mut rng = rand::thread_rng();
    let now = Utc::now();
    diesel::insert_into(episodes::table)
        .values(insertable::Episode {
            work_id,
            ext_id: Some(format!("ext-{}", rng.gen::<u64>())),
            title: "Test Episode".to_owned(),
            episode_number: Some(1),
            published_at: Some(now),
            url: Some(format!("https://example.com/ep-{}", rng.gen::<u64>())),
            duration_ms: Some(1_800_000),
            summary: None,
            availability_status: AvailabilityStatus::Available,
            first_seen_at: Some(now),
            last_seen_at: Some(now),
            last_checked_at: None,
            priority: 1,
            discovery_source: Some("test".to_owned()),
        })
        .returning(episodes::id)
        .get_result(conn)
        .unwrap()
}

pub fn insert_asset(conn: &PgConnection, episode_id: i64, asset_type: AssetType) -> i64 {
    diesel::insert_into(assets::table)
        .values(insertable::Asset {
            episode_id,
            asset_type,
            status: AssetStatus::Missing,
        })
        .returning(assets::id)
        .get_result(conn)
        .unwrap()
}

/// Builds a full Station -> Program -> Series -> Work -> Episode chain and
/// returns each level's id, for tests that need a ready-made graph.
pub struct EpisodeGraph {
    pub station_id: i64,
    pub program_id: i64,
    pub series_id: i64,
    pub work_id: i64,
    pub episode_id: i64,
}

pub fn insert_episode_graph(conn: &PgConnection) -> EpisodeGraph {
    let station_id = insert_station(conn);
    let program_id = insert_program(conn, station_id);
    let series_id = insert_series(conn, program_id);
    let work_id = insert_work(conn, series_id);
    let episode_id = insert_episode(conn, work_id);
    EpisodeGraph {
        station_id,
        program_id,
        series_id,
        work_id,
        episode_id,
    }
}
