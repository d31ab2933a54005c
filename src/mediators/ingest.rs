//! Ingest/upsert (C4, §4.4), grounded on the ancestor's `podcast_updater.rs`
//! upsert shape and the Python implementation's `pipelines/ingest.py`.
//!
//! Takes a deduplicated batch of `DiscoveredEpisode`s for one Work and folds
//! each into the catalog in its own transaction: station/program/series/work
//! upsert, re-air detection against existing episodes, and asset/job
//! planning for anything newly complete enough to download.

use dedupe::{self, ExistingEpisodeKey, MatchReason};
use discovery::DiscoveredEpisode;
use errors::*;
use mediators::common;
use model::{self, insertable, AssetStatus, AssetType, AvailabilityStatus, JobStatus};
use schema::{assets, download_jobs, episode_aliases, episodes, programs, series, stations, works};

use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use slog::Logger;

/// Case-insensitive substring map from uploader name to station code (§4.4
/// step 1). Unknown uploaders fall back to a generic aggregator station.
const UPLOADER_STATION_MAP: &[(&str, &str)] = &[
    ("vltava", "CRo3"),
    ("dvojka", "CRo2"),
    ("radiozurnal", "CRo1"),
    ("radiozurnal", "CRo1"),
    ("junior", "CRoJun"),
    ("plus", "CRoPlus"),
    ("wave", "CRoW"),
];

const AGGREGATOR_STATION_CODE: &str = "AGGREGATOR";
const AGGREGATOR_STATION_NAME: &str = "Aggregator";

pub struct Ingester<'a> {
    pub conn: &'a PgConnection,
    pub program_name: String,
    pub program_url: Option<String>,
    pub entries: Vec<DiscoveredEpisode>,
}

pub struct RunResult {
    pub num_created: i64,
    pub num_reaired: i64,
    pub num_filled: i64,
    pub duplicates: Vec<dedupe::DuplicateGroup>,
}

impl<'a> Ingester<'a> {
    pub fn run(&mut self, log: &Logger) -> Result<RunResult> {
        common::log_timed(&log.new(o!("step" => file!())), |log| self.run_inner(log))
    }

    fn run_inner(&mut self, log: &Logger) -> Result<RunResult> {
        let ordered = assign_priorities(self.entries.clone());

        let existing = self.load_existing_keys(log)?;
        let dedupe_result = dedupe::dedupe_discovered(ordered, &existing);

        let mut num_created = 0i64;
        let mut num_reaired = 0i64;
        let mut num_filled = 0i64;

        for entry in dedupe_result.unique {
            self.conn.transaction::<_, Error, _>(|| {
                let outcome = self.ingest_one(log, &entry)?;
                match outcome {
                    IngestOutcome::Created => num_created += 1,
                    IngestOutcome::Reaired => num_reaired += 1,
                    IngestOutcome::Filled => num_filled += 1,
                }
                Ok(())
            })?;
        }

        info!(log, "Ingest batch finished";
            "num_created" => num_created, "num_reaired" => num_reaired,
            "num_filled" => num_filled, "num_duplicates" => dedupe_result.duplicates.len());

        Ok(RunResult {
            num_created,
            num_reaired,
            num_filled,
            duplicates: dedupe_result.duplicates,
        })
    }

    fn load_existing_keys(&self, log: &Logger) -> Result<Vec<ExistingEpisodeKey>> {
        common::log_timed(&log.new(o!("step" => "load_existing_keys")), |_log| {
            let rows: Vec<(i64, Option<String>, Option<String>, String)> = episodes::table
                .select((
                    episodes::id,
                    episodes::ext_id,
                    episodes::url,
                    episodes::title,
                ))
                .load(self.conn)?;

            Ok(rows
                .into_iter()
                .map(|(episode_id, ext_id, url, title)| ExistingEpisodeKey {
                    episode_id,
                    ext_id,
                    url,
                    normalized_title: Some(dedupe::norm_title(&title, None)),
                })
                .collect())
        })
    }

    fn ingest_one(&self, log: &Logger, entry: &DiscoveredEpisode) -> Result<IngestOutcome> {
        let station_code = resolve_station_code(entry.uploader.as_deref());
        let station_id = self.upsert_station(log, station_code)?;
        let program_id = self.upsert_program(log, station_id)?;
        let series_name = entry.series.clone().unwrap_or_else(|| self.program_name.clone());
        let series_id = self.upsert_series(log, program_id, &series_name)?;
        let work_id = self.upsert_work(log, series_id, &series_name)?;

        match self.find_canonical_episode(work_id, entry)? {
            Some((episode_id, reason)) => {
                self.append_alias(episode_id, entry)?;

                let episode: model::Episode = episodes::table.find(episode_id).first(self.conn)?;
                let mut reaired = false;
                if episode.availability_status == AvailabilityStatus::Gone {
                    self.reair_episode(log, episode_id, entry)?;
                    reaired = true;
                }
                self.fill_episode(episode_id, &episode, entry)?;

                debug!(log, "Matched existing episode"; "episode_id" => episode_id, "reason" => reason.as_str());
                Ok(if reaired {
                    IngestOutcome::Reaired
                } else {
                    IngestOutcome::Filled
                })
            }
            None => {
                let episode_id = self.create_episode(work_id, entry)?;
                self.append_alias(episode_id, entry)?;
                self.plan_assets(episode_id)?;
                Ok(IngestOutcome::Created)
            }
        }
    }

    //
    // Station/program/series/work upserts (§4.4 step 2)
    //

    fn upsert_station(&self, _log: &Logger, code: &str) -> Result<i64> {
        if let Some(id) = stations::table
            .filter(stations::code.eq(code))
            .select(stations::id)
            .first::<i64>(self.conn)
            .optional()?
        {
            return Ok(id);
        }

        let name = if code == AGGREGATOR_STATION_CODE {
            AGGREGATOR_STATION_NAME.to_owned()
        } else {
            code.to_owned()
        };

        diesel::insert_into(stations::table)
            .values(insertable::Station {
                code: code.to_owned(),
                name,
                website: None,
            })
            .on_conflict(stations::code)
            .do_update()
            .set(stations::code.eq(code))
            .returning(stations::id)
            .get_result(self.conn)
            .map_err(Error::from)
    }

    /// Inserts fail silently on a `(station_id, name)` collision and
    /// re-read the winning row -- the one re-read on unique-constraint
    /// collision the repository layer promises (spec §3 "Failure
    /// semantics").
    fn upsert_program(&self, _log: &Logger, station_id: i64) -> Result<i64> {
        if let Some(id) = programs::table
            .filter(programs::station_id.eq(station_id))
            .filter(programs::name.eq(&self.program_name))
            .select(programs::id)
            .first::<i64>(self.conn)
            .optional()?
        {
            return Ok(id);
        }

        let inserted: Option<i64> = diesel::insert_into(programs::table)
            .values(insertable::Program {
                station_id,
                ext_id: None,
                name: self.program_name.clone(),
                url: self.program_url.clone(),
                description: None,
                genre: None,
                channel_label: None,
            })
            .on_conflict((programs::station_id, programs::name))
            .do_nothing()
            .returning(programs::id)
            .get_result(self.conn)
            .optional()?;

        match inserted {
            Some(id) => Ok(id),
            None => programs::table
                .filter(programs::station_id.eq(station_id))
                .filter(programs::name.eq(&self.program_name))
                .select(programs::id)
                .first::<i64>(self.conn)
                .map_err(Error::from),
        }
    }

    fn upsert_series(&self, _log: &Logger, program_id: i64, name: &str) -> Result<i64> {
        if let Some(id) = series::table
            .filter(series::program_id.eq(program_id))
            .filter(series::name.eq(name))
            .select(series::id)
            .first::<i64>(self.conn)
            .optional()?
        {
            return Ok(id);
        }

        let inserted: Option<i64> = diesel::insert_into(series::table)
            .values(insertable::Series {
                program_id,
                ext_id: None,
                name: name.to_owned(),
                url: None,
            })
            .on_conflict((series::program_id, series::name))
            .do_nothing()
            .returning(series::id)
            .get_result(self.conn)
            .optional()?;

        match inserted {
            Some(id) => Ok(id),
            None => series::table
                .filter(series::program_id.eq(program_id))
                .filter(series::name.eq(name))
                .select(series::id)
                .first::<i64>(self.conn)
                .map_err(Error::from),
        }
    }

    fn upsert_work(&self, _log: &Logger, series_id: i64, title: &str) -> Result<i64> {
        if let Some(id) = works::table
            .filter(works::series_id.eq(series_id))
            .filter(works::title.eq(title))
            .select(works::id)
            .first::<i64>(self.conn)
            .optional()?
        {
            return Ok(id);
        }

        let inserted: Option<i64> = diesel::insert_into(works::table)
            .values(insertable::Work {
                series_id,
                title: title.to_owned(),
                author: None,
                year: None,
            })
            .on_conflict((works::series_id, works::title))
            .do_nothing()
            .returning(works::id)
            .get_result(self.conn)
            .optional()?;

        match inserted {
            Some(id) => Ok(id),
            None => works::table
                .filter(works::series_id.eq(series_id))
                .filter(works::title.eq(title))
                .select(works::id)
                .first::<i64>(self.conn)
                .map_err(Error::from),
        }
    }

    //
    // Re-air detection (§4.4 step 3)
    //

    fn find_canonical_episode(
        &self,
        work_id: i64,
        entry: &DiscoveredEpisode,
    ) -> Result<Option<(i64, MatchReason)>> {
        if let Some(ext_id) = entry.ext_id.as_deref() {
            if let Some(id) = episodes::table
                .filter(episodes::work_id.eq(work_id))
                .filter(episodes::ext_id.eq(ext_id))
                .select(episodes::id)
                .first::<i64>(self.conn)
                .optional()?
            {
                return Ok(Some((id, MatchReason::ExtId)));
            }

            if let Some(id) = episode_aliases::table
                .filter(episode_aliases::ext_id.eq(ext_id))
                .select(episode_aliases::episode_id)
                .first::<i64>(self.conn)
                .optional()?
            {
                return Ok(Some((id, MatchReason::ExtId)));
            }
        }

        let normalized = dedupe::norm_url(&entry.url);
        if let Some(id) = episode_aliases::table
            .filter(episode_aliases::url.eq(&normalized))
            .select(episode_aliases::episode_id)
            .first::<i64>(self.conn)
            .optional()?
        {
            return Ok(Some((id, MatchReason::UrlExact)));
        }

        let stripped = dedupe::norm_url_strip_reair(&entry.url);
        let work_episode_urls: Vec<(i64, Option<String>)> = episodes::table
            .filter(episodes::work_id.eq(work_id))
            .select((episodes::id, episodes::url))
            .load(self.conn)?;

        for (id, url) in work_episode_urls {
            if let Some(url) = url {
                if dedupe::norm_url_strip_reair(&url) == stripped || dedupe::norm_url(&url) == normalized {
                    return Ok(Some((id, MatchReason::UrlReair)));
                }
            }
        }

        Ok(None)
    }

    fn append_alias(&self, episode_id: i64, entry: &DiscoveredEpisode) -> Result<()> {
        let normalized = dedupe::norm_url(&entry.url);

        diesel::insert_into(episode_aliases::table)
            .values(insertable::EpisodeAlias {
                episode_id,
                url: Some(normalized),
                ext_id: entry.ext_id.clone(),
                air_date: entry.published_at,
                discovery_source: entry.sources.iter().next().cloned(),
            })
            .on_conflict((episode_aliases::episode_id, episode_aliases::url))
            .do_nothing()
            .execute(self.conn)?;
        Ok(())
    }

    /// Promotes a `gone` episode back to `available` and re-queues any
    /// `error`/`watch` jobs for it (§4.4 step 4).
    fn reair_episode(&self, log: &Logger, episode_id: i64, entry: &DiscoveredEpisode) -> Result<()> {
        diesel::update(episodes::table.find(episode_id))
            .set((
                episodes::availability_status.eq(AvailabilityStatus::Available),
                episodes::url.eq(&entry.url),
                episodes::last_seen_at.eq(Utc::now()),
                episodes::updated_at.eq(Utc::now()),
            ))
            .execute(self.conn)?;

        let requeued = diesel::update(
            download_jobs::table
                .filter(download_jobs::episode_id.eq(episode_id))
                .filter(
                    download_jobs::status
                        .eq(JobStatus::Error)
                        .or(download_jobs::status.eq(JobStatus::Watch)),
                ),
        )
        .set((
            download_jobs::status.eq(JobStatus::Pending),
            download_jobs::error.eq(None::<String>),
        ))
        .execute(self.conn)?;

        info!(log, "Re-aired episode"; "episode_id" => episode_id, "requeued_jobs" => requeued);
        Ok(())
    }

    /// Fills empty fields from the richer discovery; never shrinks data
    /// (§4.4 step 4).
    fn fill_episode(&self, episode_id: i64, existing: &model::Episode, entry: &DiscoveredEpisode) -> Result<()> {
        let title = if existing.title.trim().is_empty() {
            entry.title.clone()
        } else {
            existing.title.clone()
        };
        let ext_id = existing.ext_id.clone().or_else(|| entry.ext_id.clone());
        let summary = existing.summary.clone().or_else(|| entry.description.clone());
        let published_at = existing.published_at.or(entry.published_at);
        let duration_ms = existing
            .duration_ms
            .or_else(|| entry.duration_s.map(|s| (s * 1000) as i32));
        let priority = existing.priority.max(entry.priority);

        diesel::update(episodes::table.find(episode_id))
            .set((
                episodes::title.eq(title),
                episodes::ext_id.eq(ext_id),
                episodes::summary.eq(summary),
                episodes::published_at.eq(published_at),
                episodes::duration_ms.eq(duration_ms),
                episodes::priority.eq(priority),
                episodes::updated_at.eq(Utc::now()),
            ))
            .execute(self.conn)?;
        Ok(())
    }

    /// Creates a brand-new episode for a discovery with no canonical match
    /// (§4.4 step 5).
    fn create_episode(&self, work_id: i64, entry: &DiscoveredEpisode) -> Result<i64> {
        let now = Utc::now();
        diesel::insert_into(episodes::table)
            .values(insertable::Episode {
                work_id,
                ext_id: entry.ext_id.clone(),
                title: entry.title.clone(),
                episode_number: None,
                published_at: entry.published_at,
                url: Some(entry.url.clone()),
                duration_ms: entry.duration_s.map(|s| (s * 1000) as i32),
                summary: entry.description.clone(),
                availability_status: AvailabilityStatus::Available,
                first_seen_at: Some(now),
                last_seen_at: Some(now),
                last_checked_at: None,
                priority: entry.priority,
                discovery_source: entry.sources.iter().next().cloned(),
            })
            .returning(episodes::id)
            .get_result(self.conn)
            .map_err(Error::from)
    }

    /// Plans required assets and their download jobs (§4.4 step 6, §3
    /// "Asset").
    fn plan_assets(&self, episode_id: i64) -> Result<()> {
        for asset_type in &model::REQUIRED_ASSET_TYPES {
            let existing: Option<(i64, AssetStatus)> = assets::table
                .filter(assets::episode_id.eq(episode_id))
                .filter(assets::asset_type.eq(*asset_type))
                .select((assets::id, assets::status))
                .first(self.conn)
                .optional()?;

            let status = match existing {
                Some((_, status)) => status,
                None => {
                    diesel::insert_into(assets::table)
                        .values(insertable::Asset {
                            episode_id,
                            asset_type: *asset_type,
                            status: AssetStatus::Missing,
                        })
                        .execute(self.conn)?;
                    AssetStatus::Missing
                }
            };

            let needs_job = matches!(
                status,
                AssetStatus::Missing | AssetStatus::Stale | AssetStatus::Failed
            );
            if needs_job {
                diesel::insert_into(download_jobs::table)
                    .values(insertable::DownloadJob {
                        episode_id,
                        asset_type: *asset_type,
                        status: JobStatus::Pending,
                        reason: None,
                    })
                    .execute(self.conn)?;
            }
        }
        Ok(())
    }
}

enum IngestOutcome {
    Created,
    Reaired,
    Filled,
}

/// Resolves an uploader string to a station code via case-insensitive
/// substring matching (§4.4 step 1).
fn resolve_station_code(uploader: Option<&str>) -> &'static str {
    let uploader = match uploader {
        Some(u) => u.to_lowercase(),
        None => return AGGREGATOR_STATION_CODE,
    };

    for (needle, code) in UPLOADER_STATION_MAP {
        if uploader.contains(needle) {
            return code;
        }
    }
    AGGREGATOR_STATION_CODE
}

/// Assigns monotonically decreasing priority to a fresh batch ordered by
/// `published_at` descending, so newer episodes are fetched first (§4.4
/// "Priority assignment").
fn assign_priorities(mut entries: Vec<DiscoveredEpisode>) -> Vec<DiscoveredEpisode> {
    entries.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    let n = entries.len() as i32;
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.priority = n - i as i32;
    }
    entries
}

#[cfg(test)]
mod tests {
    use mediators::ingest::*;
    use test_helpers;

    #[test]
    fn test_resolve_station_code_known_uploader() {
        assert_eq!("CRo3", resolve_station_code(Some("Vltava")));
        assert_eq!("CRo1", resolve_station_code(Some("Radiozurnal")));
        assert_eq!("AGGREGATOR", resolve_station_code(Some("Some Other Uploader")));
        assert_eq!("AGGREGATOR", resolve_station_code(None));
    }

    #[test]
    #[ignore]
    fn test_ingest_creates_new_episode() {
        let bootstrap = test_helpers::TestBootstrap::new();

        let entry = DiscoveredEpisode::from_source(
            "https://example.com/show/ep-1",
            "Episode One",
            "flat_playlist",
        );

        let mut mediator = Ingester {
            conn: &*bootstrap.conn,
            program_name: "Test Program".to_owned(),
            program_url: Some("https://example.com/show".to_owned()),
            entries: vec![entry],
        };

        let res = mediator.run(&bootstrap.log).unwrap();
        assert_eq!(1, res.num_created);
        assert_eq!(0, res.num_reaired);
    }
}
