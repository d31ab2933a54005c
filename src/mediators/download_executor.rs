//! Download executor (C6, §4.6), grounded on the ancestor's
//! `job_worker.rs` batch-claim-then-dispatch shape, replacing its
//! named-job dispatch table with asset-type/host-based backend selection
//! and the tagger/library-manager post-processing pipeline.

use backends::DownloadBackend;
use errors::*;
use library_manager::LibraryManagerClient;
use mediators::common;
use model::{self, AssetStatus, JobStatus};
use paths::{build_paths_for_episode, LibraryPathInput};
use schema::{assets, download_jobs, episodes, programs, series, stations, works};
use tagger::{TagContext, Tagger};

use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::BigInt;
use sha2::{Digest, Sha256};
use slog::Logger;
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

pub struct DownloadExecutor<'a> {
    pub conn: &'a PgConnection,
    pub limit: i64,
    pub download_dir: PathBuf,
    /// Host routed to `extractor_backend` (mujrozhlas.cz, per §4.2 host
    /// normalization -- nearly every discovered URL ends up here).
    pub primary_host: String,
    /// Host routed to `link_grabber_backend`, falling back to
    /// `extractor_backend` if none is configured.
    pub alternate_host: String,
    pub extractor_backend: Arc<dyn DownloadBackend>,
    pub link_grabber_backend: Option<Arc<dyn DownloadBackend>>,
    pub tagger: Arc<dyn Tagger>,
    pub library_manager: Option<Arc<LibraryManagerClient>>,
}

pub struct RunResult {
    pub num_claimed: i64,
    pub num_succeeded: i64,
    pub num_errored: i64,
    pub num_watched: i64,
}

/// Context loaded for one claimed job, joined across the relational
/// hierarchy down to the episode it belongs to.
struct JobContext {
    job_id: i64,
    episode_id: i64,
    asset_id: i64,
    asset_type: model::AssetType,
    url: String,
    program: String,
    station_code: String,
    author: Option<String>,
    year: Option<i32>,
    album: String,
    title: String,
    episode_number: Option<i32>,
}

impl<'a> DownloadExecutor<'a> {
    pub fn run(&mut self, log: &Logger) -> Result<RunResult> {
        common::log_timed(&log.new(o!("step" => file!())), |log| self.run_inner(log))
    }

    fn run_inner(&mut self, log: &Logger) -> Result<RunResult> {
        let mut res = RunResult {
            num_claimed: 0,
            num_succeeded: 0,
            num_errored: 0,
            num_watched: 0,
        };

        let jobs = self.claim_next_jobs(log)?;
        res.num_claimed = jobs.len() as i64;

        for job_id in jobs {
            match self.process_job(log, job_id) {
                Ok(JobOutcome::Success) => res.num_succeeded += 1,
                Ok(JobOutcome::Watch) => res.num_watched += 1,
                Ok(JobOutcome::Error) | Err(_) => res.num_errored += 1,
            }
        }

        info!(log, "Download executor cycle finished";
            "num_claimed" => res.num_claimed, "num_succeeded" => res.num_succeeded,
            "num_errored" => res.num_errored, "num_watched" => res.num_watched);
        Ok(res)
    }

    /// Atomically claims up to `limit` pending jobs ordered by
    /// `episode.priority DESC, job.id ASC` (§4.6 "Ordering"). Diesel's
    /// query DSL has no `FOR UPDATE SKIP LOCKED`, so this drops to
    /// `sql_query` the same way the ancestor's mediators do for subselects
    /// they can't express.
    fn claim_next_jobs(&self, log: &Logger) -> Result<Vec<i64>> {
        common::log_timed(&log.new(o!("step" => "claim_next_jobs")), |_log| {
            #[derive(QueryableByName)]
            struct ClaimedId {
                #[diesel(sql_type = BigInt)]
                id: i64,
            }

            let claimed: Vec<ClaimedId> = diesel::sql_query(
                "
                UPDATE download_jobs
                SET status = 'running', started_at = now()
                WHERE id IN (
                    SELECT dj.id
                    FROM download_jobs dj
                    JOIN episodes e ON e.id = dj.episode_id
                    WHERE dj.status = 'pending'
                    ORDER BY e.priority DESC, dj.id ASC
                    LIMIT $1
                    FOR UPDATE OF dj SKIP LOCKED
                )
                RETURNING download_jobs.id",
            )
            .bind::<BigInt, _>(self.limit)
            .load(self.conn)?;

            Ok(claimed.into_iter().map(|c| c.id).collect())
        })
    }

    fn process_job(&self, log: &Logger, job_id: i64) -> Result<JobOutcome> {
        let ctx = self.load_context(job_id)?;
        let log = log.new(o!("job_id" => job_id, "episode_id" => ctx.episode_id));

        match self.execute(&log, &ctx) {
            Ok(final_path) => {
                self.finish_success(&ctx, &final_path)?;
                self.notify_library_manager(&log);
                Ok(JobOutcome::Success)
            }
            Err(DownloadFailure::Watch(reason)) => {
                self.finish_watch(&ctx, &reason)?;
                Ok(JobOutcome::Watch)
            }
            Err(DownloadFailure::Hard(e)) => {
                self.finish_error(&ctx, &e.to_string())?;
                error!(log, "Download job failed"; "error" => e.to_string());
                Ok(JobOutcome::Error)
            }
        }
    }

    fn load_context(&self, job_id: i64) -> Result<JobContext> {
        let (episode_id, asset_type): (i64, model::AssetType) = download_jobs::table
            .find(job_id)
            .select((download_jobs::episode_id, download_jobs::asset_type))
            .first(self.conn)?;

        let episode: model::Episode = episodes::table.find(episode_id).first(self.conn)?;
        let url = episode
            .url
            .clone()
            .ok_or_else(|| Error::from("episode has no url to download from"))?;

        let work: model::Work = works::table.find(episode.work_id).first(self.conn)?;
        let series: model::Series = series::table.find(work.series_id).first(self.conn)?;
        let program: model::Program = programs::table.find(series.program_id).first(self.conn)?;
        let station: model::Station = stations::table.find(program.station_id).first(self.conn)?;

        let (asset_id,): (i64,) = assets::table
            .filter(assets::episode_id.eq(episode_id))
            .filter(assets::asset_type.eq(asset_type))
            .select((assets::id,))
            .first(self.conn)?;

        Ok(JobContext {
            job_id,
            episode_id,
            asset_id,
            asset_type,
            url,
            program: program.name,
            station_code: station.code,
            author: work.author,
            year: work.year,
            album: work.title,
            title: episode.title,
            episode_number: episode.episode_number,
        })
    }

    /// Selects a backend by URL host, invokes it, tags/moves the result,
    /// and returns the final path (§4.6 steps 1-4).
    fn execute(&self, log: &Logger, ctx: &JobContext) -> std::result::Result<PathBuf, DownloadFailure> {
        let backend = self.select_backend(&ctx.url)?;

        let job_dir = self.download_dir.join(format!("episode-{}", ctx.episode_id));
        let outcome = backend
            .download(log, &ctx.url, &job_dir)
            .map_err(|e| classify_backend_error(e))?;

        let ext = outcome
            .file_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp3")
            .to_owned();

        let input = LibraryPathInput {
            program: &ctx.program,
            station_code: &ctx.station_code,
            author: ctx.author.as_deref().unwrap_or(""),
            year: ctx.year,
            album: &ctx.album,
            title: &ctx.title,
            episode_number: ctx.episode_number,
            ext: &ext,
        };
        let suggested_relative_path = build_paths_for_episode(&input);

        let tag_ctx = TagContext {
            program: ctx.program.clone(),
            station_code: ctx.station_code.clone(),
            author: ctx.author.clone(),
            year: ctx.year,
            album: Some(ctx.album.clone()),
            title: ctx.title.clone(),
            episode_number: ctx.episode_number,
            suggested_relative_path,
        };

        self.tagger
            .tag_and_place(&tag_ctx, &outcome.file_path)
            .map_err(DownloadFailure::Hard)
    }

    fn select_backend(&self, url: &str) -> std::result::Result<Arc<dyn DownloadBackend>, DownloadFailure> {
        let host = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_owned))
            .unwrap_or_default();

        if host.ends_with(&self.primary_host) {
            return Ok(self.extractor_backend.clone());
        }
        if let Some(backend) = &self.link_grabber_backend {
            return Ok(backend.clone());
        }
        Ok(self.extractor_backend.clone())
    }

    fn finish_success(&self, ctx: &JobContext, final_path: &PathBuf) -> Result<()> {
        let size_bytes = std::fs::metadata(final_path).map(|m| m.len() as i64).unwrap_or(0);
        let checksum = sha256_file(final_path).ok();

        diesel::update(assets::table.find(ctx.asset_id))
            .set((
                assets::status.eq(AssetStatus::Complete),
                assets::file_path.eq(final_path.to_string_lossy().into_owned()),
                assets::size_bytes.eq(size_bytes),
                assets::checksum.eq(checksum),
                assets::updated_at.eq(Utc::now()),
            ))
            .execute(self.conn)?;

        diesel::update(download_jobs::table.find(ctx.job_id))
            .set((
                download_jobs::status.eq(JobStatus::Success),
                download_jobs::finished_at.eq(Utc::now()),
            ))
            .execute(self.conn)?;
        Ok(())
    }

    fn finish_watch(&self, ctx: &JobContext, reason: &str) -> Result<()> {
        diesel::update(download_jobs::table.find(ctx.job_id))
            .set((
                download_jobs::status.eq(JobStatus::Watch),
                download_jobs::error.eq(Some(reason.to_owned())),
                download_jobs::finished_at.eq(Utc::now()),
            ))
            .execute(self.conn)?;
        Ok(())
    }

    /// Post-processing failures fail the job but mark the asset `failed`,
    /// not `complete`, preserving the downloaded file (§4.6 "Error
    /// classification").
    fn finish_error(&self, ctx: &JobContext, error: &str) -> Result<()> {
        diesel::update(assets::table.find(ctx.asset_id))
            .set((assets::status.eq(AssetStatus::Failed), assets::updated_at.eq(Utc::now())))
            .execute(self.conn)?;

        diesel::update(download_jobs::table.find(ctx.job_id))
            .set((
                download_jobs::status.eq(JobStatus::Error),
                download_jobs::error.eq(Some(error.to_owned())),
                download_jobs::finished_at.eq(Utc::now()),
            ))
            .execute(self.conn)?;
        Ok(())
    }

    fn notify_library_manager(&self, log: &Logger) {
        if let Some(manager) = &self.library_manager {
            if let Err(e) = manager.trigger_library_scan(log, None) {
                warn!(log, "Library manager notify failed"; "error" => e.to_string());
            }
        }
    }
}

enum JobOutcome {
    Success,
    Watch,
    Error,
}

enum DownloadFailure {
    Watch(String),
    Hard(Error),
}

impl From<Error> for DownloadFailure {
    fn from(e: Error) -> DownloadFailure {
        DownloadFailure::Hard(e)
    }
}

fn sha256_file(path: &PathBuf) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Upstream 404/410 and "media not available" failures route a job to
/// `watch` rather than `error` (§4.6 "Error classification").
fn classify_backend_error(e: Error) -> DownloadFailure {
    let msg = e.to_string();
    if msg.contains("404") || msg.contains("410") || msg.to_lowercase().contains("not available") {
        DownloadFailure::Watch(msg)
    } else {
        DownloadFailure::Hard(e)
    }
}
