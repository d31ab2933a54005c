//! Scheduler (C7, §4.7). The ancestor codebase has no direct analog for a
//! periodic-tick loop (its closest relative, `podcore-serve`'s webserver
//! main loop, was dropped along with the rest of the web stack), so this is
//! built fresh in the ancestor's idiom: `slog` child loggers per thread,
//! `common::log_timed` wrapping each tick, one thread per periodic task
//! guarded by an `AtomicBool` against overlap (§4.7 "max_instances = 1"),
//! and `ctrlc` wired to a shared shutdown flag for the "immediate,
//! non-waiting stop" (§4.7 "Shutdown signals").

use diesel::pg::PgConnection;
use diesel::prelude::*;
use errors::*;
use mediators::common;
use mediators::{availability_prober, download_executor, ingest, reaper};
use model::CrawlTargetKind;
use schema::crawl_targets;

use chrono::{Duration, Utc};
use diesel::r2d2::ConnectionManager;
use r2d2::Pool;
use slog::Logger;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration as StdDuration;

pub struct Scheduler {
    pub pool: Pool<ConnectionManager<PgConnection>>,
    pub crawl_interval_minutes: i64,
    pub download_interval_minutes: i64,
    pub availability_interval_hours: i64,
    pub download_limit: i64,
    pub availability_batch_size: i64,
}

/// Shared state a running task checks before and after its work to enforce
/// the single-instance guard.
#[derive(Clone, Default)]
struct TaskGuards {
    crawl_running: Arc<AtomicBool>,
    download_running: Arc<AtomicBool>,
    availability_running: Arc<AtomicBool>,
}

impl Scheduler {
    /// Runs forever until `shutdown` is set, ticking each periodic task at
    /// its own cadence. An initial run of crawl and download is performed
    /// once at startup (§4.7).
    pub fn run(&self, log: &Logger, shutdown: Arc<AtomicBool>) -> Result<()> {
        let guards = TaskGuards::default();

        self.run_reaper_once(log)?;
        self.run_crawl_tick(log, &guards);
        self.run_download_tick(log, &guards);

        let crawl_every = StdDuration::from_secs((self.crawl_interval_minutes * 60) as u64);
        let download_every = StdDuration::from_secs((self.download_interval_minutes * 60) as u64);
        let availability_every = StdDuration::from_secs((self.availability_interval_hours * 3600) as u64);

        let mut last_crawl = std::time::Instant::now();
        let mut last_download = std::time::Instant::now();
        let mut last_availability = std::time::Instant::now();

        while !shutdown.load(Ordering::SeqCst) {
            if last_crawl.elapsed() >= crawl_every {
                self.run_crawl_tick(log, &guards);
                last_crawl = std::time::Instant::now();
            }
            if last_download.elapsed() >= download_every {
                self.run_download_tick(log, &guards);
                last_download = std::time::Instant::now();
            }
            if last_availability.elapsed() >= availability_every {
                self.run_availability_tick(log, &guards);
                last_availability = std::time::Instant::now();
            }
            thread::sleep(StdDuration::from_secs(1));
        }

        info!(log, "Scheduler received shutdown signal -- stopping immediately");
        Ok(())
    }

    fn run_reaper_once(&self, log: &Logger) -> Result<()> {
        let conn = self.pool.get()?;
        reaper::Reaper { conn: &*conn }.run(log)?;
        Ok(())
    }

    fn run_crawl_tick(&self, log: &Logger, guards: &TaskGuards) {
        if guards.crawl_running.swap(true, Ordering::SeqCst) {
            debug!(log, "Crawl tick already running -- skipping");
            return;
        }

        let log = log.new(o!("tick" => "crawl"));
        let pool = self.pool.clone();
        let flag = guards.crawl_running.clone();
        thread::spawn(move || {
            let result = common::log_timed(&log, |log| run_crawl_tick_inner(log, &pool));
            if let Err(e) = result {
                error!(log, "Crawl tick failed"; "error" => e.to_string());
            }
            flag.store(false, Ordering::SeqCst);
        });
    }

    fn run_download_tick(&self, log: &Logger, guards: &TaskGuards) {
        if guards.download_running.swap(true, Ordering::SeqCst) {
            debug!(log, "Download tick already running -- skipping");
            return;
        }

        let log = log.new(o!("tick" => "download"));
        let pool = self.pool.clone();
        let flag = guards.download_running.clone();
        let limit = self.download_limit;
        thread::spawn(move || {
            let result = common::log_timed(&log, |log| run_download_tick_inner(log, &pool, limit));
            if let Err(e) = result {
                error!(log, "Download tick failed"; "error" => e.to_string());
            }
            flag.store(false, Ordering::SeqCst);
        });
    }

    fn run_availability_tick(&self, log: &Logger, guards: &TaskGuards) {
        if guards.availability_running.swap(true, Ordering::SeqCst) {
            debug!(log, "Availability tick already running -- skipping");
            return;
        }

        let log = log.new(o!("tick" => "availability"));
        let pool = self.pool.clone();
        let flag = guards.availability_running.clone();
        let batch_size = self.availability_batch_size;
        thread::spawn(move || {
            let result =
                common::log_timed(&log, |log| run_availability_tick_inner(log, &pool, batch_size));
            if let Err(e) = result {
                error!(log, "Availability tick failed"; "error" => e.to_string());
            }
            flag.store(false, Ordering::SeqCst);
        });
    }
}

fn run_crawl_tick_inner(log: &Logger, pool: &Pool<ConnectionManager<PgConnection>>) -> Result<()> {
    let conn = pool.get()?;
    let now = Utc::now();

    let due: Vec<(i64, String, CrawlTargetKind, i32)> = crawl_targets::table
        .filter(crawl_targets::active.eq(true))
        .filter(
            crawl_targets::next_crawl_at
                .le(now)
                .or(crawl_targets::next_crawl_at.is_null()),
        )
        .select((
            crawl_targets::id,
            crawl_targets::url,
            crawl_targets::kind,
            crawl_targets::interval_hours,
        ))
        .load(&*conn)?;

    for (target_id, url, kind, interval_hours) in due {
        if kind != CrawlTargetKind::Program {
            debug!(log, "Skipping non-program crawl target for now"; "target_id" => target_id);
            continue;
        }

        match crawl_one_program(log, &*conn, &url) {
            Ok(_) => {}
            Err(e) => error!(log, "Crawl target failed"; "target_id" => target_id, "error" => e.to_string()),
        }

        diesel::update(crawl_targets::table.find(target_id))
            .set((
                crawl_targets::last_crawled_at.eq(now),
                crawl_targets::next_crawl_at.eq(now + Duration::hours(interval_hours as i64)),
            ))
            .execute(&*conn)?;
    }

    Ok(())
}

fn crawl_one_program(log: &Logger, conn: &PgConnection, program_url: &str) -> Result<()> {
    use discovery;
    use http_client::HttpClientLive;
    use rate_limiter::RateLimiter;
    use std::time::Duration as StdDuration;

    let client = Arc::new(HttpClientLive::new(StdDuration::from_secs(30))?);
    let limiter = Arc::new(RateLimiter::new(0.5, 2));

    let discovered = discovery::discover_program(log, client, limiter, program_url);

    let mut ingester = ingest::Ingester {
        conn,
        program_name: program_url.to_owned(),
        program_url: Some(program_url.to_owned()),
        entries: discovered,
    };
    ingester.run(log)?;
    Ok(())
}

fn run_download_tick_inner(
    log: &Logger,
    pool: &Pool<ConnectionManager<PgConnection>>,
    limit: i64,
) -> Result<()> {
    use backends::extractor::ExtractorBackend;
    use tagger::NoOpTagger;

    let conn = pool.get()?;
    let mut executor = download_executor::DownloadExecutor {
        conn: &*conn,
        limit,
        download_dir: std::env::temp_dir(),
        primary_host: "mujrozhlas.cz".to_owned(),
        alternate_host: "rozhlas.cz".to_owned(),
        extractor_backend: Arc::new(ExtractorBackend::new()),
        link_grabber_backend: None,
        tagger: Arc::new(NoOpTagger),
        library_manager: None,
    };
    executor.run(log)?;
    Ok(())
}

fn run_availability_tick_inner(
    log: &Logger,
    pool: &Pool<ConnectionManager<PgConnection>>,
    batch_size: i64,
) -> Result<()> {
    use http_client::HttpClientLive;
    use std::time::Duration as StdDuration;

    let conn = pool.get()?;
    let client = Arc::new(HttpClientLive::new(StdDuration::from_secs(15))?);
    let mut prober = availability_prober::AvailabilityProber {
        conn: &*conn,
        client,
        batch_size,
    };
    prober.run(log)?;
    Ok(())
}
