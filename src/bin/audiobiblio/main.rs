extern crate audiobiblio;
extern crate clap;
extern crate ctrlc;
extern crate diesel;
#[macro_use]
extern crate diesel_migrations;
#[macro_use]
extern crate error_chain;
extern crate r2d2;
#[macro_use]
extern crate slog;
extern crate slog_async;
extern crate slog_term;

use audiobiblio::config::Config;
use audiobiblio::discovery::DiscoveredEpisode;
use audiobiblio::error_helpers;
use audiobiblio::errors::*;
use audiobiblio::http_client::HttpClientLive;
use audiobiblio::mediators::{download_executor, ingest, scheduler};
use audiobiblio::model::{insertable, CrawlTargetKind};
use audiobiblio::rate_limiter::RateLimiter;
use audiobiblio::{backends, discovery, health, tagger};

use clap::{App, Arg, ArgMatches, SubCommand};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::ConnectionManager;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness};
use r2d2::Pool;
use slog::Logger;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

/// Well-known Czech Radio stations seeded by `seed-stations` (§0.6). Station
/// name is just the code for stations that have no friendlier display name
/// on hand; operators can rename them later via direct SQL.
const WELL_KNOWN_STATIONS: &[(&str, &str)] = &[
    ("CRo1", "Radiozurnal"),
    ("CRo2", "Dvojka"),
    ("CRo3", "Vltava"),
    ("CRoPlus", "Plus"),
    ("CRoW", "Radio Wave"),
    ("CRoJun", "Junior"),
    ("AGGREGATOR", "Aggregator"),
];

fn main() {
    let mut app = App::new("audiobiblio")
        .version("0.1")
        .about("A Czech Radio catalog crawler and download orchestrator")
        .arg(Arg::with_name("quiet").short("q").long("quiet").help("Quiets all output"))
        .subcommand(SubCommand::with_name("init").about("Runs pending database migrations"))
        .subcommand(
            SubCommand::with_name("seed-stations")
                .about("Idempotently upserts the well-known Czech Radio stations"),
        )
        .subcommand(
            SubCommand::with_name("ingest-url")
                .about("Ingests a single known episode URL directly, bypassing discovery")
                .arg(Arg::with_name("URL").required(true))
                .arg(Arg::with_name("program").long("program").takes_value(true).required(true)),
        )
        .subcommand(
            SubCommand::with_name("ingest-program")
                .about("Runs the full discovery fan-out for a program URL and ingests the result")
                .arg(Arg::with_name("URL").required(true))
                .arg(
                    Arg::with_name("dry-run")
                        .long("dry-run")
                        .help("Discovers and dedupes but rolls back instead of committing"),
                ),
        )
        .subcommand(
            SubCommand::with_name("crawl-url")
                .about("Runs one immediate discovery+ingest cycle for a program URL, without registering it as a recurring target")
                .arg(Arg::with_name("URL").required(true)),
        )
        .subcommand(
            SubCommand::with_name("target-add")
                .about("Registers a URL as a recurring crawl target")
                .arg(Arg::with_name("URL").required(true))
                .arg(
                    Arg::with_name("kind")
                        .long("kind")
                        .takes_value(true)
                        .possible_values(&["station", "program", "series"])
                        .default_value("program"),
                )
                .arg(Arg::with_name("name").long("name").takes_value(true))
                .arg(
                    Arg::with_name("interval-hours")
                        .long("interval-hours")
                        .takes_value(true)
                        .default_value("24"),
                ),
        )
        .subcommand(SubCommand::with_name("target-list").about("Lists all crawl targets"))
        .subcommand(
            SubCommand::with_name("target-toggle")
                .about("Flips a crawl target's active flag")
                .arg(Arg::with_name("ID").required(true)),
        )
        .subcommand(
            SubCommand::with_name("run-jobs")
                .about("Claims and runs one batch of pending download jobs")
                .arg(Arg::with_name("limit").long("limit").takes_value(true)),
        )
        .subcommand(SubCommand::with_name("scheduler").about("Runs the periodic crawl/download/availability scheduler"))
        .subcommand(
            SubCommand::with_name("serve")
                .about("Starts the HTTP/SSE control plane (out of scope; logs and exits)"),
        );

    let matches = app.clone().get_matches();
    let quiet = matches.is_present("quiet");
    let log = log(quiet);

    let res = match matches.subcommand_name() {
        Some("init") => subcommand_init(&log, &matches),
        Some("seed-stations") => subcommand_seed_stations(&log, &matches),
        Some("ingest-url") => subcommand_ingest_url(&log, &matches),
        Some("ingest-program") => subcommand_ingest_program(&log, &matches),
        Some("crawl-url") => subcommand_crawl_url(&log, &matches),
        Some("target-add") => subcommand_target_add(&log, &matches),
        Some("target-list") => subcommand_target_list(&log, &matches),
        Some("target-toggle") => subcommand_target_toggle(&log, &matches),
        Some("run-jobs") => subcommand_run_jobs(&log, &matches),
        Some("scheduler") => subcommand_scheduler(&log, &matches),
        Some("serve") => subcommand_serve(&log, &matches),
        None => {
            app.print_help().unwrap();
            Ok(())
        }
        _ => unreachable!(),
    };

    if let Err(ref e) = res {
        handle_error(&log, e);
    }
}

//
// Subcommands
//

fn subcommand_init(log: &Logger, _matches: &ArgMatches) -> Result<()> {
    let pool = pool(log)?;
    let mut conn = pool.get()?;

    info!(log, "Running migrations");
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| Error::from(format!("error running migrations: {}", e)))?;
    info!(log, "Finished migrations");
    Ok(())
}

fn subcommand_seed_stations(log: &Logger, _matches: &ArgMatches) -> Result<()> {
    use audiobiblio::schema::stations;

    let pool = pool(log)?;
    let conn = pool.get()?;

    let mut num_seeded = 0;
    for (code, name) in WELL_KNOWN_STATIONS {
        diesel::insert_into(stations::table)
            .values(insertable::Station {
                code: (*code).to_owned(),
                name: (*name).to_owned(),
                website: None,
            })
            .on_conflict(stations::code)
            .do_update()
            .set(stations::name.eq(*name))
            .execute(&*conn)?;
        num_seeded += 1;
    }

    info!(log, "Seeded well-known stations"; "num_seeded" => num_seeded);
    Ok(())
}

fn subcommand_ingest_url(log: &Logger, matches: &ArgMatches) -> Result<()> {
    let matches = matches.subcommand_matches("ingest-url").unwrap();
    let url = matches.value_of("URL").unwrap();
    let program = matches.value_of("program").unwrap();

    let pool = pool(log)?;
    let conn = pool.get()?;

    let entry = DiscoveredEpisode::from_source(url, url, "manual");
    let mut mediator = ingest::Ingester {
        conn: &*conn,
        program_name: program.to_owned(),
        program_url: None,
        entries: vec![entry],
    };
    let res = mediator.run(log)?;
    info!(log, "Ingest finished";
        "num_created" => res.num_created, "num_reaired" => res.num_reaired, "num_filled" => res.num_filled);
    Ok(())
}

fn subcommand_ingest_program(log: &Logger, matches: &ArgMatches) -> Result<()> {
    let matches = matches.subcommand_matches("ingest-program").unwrap();
    let url = matches.value_of("URL").unwrap();
    let dry_run = matches.is_present("dry-run");

    let pool = pool(log)?;
    let conn = pool.get()?;

    let client = Arc::new(HttpClientLive::new(std::time::Duration::from_secs(30))?);
    let limiter = Arc::new(RateLimiter::new(0.5, 2));
    let entries = discovery::discover_program(log, client, limiter, url);
    info!(log, "Discovery finished"; "num_entries" => entries.len());

    if dry_run {
        info!(log, "Dry run -- not committing"; "num_entries" => entries.len());
        return Ok(());
    }

    let mut mediator = ingest::Ingester {
        conn: &*conn,
        program_name: url.to_owned(),
        program_url: Some(url.to_owned()),
        entries,
    };
    let res = mediator.run(log)?;
    info!(log, "Ingest finished";
        "num_created" => res.num_created, "num_reaired" => res.num_reaired, "num_filled" => res.num_filled);
    Ok(())
}

fn subcommand_crawl_url(log: &Logger, matches: &ArgMatches) -> Result<()> {
    let matches = matches.subcommand_matches("crawl-url").unwrap();
    let url = matches.value_of("URL").unwrap();

    let pool = pool(log)?;
    let conn = pool.get()?;

    let client = Arc::new(HttpClientLive::new(std::time::Duration::from_secs(30))?);
    let limiter = Arc::new(RateLimiter::new(0.5, 2));
    let entries = discovery::discover_program(log, client, limiter, url);

    let mut mediator = ingest::Ingester {
        conn: &*conn,
        program_name: url.to_owned(),
        program_url: Some(url.to_owned()),
        entries,
    };
    let res = mediator.run(log)?;
    info!(log, "Crawl finished";
        "num_created" => res.num_created, "num_reaired" => res.num_reaired, "num_filled" => res.num_filled);
    Ok(())
}

fn subcommand_target_add(log: &Logger, matches: &ArgMatches) -> Result<()> {
    use audiobiblio::schema::crawl_targets;

    let matches = matches.subcommand_matches("target-add").unwrap();
    let url = matches.value_of("URL").unwrap();
    let kind: CrawlTargetKind = matches.value_of("kind").unwrap().parse().map_err(Error::from)?;
    let name = matches.value_of("name").map(|s| s.to_owned());
    let interval_hours = matches
        .value_of("interval-hours")
        .unwrap()
        .parse::<i32>()
        .chain_err(|| "invalid --interval-hours")?;

    let pool = pool(log)?;
    let conn = pool.get()?;

    let inserted: Option<i64> = diesel::insert_into(crawl_targets::table)
        .values(insertable::CrawlTarget {
            url: url.to_owned(),
            kind,
            name,
            active: true,
            interval_hours,
        })
        .on_conflict(crawl_targets::url)
        .do_nothing()
        .returning(crawl_targets::id)
        .get_result(&*conn)
        .optional()?;

    match inserted {
        Some(id) => {
            info!(log, "Added crawl target"; "id" => id, "url" => url);
        }
        None => {
            let id: i64 = crawl_targets::table
                .filter(crawl_targets::url.eq(url))
                .select(crawl_targets::id)
                .first(&*conn)?;
            info!(log, "Crawl target already registered"; "id" => id, "url" => url);
        }
    }
    Ok(())
}

fn subcommand_target_list(log: &Logger, _matches: &ArgMatches) -> Result<()> {
    use audiobiblio::schema::crawl_targets;

    let pool = pool(log)?;
    let conn = pool.get()?;

    let rows: Vec<(i64, String, CrawlTargetKind, bool, i32)> = crawl_targets::table
        .select((
            crawl_targets::id,
            crawl_targets::url,
            crawl_targets::kind,
            crawl_targets::active,
            crawl_targets::interval_hours,
        ))
        .order(crawl_targets::id.asc())
        .load(&*conn)?;

    for (id, url, kind, active, interval_hours) in rows {
        println!(
            "{:>5}  {:<8}  {:<5}  every {:>3}h  {}",
            id,
            kind,
            if active { "on" } else { "off" },
            interval_hours,
            url
        );
    }
    Ok(())
}

fn subcommand_target_toggle(log: &Logger, matches: &ArgMatches) -> Result<()> {
    use audiobiblio::schema::crawl_targets;

    let matches = matches.subcommand_matches("target-toggle").unwrap();
    let id = matches
        .value_of("ID")
        .unwrap()
        .parse::<i64>()
        .chain_err(|| "invalid target ID")?;

    let pool = pool(log)?;
    let conn = pool.get()?;

    let active: bool = crawl_targets::table
        .find(id)
        .select(crawl_targets::active)
        .first(&*conn)?;

    diesel::update(crawl_targets::table.find(id))
        .set(crawl_targets::active.eq(!active))
        .execute(&*conn)?;

    info!(log, "Toggled crawl target"; "id" => id, "active" => !active);
    Ok(())
}

fn subcommand_run_jobs(log: &Logger, matches: &ArgMatches) -> Result<()> {
    let matches = matches.subcommand_matches("run-jobs").unwrap();
    let limit = matches
        .value_of("limit")
        .map(|s| s.parse::<i64>().unwrap())
        .unwrap_or(10);

    let config = Config::load()?;
    let pool = pool(log)?;
    let conn = pool.get()?;

    let mut executor = download_executor::DownloadExecutor {
        conn: &*conn,
        limit,
        download_dir: config.download_dir.clone().into(),
        primary_host: "mujrozhlas.cz".to_owned(),
        alternate_host: "rozhlas.cz".to_owned(),
        extractor_backend: Arc::new(backends::extractor::ExtractorBackend::new()),
        link_grabber_backend: link_grabber_backend(&config)?,
        tagger: Arc::new(tagger::NoOpTagger),
        library_manager: library_manager(&config)?,
    };
    let res = executor.run(log)?;
    info!(log, "Run-jobs finished";
        "num_claimed" => res.num_claimed, "num_succeeded" => res.num_succeeded,
        "num_errored" => res.num_errored, "num_watched" => res.num_watched);
    Ok(())
}

fn subcommand_scheduler(log: &Logger, _matches: &ArgMatches) -> Result<()> {
    let config = Config::load()?;
    let pool = pool(log)?;

    health::spawn(log, &config.web_host, config.web_port);

    let shutdown = Arc::new(AtomicBool::new(false));
    let ctrlc_shutdown = shutdown.clone();
    let ctrlc_log = log.clone();
    ctrlc::set_handler(move || {
        info!(ctrlc_log, "Received interrupt -- shutting down");
        ctrlc_shutdown.store(true, Ordering::SeqCst);
    })
    .chain_err(|| "error installing signal handler")?;

    let mediator = scheduler::Scheduler {
        pool,
        crawl_interval_minutes: config.crawl_interval_minutes,
        download_interval_minutes: config.download_interval_minutes,
        availability_interval_hours: config.availability_interval_hours,
        download_limit: i64::from(config.num_workers),
        availability_batch_size: 50,
    };
    mediator.run(log, shutdown)
}

fn subcommand_serve(log: &Logger, _matches: &ArgMatches) -> Result<()> {
    info!(log, "The HTTP/SSE control plane is an out-of-scope external collaborator; nothing to serve here");
    Ok(())
}

//
// Private types/functions
//

fn handle_error(log: &Logger, e: &Error) {
    error_helpers::print_error(log, e);
    std::process::exit(1);
}

fn log(quiet: bool) -> Logger {
    use slog::Drain;

    if quiet {
        slog::Logger::root(slog::Discard, o!())
    } else {
        let decorator = slog_term::PlainSyncDecorator::new(std::io::stdout());
        let drain = slog_term::CompactFormat::new(decorator).build().fuse();
        let async_drain = slog_async::Async::new(drain).build().fuse();
        slog::Logger::root(async_drain, o!())
    }
}

fn pool(log: &Logger) -> Result<Pool<ConnectionManager<PgConnection>>> {
    let config = Config::load()?;
    debug!(log, "Initializing connection pool"; "num_connections" => config.num_connections);

    let manager = ConnectionManager::<PgConnection>::new(&config.db_url);
    Pool::builder()
        .max_size(config.num_connections)
        .min_idle(Some(0))
        .build(manager)
        .map_err(Error::from)
}

fn link_grabber_backend(config: &Config) -> Result<Option<Arc<dyn backends::DownloadBackend>>> {
    match (&config.link_grabber_host, config.link_grabber_port) {
        (Some(host), Some(port)) => {
            let backend = backends::link_grabber::LinkGrabberBackend::new(host, port)?;
            Ok(Some(Arc::new(backend)))
        }
        _ => Ok(None),
    }
}

fn library_manager(
    config: &Config,
) -> Result<Option<Arc<audiobiblio::library_manager::LibraryManagerClient>>> {
    match (&config.library_manager_url, &config.library_manager_api_key) {
        (Some(url), Some(key)) => {
            let client = audiobiblio::library_manager::LibraryManagerClient::new(url, key)?;
            Ok(Some(Arc::new(client)))
        }
        _ => Ok(None),
    }
}
