//! Test-only helpers: a pooled connection to a scratch database wrapped in
//! a test transaction, a synchronous logger, and a small bootstrap struct
//! mediator tests reach for. Grounded on the ancestor's `test_helpers.rs`.

use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::ConnectionManager;
use r2d2::Pool;
use slog::{Drain, Logger};
use std::env;

/// Connections a test pool is built with; mediators that spin up a worker
/// per connection size their pool to this so tests can saturate it.
pub const NUM_CONNECTIONS: u32 = 5;

pub fn connection() -> PgConnection {
    let database_url =
        env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set in order to run tests");
    let conn = PgConnection::establish(&database_url).unwrap();
    conn.begin_test_transaction().unwrap();
    conn
}

pub fn pool() -> Pool<ConnectionManager<PgConnection>> {
    let database_url =
        env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set in order to run tests");
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder()
        .max_size(NUM_CONNECTIONS)
        .build(manager)
        .expect("failed to build test connection pool")
}

/// An async drain, matching the ancestor's logger for interactive runs.
pub fn log() -> Logger {
    let decorator = slog_term::PlainSyncDecorator::new(std::io::stdout());
    let drain = slog_term::CompactFormat::new(decorator).build().fuse();
    let async_drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(async_drain, o!("env" => "test"))
}

/// A synchronous drain -- tests that assert on log output, or that would
/// otherwise race an async drain's background thread against process exit,
/// use this instead of `log()`.
pub fn log_sync() -> Logger {
    let decorator = slog_term::PlainSyncDecorator::new(std::io::stdout());
    let drain = slog_term::CompactFormat::new(decorator).build().fuse();
    Logger::root(std::sync::Mutex::new(drain).fuse(), o!("env" => "test"))
}

/// Deletes all rows from every table, in child-to-parent order, so a
/// pooled-connection test (which can't rely on `begin_test_transaction`
/// across multiple connections) starts clean.
pub fn clean_database(log: &Logger, conn: &PgConnection) {
    use diesel::RunQueryDsl;

    let tables = [
        "availability_log",
        "download_jobs",
        "assets",
        "episode_aliases",
        "episodes",
        "works",
        "series",
        "programs",
        "stations",
        "crawl_targets",
    ];
    for table in &tables {
        if let Err(e) = diesel::sql_query(format!("DELETE FROM {}", table)).execute(conn) {
            error!(log, "Failed to clean table"; "table" => *table, "error" => e.to_string());
        }
    }
}

/// A pooled connection plus a sync logger, with automatic database cleanup
/// on drop -- the common shape every mediator test bootstraps from.
pub struct TestBootstrap {
    pub pool: Pool<ConnectionManager<PgConnection>>,
    pub conn: r2d2::PooledConnection<ConnectionManager<PgConnection>>,
    pub log: Logger,
}

impl TestBootstrap {
    pub fn new() -> TestBootstrap {
        let pool = pool();
        let conn = pool.get().expect("failed to get pooled test connection");
        TestBootstrap {
            pool,
            conn,
            log: log_sync(),
        }
    }
}

impl Drop for TestBootstrap {
    fn drop(&mut self) {
        clean_database(&self.log, &self.conn);
    }
}
