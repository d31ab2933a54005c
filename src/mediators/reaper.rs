//! Crash-recovery reaper, grounded on the ancestor's `cleaner.rs` shape: a
//! single-purpose mediator that runs a bounded batch cleanup and reports
//! how much it touched.
//!
//! In-flight jobs that vanish because their executor process was killed
//! are promoted from `running` back to `pending` after a grace window
//! (§5 "Failure isolation"). Run once at startup before the scheduler's
//! first download tick.

use errors::*;
use mediators::common;
use model::JobStatus;
use schema::download_jobs;

use chrono::{Duration, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use slog::Logger;

/// Jobs left `running` longer than this with no executor to show for it
/// are assumed orphaned.
const GRACE_WINDOW_MINUTES: i64 = 10;

pub struct Reaper<'a> {
    pub conn: &'a PgConnection,
}

pub struct RunResult {
    pub num_reaped: i64,
}

impl<'a> Reaper<'a> {
    pub fn run(&mut self, log: &Logger) -> Result<RunResult> {
        common::log_timed(&log.new(o!("step" => file!())), |log| self.run_inner(log))
    }

    fn run_inner(&mut self, log: &Logger) -> Result<RunResult> {
        let cutoff = Utc::now() - Duration::minutes(GRACE_WINDOW_MINUTES);

        let num_reaped = diesel::update(
            download_jobs::table
                .filter(download_jobs::status.eq(JobStatus::Running))
                .filter(download_jobs::started_at.lt(cutoff)),
        )
        .set((
            download_jobs::status.eq(JobStatus::Pending),
            download_jobs::started_at.eq(None::<chrono::DateTime<Utc>>),
        ))
        .execute(self.conn)? as i64;

        if num_reaped > 0 {
            info!(log, "Reaped orphaned running jobs"; "num_reaped" => num_reaped);
        }
        Ok(RunResult { num_reaped })
    }
}

#[cfg(test)]
mod tests {
    use mediators::reaper::*;
    use test_helpers;

    #[test]
    #[ignore]
    fn test_reaper_leaves_fresh_running_jobs_alone() {
        let bootstrap = test_helpers::TestBootstrap::new();
        let mut mediator = Reaper { conn: &*bootstrap.conn };
        let res = mediator.run(&bootstrap.log).unwrap();
        assert_eq!(0, res.num_reaped);
    }
}
