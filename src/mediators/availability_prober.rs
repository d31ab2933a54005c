//! Availability prober (C5, §4.5), grounded on the ancestor's
//! `podcast_reingester.rs` single-connection batch-select loop, swapping
//! its feed-refetch work for an HTTP HEAD/GET probe against the three-state
//! (plus `gone`) availability state machine.

use errors::*;
use http_client::HttpClient;
use mediators::common;
use model::{insertable, AvailabilityStatus, JobStatus};
use schema::{availability_log, download_jobs, episodes};

use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use slog::Logger;
use std::sync::Arc;

pub struct AvailabilityProber<'a> {
    pub conn: &'a PgConnection,
    pub client: Arc<dyn HttpClient>,
    pub batch_size: i64,
}

pub struct RunResult {
    pub num_probed: i64,
    pub num_available: i64,
    pub num_gone: i64,
    pub num_unavailable: i64,
    pub num_requeued: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ProbeOutcome {
    Available,
    Gone,
    Unavailable,
}

impl<'a> AvailabilityProber<'a> {
    pub fn run(&mut self, log: &Logger) -> Result<RunResult> {
        common::log_timed(&log.new(o!("step" => file!())), |log| self.run_inner(log))
    }

    fn run_inner(&mut self, log: &Logger) -> Result<RunResult> {
        let mut res = RunResult {
            num_probed: 0,
            num_available: 0,
            num_gone: 0,
            num_unavailable: 0,
            num_requeued: 0,
        };

        for (episode_id, url, status) in self.select_batch(log)? {
            let outcome = self.probe(log, &url);
            self.record_probe(episode_id, &outcome)?;
            self.apply_state_machine(episode_id, status, outcome)?;

            res.num_probed += 1;
            match outcome {
                ProbeOutcome::Available => res.num_available += 1,
                ProbeOutcome::Gone => res.num_gone += 1,
                ProbeOutcome::Unavailable => res.num_unavailable += 1,
            }
        }

        res.num_requeued = self.process_watch_jobs(log)?;

        info!(log, "Availability probe batch finished";
            "num_probed" => res.num_probed, "num_available" => res.num_available,
            "num_gone" => res.num_gone, "num_unavailable" => res.num_unavailable,
            "num_requeued" => res.num_requeued);
        Ok(res)
    }

    fn select_batch(&self, _log: &Logger) -> Result<Vec<(i64, String, AvailabilityStatus)>> {
        let rows: Vec<(i64, Option<String>, AvailabilityStatus)> = episodes::table
            .filter(
                episodes::availability_status
                    .eq(AvailabilityStatus::Unknown)
                    .or(episodes::availability_status.eq(AvailabilityStatus::Unavailable)),
            )
            .order(episodes::last_checked_at.asc())
            .limit(self.batch_size)
            .select((episodes::id, episodes::url, episodes::availability_status))
            .load(self.conn)?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, url, status)| url.map(|u| (id, u, status)))
            .collect())
    }

    /// HEAD with redirect following; falls back to GET on 405 (§4.5 "Probe
    /// procedure").
    fn probe(&self, log: &Logger, url: &str) -> ProbeOutcome {
        let res = self.client.head(log, url);
        let res = match res {
            Ok(r) if r.status == 405 => self.client.get(log, url),
            other => other,
        };

        match res {
            Ok(r) if r.status < 400 => ProbeOutcome::Available,
            Ok(r) if r.status == 404 || r.status == 410 => ProbeOutcome::Gone,
            Ok(_) => ProbeOutcome::Unavailable,
            Err(e) => {
                debug!(log, "Probe request failed"; "url" => url, "error" => e.to_string());
                ProbeOutcome::Unavailable
            }
        }
    }

    fn record_probe(&self, episode_id: i64, outcome: &ProbeOutcome) -> Result<()> {
        let (was_available, http_status) = match outcome {
            ProbeOutcome::Available => (true, Some(200)),
            ProbeOutcome::Gone => (false, Some(404)),
            ProbeOutcome::Unavailable => (false, None),
        };

        diesel::insert_into(availability_log::table)
            .values(insertable::AvailabilityLog {
                episode_id,
                checked_at: Utc::now(),
                was_available,
                http_status,
            })
            .execute(self.conn)?;
        Ok(())
    }

    /// Applies the state-machine transition table (§4.5 "State machine").
    /// `gone` is sticky on anything but a successful probe.
    fn apply_state_machine(
        &self,
        episode_id: i64,
        from: AvailabilityStatus,
        outcome: ProbeOutcome,
    ) -> Result<()> {
        let new_status = match (from, outcome) {
            (_, ProbeOutcome::Available) => AvailabilityStatus::Available,
            (_, ProbeOutcome::Gone) => AvailabilityStatus::Gone,
            (AvailabilityStatus::Gone, ProbeOutcome::Unavailable) => AvailabilityStatus::Gone,
            (_, ProbeOutcome::Unavailable) => AvailabilityStatus::Unavailable,
        };

        let now = Utc::now();
        if outcome == ProbeOutcome::Available {
            diesel::update(episodes::table.find(episode_id))
                .set((
                    episodes::availability_status.eq(new_status),
                    episodes::last_checked_at.eq(now),
                    episodes::last_seen_at.eq(now),
                    episodes::updated_at.eq(now),
                ))
                .execute(self.conn)?;
        } else {
            diesel::update(episodes::table.find(episode_id))
                .set((
                    episodes::availability_status.eq(new_status),
                    episodes::last_checked_at.eq(now),
                    episodes::updated_at.eq(now),
                ))
                .execute(self.conn)?;
        }
        Ok(())
    }

    /// Processes every `watch` job: if its episode is newly available,
    /// flips it back to `pending` (§4.5 "WATCH processing").
    fn process_watch_jobs(&self, log: &Logger) -> Result<i64> {
        let watch_jobs: Vec<(i64, i64)> = download_jobs::table
            .filter(download_jobs::status.eq(JobStatus::Watch))
            .inner_join(episodes::table)
            .select((download_jobs::id, episodes::id))
            .load(self.conn)?;

        let mut num_requeued = 0i64;
        for (job_id, episode_id) in watch_jobs {
            let url: Option<String> = episodes::table
                .find(episode_id)
                .select(episodes::url)
                .first(self.conn)?;
            let url = match url {
                Some(u) => u,
                None => continue,
            };

            if self.probe(log, &url) == ProbeOutcome::Available {
                diesel::update(download_jobs::table.find(job_id))
                    .set((
                        download_jobs::status.eq(JobStatus::Pending),
                        download_jobs::error.eq(None::<String>),
                    ))
                    .execute(self.conn)?;
                num_requeued += 1;
            }
        }

        Ok(num_requeued)
    }
}

#[cfg(test)]
mod tests {
    use mediators::availability_prober::*;

    #[test]
    fn test_state_machine_gone_is_sticky() {
        let prober_like = |from, outcome| match (from, outcome) {
            (_, ProbeOutcome::Available) => AvailabilityStatus::Available,
            (_, ProbeOutcome::Gone) => AvailabilityStatus::Gone,
            (AvailabilityStatus::Gone, ProbeOutcome::Unavailable) => AvailabilityStatus::Gone,
            (_, ProbeOutcome::Unavailable) => AvailabilityStatus::Unavailable,
        };

        assert_eq!(
            AvailabilityStatus::Gone,
            prober_like(AvailabilityStatus::Gone, ProbeOutcome::Unavailable)
        );
        assert_eq!(
            AvailabilityStatus::Available,
            prober_like(AvailabilityStatus::Gone, ProbeOutcome::Available)
        );
        assert_eq!(
            AvailabilityStatus::Unavailable,
            prober_like(AvailabilityStatus::Unknown, ProbeOutcome::Unavailable)
        );
    }
}
