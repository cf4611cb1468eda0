// Daily reset scheduler.
//
// Sleeps until the next local midnight, clears yesterday's prompt records,
// and repeats. The target is recomputed every cycle from the wall clock, so
// DST shifts and clock corrections move the next wake-up instead of
// accumulating drift.

use crate::core::clock::Clock;
use crate::core::throttle::{DailyPromptThrottle, PromptStore};
use chrono::{DateTime, TimeZone};
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Used when the next midnight cannot be computed at all.
const FALLBACK_WAIT: Duration = Duration::from_secs(60 * 60);

/// First instant of the next local calendar day. When midnight itself is
/// skipped by a DST jump, the first whole hour that exists is used.
pub fn next_midnight(now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    let tz = now.timezone();
    let tomorrow = now.date_naive().succ_opt()?;

    (0..24).find_map(|hour| {
        let local = tomorrow.and_hms_opt(hour, 0, 0)?;
        tz.from_local_datetime(&local).earliest()
    })
}

pub fn duration_until_next_midnight(now: &DateTime<Tz>) -> Duration {
    next_midnight(now)
        .and_then(|midnight| (midnight - *now).to_std().ok())
        .unwrap_or(FALLBACK_WAIT)
}

pub struct DailyResetScheduler<S: PromptStore> {
    throttle: Arc<DailyPromptThrottle<S>>,
    clock: Arc<dyn Clock>,
}

impl<S: PromptStore> DailyResetScheduler<S> {
    pub fn new(throttle: Arc<DailyPromptThrottle<S>>, clock: Arc<dyn Clock>) -> Self {
        Self { throttle, clock }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let now = self.clock.now();
            let started_on = now.date_naive();
            let wait = duration_until_next_midnight(&now);
            tracing::debug!(wait_secs = wait.as_secs(), "Next prompt reset scheduled");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            // Timers can fire a little early; only reset once the day has
            // actually changed.
            if self.clock.today() == started_on {
                continue;
            }

            if let Err(err) = self.throttle.reset_all().await {
                tracing::error!(error = %err, "Daily prompt reset failed");
            }
        }

        tracing::info!("Daily reset scheduler stopped");
    }
}
