//! Single-flight polling of the sheet and dispatch of announcements.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::formatter::{render, MessageStyle};
use crate::scanner::SheetWatcher;
use crate::sink::{MessageSink, SinkError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Scanning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A scan was already running; this firing did nothing.
    Busy,
    Completed { delivered: usize },
}

#[derive(Debug, Error)]
pub enum TickError {
    #[error("failed to deliver row {row_index} ({delivered} of {accepted} delivered): {source}")]
    Dispatch {
        row_index: usize,
        delivered: usize,
        accepted: usize,
        #[source]
        source: SinkError,
    },
}

pub struct PollLoop {
    state: Mutex<PollState>,
    watcher: tokio::sync::Mutex<SheetWatcher>,
    sink: Arc<dyn MessageSink>,
    style: MessageStyle,
    interval: Duration,
}

impl PollLoop {
    pub fn new(
        watcher: SheetWatcher,
        sink: Arc<dyn MessageSink>,
        style: MessageStyle,
        interval: Duration,
    ) -> Self {
        Self {
            state: Mutex::new(PollState::Idle),
            watcher: tokio::sync::Mutex::new(watcher),
            sink,
            style,
            interval,
        }
    }

    pub fn state(&self) -> PollState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One timer firing. Rows are dispatched in sheet order; the first failed
    /// send abandons the rest of the batch, which stays behind the watermark.
    pub async fn tick(&self) -> Result<TickOutcome, TickError> {
        let Some(_scan) = self.begin_scan() else {
            debug!("previous scan still running; skipping tick");
            return Ok(TickOutcome::Busy);
        };

        let rows = self.watcher.lock().await.new_rows().await;
        let accepted = rows.len();
        let now = Utc::now();

        for (delivered, row) in rows.iter().enumerate() {
            let notification = render(row, self.style, now);
            self.sink
                .send(&notification)
                .await
                .map_err(|source| TickError::Dispatch {
                    row_index: row.row_index,
                    delivered,
                    accepted,
                    source,
                })?;
            info!(row = row.row_index, name = row.name(), "announced new entry");
        }

        Ok(TickOutcome::Completed {
            delivered: accepted,
        })
    }

    /// Fires [`Self::tick`] every interval until `shutdown` resolves. The first
    /// firing happens one interval after start. Ticks still running at shutdown
    /// are awaited so a batch is never cut off mid-send.
    pub async fn run<S>(self: Arc<Self>, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        let mut in_flight = JoinSet::new();
        tokio::pin!(shutdown);
        info!(interval_ms = self.interval.as_millis() as u64, "polling for new rows");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested; poll loop stopping");
                    break;
                }
                _ = ticker.tick() => {
                    while in_flight.try_join_next().is_some() {}
                    let poller = Arc::clone(&self);
                    in_flight.spawn(async move {
                        match poller.tick().await {
                            Ok(TickOutcome::Completed { delivered }) if delivered > 0 => {
                                info!(delivered, "delivered new entries");
                            }
                            Ok(_) => {}
                            Err(err) => error!(error = %err, "error checking for updates"),
                        }
                    });
                }
            }
        }

        if !in_flight.is_empty() {
            info!(pending = in_flight.len(), "waiting for in-flight scan to finish");
        }
        while let Some(joined) = in_flight.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "poll task failed");
            }
        }
    }

    fn begin_scan(&self) -> Option<ScanGuard<'_>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == PollState::Scanning {
            return None;
        }
        *state = PollState::Scanning;
        Some(ScanGuard { state: &self.state })
    }
}

// Returns the loop to Idle however the scan ends.
struct ScanGuard<'a> {
    state: &'a Mutex<PollState>,
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = PollState::Idle;
    }
}
