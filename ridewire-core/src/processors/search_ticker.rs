//! SearchTicker processor.
//!
//! The SearchTicker is the only long-lived timer of the dispatch core. On
//! every tick it emits [`AdvanceSearches`] to the [`Dispatcher`], which
//! retries due searches, expires exhausted ones and reaps old terminal
//! rides. The tick resolution follows `DispatchConfig::scheduler_tick` and
//! is re-read whenever the config store changes.

use kanau::processor::Processor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::events::AdvanceSearches;
use crate::framework::Dispatcher;

const MIN_TICK: Duration = Duration::from_millis(10);

pub struct SearchTicker {
    dispatcher: Arc<Dispatcher>,
}

impl SearchTicker {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Run until shutdown is signaled.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut config_watcher = self.dispatcher.config_store().subscribe();
        let mut tick = self.dispatcher.config().scheduler_tick;
        let mut interval = ticker(tick);
        info!(tick_ms = tick.as_millis() as u64, "SearchTicker started");

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("SearchTicker received shutdown signal");
                        break;
                    }
                }

                Ok(config) = config_watcher.changed() => {
                    let next = config.scheduler_tick;
                    if next != tick {
                        tick = next;
                        interval = ticker(tick);
                        info!(tick_ms = tick.as_millis() as u64, "SearchTicker tick changed");
                    }
                }

                now = interval.tick() => {
                    let sweep = match self.dispatcher.process(AdvanceSearches { now }).await {
                        Ok(sweep) => sweep,
                        Err(never) => match never {},
                    };
                    if sweep.matched + sweep.exhausted + sweep.purged > 0 {
                        debug!(
                            matched = sweep.matched,
                            exhausted = sweep.exhausted,
                            purged = sweep.purged,
                            "Search sweep"
                        );
                    }
                }
            }
        }

        info!("SearchTicker stopped");
    }
}

fn ticker(period: Duration) -> Interval {
    let period = period.max(MIN_TICK);
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
