//! The two periodic loops driving telemetry
//!
//! - **collection loop**: `start_collect()` on every tick, starting polls of
//!   the due, idle collectors among the currently subscribed topics
//! - **dispatch loop**: `dispatch_tick()` on every tick, re-sending the cache
//!
//! Both run as independent tasks so their cadences can differ. Shutdown stops
//! the loops after the current iteration; in-flight polls are not cancelled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, instrument, trace};

use crate::dispatcher::Dispatcher;

/// Handle owning the collection and dispatch tasks
pub struct TelemetryHandle {
    shutdown: watch::Sender<bool>,
    collection: JoinHandle<()>,
    dispatch: JoinHandle<()>,
}

impl TelemetryHandle {
    /// Spawn both loops
    pub fn spawn(
        dispatcher: Arc<Dispatcher>,
        collect_every: Duration,
        dispatch_every: Duration,
    ) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);

        let collection = tokio::spawn(collection_loop(
            Arc::clone(&dispatcher),
            collect_every,
            shutdown_rx.clone(),
        ));
        let dispatch = tokio::spawn(dispatch_loop(dispatcher, dispatch_every, shutdown_rx));

        Self {
            shutdown,
            collection,
            dispatch,
        }
    }

    /// Stop both loops and wait for them to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);

        for (name, task) in [("collection", self.collection), ("dispatch", self.dispatch)] {
            if let Err(e) = task.await {
                error!("{name} loop ended abnormally: {e}");
            }
        }
    }
}

#[instrument(skip_all)]
async fn collection_loop(
    dispatcher: Arc<Dispatcher>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!("starting collection loop every {period:?}");

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // polls run detached so a slow topic never delays the next tick
                let started = dispatcher.start_collect().await;
                trace!("collection tick started {} polls", started.len());
            }
            _ = shutdown.changed() => break,
        }
    }

    debug!("collection loop stopped");
}

#[instrument(skip_all)]
async fn dispatch_loop(
    dispatcher: Arc<Dispatcher>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!("starting dispatch loop every {period:?}");

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                dispatcher.dispatch_tick().await;
            }
            _ = shutdown.changed() => break,
        }
    }

    debug!("dispatch loop stopped");
}
