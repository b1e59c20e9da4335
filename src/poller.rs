use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::core::model::RepositoryModel;
use crate::core::settings::ConfigSource;
use crate::scheduler::{CancelToken, ScheduledTask, Scheduler};

/// How often an enabled poller asks the model to recount.
pub const POLL_PERIOD: Duration = Duration::from_secs(3 * 60);

/// Delay before the first refresh after enabling, so the host's initial
/// status run gets the repository to itself.
pub const FIRST_REFRESH_DELAY: Duration = Duration::from_secs(3);

/// Keeps a repository's incoming/outgoing counts fresh.
///
/// Owns a repeating timer that asks the [`RepositoryModel`] to recount,
/// follows the `auto_in_out` configuration option, and stops itself when
/// the model reports a failure that retrying cannot fix.
pub struct AutoInOutPoller {
    inner: Arc<PollerInner>,
    subscriptions: Mutex<Vec<JoinHandle<()>>>,
}

struct PollerInner {
    model: Arc<dyn RepositoryModel>,
    config: Arc<dyn ConfigSource>,
    scheduler: Arc<dyn Scheduler>,
    /// Presence of the repeating timer's token is the enabled flag.
    timer: Mutex<Option<CancelToken>>,
    in_flight: AtomicBool,
    disposed: AtomicBool,
}

impl AutoInOutPoller {
    /// Subscribes to configuration and hgrc change events, then reconciles
    /// once so the initial state matches the current configuration.
    pub fn new(
        model: Arc<dyn RepositoryModel>,
        config: Arc<dyn ConfigSource>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let inner = Arc::new(PollerInner {
            model: Arc::clone(&model),
            config,
            scheduler,
            timer: Mutex::new(None),
            in_flight: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        });

        let subscriptions = vec![
            spawn_reconcile(&inner, inner.config.subscribe()),
            spawn_reconcile(&inner, model.subscribe_hgrc_changed()),
        ];

        reconcile_from_configuration(&inner);

        Self {
            inner,
            subscriptions: Mutex::new(subscriptions),
        }
    }

    /// Manual override; normally driven by configuration events.
    pub fn enable(&self) {
        enable(&self.inner);
    }

    /// Manual override; normally driven by configuration events.
    pub fn disable(&self) {
        self.inner.disable();
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.timer.lock().unwrap().is_some()
    }

    /// Stops all polling and releases the event subscriptions. Idempotent;
    /// the poller cannot be re-enabled afterwards.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.inner.disable();
        for subscription in self.subscriptions.lock().unwrap().drain(..) {
            subscription.abort();
        }

        tracing::debug!("Auto incoming/outgoing poller disposed");
    }
}

impl Drop for AutoInOutPoller {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn spawn_reconcile(
    inner: &Arc<PollerInner>,
    mut events: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                // A lagged receiver still means something changed.
                Ok(()) | Err(RecvError::Lagged(_)) => reconcile_from_configuration(&inner),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn reconcile_from_configuration(inner: &Arc<PollerInner>) {
    if inner.config.auto_in_out() == Some(false) {
        inner.disable();
    } else {
        enable(inner);
    }
}

fn enable(inner: &Arc<PollerInner>) {
    if inner.disposed.load(Ordering::SeqCst) {
        return;
    }

    let mut timer = inner.timer.lock().unwrap();
    if timer.is_some() {
        return;
    }

    tracing::info!("Auto incoming/outgoing enabled (period: {:?})", POLL_PERIOD);

    // The one-shot's token is dropped on purpose: a first refresh that
    // outlives a disable is harmless and settles on the next
    // reconciliation.
    let _ = inner
        .scheduler
        .schedule_once(FIRST_REFRESH_DELAY, refresh_task(inner));

    *timer = Some(
        inner
            .scheduler
            .schedule_repeating(POLL_PERIOD, refresh_task(inner)),
    );
}

fn refresh_task(inner: &Arc<PollerInner>) -> ScheduledTask {
    let poller = Arc::clone(inner);
    Arc::new(move || {
        let poller = Arc::clone(&poller);
        Box::pin(async move { poller.refresh().await })
    })
}

impl PollerInner {
    fn disable(&self) {
        let token = self.timer.lock().unwrap().take();
        if let Some(token) = token {
            tracing::info!("Auto incoming/outgoing disabled");
            token.cancel();
        }
    }

    async fn refresh(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        // A tick that lands while a query is still running shares its
        // outcome instead of stacking a second concurrent query.
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return;
        }
        let _guard = InFlightGuard(&self.in_flight);

        match self.model.count_incoming_outgoing().await {
            Ok(()) => {}
            Err(err) if err.is_permanent() => {
                tracing::warn!(
                    error = %err,
                    "Incoming/outgoing query cannot succeed, disabling auto refresh"
                );
                self.disable();
            }
            // Transient failure; the next tick retries.
            Err(_) => {}
        }
    }
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
