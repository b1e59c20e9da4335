//! Background incoming/outgoing changeset tracking for Mercurial hosts.
//!
//! The host supplies a [`RepositoryModel`] that knows how to count
//! incoming/outgoing changesets against a remote; [`AutoInOutPoller`] owns
//! the schedule — refreshing the counts every few minutes, following the
//! `auto_in_out` configuration option, and stopping once the model reports
//! a failure that retrying cannot fix.

pub mod core;
pub mod poller;
pub mod scheduler;

pub use crate::core::errors::HgError;
pub use crate::core::model::RepositoryModel;
pub use crate::core::settings::{ConfigSource, Settings, SettingsWatcher};
pub use crate::poller::{AutoInOutPoller, FIRST_REFRESH_DELAY, POLL_PERIOD};
pub use crate::scheduler::{CancelToken, ScheduledTask, Scheduler, TokioScheduler};
