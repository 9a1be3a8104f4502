//! Periodic scheduling for the long-running service.
//!
//! Two independent timers: one triggers a change-detection cycle, the other
//! flushes both stores. A cycle still running when the cycle timer fires
//! causes that tick to be dropped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};

use crate::app::AppContext;
use crate::config::{ConfigError, ScheduleConfig};

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Cycle interval in seconds (default: 3600 = 1 hour)
    pub cycle_interval_secs: u64,
    /// Flush interval in seconds (default: 60)
    pub flush_interval_secs: u64,
    /// Whether scheduled cycles notify subscribers
    pub notify: bool,
    /// Whether to run a silent cycle immediately on start
    pub cycle_on_start: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: 3600,
            flush_interval_secs: 60,
            notify: true,
            cycle_on_start: false,
        }
    }
}

impl DaemonConfig {
    pub fn from_schedule(schedule: &ScheduleConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            cycle_interval_secs: schedule.cycle_interval_secs()?,
            flush_interval_secs: schedule.flush_interval_secs()?,
            notify: schedule.notify,
            cycle_on_start: schedule.cycle_on_start,
        })
    }
}

const UNITS: [(char, u64); 4] = [('d', 86_400), ('h', 3_600), ('m', 60), ('s', 1)];

/// Parse an interval such as `"1h"`, `"30m"`, `"1d"`, `"45s"` or bare seconds.
pub fn parse_interval(s: &str) -> Result<u64, ConfigError> {
    let s = s.trim().to_lowercase();
    let (digits, unit) = match s.char_indices().last() {
        Some((i, c)) if c.is_ascii_alphabetic() => (&s[..i], Some(c)),
        _ => (s.as_str(), None),
    };

    let scale = match unit {
        None => 1,
        Some(c) => UNITS
            .iter()
            .find(|(u, _)| *u == c)
            .map(|(_, scale)| *scale)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown interval unit '{}' in '{}'", c, s)))?,
    };

    let count: u64 = digits.parse().map_err(|_| {
        ConfigError::Invalid(format!("invalid interval '{}'; use e.g. '1h', '30m', '1d'", s))
    })?;

    match count.checked_mul(scale) {
        Some(0) => Err(ConfigError::Invalid("interval must be greater than zero".into())),
        Some(secs) => Ok(secs),
        None => Err(ConfigError::Invalid(format!("interval '{}' is too large", s))),
    }
}

/// Largest whole unit, e.g. `7200` → `"2h"`.
pub fn format_interval(secs: u64) -> String {
    UNITS
        .iter()
        .find(|(_, scale)| secs >= *scale && secs % scale == 0)
        .map(|(unit, scale)| format!("{}{}", secs / scale, unit))
        .unwrap_or_else(|| format!("{}s", secs))
}

/// Daemon runner
pub struct Daemon {
    ctx: Arc<AppContext>,
    config: DaemonConfig,
}

impl Daemon {
    pub fn new(ctx: Arc<AppContext>, config: DaemonConfig) -> Self {
        Self { ctx, config }
    }

    /// Run until `shutdown` resolves, then wait for any in-flight cycle and
    /// flush both stores one last time.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            cycle_interval = %format_interval(self.config.cycle_interval_secs),
            flush_interval = %format_interval(self.config.flush_interval_secs),
            notify = self.config.notify,
            "scheduler started"
        );

        if self.config.cycle_on_start {
            tracing::info!("running initial silent cycle");
            self.ctx.detector.trigger(false);
        }

        let mut cycle_timer = interval(Duration::from_secs(self.config.cycle_interval_secs));
        cycle_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        cycle_timer.tick().await; // Skip the first immediate tick

        let mut flush_timer = interval(Duration::from_secs(self.config.flush_interval_secs));
        flush_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        flush_timer.tick().await;

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = cycle_timer.tick() => {
                    tracing::debug!("scheduled cycle");
                    self.ctx.detector.trigger(self.config.notify);
                }
                _ = flush_timer.tick() => {
                    self.ctx.flush().await;
                }
            }
        }

        tracing::info!("scheduler shutting down");
        self.ctx.detector.wait_idle().await;
        self.ctx.flush().await;
    }
}

/// Resolves on SIGINT or SIGTERM (Ctrl-C on Windows).
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {},
                    _ = sigint.recv() => {},
                }
            }
            _ => {
                tracing::warn!("failed to install signal handlers; falling back to Ctrl-C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
